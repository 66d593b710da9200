pub mod daft;
pub mod idealista;
pub mod immoscout24;
pub mod token;
pub mod traits;
pub mod types;

pub use daft::DaftClient;
pub use idealista::IdealistaClient;
pub use immoscout24::ImmoScout24Client;
pub use token::TokenManager;
pub use traits::PropertyClient;

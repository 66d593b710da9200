pub mod aggregator;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod queries;
pub mod reference;

pub use aggregator::PropertyAggregator;
pub use config::Config;
pub use queries::{PropertyQueries, SearchRequest};

use thiserror::Error;

/// Failures inside a source adapter.
///
/// These never leave the adapter: `PropertyClient::search` and
/// `PropertyClient::get_property` log them and degrade to an empty or absent
/// result.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{source_name} is not configured")]
    NotConfigured { source_name: &'static str },

    #[error("{source_name} request failed: {error}")]
    Http {
        source_name: &'static str,
        #[source]
        error: reqwest::Error,
    },

    #[error("{source_name} returned status {status}")]
    Status {
        source_name: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{source_name} returned an unreadable payload: {error}")]
    Decode {
        source_name: &'static str,
        #[source]
        error: serde_json::Error,
    },

    #[error("{source_name} authentication failed: {message}")]
    Auth {
        source_name: &'static str,
        message: String,
    },

    #[error("{source_name} cannot resolve property id {id}")]
    InvalidId { source_name: &'static str, id: String },
}

impl SourceError {
    pub fn http(source_name: &'static str, error: reqwest::Error) -> Self {
        Self::Http { source_name, error }
    }

    pub fn decode(source_name: &'static str, error: serde_json::Error) -> Self {
        Self::Decode { source_name, error }
    }
}

/// User-facing failures of the query surface. Messages never carry internals.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid search filters provided")]
    InvalidFilters { reason: String },

    #[error("Failed to search properties")]
    SearchFailed,

    #[error("Failed to fetch property")]
    PropertyFetchFailed,
}

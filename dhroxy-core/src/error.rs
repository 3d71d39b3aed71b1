use thiserror::Error;

#[derive(Error, Debug)]
pub enum DhroxyError {
    /// Upstream sent a timestamp that is not an offset date-time.
    #[error("Invalid timestamp in {field}: '{value}': {source}")]
    InvalidTimestamp {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DhroxyError>;

//! Error types shared by every pipeline stage.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the readmission pipeline
#[derive(Debug, Error)]
pub enum ReadmitError {
    #[error("{0} not set")]
    MissingSetting(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Model not found at {}. Train first.", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Arrow conversion error: {0}")]
    SerdeArrow(#[from] serde_arrow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Server error: {0}")]
    Server(#[source] std::io::Error),

    #[error("Request failed: {0}")]
    Client(#[from] reqwest::Error),
}

impl ReadmitError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Message without the variant prefix, for callers that add their own.
    pub fn reason(&self) -> String {
        match self {
            Self::Client(source) => source.to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, ReadmitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_keeps_the_prefix_of_non_client_errors() {
        let err = ReadmitError::InvalidData("row 3 has label 2".into());
        assert_eq!(err.reason(), "Invalid data: row 3 has label 2");
    }
}

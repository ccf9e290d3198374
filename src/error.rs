use thiserror::Error;

use crate::literal::LiteralError;

/// Main error type for bizgraph
#[derive(Error, Debug)]
pub enum BizgraphError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Declaration literal could not be turned into JSON
    #[error("Literal error: {0}")]
    Literal(#[from] LiteralError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Chat completion API errors
    #[error("Chat API error: {0}")]
    Chat(String),

    /// Requested record does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Record already exists
    #[error("{0} already exists")]
    Conflict(String),

    /// Record shape does not match what a table expects
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using BizgraphError
pub type Result<T> = std::result::Result<T, BizgraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BizgraphError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_not_found_display() {
        let err = BizgraphError::NotFound("Node 'n1'".to_string());
        assert_eq!(err.to_string(), "Node 'n1' not found");
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: BizgraphError = rusqlite_err.into();
        assert!(matches!(err, BizgraphError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BizgraphError = io_err.into();
        assert!(matches!(err, BizgraphError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: BizgraphError = json_err.into();
        assert!(matches!(err, BizgraphError::Json(_)));
    }
}

use thiserror::Error;

/// Main error type for kbase
#[derive(Error, Debug)]
pub enum KbaseError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Extension is not in the supported-format table (checked before any I/O)
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Loader could not produce text from a supported file
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Embedding backend errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector store errors
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// File record not found
    #[error("File not found: {0}")]
    FileNotFound(i64),

    /// Sync root not found
    #[error("Sync root not found: {0}")]
    SyncRootNotFound(i64),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenient Result type using KbaseError
pub type Result<T> = std::result::Result<T, KbaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KbaseError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: KbaseError = rusqlite_err.into();
        assert!(matches!(err, KbaseError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: KbaseError = io_err.into();
        assert!(matches!(err, KbaseError::Io(_)));
    }

    #[test]
    fn test_unsupported_file_type_message() {
        let err = KbaseError::UnsupportedFileType(".zzz".to_string());
        assert!(err.to_string().contains("Unsupported file type"));
        assert!(err.to_string().contains(".zzz"));
    }
}

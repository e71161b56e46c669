use thiserror::Error;

/// Main error type for relgraph
#[derive(Error, Debug)]
pub enum RelgraphError {
    /// Database-related errors (storage failures not otherwise classified)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad or missing required input
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A person with this name already exists
    #[error("A person named \"{0}\" already exists")]
    DuplicateName(String),

    /// The unordered pair already has a relationship
    #[error("A relationship between persons {0} and {1} already exists")]
    DuplicateRelationship(i64, i64),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unsupported format, oversize upload or decode failure
    #[error("Image error: {0}")]
    ImageProcessing(String),

    /// Unexpected runtime failure (e.g. a blocking task panicked)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenient Result type using RelgraphError
pub type Result<T> = std::result::Result<T, RelgraphError>;

impl RelgraphError {
    /// True for errors caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RelgraphError::Validation(_)
                | RelgraphError::DuplicateName(_)
                | RelgraphError::DuplicateRelationship(..)
                | RelgraphError::NotFound(_)
                | RelgraphError::ImageProcessing(_)
        )
    }
}

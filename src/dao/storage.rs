use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by seed store backends regardless of the underlying service.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or the exchange with it failed.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend answered but refused the operation (missing key, index out of range...).
    #[error("storage rejected operation on `{key}`: {message}")]
    Rejected { key: String, message: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a rejection for an operation on `key`.
    pub fn rejected(key: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Rejected {
            key: key.into(),
            message: message.into(),
        }
    }
}

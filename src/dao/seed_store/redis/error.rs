//! Error types shared by the Redis storage implementation.

use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`RedisDaoError`] failures.
pub type RedisResult<T> = Result<T, RedisDaoError>;

/// Failures that can occur while talking RESP to Redis.
#[derive(Debug, Error)]
pub enum RedisDaoError {
    /// Connection URL could not be understood.
    #[error("invalid Redis URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: &'static str },
    /// TCP connection to the server failed.
    #[error("failed to connect to Redis at `{address}`")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    /// Encoding, decoding or transport failure on an established connection.
    #[error("Redis protocol failure during `{command}`: {details}")]
    Protocol {
        command: &'static str,
        details: String,
    },
    /// Server closed the connection.
    #[error("Redis connection closed during `{command}`")]
    Disconnected { command: &'static str },
    /// Server did not answer in time.
    #[error("Redis command `{command}` timed out")]
    Timeout { command: &'static str },
    /// Server answered with an error reply.
    #[error("Redis rejected `{command}` on `{key}`: {message}")]
    Reply {
        command: &'static str,
        key: String,
        message: String,
    },
    /// Server answered with a frame of the wrong shape.
    #[error("unexpected Redis reply to `{command}`: {frame}")]
    UnexpectedReply {
        command: &'static str,
        frame: String,
    },
}

impl From<RedisDaoError> for StorageError {
    fn from(err: RedisDaoError) -> Self {
        match err {
            RedisDaoError::Reply { key, message, .. } => StorageError::rejected(key, message),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}

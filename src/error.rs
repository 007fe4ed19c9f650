use thiserror::Error;

use crate::state::counters::{CounterError, Side};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
}

/// Validation failures for inbound WebSocket messages.
///
/// The `Display` output is the message sent back to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Payload is not UTF-8 encoded JSON.
    #[error("Invalid JSON payload")]
    InvalidJson,
    /// Payload carries no usable `type` discriminant.
    #[error("Missing type field")]
    MissingType,
    /// `type` is not one of the supported request kinds.
    #[error("Unrecognized request type: {0}")]
    UnrecognizedType(String),
    /// `matt` or `hail` is absent.
    #[error("Missing required data fields")]
    MissingFields,
    /// `matt` or `hail` is not an array.
    #[error("data.matt and data.hail must be arrays")]
    NotArrays,
    /// `matt` or `hail` does not hold exactly one entry per seed.
    #[error("Invalid data length")]
    InvalidLength,
    /// An entry is not an integer.
    #[error("Invalid data format in data.{side}: {found}")]
    InvalidFormat {
        /// Array holding the offending entry.
        side: Side,
        /// JSON type name of the offending entry.
        found: &'static str,
    },
    /// Applying the increment would overflow a counter.
    #[error("Increment overflows data.{side}[{index}]")]
    Overflow {
        /// Side of the overflowing counter.
        side: Side,
        /// Index of the overflowing counter.
        index: usize,
    },
}

impl ProtocolError {
    /// Status code carried in the error reply.
    pub fn code(&self) -> u16 {
        match self {
            ProtocolError::InvalidJson
            | ProtocolError::MissingType
            | ProtocolError::UnrecognizedType(_)
            | ProtocolError::MissingFields => 400,
            ProtocolError::NotArrays
            | ProtocolError::InvalidLength
            | ProtocolError::InvalidFormat { .. }
            | ProtocolError::Overflow { .. } => 422,
        }
    }
}

impl From<CounterError> for ProtocolError {
    fn from(err: CounterError) -> Self {
        match err {
            CounterError::IndexOutOfRange { .. } => ProtocolError::InvalidLength,
            CounterError::Overflow { side, index } => ProtocolError::Overflow { side, index },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_split_missing_from_malformed() {
        assert_eq!(ProtocolError::MissingType.code(), 400);
        assert_eq!(ProtocolError::UnrecognizedType("foo".into()).code(), 400);
        assert_eq!(ProtocolError::MissingFields.code(), 400);
        assert_eq!(ProtocolError::NotArrays.code(), 422);
        assert_eq!(ProtocolError::InvalidLength.code(), 422);
        assert_eq!(
            ProtocolError::Overflow {
                side: Side::Hail,
                index: 0
            }
            .code(),
            422
        );
    }

    #[test]
    fn messages_name_the_offending_field() {
        let err = ProtocolError::InvalidFormat {
            side: Side::Hail,
            found: "string",
        };
        assert_eq!(err.to_string(), "Invalid data format in data.hail: string");
        assert_eq!(
            ProtocolError::UnrecognizedType("foo".into()).to_string(),
            "Unrecognized request type: foo"
        );
    }
}

use serde::Serialize;
use serde_json::{Map, Number, Value};
use utoipa::ToSchema;

use crate::{
    error::ProtocolError,
    state::counters::{SEED_COUNT, Seeds, Side, Snapshot},
};

/// Validated request received from a seed client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Per-index deltas to add to both sides.
    Increment {
        /// Deltas for the `matt` side.
        matt: Seeds,
        /// Deltas for the `hail` side.
        hail: Seeds,
    },
    /// Ask for the current snapshot.
    UpdateRequest,
}

impl ClientRequest {
    /// Parse and validate a raw text frame.
    pub fn from_json_str(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(|_| ProtocolError::InvalidJson)?;
        Self::from_value(value)
    }

    /// Validate an already decoded payload, stopping at the first violation.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(fields) = value else {
            return Err(ProtocolError::MissingType);
        };

        let kind = match present(&fields, "type") {
            None => return Err(ProtocolError::MissingType),
            Some(Value::String(kind)) => kind.as_str(),
            Some(other) => return Err(ProtocolError::UnrecognizedType(other.to_string())),
        };

        match kind {
            "increment" => parse_increment(&fields),
            "updateRequest" => Ok(Self::UpdateRequest),
            other => Err(ProtocolError::UnrecognizedType(other.to_string())),
        }
    }

    /// Wire name of the request kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Increment { .. } => "increment",
            Self::UpdateRequest => "updateRequest",
        }
    }
}

fn parse_increment(fields: &Map<String, Value>) -> Result<ClientRequest, ProtocolError> {
    let (Some(matt), Some(hail)) = (present(fields, "matt"), present(fields, "hail")) else {
        return Err(ProtocolError::MissingFields);
    };
    let (Value::Array(matt), Value::Array(hail)) = (matt, hail) else {
        return Err(ProtocolError::NotArrays);
    };
    if matt.len() != SEED_COUNT || hail.len() != SEED_COUNT {
        return Err(ProtocolError::InvalidLength);
    }

    let mut matt_deltas = [0; SEED_COUNT];
    let mut hail_deltas = [0; SEED_COUNT];
    for index in 0..SEED_COUNT {
        matt_deltas[index] = parse_delta(Side::Matt, &matt[index])?;
        hail_deltas[index] = parse_delta(Side::Hail, &hail[index])?;
    }

    Ok(ClientRequest::Increment {
        matt: matt_deltas,
        hail: hail_deltas,
    })
}

/// Field value, unless it is absent or one of the values loosely typed clients
/// send for "unset": `null`, `false`, `0` or `""`.
fn present<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|value| match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(text) => !text.is_empty(),
        Value::Number(number) => number.as_f64() != Some(0.0),
        _ => true,
    })
}

fn parse_delta(side: Side, value: &Value) -> Result<i64, ProtocolError> {
    match value {
        Value::Number(number) => {
            integer_value(number).ok_or(ProtocolError::InvalidFormat {
                side,
                found: "non-integer number",
            })
        }
        other => Err(ProtocolError::InvalidFormat {
            side,
            found: json_type_name(other),
        }),
    }
}

/// Accept integral numbers that fit an `i64`, including `3.0`-style floats.
fn integer_value(number: &Number) -> Option<i64> {
    if let Some(value) = number.as_i64() {
        return Some(value);
    }
    let value = number.as_f64()?;
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.fract() == 0.0 && in_range).then_some(value as i64)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Messages pushed to seed clients.
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full state snapshot.
    #[serde(rename = "seedUpdate")]
    SeedUpdate {
        /// Current `matt` values, one per seed.
        matt: Vec<i64>,
        /// Current `hail` values, one per seed.
        hail: Vec<i64>,
    },
    /// Rejection of the last inbound message.
    #[serde(rename = "error")]
    Error {
        /// Human readable reason.
        message: String,
        /// 400 for missing or unknown fields, 422 for malformed values.
        code: u16,
    },
}

impl From<Snapshot> for ServerMessage {
    fn from(snapshot: Snapshot) -> Self {
        Self::SeedUpdate {
            matt: snapshot.matt.to_vec(),
            hail: snapshot.hail.to_vec(),
        }
    }
}

impl From<&ProtocolError> for ServerMessage {
    fn from(err: &ProtocolError) -> Self {
        Self::Error {
            message: err.to_string(),
            code: err.code(),
        }
    }
}

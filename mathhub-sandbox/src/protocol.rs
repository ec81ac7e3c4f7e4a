//! Line protocol between the host and a sandbox worker.
//!
//! Every request and reply is one JSON document on its own line. Numbers
//! travel as raw IEEE-754 bit patterns so `-0`, `NaN` and the infinities
//! arrive exactly as they left.

use serde::{Deserialize, Serialize};

use mathhub_core::SandboxValue;

use crate::config::{ContextId, EngineLimits};
use crate::error::SandboxError;

/// Largest reply line the host accepts from a worker.
pub const MAX_REPLY_BYTES: u64 = 16 * 1024 * 1024;

/// Exact wire encoding of a [`SandboxValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum WireValue {
    Null,
    Bool(bool),
    /// `f64::to_bits` of the number.
    Number(u64),
    String(String),
    Array(Vec<WireValue>),
    /// Properties in insertion order.
    Object(Vec<(String, WireValue)>),
}

impl From<&SandboxValue> for WireValue {
    fn from(value: &SandboxValue) -> Self {
        match value {
            SandboxValue::Null => Self::Null,
            SandboxValue::Bool(b) => Self::Bool(*b),
            SandboxValue::Number(n) => Self::Number(n.to_bits()),
            SandboxValue::String(s) => Self::String(s.clone()),
            SandboxValue::Array(items) => Self::Array(items.iter().map(Self::from).collect()),
            SandboxValue::Object(map) => {
                Self::Object(map.iter().map(|(k, v)| (k.clone(), Self::from(v))).collect())
            }
        }
    }
}

impl From<WireValue> for SandboxValue {
    fn from(value: WireValue) -> Self {
        match value {
            WireValue::Null => Self::Null,
            WireValue::Bool(b) => Self::Bool(b),
            WireValue::Number(bits) => Self::Number(f64::from_bits(bits)),
            WireValue::String(s) => Self::String(s),
            WireValue::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            WireValue::Object(entries) => {
                Self::Object(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// A command sent to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Set the engine limits for every context created afterwards.
    Configure { limits: EngineLimits },
    /// Create a fresh, empty execution context.
    CreateContext { context: ContextId },
    /// Evaluate `source` to a function in `context` and call it with `args`.
    Run { context: ContextId, source: String, args: Vec<WireValue> },
}

/// A worker's reply to one [`WorkerRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerResponse {
    Ready,
    Value { value: WireValue },
    UserError { message: String },
    Unsupported { reason: String },
    LimitExceeded { reason: String },
    UnknownContext { context: ContextId },
    Protocol { message: String },
}

impl WorkerResponse {
    /// Encode an engine-side failure as a reply.
    #[must_use]
    pub fn from_error(error: SandboxError) -> Self {
        match error {
            SandboxError::UserCode { message } => Self::UserError { message },
            SandboxError::UnsupportedValueType { reason } => Self::Unsupported { reason },
            SandboxError::ExecutionTimeout { reason } => Self::LimitExceeded { reason },
            SandboxError::UnknownContext(context) => Self::UnknownContext { context },
            other => Self::Protocol { message: other.to_string() },
        }
    }

    /// Decode the reply to a `Run` request.
    ///
    /// # Errors
    /// Returns the [`SandboxError`] the worker reported, or
    /// [`SandboxError::Protocol`] if the reply does not answer a `Run`.
    pub fn into_value(self) -> Result<SandboxValue, SandboxError> {
        match self {
            Self::Value { value } => Ok(SandboxValue::from(value)),
            Self::Ready => Err(SandboxError::Protocol("expected a value, got ready".to_owned())),
            other => Err(other.into_error()),
        }
    }

    /// Decode the reply to a `Configure` or `CreateContext` request.
    ///
    /// # Errors
    /// Returns the [`SandboxError`] the worker reported, or
    /// [`SandboxError::Protocol`] if the worker sent a value.
    pub fn into_ready(self) -> Result<(), SandboxError> {
        match self {
            Self::Ready => Ok(()),
            Self::Value { .. } => Err(SandboxError::Protocol("expected ready, got a value".to_owned())),
            other => Err(other.into_error()),
        }
    }

    fn into_error(self) -> SandboxError {
        match self {
            Self::UserError { message } => SandboxError::UserCode { message },
            Self::Unsupported { reason } => SandboxError::UnsupportedValueType { reason },
            Self::LimitExceeded { reason } => SandboxError::ExecutionTimeout { reason },
            Self::UnknownContext { context } => SandboxError::UnknownContext(context),
            Self::Protocol { message } => SandboxError::Protocol(message),
            Self::Ready | Self::Value { .. } => {
                SandboxError::Protocol("worker reply is not an error".to_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn through_json(value: &SandboxValue) -> SandboxValue {
        let line = match serde_json::to_string(&WireValue::from(value)) {
            Ok(s) => s,
            Err(e) => panic!("encode failed: {e}"),
        };
        match serde_json::from_str::<WireValue>(&line) {
            Ok(w) => SandboxValue::from(w),
            Err(e) => panic!("decode failed: {e}"),
        }
    }

    #[test]
    fn special_numbers_survive_the_wire() {
        match through_json(&SandboxValue::Number(-0.0)) {
            SandboxValue::Number(n) => assert!(n == 0.0 && n.is_sign_negative(), "lost sign of zero"),
            other => panic!("expected number, got {other:?}"),
        }
        match through_json(&SandboxValue::Number(f64::NAN)) {
            SandboxValue::Number(n) => assert!(n.is_nan()),
            other => panic!("expected number, got {other:?}"),
        }
        assert_eq!(
            through_json(&SandboxValue::Number(f64::NEG_INFINITY)),
            SandboxValue::Number(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn object_key_order_survives_the_wire() {
        let mut map = IndexMap::new();
        map.insert("z".to_owned(), SandboxValue::from(1));
        map.insert("a".to_owned(), SandboxValue::Array(vec![SandboxValue::Null, "s".into()]));
        let value = SandboxValue::Object(map);
        assert_eq!(through_json(&value), value);
    }

    #[test]
    fn requests_are_tagged_by_op() {
        let request = WorkerRequest::Run {
            context: ContextId(3),
            source: "() => 1".to_owned(),
            args: vec![WireValue::Bool(true)],
        };
        let line = match serde_json::to_string(&request) {
            Ok(s) => s,
            Err(e) => panic!("encode failed: {e}"),
        };
        assert!(line.starts_with(r#"{"op":"run","context":3"#), "got {line}");
        let back: WorkerRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => panic!("decode failed: {e}"),
        };
        assert_eq!(back, request);
    }

    #[test]
    fn error_replies_decode_to_matching_errors() {
        let reply = WorkerResponse::from_error(SandboxError::user_code("boom"));
        assert!(matches!(reply.into_value(), Err(SandboxError::UserCode { .. })));

        let reply = WorkerResponse::LimitExceeded { reason: "loop".to_owned() };
        assert!(matches!(reply.into_ready(), Err(SandboxError::ExecutionTimeout { .. })));

        let reply = WorkerResponse::Ready;
        assert!(matches!(reply.into_value(), Err(SandboxError::Protocol(_))));
    }
}

//! Host-side representation of values crossing the sandbox boundary.
//!
//! A [`SandboxValue`] is an owned tree. It cannot hold functions or
//! references into either heap and cannot be cyclic, so copying one into or
//! out of a sandbox is always a deep copy.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A plain data value: the only shape allowed across the trust boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SandboxValue {
    #[default]
    Null,
    Bool(bool),
    /// IEEE-754 double, the sandbox's only number type.
    Number(f64),
    String(String),
    Array(Vec<SandboxValue>),
    /// Plain object; keys keep their insertion order.
    Object(IndexMap<String, SandboxValue>),
}

impl SandboxValue {
    /// Converts a parsed JSON document into a sandbox value.
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect(),
            ),
        }
    }

    /// Converts to a JSON document. Non-finite numbers become `null`, as
    /// `JSON.stringify` does.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => json_number(*n),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Short name of the variant, for logs and error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Nesting depth; scalars are depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Array(items) => 1 + items.iter().map(Self::depth).max().unwrap_or(0),
            Self::Object(map) => 1 + map.values().map(Self::depth).max().unwrap_or(0),
            _ => 0,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn json_number(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER && !(n == 0.0 && n.is_sign_negative()) {
        // Exact: |n| is at most 2^53 - 1 and integral.
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

impl From<&str> for SandboxValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for SandboxValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for SandboxValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for SandboxValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for SandboxValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<serde_json::Value> for SandboxValue {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(value)
    }
}

impl Serialize for SandboxValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SandboxValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_conversion_preserves_shape_and_key_order() {
        let json = serde_json::json!({"z": 1, "a": [true, null, "s"], "m": {"k": 2.5}});
        let value = SandboxValue::from_json(json.clone());
        match &value {
            SandboxValue::Object(map) => {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                assert_eq!(keys, ["z", "a", "m"], "insertion order must be kept");
            }
            other => panic!("expected object, got {other:?}"),
        }
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn integral_numbers_serialize_without_fraction() {
        let json = match serde_json::to_string(&SandboxValue::Number(50.0)) {
            Ok(s) => s,
            Err(e) => panic!("serialize failed: {e}"),
        };
        assert_eq!(json, "50");
    }

    #[test]
    fn non_finite_numbers_serialize_as_null() {
        assert_eq!(SandboxValue::Number(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(SandboxValue::Number(f64::INFINITY).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn depth_counts_nesting() {
        let flat = SandboxValue::Number(1.0);
        let nested = SandboxValue::Array(vec![SandboxValue::Array(vec![flat.clone()])]);
        assert_eq!(flat.depth(), 0);
        assert_eq!(nested.depth(), 2);
    }
}

//! Conversion between operator-channel JSON and wire payload values.
//!
//! The operator speaks JSON; the wire speaks the binary value model. The
//! mapping is total in the wire→JSON direction; JSON→wire rejects the
//! forms the wire codec cannot carry (floating point, integers beyond the
//! 4-byte argument range).

use provlink_proto::Value;
use serde_json::Value as Json;
use thiserror::Error;

/// JSON that cannot be expressed in the wire payload model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Floating-point numbers are outside the wire codec's subset.
    #[error("floating-point numbers cannot be encoded")]
    Float,

    /// Integer magnitude beyond the 4-byte argument range.
    #[error("integer {0} is outside the encodable range")]
    OutOfRange(String),
}

/// Operator JSON → wire value.
pub fn json_to_value(json: &Json) -> Result<Value, ConvertError> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => {
            if let Some(u) = n.as_u64() {
                if u > u64::from(u32::MAX) {
                    return Err(ConvertError::OutOfRange(n.to_string()));
                }
                Ok(Value::Uint(u))
            } else if let Some(i) = n.as_i64() {
                if i < -4_294_967_296 {
                    return Err(ConvertError::OutOfRange(n.to_string()));
                }
                Ok(Value::Int(i))
            } else {
                Err(ConvertError::Float)
            }
        },
        Json::String(s) => Ok(Value::text(s.clone())),
        Json::Array(items) => Ok(Value::Array(
            items.iter().map(json_to_value).collect::<Result<_, _>>()?,
        )),
        Json::Object(entries) => Ok(Value::Map(
            entries
                .iter()
                .map(|(key, value)| Ok((key.clone(), json_to_value(value)?)))
                .collect::<Result<_, ConvertError>>()?,
        )),
    }
}

/// Wire value → operator JSON.
#[must_use]
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Uint(n) => Json::from(*n),
        Value::Int(n) => Json::from(*n),
        Value::Text(s) => Json::String(s.clone()),
        Value::Bool(b) => Json::Bool(*b),
        Value::Null => Json::Null,
        // Byte strings are unused by this protocol; surface them as arrays.
        Value::Bytes(bytes) => Json::Array(bytes.iter().map(|&b| Json::from(b)).collect()),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), value_to_json(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn cfg_subtree_round_trips() {
        let cfg = json!({
            "wifi": {"ssid": "net", "pass": "pw", "dhcp": 1},
            "mqtt": {"host": "h", "port": 1883},
        });
        let value = json_to_value(&cfg).unwrap();
        assert_eq!(value_to_json(&value), cfg);
    }

    #[test]
    fn floats_are_rejected() {
        assert_eq!(json_to_value(&json!(1.5)), Err(ConvertError::Float));
        assert_eq!(
            json_to_value(&json!({"wifi": {"dhcp": 0.5}})),
            Err(ConvertError::Float)
        );
    }

    #[test]
    fn out_of_range_integers_are_rejected() {
        assert!(matches!(
            json_to_value(&json!(4_294_967_296u64)),
            Err(ConvertError::OutOfRange(_))
        ));
        assert!(matches!(
            json_to_value(&json!(-4_294_967_297i64)),
            Err(ConvertError::OutOfRange(_))
        ));
    }

    #[test]
    fn negative_integers_map_to_int() {
        assert_eq!(json_to_value(&json!(-42)).unwrap(), Value::Int(-42));
        assert_eq!(value_to_json(&Value::Int(-42)), json!(-42));
    }
}

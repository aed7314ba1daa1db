//! Operator request/response objects.
//!
//! Every request line carries `v: 1`, a unique `id`, and an `op` name;
//! most carry a `device_id`. Responses mirror `v` and `id`, set `op` to
//! `<op>_ack`, echo `device_id`, and carry `status: "ok" | "error"` with
//! either a result payload or an `err: {code, msg}` object. Unknown request
//! fields are ignored for forward compatibility.

use serde::Deserialize;
use serde_json::{Value as Json, json};

/// Schema version every request must carry.
pub const SCHEMA_VERSION: u32 = 1;

/// One parsed operator request line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperatorRequest {
    /// Schema version; anything but 1 is rejected.
    #[serde(default)]
    pub v: u32,

    /// Operator-chosen request identifier, echoed in the response.
    #[serde(default)]
    pub id: String,

    /// Operation name.
    #[serde(default)]
    pub op: String,

    /// Target device address, colon- or bare-hex form.
    #[serde(default)]
    pub device_id: Option<String>,

    /// Bearer token for auth-carrying operations.
    #[serde(default)]
    pub auth: Option<Auth>,

    /// Configuration subtree for `provision_write`.
    #[serde(default)]
    pub cfg: Option<Json>,

    /// Requested dotted field paths for `provision_read`.
    #[serde(default)]
    pub fields: Option<Vec<Json>>,

    /// Chain an `apply` step after a successful write.
    #[serde(default)]
    pub apply: bool,

    /// Chain a `reboot` step after a successful write (and apply).
    #[serde(default)]
    pub reboot: bool,

    /// Per-step timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Authorization envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Auth {
    /// Shared bearer token.
    #[serde(default)]
    pub token: String,
}

/// Error codes surfaced on the operator channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Schema or payload validation failure.
    BadRequest,
    /// Missing or rejected authorization token.
    SecurityDenied,
    /// Unknown operation or message type.
    UnsupportedOp,
    /// A job is already in flight.
    Busy,
    /// No matching acknowledgment within the retry budget.
    NoAck,
    /// The peer answered with a negative acknowledgment.
    Nack,
    /// The proprietary transport send primitive failed.
    TxFail,
    /// Operator line exceeded the channel cap.
    SerialOverflow,
}

impl ErrorCode {
    /// Wire string for this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::SecurityDenied => "SECURITY_DENIED",
            Self::UnsupportedOp => "UNSUPPORTED_OP",
            Self::Busy => "BUSY",
            Self::NoAck => "NO_ACK",
            Self::Nack => "NACK",
            Self::TxFail => "PROPRIETARY_TX_FAIL",
            Self::SerialOverflow => "SERIAL_OVERFLOW",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful response skeleton; callers may add result fields.
#[must_use]
pub fn ok_response(op: &str, id: &str, device_id: Option<&str>) -> Json {
    let mut response = json!({
        "v": SCHEMA_VERSION,
        "id": id,
        "op": format!("{op}_ack"),
        "status": "ok",
    });
    if let (Some(device_id), Some(map)) = (device_id, response.as_object_mut()) {
        map.insert("device_id".to_owned(), Json::String(device_id.to_owned()));
    }
    response
}

/// Error response with a structured `err` object.
#[must_use]
pub fn err_response(op: &str, id: &str, device_id: Option<&str>, code: ErrorCode, msg: &str) -> Json {
    let mut response = json!({
        "v": SCHEMA_VERSION,
        "id": id,
        "op": format!("{op}_ack"),
        "status": "error",
        "err": { "code": code.as_str(), "msg": msg },
    });
    if let (Some(device_id), Some(map)) = (device_id, response.as_object_mut()) {
        map.insert("device_id".to_owned(), Json::String(device_id.to_owned()));
    }
    response
}

/// Error line for an oversize operator line; no id or op is known.
#[must_use]
pub fn overflow_response() -> Json {
    json!({
        "v": SCHEMA_VERSION,
        "status": "error",
        "err": { "code": ErrorCode::SerialOverflow.as_str(), "msg": "line too long" },
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn parses_a_full_write_request() {
        let line = r#"{
            "v": 1, "id": "a1", "op": "provision_write",
            "device_id": "AA:BB:CC:DD:EE:01",
            "auth": {"token": "t"},
            "cfg": {"wifi": {"ssid": "net", "pass": "pw"}},
            "apply": true, "reboot": false, "timeout_ms": 500,
            "future_field": [1, 2, 3]
        }"#;
        let req: OperatorRequest = serde_json::from_str(line).unwrap();
        assert_eq!(req.v, 1);
        assert_eq!(req.id, "a1");
        assert_eq!(req.op, "provision_write");
        assert_eq!(req.device_id.as_deref(), Some("AA:BB:CC:DD:EE:01"));
        assert_eq!(req.auth.unwrap().token, "t");
        assert!(req.apply);
        assert!(!req.reboot);
        assert_eq!(req.timeout_ms, Some(500));
    }

    #[test]
    fn missing_fields_default() {
        let req: OperatorRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.v, 0);
        assert!(req.id.is_empty());
        assert!(req.op.is_empty());
        assert!(req.device_id.is_none());
        assert!(!req.apply);
    }

    #[test]
    fn response_shapes() {
        let ok = ok_response("ping", "a", Some("AA:BB:CC:DD:EE:01"));
        assert_eq!(ok["op"], "ping_ack");
        assert_eq!(ok["status"], "ok");
        assert_eq!(ok["device_id"], "AA:BB:CC:DD:EE:01");

        let err = err_response("reboot", "b", None, ErrorCode::NoAck, "reboot failed");
        assert_eq!(err["status"], "error");
        assert_eq!(err["err"]["code"], "NO_ACK");
        assert!(err.get("device_id").is_none());

        let overflow = overflow_response();
        assert_eq!(overflow["err"]["code"], "SERIAL_OVERFLOW");
        assert!(overflow.get("id").is_none());
    }
}

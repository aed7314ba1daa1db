//! Operator request dispatch.
//!
//! One request, one job, one response. Validation happens before the job
//! record is claimed, so malformed requests never consume the bridge; the
//! job is released on every path out of a claimed request.

use std::time::Duration;

use provlink_core::{env::Environment, link::Link, peer::PeerAddr};
use provlink_proto::{MsgType, Value};
use serde_json::{Value as Json, json};
use tracing::{info, warn};

use crate::{
    convert::{json_to_value, value_to_json},
    executor::{Executor, Step, StepError},
    job::JobState,
    request::{ErrorCode, OperatorRequest, SCHEMA_VERSION, err_response, ok_response},
};

/// Per-op defaults: `(timeout, attempts)`.
const PING_DEFAULTS: (Duration, u32) = (Duration::from_millis(2000), 2);
const WRITE_DEFAULTS: (Duration, u32) = (Duration::from_millis(8000), 3);
const READ_DEFAULTS: (Duration, u32) = (Duration::from_millis(5000), 2);
const APPLY_DEFAULTS: (Duration, u32) = (Duration::from_millis(3000), 3);
const REBOOT_DEFAULTS: (Duration, u32) = (Duration::from_millis(4000), 2);

/// Identity reported by the `hello` op.
#[derive(Debug, Clone)]
pub struct BridgeIdentity {
    /// Bridge product identifier.
    pub bridge: String,
    /// Firmware/build version.
    pub fw: String,
    /// Hardware serial.
    pub serial: String,
}

impl Default for BridgeIdentity {
    fn default() -> Self {
        Self {
            bridge: "provlink-bridge".to_owned(),
            fw: env!("CARGO_PKG_VERSION").to_owned(),
            serial: "0".to_owned(),
        }
    }
}

/// What the response carries beyond `status: ok`.
enum ResponseKind {
    Plain,
    Stored,
    Data,
}

struct Plan {
    steps: Vec<Step>,
    kind: ResponseKind,
}

/// Bridge dispatcher: owns the link, the executor, and the job record.
pub struct BridgeDispatcher<L, E>
where
    L: Link,
    E: Environment,
{
    link: L,
    executor: Executor<E>,
    job: JobState,
    identity: BridgeIdentity,
}

impl<L, E> BridgeDispatcher<L, E>
where
    L: Link,
    E: Environment,
{
    /// Dispatcher over `link`, timed by `env`.
    pub fn new(link: L, env: E, identity: BridgeIdentity) -> Self {
        Self { link, executor: Executor::new(env), job: JobState::new(), identity }
    }

    /// The job record (status inspection).
    pub fn job(&self) -> &JobState {
        &self.job
    }

    #[cfg(test)]
    pub(crate) fn job_mut(&mut self) -> &mut JobState {
        &mut self.job
    }

    /// Drive one operator request to its response line.
    pub async fn handle_request(&mut self, req: &OperatorRequest) -> Json {
        let op = req.op.as_str();
        let id = req.id.as_str();
        let device_id = req.device_id.as_deref();

        if req.v != SCHEMA_VERSION || id.is_empty() || op.is_empty() {
            return err_response(op, id, device_id, ErrorCode::BadRequest, "schema");
        }

        // Liveness probe: answered locally, never touches the wire.
        if op == "hello" {
            let mut response = ok_response(op, id, None);
            if let Some(map) = response.as_object_mut() {
                map.insert("bridge".to_owned(), Json::String(self.identity.bridge.clone()));
                map.insert("fw".to_owned(), Json::String(self.identity.fw.clone()));
                map.insert("serial".to_owned(), Json::String(self.identity.serial.clone()));
                map.insert("cap".to_owned(), json!(["provision", "readback", "reboot"]));
            }
            return response;
        }

        let Some(peer) = device_id.and_then(|raw| raw.parse::<PeerAddr>().ok()) else {
            return err_response(op, id, device_id, ErrorCode::BadRequest, "invalid device address");
        };

        let plan = match build_plan(req) {
            Ok(plan) => plan,
            Err((code, msg)) => return err_response(op, id, device_id, code, msg),
        };

        let Ok(sequence) = self.job.begin(id, peer) else {
            return err_response(op, id, device_id, ErrorCode::Busy, "bridge busy");
        };
        info!(%peer, op, id, sequence, "job started");

        let result = self.run_plan(peer, sequence, &plan).await;
        self.job.clear();

        match result {
            Ok(data) => {
                let mut response = ok_response(op, id, device_id);
                if let Some(map) = response.as_object_mut() {
                    match plan.kind {
                        ResponseKind::Stored => {
                            map.insert("detail".to_owned(), Json::String("stored".to_owned()));
                        },
                        ResponseKind::Data => {
                            map.insert("data".to_owned(), data.unwrap_or(Json::Null));
                        },
                        ResponseKind::Plain => {},
                    }
                }
                response
            },
            Err((code, _)) => err_response(op, id, device_id, code, &format!("{op} failed")),
        }
    }

    /// Run every step of the plan under one sequence; the first failure
    /// carries its error code into the operator response.
    async fn run_plan(
        &mut self,
        peer: PeerAddr,
        sequence: u16,
        plan: &Plan,
    ) -> Result<Option<Json>, (ErrorCode, String)> {
        let mut data = None;
        for step in &plan.steps {
            match self.executor.send_and_wait(&mut self.link, peer, sequence, step).await {
                Ok(payload) => {
                    if step.expect == MsgType::ReadConfigAck {
                        data = Some(decode_read_ack(&payload)?);
                    }
                },
                Err(err) => return Err(map_step_error(&err)),
            }
        }
        Ok(data)
    }
}

/// Map a step failure to the operator error code.
///
/// The remote nack's code and message are logged but not forwarded; the
/// operator sees only `NACK` (known lossiness, kept for compatibility with
/// existing tooling).
fn map_step_error(err: &StepError) -> (ErrorCode, String) {
    match err {
        StepError::NoAck => (ErrorCode::NoAck, err.to_string()),
        StepError::Nack { code, msg } => {
            warn!(remote_code = %code, remote_msg = %msg, "peer nack");
            (ErrorCode::Nack, err.to_string())
        },
        StepError::Tx(_) => (ErrorCode::TxFail, err.to_string()),
        StepError::Protocol(_) => (ErrorCode::BadRequest, err.to_string()),
    }
}

fn decode_read_ack(payload: &[u8]) -> Result<Json, (ErrorCode, String)> {
    let body = Value::decode(payload)
        .map_err(|e| (ErrorCode::BadRequest, format!("ack payload decode: {e}")))?;
    Ok(body.get("data").map_or(Json::Null, value_to_json))
}

fn build_plan(req: &OperatorRequest) -> Result<Plan, (ErrorCode, &'static str)> {
    let timeout = |default: (Duration, u32)| {
        (
            req.timeout_ms.map_or(default.0, Duration::from_millis),
            default.1,
        )
    };
    let step = |request: MsgType, payload: Vec<u8>, (timeout, attempts): (Duration, u32)| Step {
        request,
        // All plan steps are request types, which always have an ack pair.
        expect: request.ack_type().unwrap_or(MsgType::Error),
        payload,
        timeout,
        attempts,
    };

    match req.op.as_str() {
        "ping" => Ok(Plan {
            steps: vec![step(MsgType::Ping, Vec::new(), timeout(PING_DEFAULTS))],
            kind: ResponseKind::Plain,
        }),
        "reboot" => Ok(Plan {
            steps: vec![step(MsgType::Reboot, Vec::new(), timeout(REBOOT_DEFAULTS))],
            kind: ResponseKind::Plain,
        }),
        "provision_write" => {
            let token = bearer_token(req)?;
            let cfg = req.cfg.clone().unwrap_or_else(|| json!({}));
            let cfg = json_to_value(&cfg).map_err(|_| (ErrorCode::BadRequest, "cfg"))?;
            let payload = Value::Map(vec![
                ("token".to_owned(), Value::text(token)),
                ("cfg".to_owned(), cfg),
            ])
            .encode()
            .map_err(|_| (ErrorCode::BadRequest, "cfg"))?;

            let mut steps = vec![step(MsgType::WriteConfig, payload, timeout(WRITE_DEFAULTS))];
            if req.apply {
                steps.push(step(MsgType::Apply, Vec::new(), timeout(APPLY_DEFAULTS)));
            }
            if req.reboot {
                steps.push(step(MsgType::Reboot, Vec::new(), timeout(REBOOT_DEFAULTS)));
            }
            Ok(Plan { steps, kind: ResponseKind::Stored })
        },
        "provision_read" => {
            let token = bearer_token(req)?;
            let fields: Vec<Value> = req
                .fields
                .iter()
                .flatten()
                .filter_map(Json::as_str)
                .map(Value::text)
                .collect();
            let payload = Value::Map(vec![
                ("token".to_owned(), Value::text(token)),
                ("fields".to_owned(), Value::Array(fields)),
            ])
            .encode()
            .map_err(|_| (ErrorCode::BadRequest, "fields"))?;

            Ok(Plan {
                steps: vec![step(MsgType::ReadConfig, payload, timeout(READ_DEFAULTS))],
                kind: ResponseKind::Data,
            })
        },
        _ => Err((ErrorCode::UnsupportedOp, "unknown op")),
    }
}

/// Token for auth-bearing ops; empty is denied before touching the wire.
fn bearer_token(req: &OperatorRequest) -> Result<&str, (ErrorCode, &'static str)> {
    let token = req.auth.as_ref().map(|auth| auth.token.as_str()).unwrap_or("");
    if token.is_empty() {
        return Err((ErrorCode::SecurityDenied, "token required"));
    }
    Ok(token)
}

//! Device dispatcher state machine.
//!
//! One pass per inbound datagram:
//! `parse → (drop | reassemble → dedup → dispatch → reply → cache)`.
//! The machine is pure: it mutates only its own store, reassembly slot, and
//! dedup cache, and returns [`DeviceAction`] values for the driver to
//! execute. No state outlives a request except the dedup cache and the
//! persistent store.
//!
//! A duplicate of an already-answered request resends the cached reply
//! verbatim without re-running the handler, so side effects such as the
//! `cfg_version` bump happen exactly once per distinct request.

use std::{ops::Sub, time::Duration};

use bytes::Bytes;
use provlink_core::{
    dedup::DedupCache, message::MessageKey, peer::PeerAddr, reassembly::ReassemblyBuffer,
};
use provlink_proto::{Frame, FrameFlags, MsgType, ProtocolError, Value, split_message};
use tracing::{debug, error, trace, warn};

use crate::storage::{ConfigSlot, ConfigStore, StorageError};

/// Delay between sending the reboot ack and restarting, so the ack is
/// observable on the wire before the link goes down.
pub const REBOOT_ACK_DRAIN: Duration = Duration::from_millis(200);

const BAD_REQUEST: &str = "BAD_REQUEST";
const SECURITY_DENIED: &str = "SECURITY_DENIED";
const UNSUPPORTED_OP: &str = "UNSUPPORTED_OP";

/// Actions the driver executes on behalf of the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    /// Send one encoded frame to `peer`.
    SendFrame {
        /// Destination peer.
        peer: PeerAddr,
        /// Encoded wire bytes.
        datagram: Bytes,
    },

    /// Re-read persistent config into the running collaborators.
    ///
    /// Always ordered after the acknowledgment's `SendFrame` so the link
    /// stays stable through any network reconfiguration.
    ApplyConfig,

    /// Restart the system after letting the ack drain for `delay`.
    Reboot {
        /// Drain delay before the restart.
        delay: Duration,
    },
}

enum Reply {
    Ack(MsgType),
    Data(MsgType, Value),
    Nack { code: &'static str, msg: &'static str },
}

enum FollowUp {
    Apply,
    Reboot,
}

/// Device endpoint: dispatcher plus its per-endpoint state.
///
/// Generic over the instant type so tests drive it with a virtual clock.
pub struct DeviceEndpoint<S, I>
where
    S: ConfigStore,
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    store: S,
    token: String,
    reassembly: ReassemblyBuffer<I>,
    dedup: DedupCache,
}

impl<S, I> DeviceEndpoint<S, I>
where
    S: ConfigStore,
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Endpoint over `store`, authorizing requests bearing `token`.
    pub fn new(store: S, token: impl Into<String>) -> Self {
        Self {
            store,
            token: token.into(),
            reassembly: ReassemblyBuffer::new(),
            dedup: DedupCache::new(),
        }
    }

    /// The persistent store (driver access for the apply path).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Periodic maintenance: age out a stale reassembly slot.
    pub fn tick(&mut self, now: I) {
        if self.reassembly.expire(now) {
            debug!("discarded stale reassembly slot");
        }
    }

    /// Process one inbound datagram, returning the actions to execute in
    /// order.
    ///
    /// Malformed frames and incomplete fragments produce no actions; a
    /// persistent-store failure drops the request (the initiator retries
    /// and the handlers are idempotent).
    pub fn handle_datagram(&mut self, now: I, peer: PeerAddr, datagram: &[u8]) -> Vec<DeviceAction> {
        let frame = match Frame::decode(datagram) {
            Ok(frame) => frame,
            Err(err) => {
                trace!(%peer, %err, "dropping malformed frame");
                return Vec::new();
            },
        };

        let header = frame.header;
        let key = MessageKey::from_header(peer, &header);

        let payload = if header.flags().is_fragment() {
            match self.reassembly.accept(
                now,
                key,
                header.frag_idx(),
                header.frag_cnt(),
                frame.payload,
            ) {
                Some(full) => full,
                None => return Vec::new(),
            }
        } else {
            frame.payload
        };

        if let Some(cached) = self.dedup.replay(&key) {
            debug!(%peer, sequence = header.sequence(), "duplicate request, replaying cached reply");
            return cached
                .iter()
                .map(|datagram| DeviceAction::SendFrame { peer, datagram: datagram.clone() })
                .collect();
        }

        let (reply, follow_up) = match self.dispatch(header.msg_type(), &payload) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(%peer, %err, "store failure, dropping request");
                return Vec::new();
            },
        };

        let frames = match reply_frames(header.sequence(), &reply) {
            Ok(frames) => frames,
            Err(err) => {
                error!(%peer, %err, "could not build reply");
                return Vec::new();
            },
        };

        self.dedup.record(key, frames.clone());

        let mut actions: Vec<DeviceAction> = frames
            .into_iter()
            .map(|datagram| DeviceAction::SendFrame { peer, datagram })
            .collect();
        match follow_up {
            Some(FollowUp::Apply) => actions.push(DeviceAction::ApplyConfig),
            Some(FollowUp::Reboot) => actions.push(DeviceAction::Reboot { delay: REBOOT_ACK_DRAIN }),
            None => {},
        }
        actions
    }

    fn dispatch(
        &mut self,
        msg_type: Option<MsgType>,
        payload: &[u8],
    ) -> Result<(Reply, Option<FollowUp>), StorageError> {
        match msg_type {
            Some(MsgType::Ping) => Ok((Reply::Ack(MsgType::PingAck), None)),
            Some(MsgType::WriteConfig) => Ok((self.handle_write(payload)?, None)),
            Some(MsgType::ReadConfig) => Ok((self.handle_read(payload)?, None)),
            // Ack first; the side effect runs after the reply is on the wire.
            Some(MsgType::Apply) => Ok((Reply::Ack(MsgType::ApplyAck), Some(FollowUp::Apply))),
            Some(MsgType::Reboot) => Ok((Reply::Ack(MsgType::RebootAck), Some(FollowUp::Reboot))),
            _ => Ok((
                Reply::Nack { code: UNSUPPORTED_OP, msg: "not implemented" },
                None,
            )),
        }
    }

    fn handle_write(&mut self, payload: &[u8]) -> Result<Reply, StorageError> {
        let value = match Value::decode(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "write-config payload decode failed");
                return Ok(Reply::Nack { code: BAD_REQUEST, msg: "payload decode" });
            },
        };
        if value.as_map().is_none() {
            return Ok(Reply::Nack { code: BAD_REQUEST, msg: "expected map" });
        }

        // Shape errors outrank authorization: the whole payload is parsed
        // before the token is compared.
        let Ok(writes) = WriteSet::parse(value.get("cfg")) else {
            return Ok(Reply::Nack { code: BAD_REQUEST, msg: "cfg" });
        };

        let token = value.get("token").and_then(Value::as_text).unwrap_or("");
        if token != self.token {
            warn!("write-config token mismatch");
            return Ok(Reply::Nack { code: SECURITY_DENIED, msg: "token mismatch" });
        }

        self.apply_writes(&writes)?;

        let version = self.store.get_u32(ConfigSlot::CfgVersion)?.unwrap_or(0).wrapping_add(1);
        self.store.set_u32(ConfigSlot::CfgVersion, version)?;
        debug!(version, "stored configuration write");

        Ok(Reply::Ack(MsgType::WriteConfigAck))
    }

    fn apply_writes(&mut self, writes: &WriteSet) -> Result<(), StorageError> {
        if let Some(ssid) = &writes.wifi_ssid {
            self.store.set_str(ConfigSlot::WifiSsid, ssid)?;
        }
        if writes.wifi_ssid.is_some() || writes.wifi_pass.is_some() {
            // A new SSID invalidates any stored password.
            self.store
                .set_str(ConfigSlot::WifiPass, writes.wifi_pass.as_deref().unwrap_or(""))?;
        }
        if let Some(dhcp) = writes.wifi_dhcp {
            self.store.set_u32(ConfigSlot::WifiDhcp, dhcp)?;
        }
        if let Some(host) = &writes.mqtt_host {
            self.store.set_str(ConfigSlot::MqttHost, host)?;
        }
        if let Some(port) = writes.mqtt_port {
            self.store.set_u32(ConfigSlot::MqttPort, u32::from(port))?;
        }
        if let Some(user) = &writes.mqtt_user {
            self.store.set_str(ConfigSlot::MqttUser, user)?;
        }
        if let Some(pass) = &writes.mqtt_pass {
            self.store.set_str(ConfigSlot::MqttPass, pass)?;
        }
        if let Some(prefix) = &writes.mqtt_topic_prefix {
            self.store.set_str(ConfigSlot::MqttTopicPrefix, prefix)?;
        }
        Ok(())
    }

    fn handle_read(&mut self, payload: &[u8]) -> Result<Reply, StorageError> {
        let value = match Value::decode(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "read-config payload decode failed");
                return Ok(Reply::Nack { code: BAD_REQUEST, msg: "payload decode" });
            },
        };

        let token = value.get("token").and_then(Value::as_text).unwrap_or("");
        if token != self.token {
            warn!("read-config token mismatch");
            return Ok(Reply::Nack { code: SECURITY_DENIED, msg: "token mismatch" });
        }

        let mut namespaces: Vec<(String, Value)> = Vec::new();
        let fields = value.get("fields").and_then(Value::as_array).unwrap_or(&[]);
        for field in fields {
            // Non-text entries and unknown paths are silently omitted.
            let Some(path) = field.as_text() else { continue };
            if let Some(leaf) = self.read_field(path)? {
                push_leaf(&mut namespaces, path, leaf);
            }
        }

        let data = Value::Map(vec![("data".to_owned(), Value::Map(namespaces))]);
        Ok(Reply::Data(MsgType::ReadConfigAck, data))
    }

    /// Value for one dotted field path. `None` for unknown paths; known
    /// paths report their boot defaults when never written. The token is
    /// never readable.
    fn read_field(&self, path: &str) -> Result<Option<Value>, StorageError> {
        let text = |slot| -> Result<Option<Value>, StorageError> {
            Ok(Some(Value::Text(self.store.get_str(slot)?.unwrap_or_default())))
        };
        match path {
            "wifi.ssid" => text(ConfigSlot::WifiSsid),
            "wifi.pass" => text(ConfigSlot::WifiPass),
            "wifi.dhcp" => Ok(Some(Value::Uint(u64::from(
                self.store.get_u32(ConfigSlot::WifiDhcp)?.unwrap_or(1),
            )))),
            "mqtt.host" => text(ConfigSlot::MqttHost),
            "mqtt.port" => Ok(Some(Value::Uint(u64::from(
                self.store.get_u32(ConfigSlot::MqttPort)?.unwrap_or(1883),
            )))),
            "mqtt.user" => text(ConfigSlot::MqttUser),
            "mqtt.pass" => text(ConfigSlot::MqttPass),
            "mqtt.topic_prefix" => text(ConfigSlot::MqttTopicPrefix),
            "sys.cfg_version" => Ok(Some(Value::Uint(u64::from(
                self.store.get_u32(ConfigSlot::CfgVersion)?.unwrap_or(0),
            )))),
            _ => Ok(None),
        }
    }
}

/// Recognized leaf writes collected from a `cfg` subtree.
#[derive(Debug, Default)]
struct WriteSet {
    wifi_ssid: Option<String>,
    wifi_pass: Option<String>,
    wifi_dhcp: Option<u32>,
    mqtt_host: Option<String>,
    mqtt_port: Option<u16>,
    mqtt_user: Option<String>,
    mqtt_pass: Option<String>,
    mqtt_topic_prefix: Option<String>,
}

impl WriteSet {
    /// Parse the `cfg` subtree. Unknown namespaces and leaves are skipped;
    /// a recognized leaf of the wrong type is an error.
    fn parse(cfg: Option<&Value>) -> Result<Self, ()> {
        let mut writes = Self::default();
        let Some(cfg) = cfg else { return Ok(writes) };
        let entries = cfg.as_map().ok_or(())?;

        for (namespace, sub) in entries {
            // A namespace that is not a map is tolerated and skipped.
            let Some(leaves) = sub.as_map() else { continue };
            match namespace.as_str() {
                "wifi" => {
                    for (leaf, value) in leaves {
                        match leaf.as_str() {
                            "ssid" => writes.wifi_ssid = Some(text_leaf(value)?),
                            "pass" => writes.wifi_pass = Some(text_leaf(value)?),
                            "dhcp" => {
                                let dhcp = value.as_uint().ok_or(())?;
                                writes.wifi_dhcp = Some(u32::try_from(dhcp).map_err(|_| ())?);
                            },
                            _ => {},
                        }
                    }
                },
                "mqtt" => {
                    for (leaf, value) in leaves {
                        match leaf.as_str() {
                            "host" => writes.mqtt_host = Some(text_leaf(value)?),
                            "port" => {
                                let port = value.as_uint().ok_or(())?;
                                writes.mqtt_port = Some(u16::try_from(port).map_err(|_| ())?);
                            },
                            "user" => writes.mqtt_user = Some(text_leaf(value)?),
                            "pass" => writes.mqtt_pass = Some(text_leaf(value)?),
                            "topic_prefix" => writes.mqtt_topic_prefix = Some(text_leaf(value)?),
                            _ => {},
                        }
                    }
                },
                _ => {},
            }
        }
        Ok(writes)
    }
}

fn text_leaf(value: &Value) -> Result<String, ()> {
    value.as_text().map(str::to_owned).ok_or(())
}

/// Insert `path`'s leaf under its namespace, first occurrence wins.
fn push_leaf(namespaces: &mut Vec<(String, Value)>, path: &str, leaf: Value) {
    let Some((ns, name)) = path.split_once('.') else { return };

    let entries = match namespaces.iter_mut().find(|(key, _)| key == ns) {
        Some((_, Value::Map(entries))) => entries,
        Some(_) => return,
        None => {
            namespaces.push((ns.to_owned(), Value::Map(Vec::new())));
            match namespaces.last_mut() {
                Some((_, Value::Map(entries))) => entries,
                _ => return,
            }
        },
    };
    if !entries.iter().any(|(key, _)| key == name) {
        entries.push((name.to_owned(), leaf));
    }
}

/// Encode a reply into send-ready wire frames (fragmented if needed).
fn reply_frames(sequence: u16, reply: &Reply) -> Result<Vec<Bytes>, ProtocolError> {
    let (msg_type, payload) = match reply {
        Reply::Ack(msg_type) => (*msg_type, Vec::new()),
        Reply::Data(msg_type, value) => (*msg_type, value.encode()?),
        Reply::Nack { code, msg } => {
            let body = Value::Map(vec![
                ("code".to_owned(), Value::text(*code)),
                ("msg".to_owned(), Value::text(*msg)),
            ]);
            (MsgType::Nack, body.encode()?)
        },
    };
    let frames = split_message(msg_type, sequence, FrameFlags::empty(), &payload)?;
    Ok(frames.iter().map(Frame::encode).collect())
}

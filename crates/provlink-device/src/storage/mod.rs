//! Persistent configuration store.
//!
//! A flat key-value store over the named provisioning slots: WiFi credentials,
//! MQTT endpoint, the monotonic `cfg_version` counter, and the shared
//! authorization token. Reads and writes are atomic per slot. Values are
//! stored as strings (integers in decimal) so both backends share one
//! encoding and `read-config` debugging stays human-friendly.

mod memory;
mod redb;

use thiserror::Error;

pub use self::{memory::MemoryStore, redb::RedbStore};

/// Storage failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend I/O or transaction failure.
    #[error("storage backend: {0}")]
    Backend(String),

    /// A slot held a value that does not parse as the requested type.
    #[error("slot {slot} holds a non-integer value")]
    NotAnInteger {
        /// The offending slot key.
        slot: &'static str,
    },
}

/// The named persistent slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSlot {
    /// WiFi network name.
    WifiSsid,
    /// WiFi passphrase.
    WifiPass,
    /// Whether DHCP is enabled (0/1).
    WifiDhcp,
    /// MQTT broker host.
    MqttHost,
    /// MQTT broker port.
    MqttPort,
    /// MQTT username.
    MqttUser,
    /// MQTT password.
    MqttPass,
    /// Topic prefix for status publication.
    MqttTopicPrefix,
    /// Monotonic counter, bumped on each successful write-config.
    CfgVersion,
    /// Shared bearer token authorizing config reads and writes.
    Token,
}

impl ConfigSlot {
    /// Stable store key for this slot.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::WifiSsid => "wifi_ssid",
            Self::WifiPass => "wifi_pass",
            Self::WifiDhcp => "wifi_dhcp",
            Self::MqttHost => "mqtt_host",
            Self::MqttPort => "mqtt_port",
            Self::MqttUser => "mqtt_user",
            Self::MqttPass => "mqtt_pass",
            Self::MqttTopicPrefix => "mqtt_topic_prefix",
            Self::CfgVersion => "cfg_version",
            Self::Token => "token",
        }
    }
}

/// Flat per-slot persistent store.
///
/// Each method is atomic for its slot; callers never observe a torn value.
pub trait ConfigStore {
    /// Read a string slot. `None` when never written.
    fn get_str(&self, slot: ConfigSlot) -> Result<Option<String>, StorageError>;

    /// Write a string slot.
    fn set_str(&mut self, slot: ConfigSlot, value: &str) -> Result<(), StorageError>;

    /// Read an integer slot. `None` when never written.
    fn get_u32(&self, slot: ConfigSlot) -> Result<Option<u32>, StorageError> {
        match self.get_str(slot)? {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| StorageError::NotAnInteger { slot: slot.key() }),
            None => Ok(None),
        }
    }

    /// Write an integer slot.
    fn set_u32(&mut self, slot: ConfigSlot, value: u32) -> Result<(), StorageError> {
        self.set_str(slot, &value.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    /// Backend-independent behavior, run against both stores.
    fn exercise(store: &mut impl ConfigStore) {
        assert_eq!(store.get_str(ConfigSlot::WifiSsid).unwrap(), None);
        assert_eq!(store.get_u32(ConfigSlot::CfgVersion).unwrap(), None);

        store.set_str(ConfigSlot::WifiSsid, "net").unwrap();
        store.set_u32(ConfigSlot::CfgVersion, 3).unwrap();

        assert_eq!(store.get_str(ConfigSlot::WifiSsid).unwrap().as_deref(), Some("net"));
        assert_eq!(store.get_u32(ConfigSlot::CfgVersion).unwrap(), Some(3));

        store.set_str(ConfigSlot::WifiSsid, "").unwrap();
        assert_eq!(store.get_str(ConfigSlot::WifiSsid).unwrap().as_deref(), Some(""));

        store.set_str(ConfigSlot::MqttPort, "not-a-number").unwrap();
        assert!(matches!(
            store.get_u32(ConfigSlot::MqttPort),
            Err(StorageError::NotAnInteger { slot: "mqtt_port" })
        ));
    }

    #[test]
    fn memory_store_contract() {
        exercise(&mut MemoryStore::new());
    }

    #[test]
    fn redb_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&mut RedbStore::open(dir.path().join("cfg.redb")).unwrap());
    }

    #[test]
    fn redb_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.redb");
        {
            let mut store = RedbStore::open(&path).unwrap();
            store.set_str(ConfigSlot::MqttHost, "broker.local").unwrap();
            store.set_u32(ConfigSlot::CfgVersion, 7).unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.get_str(ConfigSlot::MqttHost).unwrap().as_deref(), Some("broker.local"));
        assert_eq!(store.get_u32(ConfigSlot::CfgVersion).unwrap(), Some(7));
    }
}

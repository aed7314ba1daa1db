//! Pumped device endpoint for end-to-end scenarios.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use provlink_core::link::Link;
use provlink_device::{ConfigSlot, ConfigStore, DeviceAction, DeviceEndpoint, MemoryStore, StorageError};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::sim_link::SimLink;

/// Clonable in-memory store so a test can inspect (and a rebooted device
/// can keep) the persistent slots while the pump owns the endpoint.
#[derive(Debug, Clone, Default)]
pub struct SharedStore(Arc<Mutex<MemoryStore>>);

impl SharedStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current `cfg_version`, `None` if never written.
    pub fn cfg_version(&self) -> Result<Option<u32>, StorageError> {
        self.get_u32(ConfigSlot::CfgVersion)
    }
}

impl ConfigStore for SharedStore {
    fn get_str(&self, slot: ConfigSlot) -> Result<Option<String>, StorageError> {
        self.0
            .lock()
            .map_err(|_| StorageError::Backend("store mutex poisoned".to_owned()))?
            .get_str(slot)
    }

    fn set_str(&mut self, slot: ConfigSlot, value: &str) -> Result<(), StorageError> {
        self.0
            .lock()
            .map_err(|_| StorageError::Backend("store mutex poisoned".to_owned()))?
            .set_str(slot, value)
    }
}

/// A device endpoint pumped by a background task.
pub struct SimDevice {
    store: SharedStore,
    applies: Arc<AtomicUsize>,
    pump: JoinHandle<Option<SimLink>>,
}

impl SimDevice {
    /// Boot a device over `link` with a fresh endpoint around `store`.
    ///
    /// Booting with a previously used store models a restart: persistent
    /// slots survive, the dedup cache and reassembly slot do not.
    #[must_use]
    pub fn boot(link: SimLink, store: SharedStore, token: impl Into<String>) -> Self {
        let endpoint = DeviceEndpoint::new(store.clone(), token);
        let applies = Arc::new(AtomicUsize::new(0));
        let pump = tokio::spawn(pump(endpoint, link, Arc::clone(&applies)));
        Self { store, applies, pump }
    }

    /// The device's persistent store.
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// How many times the apply side effect has run.
    #[must_use]
    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    /// Wait for the device to power off (reboot op), returning its link so
    /// the test can drain it and boot again.
    pub async fn powered_off(self) -> Option<SimLink> {
        self.pump.await.ok().flatten()
    }
}

/// Drive the endpoint until a reboot (returns the link) or the link dies
/// (returns `None`).
async fn pump(
    mut endpoint: DeviceEndpoint<SharedStore, tokio::time::Instant>,
    mut link: SimLink,
    applies: Arc<AtomicUsize>,
) -> Option<SimLink> {
    let mut maintenance = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            received = link.recv() => {
                let Ok((peer, datagram)) = received else { return None };
                let actions = endpoint.handle_datagram(tokio::time::Instant::now(), peer, &datagram);
                for action in actions {
                    match action {
                        DeviceAction::SendFrame { peer, datagram } => {
                            let _ = link.send(peer, datagram).await;
                        },
                        DeviceAction::ApplyConfig => {
                            applies.fetch_add(1, Ordering::SeqCst);
                            debug!("sim device applied configuration");
                        },
                        DeviceAction::Reboot { delay } => {
                            tokio::time::sleep(delay).await;
                            debug!("sim device rebooting");
                            return Some(link);
                        },
                    }
                }
            },
            _ = maintenance.tick() => endpoint.tick(tokio::time::Instant::now()),
        }
    }
}

//! In-memory store for tests and ephemeral devices.

use std::collections::HashMap;

use super::{ConfigSlot, ConfigStore, StorageError};

/// HashMap-backed store; nothing survives a restart.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    slots: HashMap<&'static str, String>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get_str(&self, slot: ConfigSlot) -> Result<Option<String>, StorageError> {
        Ok(self.slots.get(slot.key()).cloned())
    }

    fn set_str(&mut self, slot: ConfigSlot, value: &str) -> Result<(), StorageError> {
        self.slots.insert(slot.key(), value.to_owned());
        Ok(())
    }
}

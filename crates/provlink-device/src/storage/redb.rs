//! redb-backed persistent store.
//!
//! One table of string slots. Every write is its own committed
//! transaction, which gives the per-slot atomicity the dispatcher relies
//! on and keeps a power cut from tearing a value.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition, TableError};

use super::{ConfigSlot, ConfigStore, StorageError};

const CONFIG_TABLE: TableDefinition<&str, &str> = TableDefinition::new("provisioning_config");

/// Durable store over a single redb file.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { db })
    }
}

impl ConfigStore for RedbStore {
    fn get_str(&self, slot: ConfigSlot) -> Result<Option<String>, StorageError> {
        let tx = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let table = match tx.open_table(CONFIG_TABLE) {
            Ok(table) => table,
            // A fresh database has no table until the first write.
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StorageError::Backend(e.to_string())),
        };
        let value = table
            .get(slot.key())
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .map(|guard| guard.value().to_owned());
        Ok(value)
    }

    fn set_str(&mut self, slot: ConfigSlot, value: &str) -> Result<(), StorageError> {
        let tx = self.db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut table = tx
                .open_table(CONFIG_TABLE)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            table
                .insert(slot.key(), value)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        tx.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

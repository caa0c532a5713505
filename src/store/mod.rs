//! Whole-collection key/value persistence.
//!
//! Every collection lives under one fixed key and is read in full, mutated
//! in memory, then written back in full. There are no secondary indices:
//! callers load the collection and filter it.
//!
//! Two backends: `MemoryStore` (tests, embedding) and `SqliteStore`.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Fixed collection keys.
pub mod keys {
    pub const PROVIDER_IDENTITIES: &str = "provider_identities";
    pub const CARE_TEAM_ASSIGNMENTS: &str = "care_team_assignments";
    pub const COMMUNICATIONS: &str = "communications";
    pub const MULTI_ROLE_USERS: &str = "multi_role_users";
    pub const NOTIFICATION_OUTBOX: &str = "notification_outbox";
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },
}

/// Synchronous JSON key/value collaborator.
///
/// `get` returns `None` for a key that was never written.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
}

/// Load a whole collection, falling back to its default when absent.
pub fn load_collection<T>(store: &dyn KeyValueStore, key: &str) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    match store.get(key)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(T::default()),
    }
}

/// Write a whole collection back under its key.
pub fn save_collection<T>(store: &dyn KeyValueStore, key: &str, collection: &T) -> Result<(), StoreError>
where
    T: Serialize,
{
    let value = serde_json::to_value(collection)?;
    store.set(key, value)
}

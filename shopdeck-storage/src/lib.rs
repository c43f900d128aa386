//! Durable key-value persistence for the Shopdeck licensing core.
//!
//! The core stores a handful of small values (the license record, the
//! lockdown flag, the validation clock, the audit log) through this
//! boundary. The core owns serialization; a store sees opaque bytes.
//!
//! Implementations must give `set` atomic replace semantics: a concurrent
//! reader observes either the previous value or the new one in full,
//! never a torn write.

mod error;
mod file_store;
mod memory_store;

pub use error::{StorageError, StorageResult};
pub use file_store::FileStore;
pub use memory_store::MemoryStore;

/// Durable key-value storage with atomic replace.
///
/// Keys are short ASCII names (`[A-Za-z0-9._-]`, starting with an
/// alphanumeric character). Values are opaque byte strings.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, atomically replacing any previous
    /// value.
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes the value stored under `key`. Removing an absent key is
    /// not an error.
    fn clear(&self, key: &str) -> StorageResult<()>;
}

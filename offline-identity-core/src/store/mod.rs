//! Key-value store interface and the bundled implementations.
//!
//! Records and the unauthenticated DB key live in a flat string map. Hosts
//! may plug in any durable map (preferences file, keychain, `IndexedDB`) by
//! implementing [`KeyValueStore`].

mod file;
mod lock;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StoreResult;

/// Durable string-keyed, string-valued store.
#[cfg_attr(feature = "ffi", uniffi::export(with_foreign))]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read(&self, key: String) -> StoreResult<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write(&self, key: String, value: String) -> StoreResult<()>;

    /// Returns `true` if a value is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn contains(&self, key: String) -> StoreResult<bool>;

    /// Stores `value` under `key` only if the key is absent, and returns the
    /// value stored under `key` afterwards.
    ///
    /// The check and the write MUST happen in one critical section: two
    /// concurrent callers with different values must both get back the same
    /// winning value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    fn insert_if_absent(&self, key: String, value: String) -> StoreResult<String>;
}

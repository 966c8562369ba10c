//! Offline identity cache.
//!
//! Caches a user's identity and authentication state on the device so an
//! application keeps working offline after the first login, and gives every
//! user a stable namespace for their local data.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use offline_identity_core::{
//!     CredentialPersistence, IdentityRecord, KdfParams, MemoryStore, PasswordCodec,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let codec = Arc::new(PasswordCodec::new(KdfParams::testing())?);
//! let persistence = CredentialPersistence::new(store, codec);
//!
//! let mut record = IdentityRecord::new("alice")?.with_password("pw");
//! persistence.save(&mut record)?;
//!
//! let loaded = persistence.load("alice", "pw")?;
//! assert_eq!(loaded.database_name(), record.database_name());
//! # Ok(())
//! # }
//! ```
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod codec;
pub use codec::{EncryptionCodec, KdfParams, PasswordCodec};

pub mod error;
pub use error::*;

pub mod logger;

mod persistence;
pub use persistence::CredentialPersistence;

mod record;
pub use record::{IdentityRecord, DB_NAME_PREFIX};

pub mod store;
pub use store::{FileStore, KeyValueStore, MemoryStore};

mod unauthenticated;
pub use unauthenticated::{unauthenticated_key, UNAUTHENTICATED_DB_KEY};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("offline_identity_core");

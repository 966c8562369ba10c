//! The shared DB key of unauthenticated sessions.
//!
//! Every record saved without a server session is namespaced under one
//! store-wide token, created on first use and kept for the lifetime of the
//! store.

use log::info;
use uuid::Uuid;

use crate::error::IdentityResult;
use crate::store::KeyValueStore;

/// Store key holding the unauthenticated DB key.
pub const UNAUTHENTICATED_DB_KEY: &str = "UNAUTHENTICATED_DB_KEY";

/// Returns the store's unauthenticated DB key, creating it on first call.
///
/// The get-or-create runs through [`KeyValueStore::insert_if_absent`], so
/// concurrent first callers all receive the same token.
///
/// # Errors
///
/// Returns [`IdentityError::Persistence`](crate::IdentityError::Persistence)
/// if the store cannot be read or written.
pub fn unauthenticated_key(store: &dyn KeyValueStore) -> IdentityResult<String> {
    if let Some(existing) = store.read(UNAUTHENTICATED_DB_KEY.to_string())? {
        return Ok(existing);
    }

    let candidate = Uuid::new_v4().to_string();
    let key = store.insert_if_absent(UNAUTHENTICATED_DB_KEY.to_string(), candidate.clone())?;
    if key == candidate {
        info!("created unauthenticated db key");
    }
    Ok(key)
}

//! Saving and loading identity records.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use secrecy::ExposeSecret;

use crate::codec::EncryptionCodec;
use crate::error::{IdentityError, IdentityResult};
use crate::record::IdentityRecord;
use crate::store::KeyValueStore;
use crate::unauthenticated;

const RECORD_KEY_PREFIX: &str = "user_";

/// Encrypted persistence of [`IdentityRecord`]s in a [`KeyValueStore`].
///
/// Each record is stored under `user_<user_name>`, encrypted with the
/// record's own password.
pub struct CredentialPersistence {
    store: Arc<dyn KeyValueStore>,
    codec: Arc<dyn EncryptionCodec>,
}

impl fmt::Debug for CredentialPersistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPersistence").finish()
    }
}

impl CredentialPersistence {
    /// Creates a persistence handle over `store`, encrypting with `codec`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, codec: Arc<dyn EncryptionCodec>) -> Self {
        Self { store, codec }
    }

    /// Store key of the record for `user_name`.
    #[must_use]
    pub fn record_key(user_name: &str) -> String {
        format!("{RECORD_KEY_PREFIX}{user_name}")
    }

    /// Encrypts and writes `record`.
    ///
    /// An unauthenticated record first gets its password copied to
    /// `unauthenticated_password` and its DB key replaced by the store's
    /// unauthenticated key, even if it already had one.
    ///
    /// # Errors
    ///
    /// - [`IdentityError::Credential`] if the record has no password.
    /// - [`IdentityError::InvalidInput`] if an authenticated record has no DB key.
    /// - [`IdentityError::Persistence`] if the store write fails.
    ///
    /// The record is left unmodified when a precondition fails.
    pub fn save(&self, record: &mut IdentityRecord) -> IdentityResult<()> {
        let Some(password) = record.password().map(|p| p.expose_secret().to_owned()) else {
            return Err(IdentityError::Credential(
                "password not available".to_string(),
            ));
        };

        if record.is_authenticated() {
            if record.db_key().is_none() {
                return Err(IdentityError::InvalidInput(format!(
                    "authenticated record for {} has no db_key",
                    record.user_name()
                )));
            }
        } else {
            let db_key = self.unauthenticated_key()?;
            record.set_unauthenticated_password(Some(password));
            record.set_db_key(Some(db_key));
        }

        let blob = record.to_encrypted_json(self.codec.as_ref())?;
        self.store
            .write(Self::record_key(record.user_name()), blob)?;
        info!(
            "saved identity record for {} (authenticated: {})",
            record.user_name(),
            record.is_authenticated()
        );
        Ok(())
    }

    /// Reads and decrypts the record for `user_name`.
    ///
    /// The returned record holds `password` in memory.
    ///
    /// # Errors
    ///
    /// - [`IdentityError::NotFound`] if no record is stored for `user_name`.
    /// - [`IdentityError::Authentication`] if `password` does not decrypt it.
    /// - [`IdentityError::Serialization`] if the decrypted payload is not a
    ///   record for `user_name`.
    /// - [`IdentityError::Persistence`] if the store read fails.
    pub fn load(&self, user_name: &str, password: &str) -> IdentityResult<IdentityRecord> {
        let blob = self
            .store
            .read(Self::record_key(user_name))?
            .ok_or_else(|| IdentityError::not_found(user_name))?;
        debug!("read encrypted identity record for {user_name}");

        let json = self
            .codec
            .decrypt(password.to_owned(), blob)
            .map_err(|err| {
                warn!("could not decrypt identity record for {user_name}");
                IdentityError::from(err)
            })?;

        let mut record = IdentityRecord::new(user_name)?.with_password(password);
        record.merge_from_json(&json)?;
        Ok(record)
    }

    /// Whether a record is stored for `user_name`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Persistence`] if the store cannot be queried.
    pub fn exists(&self, user_name: &str) -> IdentityResult<bool> {
        Ok(self.store.contains(Self::record_key(user_name))?)
    }

    /// The store's unauthenticated DB key, created on first call.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Persistence`] if the store cannot be read or written.
    pub fn unauthenticated_key(&self) -> IdentityResult<String> {
        unauthenticated::unauthenticated_key(self.store.as_ref())
    }
}

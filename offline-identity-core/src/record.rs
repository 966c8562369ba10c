//! The identity record: who the user is, how they authenticated and which
//! local namespace their data lives in.

use std::fmt;
use std::hash::{Hash, Hasher};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::codec::EncryptionCodec;
use crate::error::{IdentityError, IdentityResult};

/// Prefix of every derived database name.
pub const DB_NAME_PREFIX: &str = "DB-";

/// A cached user identity.
///
/// Two records are equal (and hash equally) when their user names match,
/// whatever the other fields hold. The password lives in memory only and is
/// never part of the JSON form.
pub struct IdentityRecord {
    user_name: String,
    password: Option<SecretString>,
    authenticated: bool,
    server_url: Option<String>,
    db_key: Option<String>,
    organisation: Option<String>,
    full_name: Option<String>,
    unauthenticated_password: Option<String>,
}

impl IdentityRecord {
    /// Creates a record for `user_name` with every other field unset.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidInput`] if `user_name` is empty.
    pub fn new(user_name: impl Into<String>) -> IdentityResult<Self> {
        let user_name = user_name.into();
        if user_name.is_empty() {
            return Err(IdentityError::InvalidInput(
                "user name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            user_name,
            ..Self::empty()
        })
    }

    const fn empty() -> Self {
        Self {
            user_name: String::new(),
            password: None,
            authenticated: false,
            server_url: None,
            db_key: None,
            organisation: None,
            full_name: None,
            unauthenticated_password: None,
        }
    }

    /// Sets the in-memory password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.set_password(password);
        self
    }

    /// Sets the authenticated flag.
    #[must_use]
    pub const fn with_authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    /// Sets the server URL.
    #[must_use]
    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = Some(server_url.into());
        self
    }

    /// Sets the DB key.
    #[must_use]
    pub fn with_db_key(mut self, db_key: impl Into<String>) -> Self {
        self.db_key = Some(db_key.into());
        self
    }

    /// Sets the organisation.
    #[must_use]
    pub fn with_organisation(mut self, organisation: impl Into<String>) -> Self {
        self.organisation = Some(organisation.into());
        self
    }

    /// Sets the full name.
    #[must_use]
    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    /// Decodes a record from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Serialization`] if the JSON is malformed or has
    /// no non-empty `user_name`.
    pub fn from_json(json: &str) -> IdentityResult<Self> {
        let mut record = Self::empty();
        record.merge_from_json(json)?;
        if record.user_name.is_empty() {
            return Err(IdentityError::Serialization(
                "record payload has no user_name".to_string(),
            ));
        }
        Ok(record)
    }

    /// Applies a JSON payload on top of this record.
    ///
    /// Patch, not replace: fields missing from the payload keep their current
    /// value, an explicit `null` clears an optional field and unknown fields
    /// are ignored. The user name can only be filled in when empty; a payload
    /// naming a different user is rejected. On error the record is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Serialization`] if the JSON is malformed or
    /// names another user.
    pub fn merge_from_json(&mut self, json: &str) -> IdentityResult<&mut Self> {
        let patch: RecordPatch = serde_json::from_str(json)?;

        if let Some(user_name) = patch.user_name {
            if user_name.is_empty() {
                return Err(IdentityError::Serialization(
                    "user_name must not be empty".to_string(),
                ));
            }
            if !self.user_name.is_empty() && self.user_name != user_name {
                return Err(IdentityError::Serialization(format!(
                    "payload belongs to user {user_name}, not {}",
                    self.user_name
                )));
            }
            self.user_name = user_name;
        }
        if let Some(authenticated) = patch.authenticated {
            self.authenticated = authenticated;
        }
        if let Some(server_url) = patch.server_url {
            self.server_url = server_url;
        }
        if let Some(db_key) = patch.db_key {
            self.db_key = db_key;
        }
        if let Some(organisation) = patch.organisation {
            self.organisation = organisation;
        }
        if let Some(full_name) = patch.full_name {
            self.full_name = full_name;
        }
        if let Some(unauthenticated_password) = patch.unauthenticated_password {
            self.unauthenticated_password = unauthenticated_password;
        }
        Ok(self)
    }

    /// Encodes the record as JSON. The password is never included.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> IdentityResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encodes the record as JSON and encrypts it with the record's password.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Credential`] if no password is set, or the
    /// codec's error if encryption fails.
    pub fn to_encrypted_json(&self, codec: &dyn EncryptionCodec) -> IdentityResult<String> {
        let password = self.password.as_ref().ok_or_else(|| {
            IdentityError::Credential("password not available".to_string())
        })?;
        let json = self.to_json()?;
        Ok(codec.encrypt(password.expose_secret().to_owned(), json)?)
    }

    /// Name of this user's local database, derived from the DB key.
    ///
    /// `None` while no DB key is set.
    #[must_use]
    pub fn database_name(&self) -> Option<String> {
        self.db_key.as_deref().map(|db_key| {
            let digest = Sha256::digest(db_key.as_bytes());
            format!("{DB_NAME_PREFIX}{}", hex::encode(digest))
        })
    }

    /// The user name.
    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// The in-memory password, if set.
    #[must_use]
    pub const fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    /// Whether a password is held in memory.
    #[must_use]
    pub const fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Replaces the in-memory password.
    pub fn set_password(&mut self, password: impl Into<String>) {
        let password: String = password.into();
        self.password = Some(SecretString::new(password.into_boxed_str()));
    }

    /// Drops the in-memory password.
    pub fn clear_password(&mut self) {
        self.password = None;
    }

    /// Whether a server session has been established.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Sets the authenticated flag.
    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    /// The server URL.
    #[must_use]
    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    /// Sets or clears the server URL.
    pub fn set_server_url(&mut self, server_url: Option<String>) {
        self.server_url = server_url;
    }

    /// The DB key.
    #[must_use]
    pub fn db_key(&self) -> Option<&str> {
        self.db_key.as_deref()
    }

    /// Sets or clears the DB key.
    pub fn set_db_key(&mut self, db_key: Option<String>) {
        self.db_key = db_key;
    }

    /// The organisation.
    #[must_use]
    pub fn organisation(&self) -> Option<&str> {
        self.organisation.as_deref()
    }

    /// Sets or clears the organisation.
    pub fn set_organisation(&mut self, organisation: Option<String>) {
        self.organisation = organisation;
    }

    /// The full name.
    #[must_use]
    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    /// Sets or clears the full name.
    pub fn set_full_name(&mut self, full_name: Option<String>) {
        self.full_name = full_name;
    }

    /// The password kept for unauthenticated sessions.
    #[must_use]
    pub fn unauthenticated_password(&self) -> Option<&str> {
        self.unauthenticated_password.as_deref()
    }

    /// Sets or clears the password kept for unauthenticated sessions.
    pub fn set_unauthenticated_password(&mut self, unauthenticated_password: Option<String>) {
        self.unauthenticated_password = unauthenticated_password;
    }
}

impl Clone for IdentityRecord {
    fn clone(&self) -> Self {
        Self {
            user_name: self.user_name.clone(),
            password: self
                .password
                .as_ref()
                .map(|password| SecretString::new(password.expose_secret().into())),
            authenticated: self.authenticated,
            server_url: self.server_url.clone(),
            db_key: self.db_key.clone(),
            organisation: self.organisation.clone(),
            full_name: self.full_name.clone(),
            unauthenticated_password: self.unauthenticated_password.clone(),
        }
    }
}

impl PartialEq for IdentityRecord {
    fn eq(&self, other: &Self) -> bool {
        self.user_name == other.user_name
    }
}

impl Eq for IdentityRecord {}

impl Hash for IdentityRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user_name.hash(state);
    }
}

impl fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("user_name", &self.user_name)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("authenticated", &self.authenticated)
            .field("server_url", &self.server_url)
            .field("db_key", &self.db_key)
            .field("organisation", &self.organisation)
            .field("full_name", &self.full_name)
            .field(
                "unauthenticated_password",
                &self.unauthenticated_password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Wire form of a record.
#[derive(Serialize)]
struct RecordWire<'a> {
    user_name: &'a str,
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    db_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    organisation: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unauthenticated_password: Option<&'a str>,
}

impl Serialize for IdentityRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RecordWire {
            user_name: &self.user_name,
            authenticated: self.authenticated,
            server_url: self.server_url.as_deref(),
            db_key: self.db_key.as_deref(),
            organisation: self.organisation.as_deref(),
            full_name: self.full_name.as_deref(),
            unauthenticated_password: self.unauthenticated_password.as_deref(),
        }
        .serialize(serializer)
    }
}

/// Decoded payload for [`IdentityRecord::merge_from_json`].
///
/// Outer `None` means the field was absent, `Some(None)` means explicit null.
#[derive(Default, Deserialize)]
#[serde(default)]
struct RecordPatch {
    user_name: Option<String>,
    authenticated: Option<bool>,
    #[serde(deserialize_with = "present")]
    server_url: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    db_key: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    organisation: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    full_name: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    unauthenticated_password: Option<Option<String>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

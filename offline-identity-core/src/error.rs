//! Error types for identity persistence.

use thiserror::Error;

/// Result type for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Result type for key-value store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for encryption codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while saving, loading or decoding identity records.
#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum IdentityError {
    /// The operation needs a password that is not set.
    #[error("credential error: {0}")]
    Credential(String),

    /// Decryption failed: wrong password or corrupted payload.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The caller supplied a value the record cannot hold.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Malformed JSON, or a payload that is not a valid record.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The underlying store failed to read or write.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// No record exists for the given user name.
    #[error("no identity record for user {user_name}")]
    NotFound {
        /// User name that was looked up.
        user_name: String,
    },

    /// The codec failed to encrypt for a reason other than a missing password.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl IdentityError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence(err) if err.is_transient())
    }

    /// User-friendly recovery hint.
    #[must_use]
    pub const fn recovery_hint(&self) -> &'static str {
        match self {
            Self::Credential(_) => "Sign in again so the password is available.",
            Self::Authentication(_) => {
                "The password does not match the one this identity was saved with."
            }
            Self::InvalidInput(_) => "Check the entered user details and try again.",
            Self::Serialization(_) => {
                "The stored identity could not be decoded. Sign in online to recreate it."
            }
            Self::Persistence(_) => {
                "Unable to access local storage. Check disk space and permissions, then retry."
            }
            Self::NotFound { .. } => {
                "No offline identity exists for this user. Sign in online first."
            }
            Self::Crypto(_) => "Encryption failed. Please report this issue.",
        }
    }

    pub(crate) fn not_found(user_name: &str) -> Self {
        Self::NotFound {
            user_name: user_name.to_string(),
        }
    }
}

impl From<serde_json::Error> for IdentityError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<CodecError> for IdentityError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Decryption(message) => Self::Authentication(message),
            CodecError::Encryption(message) | CodecError::InvalidParameters(message) => {
                Self::Crypto(message)
            }
            #[cfg(feature = "ffi")]
            CodecError::UnexpectedUniFFICallbackError(message) => Self::Crypto(message),
        }
    }
}

/// Errors raised by [`KeyValueStore`](crate::store::KeyValueStore) implementations.
#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum StoreError {
    /// Reading from the backing medium failed.
    #[error("store read failed: {0}")]
    Read(String),

    /// Writing to the backing medium failed.
    #[error("store write failed: {0}")]
    Write(String),

    /// The store lock could not be acquired.
    #[error("store lock error: {0}")]
    Lock(String),

    /// The backing file exists but cannot be decoded.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// Unexpected `UniFFI` callback error.
    #[cfg(feature = "ffi")]
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl StoreError {
    /// Whether the failure is likely to clear up on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Write(_) | Self::Lock(_))
    }
}

/// Errors raised by [`EncryptionCodec`](crate::codec::EncryptionCodec) implementations.
#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum CodecError {
    /// Wrong password, tampered ciphertext or unknown format.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Encryption could not be performed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The codec was configured with parameters it cannot use.
    #[error("invalid codec parameters: {0}")]
    InvalidParameters(String),

    /// Unexpected `UniFFI` callback error.
    #[cfg(feature = "ffi")]
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

#[cfg(feature = "ffi")]
impl From<uniffi::UnexpectedUniFFICallbackError> for StoreError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

#[cfg(feature = "ffi")]
impl From<uniffi::UnexpectedUniFFICallbackError> for CodecError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

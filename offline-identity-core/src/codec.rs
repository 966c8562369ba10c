//! Password-keyed encryption of serialized records.
//!
//! [`EncryptionCodec`] is the capability the persistence layer needs.
//! [`PasswordCodec`] is the bundled implementation: Argon2id stretches the
//! password into a 256-bit key and XChaCha20-Poly1305 seals the plaintext.
//!
//! Wire format (base64, standard alphabet):
//!
//! ```text
//! version (1) || m_cost (4) || t_cost (4) || p_cost (4) || salt (16) || nonce (24) || ciphertext || tag (16)
//! ```
//!
//! The Argon2 costs are little-endian `u32`s. Decryption derives the key
//! from the costs in the envelope, so a codec with different [`KdfParams`]
//! still opens data sealed under older settings.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CodecError, CodecResult};

const FORMAT_VERSION: u8 = 1;
const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 24;
const KEY_SIZE: usize = 32;
const TAG_SIZE: usize = 16;
const COST_SIZE: usize = 4;
const COSTS_END: usize = 1 + 3 * COST_SIZE;
const HEADER_SIZE: usize = COSTS_END + SALT_SIZE + NONCE_SIZE;

// Upper bounds accepted from an envelope header.
const MAX_MEMORY_KIB: u32 = 1 << 20;
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 16;

/// Symmetric encryption keyed by a password string.
#[cfg_attr(feature = "ffi", uniffi::export(with_foreign))]
pub trait EncryptionCodec: Send + Sync {
    /// Encrypts `plaintext` under `password`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption cannot be performed.
    fn encrypt(&self, password: String, plaintext: String) -> CodecResult<String>;

    /// Decrypts `ciphertext` with `password`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decryption`] on a wrong password or corrupted input.
    fn decrypt(&self, password: String, ciphertext: String) -> CodecResult<String>;
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Interactive preset (19 MiB, 2 passes, 1 lane).
    #[must_use]
    pub const fn interactive() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }

    /// Minimal-cost preset. Only for tests.
    #[must_use]
    pub const fn testing() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// [`EncryptionCodec`] built on Argon2id and XChaCha20-Poly1305.
#[derive(Debug, Clone)]
pub struct PasswordCodec {
    params: Params,
}

impl PasswordCodec {
    /// Creates a codec with the given KDF cost.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidParameters`] if Argon2 rejects the parameters.
    pub fn new(kdf: KdfParams) -> CodecResult<Self> {
        let params = Params::new(
            kdf.memory_kib,
            kdf.iterations,
            kdf.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|err| CodecError::InvalidParameters(err.to_string()))?;
        Ok(Self { params })
    }
}

fn derive_key(
    params: Params,
    password: &str,
    salt: &[u8],
) -> Result<Zeroizing<[u8; KEY_SIZE]>, argon2::Error> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    argon2.hash_password_into(password.as_bytes(), salt, &mut *key)?;
    Ok(key)
}

fn read_cost(bytes: &[u8], index: usize) -> u32 {
    let start = 1 + index * COST_SIZE;
    let mut cost = [0u8; COST_SIZE];
    cost.copy_from_slice(&bytes[start..start + COST_SIZE]);
    u32::from_le_bytes(cost)
}

/// Rebuilds the Argon2 parameters recorded in an envelope header.
fn header_params(bytes: &[u8]) -> CodecResult<Params> {
    let (memory_kib, iterations, parallelism) =
        (read_cost(bytes, 0), read_cost(bytes, 1), read_cost(bytes, 2));
    if memory_kib > MAX_MEMORY_KIB || iterations > MAX_ITERATIONS || parallelism > MAX_PARALLELISM
    {
        return Err(CodecError::Decryption(format!(
            "kdf cost out of range (m={memory_kib}, t={iterations}, p={parallelism})"
        )));
    }
    Params::new(memory_kib, iterations, parallelism, Some(KEY_SIZE))
        .map_err(|err| CodecError::Decryption(format!("invalid kdf cost in header: {err}")))
}

impl EncryptionCodec for PasswordCodec {
    fn encrypt(&self, password: String, plaintext: String) -> CodecResult<String> {
        let password = Zeroizing::new(password);
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let key = derive_key(self.params.clone(), &password, &salt)
            .map_err(|err| CodecError::Encryption(format!("key derivation failed: {err}")))?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&*key));
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|err| CodecError::Encryption(err.to_string()))?;

        let mut out = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        out.push(FORMAT_VERSION);
        for cost in [
            self.params.m_cost(),
            self.params.t_cost(),
            self.params.p_cost(),
        ] {
            out.extend_from_slice(&cost.to_le_bytes());
        }
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, password: String, ciphertext: String) -> CodecResult<String> {
        let password = Zeroizing::new(password);
        let bytes = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| CodecError::Decryption("ciphertext is not valid base64".to_string()))?;
        if bytes.len() < HEADER_SIZE + TAG_SIZE {
            return Err(CodecError::Decryption("ciphertext too short".to_string()));
        }
        if bytes[0] != FORMAT_VERSION {
            return Err(CodecError::Decryption(format!(
                "unsupported format version {}",
                bytes[0]
            )));
        }

        let params = header_params(&bytes)?;
        let (salt, rest) = bytes[COSTS_END..].split_at(SALT_SIZE);
        let (nonce, sealed) = rest.split_at(NONCE_SIZE);
        let key = derive_key(params, &password, salt)
            .map_err(|err| CodecError::Decryption(format!("key derivation failed: {err}")))?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&*key));
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), sealed)
            .map_err(|_| CodecError::Decryption("wrong password or corrupted data".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| CodecError::Decryption("plaintext is not valid UTF-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn codec() -> PasswordCodec {
        PasswordCodec::new(KdfParams::testing()).expect("codec")
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let codec = codec();
        let sealed = codec
            .encrypt("pw".to_string(), r#"{"user_name":"alice"}"#.to_string())
            .expect("encrypt");
        assert!(!sealed.contains("alice"));
        let opened = codec.decrypt("pw".to_string(), sealed).expect("decrypt");
        assert_eq!(opened, r#"{"user_name":"alice"}"#);
    }

    #[test]
    fn test_salt_and_nonce_are_fresh_per_call() {
        let codec = codec();
        let a = codec
            .encrypt("pw".to_string(), "same".to_string())
            .expect("encrypt");
        let b = codec
            .encrypt("pw".to_string(), "same".to_string())
            .expect("encrypt");
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_password_fails() {
        let codec = codec();
        let sealed = codec
            .encrypt("pw".to_string(), "secret".to_string())
            .expect("encrypt");
        match codec.decrypt("nope".to_string(), sealed) {
            Err(CodecError::Decryption(_)) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let codec = codec();
        let sealed = codec
            .encrypt("pw".to_string(), "secret".to_string())
            .expect("encrypt");
        let mut bytes = STANDARD.decode(sealed).expect("base64");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let tampered = STANDARD.encode(bytes);
        assert!(matches!(
            codec.decrypt("pw".to_string(), tampered),
            Err(CodecError::Decryption(_))
        ));
    }

    #[test_case("not base64 at all!" ; "invalid base64")]
    #[test_case("AQID" ; "too short")]
    #[test_case("" ; "empty")]
    fn test_malformed_input_is_decryption_error(input: &str) {
        assert!(matches!(
            codec().decrypt("pw".to_string(), input.to_string()),
            Err(CodecError::Decryption(_))
        ));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let codec = codec();
        let sealed = codec
            .encrypt("pw".to_string(), "secret".to_string())
            .expect("encrypt");
        let mut bytes = STANDARD.decode(sealed).expect("base64");
        bytes[0] = FORMAT_VERSION + 1;
        match codec.decrypt("pw".to_string(), STANDARD.encode(bytes)) {
            Err(CodecError::Decryption(message)) => {
                assert!(message.contains("unsupported format version"));
            }
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_decrypt_uses_costs_from_envelope() {
        let sealed = codec()
            .encrypt("pw".to_string(), "secret".to_string())
            .expect("encrypt");
        let reconfigured = PasswordCodec::new(KdfParams {
            memory_kib: 16,
            iterations: 2,
            parallelism: 1,
        })
        .expect("codec");
        assert_eq!(
            reconfigured.decrypt("pw".to_string(), sealed).expect("decrypt"),
            "secret"
        );
    }

    #[test]
    fn test_envelope_records_kdf_costs() {
        let sealed = codec()
            .encrypt("pw".to_string(), "secret".to_string())
            .expect("encrypt");
        let bytes = STANDARD.decode(sealed).expect("base64");
        let testing = KdfParams::testing();
        assert_eq!(read_cost(&bytes, 0), testing.memory_kib);
        assert_eq!(read_cost(&bytes, 1), testing.iterations);
        assert_eq!(read_cost(&bytes, 2), testing.parallelism);
    }

    #[test_case(0, u32::MAX ; "absurd memory")]
    #[test_case(1, u32::MAX ; "absurd iterations")]
    #[test_case(2, 0 ; "zero parallelism")]
    #[test_case(1, 0 ; "zero iterations")]
    fn test_bad_header_costs_are_decryption_errors(index: usize, value: u32) {
        let codec = codec();
        let sealed = codec
            .encrypt("pw".to_string(), "secret".to_string())
            .expect("encrypt");
        let mut bytes = STANDARD.decode(sealed).expect("base64");
        let start = 1 + index * COST_SIZE;
        bytes[start..start + COST_SIZE].copy_from_slice(&value.to_le_bytes());
        assert!(matches!(
            codec.decrypt("pw".to_string(), STANDARD.encode(bytes)),
            Err(CodecError::Decryption(_))
        ));
    }

    #[test]
    fn test_invalid_kdf_params_rejected() {
        let params = KdfParams {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(matches!(
            PasswordCodec::new(params),
            Err(CodecError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_kdf_params_deserialize_with_defaults() {
        let params: KdfParams = serde_json::from_str(r#"{"iterations":3}"#).expect("parse");
        assert_eq!(params.iterations, 3);
        assert_eq!(params.memory_kib, KdfParams::interactive().memory_kib);
        assert_eq!(params.parallelism, 1);
    }
}

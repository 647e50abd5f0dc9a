//! Credential resolution for the at-rest encrypted store.
//!
//! The real store is encrypted with a key derived from the user password
//! via Argon2id. Salt and derivation parameters are persisted next to the
//! database in `encryption.json`; the derived key is hex-encoded because
//! that is the textual form DuckDB's `ENCRYPTION_KEY` attach option takes.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;
use zeroize::Zeroizing;

use crate::error::StoreError;
use crate::paths;

/// Password the key is derived from. Required for encrypted stores.
pub const DB_PASSWORD_ENV: &str = "FERNLINE_DB_PASSWORD";

/// Pre-derived hex key. The desktop app derives once at unlock and hands
/// the key down so the password never crosses a process boundary twice.
pub const DB_KEY_ENV: &str = "FERNLINE_DB_KEY";

pub const KDF_TIME_COST: u32 = 3;
pub const KDF_MEMORY_COST: u32 = 65536; // 64MB
pub const KDF_PARALLELISM: u32 = 4;
pub const KDF_HASH_LEN: u32 = 32;

/// How the store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Unencrypted file-backed store (demo database).
    Plain,
    /// Encrypted store, attached under a derived key.
    Encrypted,
}

/// Key material handed to the store opener.
#[derive(Debug)]
pub enum KeyMaterial {
    /// Plain store, no key needed.
    None,
    /// Hex-encoded raw key, zeroized on drop.
    Hex(Zeroizing<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argon2Params {
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,
    #[serde(default = "default_memory_cost")]
    pub memory_cost: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    #[serde(default = "default_hash_len")]
    pub hash_len: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            time_cost: KDF_TIME_COST,
            memory_cost: KDF_MEMORY_COST,
            parallelism: KDF_PARALLELISM,
            hash_len: KDF_HASH_LEN,
        }
    }
}

fn default_time_cost() -> u32 {
    KDF_TIME_COST
}
fn default_memory_cost() -> u32 {
    KDF_MEMORY_COST
}
fn default_parallelism() -> u32 {
    KDF_PARALLELISM
}
fn default_hash_len() -> u32 {
    KDF_HASH_LEN
}

/// Persisted encryption metadata (`encryption.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    pub encrypted: bool,
    /// Base64-encoded salt.
    pub salt: String,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub version: Option<i32>,
    #[serde(default)]
    pub argon2_params: Argon2Params,
}

impl EncryptionMetadata {
    /// Read and parse the metadata record. A missing or unreadable file
    /// is a fatal precondition, not a per-table failure.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Metadata(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| StoreError::Metadata(format!("cannot parse {}: {e}", path.display())))
    }
}

/// Derive the hex-encoded store key from a password and salt with Argon2id.
pub fn derive_key_hex(
    password: &str,
    salt: &[u8],
    params: &Argon2Params,
) -> Result<Zeroizing<String>, StoreError> {
    let argon_params = argon2::Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(params.hash_len as usize),
    )
    .map_err(|e| StoreError::KeyDerivation(format!("argon2 params: {e}")))?;
    let argon = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon_params,
    );
    let mut key = Zeroizing::new(vec![0u8; params.hash_len as usize]);
    argon
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| StoreError::KeyDerivation(format!("argon2 derive: {e}")))?;
    Ok(Zeroizing::new(hex::encode(&key)))
}

/// Resolve the key material needed to open the store in `mode`.
///
/// Plain mode needs nothing. Encrypted mode takes a pre-derived key from
/// `FERNLINE_DB_KEY` if present, otherwise derives one from
/// `FERNLINE_DB_PASSWORD` plus the persisted salt and parameters. Every
/// failure in here is fatal: there is no table-level fallback for a store
/// that cannot be unlocked.
pub fn resolve_key(mode: StoreMode, data_dir: &Path) -> Result<KeyMaterial, StoreError> {
    match mode {
        StoreMode::Plain => Ok(KeyMaterial::None),
        StoreMode::Encrypted => {
            if let Ok(key) = std::env::var(DB_KEY_ENV) {
                return Ok(KeyMaterial::Hex(Zeroizing::new(key)));
            }
            let password = Zeroizing::new(
                std::env::var(DB_PASSWORD_ENV)
                    .map_err(|_| StoreError::PasswordMissing(DB_PASSWORD_ENV))?,
            );
            let metadata = EncryptionMetadata::load(&paths::encryption_metadata_path(data_dir))?;
            if !metadata.encrypted {
                return Err(StoreError::Metadata(
                    "metadata says the store is not encrypted".to_string(),
                ));
            }
            let salt = general_purpose::STANDARD
                .decode(&metadata.salt)
                .map_err(|e| StoreError::Metadata(format!("decode salt: {e}")))?;
            let key = derive_key_hex(&password, &salt, &metadata.argon2_params)?;
            Ok(KeyMaterial::Hex(key))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fast_params() -> Argon2Params {
        Argon2Params {
            time_cost: 1,
            memory_cost: 1024,
            parallelism: 1,
            hash_len: 32,
        }
    }

    #[test]
    fn derive_key_is_deterministic_and_hex() {
        let salt = [7u8; 16];
        let a = derive_key_hex("hunter2", &salt, &fast_params()).unwrap();
        let b = derive_key_hex("hunter2", &salt, &fast_params()).unwrap();
        assert_eq!(*a, *b);
        assert_eq!(a.len(), 64); // 32 bytes hex-encoded
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let other = derive_key_hex("hunter3", &salt, &fast_params()).unwrap();
        assert_ne!(*a, *other);
    }

    #[test]
    fn metadata_missing_params_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("encryption.json");
        std::fs::write(&path, r#"{"encrypted": true, "salt": "AAAA"}"#).unwrap();
        let metadata = EncryptionMetadata::load(&path).unwrap();
        assert!(metadata.encrypted);
        assert_eq!(metadata.argon2_params.time_cost, KDF_TIME_COST);
        assert_eq!(metadata.argon2_params.memory_cost, KDF_MEMORY_COST);
        assert_eq!(metadata.argon2_params.parallelism, KDF_PARALLELISM);
        assert_eq!(metadata.argon2_params.hash_len, KDF_HASH_LEN);
    }

    #[test]
    fn metadata_rejects_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("encryption.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            EncryptionMetadata::load(&path),
            Err(StoreError::Metadata(_))
        ));
    }

    #[test]
    fn metadata_missing_file_is_fatal() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            EncryptionMetadata::load(&dir.path().join("encryption.json")),
            Err(StoreError::Metadata(_))
        ));
    }

    // Env-var behaviour lives in one test body: process environment is
    // shared across the test harness threads.
    #[test]
    fn resolve_key_env_behaviour() {
        let dir = tempdir().unwrap();

        std::env::remove_var(DB_KEY_ENV);
        std::env::remove_var(DB_PASSWORD_ENV);

        // Plain mode never looks at the environment.
        assert!(matches!(
            resolve_key(StoreMode::Plain, dir.path()),
            Ok(KeyMaterial::None)
        ));

        // Encrypted mode without a password is a fatal precondition.
        assert!(matches!(
            resolve_key(StoreMode::Encrypted, dir.path()),
            Err(StoreError::PasswordMissing(_))
        ));

        // A pre-derived key bypasses password and metadata entirely.
        std::env::set_var(DB_KEY_ENV, "deadbeef");
        match resolve_key(StoreMode::Encrypted, dir.path()) {
            Ok(KeyMaterial::Hex(key)) => assert_eq!(*key, "deadbeef"),
            other => panic!("expected hex key, got {other:?}"),
        }
        std::env::remove_var(DB_KEY_ENV);

        // Password present but no metadata file: still fatal.
        std::env::set_var(DB_PASSWORD_ENV, "hunter2");
        assert!(matches!(
            resolve_key(StoreMode::Encrypted, dir.path()),
            Err(StoreError::Metadata(_))
        ));

        // Full metadata record: key derives with the persisted params.
        let salt = general_purpose::STANDARD.encode([9u8; 16]);
        std::fs::write(
            dir.path().join("encryption.json"),
            format!(
                r#"{{"encrypted": true, "salt": "{salt}",
                    "argon2_params": {{"time_cost": 1, "memory_cost": 1024,
                                       "parallelism": 1, "hash_len": 32}}}}"#
            ),
        )
        .unwrap();
        let resolved = resolve_key(StoreMode::Encrypted, dir.path()).unwrap();
        let expected = derive_key_hex(
            "hunter2",
            &[9u8; 16],
            &Argon2Params {
                time_cost: 1,
                memory_cost: 1024,
                parallelism: 1,
                hash_len: 32,
            },
        )
        .unwrap();
        match resolved {
            KeyMaterial::Hex(key) => assert_eq!(*key, *expected),
            other => panic!("expected hex key, got {other:?}"),
        }

        // Metadata that says the store is not encrypted is rejected.
        std::fs::write(
            dir.path().join("encryption.json"),
            format!(r#"{{"encrypted": false, "salt": "{salt}"}}"#),
        )
        .unwrap();
        assert!(matches!(
            resolve_key(StoreMode::Encrypted, dir.path()),
            Err(StoreError::Metadata(_))
        ));

        std::env::remove_var(DB_PASSWORD_ENV);
    }
}

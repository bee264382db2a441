//! Persisted wrapped-key record
//!
//! The only durable client-side secret state: one JSON file holding the
//! AES-KW wrapped UMK plus the salt and KDF params needed to re-derive the
//! KEK. Flushed atomically via temp+rename, owner-only on Unix.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use zkn_crypto::{KdfParams, WrappedKey};

use crate::error::{ZknError, ZknResult};
use crate::types::b64;

/// Record format written by this version.
pub const VAULT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultRecord {
    #[serde(with = "b64")]
    wrapped_key: Vec<u8>,
    #[serde(with = "b64")]
    salt: Vec<u8>,
    params: KdfParams,
    version: u32,
    created_at: u64,
}

/// File-backed store for a single [`WrappedKey`].
#[derive(Debug, Clone)]
pub struct VaultStore {
    path: PathBuf,
}

impl VaultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the record. A missing file is `Ok(None)`.
    pub fn load(&self) -> ZknResult<Option<WrappedKey>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: VaultRecord = serde_json::from_str(&content)
            .map_err(|e| ZknError::Vault(format!("parsing {}: {e}", self.path.display())))?;

        if record.version != VAULT_VERSION {
            return Err(ZknError::Vault(format!(
                "unsupported vault version {} in {} (expected {VAULT_VERSION})",
                record.version,
                self.path.display()
            )));
        }

        Ok(Some(WrappedKey {
            wrapped_key: record.wrapped_key,
            salt: record.salt,
            params: record.params,
        }))
    }

    /// Write the record, replacing any existing one.
    pub fn save(&self, wrapped: &WrappedKey) -> ZknResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let record = VaultRecord {
            wrapped_key: wrapped.wrapped_key.clone(),
            salt: wrapped.salt.clone(),
            params: wrapped.params,
            version: VAULT_VERSION,
            created_at,
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| ZknError::Vault(format!("serializing vault record: {e}")))?;

        // Atomic write: write to temp file, then rename
        let tmp_path = self.path.with_extension("tmp");
        write_private(&tmp_path, json.as_bytes())?;
        std::fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(path = %self.path.display(), "vault record saved");
        Ok(())
    }

    /// Remove the record. Removing a missing record succeeds.
    pub fn delete(&self) -> ZknResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "vault record deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zkn_crypto::KdfAlgorithm;

    fn sample() -> WrappedKey {
        WrappedKey {
            wrapped_key: vec![0xAB; 40],
            salt: vec![0x11; 32],
            params: KdfParams::new(KdfAlgorithm::Argon2id, 1024, 1, 1).unwrap(),
        }
    }

    #[test]
    fn open_nonexistent_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = VaultStore::new(tmp.path().join("vault.json"));
        assert!(store.load().unwrap().is_none());
        assert!(!store.exists());
    }

    #[test]
    fn save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let store = VaultStore::new(tmp.path().join("nested/dir/vault.json"));

        store.save(&sample()).unwrap();
        assert!(store.exists());
        assert!(!tmp.path().join("nested/dir/vault.tmp").exists());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn record_is_base64_json() {
        let tmp = TempDir::new().unwrap();
        let store = VaultStore::new(tmp.path().join("vault.json"));
        store.save(&sample()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert!(raw["wrapped_key"].as_str().unwrap().starts_with("q6ur"));
        assert_eq!(raw["params"]["m"], 1024);
        assert_eq!(raw["params"]["algorithm"], "argon2id");
        assert!(raw["created_at"].as_u64().unwrap() > 0);
    }

    #[cfg(unix)]
    #[test]
    fn record_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let store = VaultStore::new(tmp.path().join("vault.json"));
        store.save(&sample()).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = VaultStore::new(tmp.path().join("vault.json"));
        store.save(&sample()).unwrap();

        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
        store.delete().unwrap();
    }

    #[test]
    fn unknown_version_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = VaultStore::new(tmp.path().join("vault.json"));
        store.save(&sample()).unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        std::fs::write(
            store.path(),
            content.replace("\"version\": 1", "\"version\": 2"),
        )
        .unwrap();
        assert!(matches!(store.load(), Err(ZknError::Vault(_))));
    }

    #[test]
    fn corrupt_file_is_vault_error() {
        let tmp = TempDir::new().unwrap();
        let store = VaultStore::new(tmp.path().join("vault.json"));
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(ZknError::Vault(_))));
    }
}

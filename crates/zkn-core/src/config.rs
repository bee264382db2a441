use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use zkn_crypto::{check_salt_len, KdfAlgorithm, KdfParams, WorkerMode, DEFAULT_SALT_LEN};

use crate::error::{ZknError, ZknResult};

/// Top-level client configuration (loaded from zkn.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZknConfig {
    pub kdf: KdfConfig,
    pub worker: WorkerConfig,
    pub vault: VaultConfig,
    pub log: LogConfig,
}

/// Password KDF parameters used when creating a new vault.
///
/// Existing vaults always unlock with the params stored in their record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// "argon2id" (default) or "pbkdf2-sha256-compat"
    pub algorithm: KdfAlgorithm,
    /// Argon2id memory cost in KiB (default: 131072 = 128 MiB)
    pub mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Argon2id parallelism (default: 1)
    pub parallelism: u32,
    /// Salt length in bytes (default: 32, range 16..=1024)
    pub salt_len: usize,
}

impl KdfConfig {
    /// Validated [`KdfParams`] for this section.
    pub fn to_params(&self) -> ZknResult<KdfParams> {
        check_salt_len(self.salt_len)
            .map_err(|e| ZknError::Config(format!("kdf.salt_len: {e}")))?;
        KdfParams::new(
            self.algorithm,
            self.mem_cost_kib,
            self.time_cost,
            self.parallelism,
        )
        .map_err(|e| ZknError::Config(format!("kdf: {e}")))
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        let params = KdfParams::default();
        Self {
            algorithm: params.algorithm,
            mem_cost_kib: params.mem_cost_kib,
            time_cost: params.time_cost,
            parallelism: params.parallelism,
            salt_len: DEFAULT_SALT_LEN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// "background" (default) or "inline"
    pub mode: WorkerMode,
    /// Upper bound on KDF runs in flight (each holds mem_cost_kib of RAM)
    pub max_concurrent_derivations: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: WorkerMode::Background,
            max_concurrent_derivations: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Wrapped key record location
    pub path: PathBuf,
}

impl VaultConfig {
    /// `path` with a leading `~/` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        expand_tilde(&self.path)
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/zknotes/vault.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[kdf]
algorithm = "argon2id"
mem_cost_kib = 65536
time_cost = 4
parallelism = 2
salt_len = 24

[worker]
mode = "inline"
max_concurrent_derivations = 1

[vault]
path = "/var/lib/zknotes/vault.json"

[log]
level = "debug"
format = "json"
"#;
        let config: ZknConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.kdf.mem_cost_kib, 65536);
        assert_eq!(config.kdf.time_cost, 4);
        assert_eq!(config.kdf.parallelism, 2);
        assert_eq!(config.kdf.salt_len, 24);
        assert_eq!(config.worker.mode, WorkerMode::Inline);
        assert_eq!(config.worker.max_concurrent_derivations, 1);
        assert_eq!(
            config.vault.path,
            PathBuf::from("/var/lib/zknotes/vault.json")
        );
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: ZknConfig = toml::from_str("").unwrap();

        assert_eq!(config.kdf.algorithm, KdfAlgorithm::Argon2id);
        assert_eq!(config.kdf.mem_cost_kib, 131072);
        assert_eq!(config.kdf.time_cost, 3);
        assert_eq!(config.kdf.parallelism, 1);
        assert_eq!(config.kdf.salt_len, 32);
        assert_eq!(config.worker.mode, WorkerMode::Background);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.kdf.to_params().unwrap(), KdfParams::default());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[kdf]
time_cost = 5
"#;
        let config: ZknConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.kdf.time_cost, 5);
        // Defaults
        assert_eq!(config.kdf.mem_cost_kib, 131072);
        assert_eq!(config.worker.max_concurrent_derivations, 2);
    }

    #[test]
    fn test_pbkdf2_compat_algorithm_parses() {
        let config: ZknConfig =
            toml::from_str("[kdf]\nalgorithm = \"pbkdf2-sha256-compat\"\n").unwrap();
        assert_eq!(config.kdf.algorithm, KdfAlgorithm::Pbkdf2Sha256Compat);
    }

    #[test]
    fn test_invalid_kdf_rejected() {
        let mut kdf = KdfConfig {
            parallelism: 0,
            ..KdfConfig::default()
        };
        assert!(matches!(kdf.to_params(), Err(ZknError::Config(_))));

        kdf.parallelism = 1;
        kdf.salt_len = 8;
        assert!(matches!(kdf.to_params(), Err(ZknError::Config(_))));

        kdf.salt_len = usize::MAX;
        assert!(matches!(kdf.to_params(), Err(ZknError::Config(_))));

        let config: ZknConfig = toml::from_str("[kdf]\nmem_cost_kib = 4\n").unwrap();
        assert!(config.kdf.to_params().is_err());
    }

    #[test]
    fn test_unknown_worker_mode_rejected() {
        assert!(toml::from_str::<ZknConfig>("[worker]\nmode = \"gpu\"\n").is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ZknConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ZknConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.kdf.mem_cost_kib, parsed.kdf.mem_cost_kib);
        assert_eq!(config.worker.mode, parsed.worker.mode);
        assert_eq!(config.vault.path, parsed.vault.path);
    }

    #[test]
    fn test_expand_tilde() {
        let plain = PathBuf::from("/etc/zkn.toml");
        assert_eq!(expand_tilde(&plain), plain);

        let expanded = expand_tilde(Path::new("~/notes/vault.json"));
        assert!(expanded.ends_with("notes/vault.json"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}

//! Key derivation: password + salt → key-encryption key (KEK)
//!
//! Argon2id is the only algorithm chosen by default. PBKDF2-HMAC-SHA256 is
//! kept as an explicit compatibility mode for clients that cannot run
//! Argon2; it reuses the same `m`/`t` knobs but has no memory hardness.
//! It is never selected implicitly.

use std::time::Instant;

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::random::check_salt_len;
use crate::KEY_SIZE;

/// Password hashing function used to derive the KEK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KdfAlgorithm {
    /// Argon2id v1.3 (memory-hard)
    #[default]
    Argon2id,
    /// PBKDF2-HMAC-SHA256. Degraded brute-force resistance; compatibility only.
    Pbkdf2Sha256Compat,
}

/// Persisted derivation parameters.
///
/// These travel with every wrapped key so a later login reproduces the same
/// KEK. All fields are required on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    /// Memory cost in KiB (default: 131072 = 128 MiB)
    #[serde(rename = "m")]
    pub mem_cost_kib: u32,
    /// Time cost / passes (default: 3)
    #[serde(rename = "t")]
    pub time_cost: u32,
    /// Lanes (default: 1)
    #[serde(rename = "p")]
    pub parallelism: u32,
}

/// Upper bound on memory cost: 4 GiB
pub const MAX_MEM_COST_KIB: u32 = 4 * 1024 * 1024;
pub const MAX_TIME_COST: u32 = 64;
pub const MAX_PARALLELISM: u32 = 16;
/// PBKDF2 never runs fewer rounds than this.
pub const MIN_PBKDF2_ITERATIONS: u32 = 10_000;

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            mem_cost_kib: 131_072,
            time_cost: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Build and validate a parameter set.
    pub fn new(
        algorithm: KdfAlgorithm,
        mem_cost_kib: u32,
        time_cost: u32,
        parallelism: u32,
    ) -> CryptoResult<Self> {
        let params = Self {
            algorithm,
            mem_cost_kib,
            time_cost,
            parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> CryptoResult<()> {
        if !(1..=MAX_PARALLELISM).contains(&self.parallelism) {
            return Err(CryptoError::Configuration(format!(
                "parallelism must be in 1..={MAX_PARALLELISM}, got {}",
                self.parallelism
            )));
        }
        if !(1..=MAX_TIME_COST).contains(&self.time_cost) {
            return Err(CryptoError::Configuration(format!(
                "time cost must be in 1..={MAX_TIME_COST}, got {}",
                self.time_cost
            )));
        }
        // Argon2 needs at least 8 KiB per lane
        let min_mem = 8 * self.parallelism;
        if self.mem_cost_kib < min_mem || self.mem_cost_kib > MAX_MEM_COST_KIB {
            return Err(CryptoError::Configuration(format!(
                "memory cost must be in {min_mem}..={MAX_MEM_COST_KIB} KiB, got {}",
                self.mem_cost_kib
            )));
        }
        Ok(())
    }

    /// Iteration count used by the PBKDF2 compatibility mode.
    pub fn pbkdf2_iterations(&self) -> u32 {
        let scaled = self
            .time_cost
            .saturating_mul(1000)
            .saturating_add(self.mem_cost_kib / 100);
        scaled.max(MIN_PBKDF2_ITERATIONS)
    }
}

/// A 256-bit key-encryption key.
///
/// Only [`crate::wrap`] can use it. It remembers the salt and params it was
/// derived from so a wrapped key records exactly what produced it.
/// Zeroized on drop.
#[derive(Clone)]
pub struct Kek {
    bytes: [u8; KEY_SIZE],
    salt: Vec<u8>,
    params: KdfParams,
}

impl Kek {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Salt this KEK was derived with.
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Params this KEK was derived with.
    pub fn params(&self) -> &KdfParams {
        &self.params
    }
}

impl Drop for Kek {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Kek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kek")
            .field("bytes", &"[REDACTED]")
            .field("algorithm", &self.params.algorithm)
            .finish()
    }
}

/// Derive a KEK from a password and salt.
///
/// Deterministic: the same `(password, salt, params)` always yields the same
/// KEK, which is what lets a later session unwrap the stored master key.
pub fn derive_kek(password: &SecretString, salt: &[u8], params: &KdfParams) -> CryptoResult<Kek> {
    if password.expose_secret().is_empty() {
        return Err(CryptoError::Configuration("password must not be empty".into()));
    }
    check_salt_len(salt.len())?;
    params.validate()?;

    let started = Instant::now();
    let mut key = [0u8; KEY_SIZE];
    match params.algorithm {
        KdfAlgorithm::Argon2id => {
            let argon2_params = Params::new(
                params.mem_cost_kib,
                params.time_cost,
                params.parallelism,
                Some(KEY_SIZE),
            )
            .map_err(|e| CryptoError::Configuration(format!("invalid Argon2id params: {e}")))?;

            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);
            if let Err(e) =
                argon2.hash_password_into(password.expose_secret().as_bytes(), salt, &mut key)
            {
                key.zeroize();
                return Err(CryptoError::Derivation(format!("Argon2id KDF failed: {e}")));
            }
        }
        KdfAlgorithm::Pbkdf2Sha256Compat => {
            tracing::warn!(
                iterations = params.pbkdf2_iterations(),
                "deriving KEK with PBKDF2 compatibility mode (not memory-hard)"
            );
            pbkdf2::pbkdf2_hmac::<Sha256>(
                password.expose_secret().as_bytes(),
                salt,
                params.pbkdf2_iterations(),
                &mut key,
            );
        }
    }

    tracing::debug!(
        algorithm = ?params.algorithm,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "derived KEK"
    );

    Ok(Kek {
        bytes: key,
        salt: salt.to_vec(),
        params: *params,
    })
}

//! Random/salt provider backed by the OS CSPRNG.
//!
//! `OsRng` is stateless from our side, so concurrent callers need no locking.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::{IV_SIZE, MAX_SALT_LEN, MIN_SALT_LEN};

/// Reject salt lengths outside `MIN_SALT_LEN..=MAX_SALT_LEN`.
pub fn check_salt_len(len: usize) -> CryptoResult<()> {
    if !(MIN_SALT_LEN..=MAX_SALT_LEN).contains(&len) {
        return Err(CryptoError::Configuration(format!(
            "salt length must be in {MIN_SALT_LEN}..={MAX_SALT_LEN} bytes, got {len}"
        )));
    }
    Ok(())
}

/// Generate a random KDF salt of `len` bytes.
pub fn generate_salt(len: usize) -> CryptoResult<Vec<u8>> {
    check_salt_len(len)?;
    let mut salt = vec![0u8; len];
    OsRng.fill_bytes(&mut salt);
    Ok(salt)
}

/// Fill a fixed-size array with random bytes.
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Fresh 96-bit AES-GCM IV.
pub fn generate_iv() -> [u8; IV_SIZE] {
    random_array()
}

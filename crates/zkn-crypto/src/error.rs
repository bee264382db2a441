use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failures surfaced by the key hierarchy.
///
/// The two authentication variants carry no payload: their `Display` is safe
/// to log, and nothing about the key, the params, or the provider leaks
/// through them.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Malformed salt, params, or lengths. A caller bug; never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The underlying primitive rejected the operation.
    #[error("key derivation failed: {0}")]
    Derivation(String),

    /// Wrong password, mismatched KDF params, or a corrupted wrapped key.
    #[error("key unwrap failed: invalid credentials or corrupted key record")]
    UnwrapAuthentication,

    /// Tampered ciphertext/IV or the wrong content key.
    #[error("decryption failed: authentication tag mismatch")]
    DecryptionAuthentication,
}

impl CryptoError {
    /// Generic text suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            CryptoError::Configuration(_) => "invalid request",
            CryptoError::Derivation(_) => "key derivation failed",
            CryptoError::UnwrapAuthentication => "invalid credentials",
            CryptoError::DecryptionAuthentication => "note could not be decrypted",
        }
    }

    /// True for the expected-in-practice failures (wrong password, tampering).
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            CryptoError::UnwrapAuthentication | CryptoError::DecryptionAuthentication
        )
    }
}

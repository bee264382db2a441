//! Key hierarchy: user master key generation and label-separated subkeys

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::random::random_array;
use crate::KEY_SIZE;

/// HKDF info label for the note content key.
pub const CONTENT_LABEL: &str = "content";
/// HKDF info label for the blind-index search key.
pub const SEARCH_LABEL: &str = "search";
/// Default output length of [`hkdf`].
pub const DEFAULT_DERIVED_KEY_LEN: usize = 32;
/// RFC 5869 limit for SHA-256: 255 blocks.
pub const MAX_DERIVED_KEY_LEN: usize = 255 * 32;

// The UMK is uniformly random, so a fixed zero salt only provides domain
// uniformity. Do not reuse for low-entropy input keying material.
const ZERO_SALT: [u8; 32] = [0u8; 32];

/// The root of a user's key hierarchy. Only usable for derivation.
///
/// Zeroized on drop.
#[derive(Clone)]
pub struct UserMasterKey {
    bytes: [u8; KEY_SIZE],
}

impl UserMasterKey {
    /// Rebuild a UMK from raw bytes. The bytes must come from
    /// [`generate_umk`] (directly or through an unwrap).
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for UserMasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for UserMasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserMasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

macro_rules! purpose_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            bytes: [u8; KEY_SIZE],
        }

        impl $name {
            pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.bytes
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.bytes.zeroize();
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

purpose_key!(
    /// AES-256-GCM key for note titles, bodies, and tags.
    ContentKey
);
purpose_key!(
    /// HMAC-SHA256 key for blind-index term hashes.
    SearchKey
);

/// Raw HKDF output, tagged with the label that produced it.
pub struct DerivedKey {
    bytes: Zeroizing<Vec<u8>>,
    label: String,
}

impl DerivedKey {
    /// Raw derived material.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Restrict this material to AES-256-GCM.
    pub fn into_content_key(self) -> CryptoResult<ContentKey> {
        self.into_array("AES-256-GCM")
            .map(|bytes| ContentKey { bytes })
    }

    /// Restrict this material to HMAC-SHA256 signing.
    pub fn into_search_key(self) -> CryptoResult<SearchKey> {
        self.into_array("HMAC-SHA256")
            .map(|bytes| SearchKey { bytes })
    }

    fn into_array(self, usage: &str) -> CryptoResult<[u8; KEY_SIZE]> {
        if self.bytes.len() != KEY_SIZE {
            return Err(CryptoError::Derivation(format!(
                "{usage} needs a {KEY_SIZE}-byte key, derived key '{}' has {} bytes",
                self.label,
                self.bytes.len()
            )));
        }
        let mut out = [0u8; KEY_SIZE];
        out.copy_from_slice(&self.bytes);
        Ok(out)
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("label", &self.label)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Generate a fresh 256-bit user master key. Called once per account.
pub fn generate_umk() -> UserMasterKey {
    UserMasterKey::from_bytes(random_array())
}

/// HKDF-SHA256 extract-and-expand of the UMK under a domain label.
///
/// Extract uses an all-zero 32-byte salt; expand runs `ceil(length / 32)`
/// rounds of `HMAC(PRK, T(i-1) || label || i)` with `i` starting at 1, and
/// the result is truncated to `length`.
pub fn hkdf(parent: &UserMasterKey, label: &str, length: usize) -> CryptoResult<DerivedKey> {
    if length == 0 || length > MAX_DERIVED_KEY_LEN {
        return Err(CryptoError::Configuration(format!(
            "derived key length must be in 1..={MAX_DERIVED_KEY_LEN}, got {length}"
        )));
    }

    let hk = Hkdf::<Sha256>::new(Some(&ZERO_SALT[..]), parent.as_bytes());
    let mut okm = Zeroizing::new(vec![0u8; length]);
    hk.expand(label.as_bytes(), &mut okm)
        .map_err(|e| CryptoError::Derivation(format!("HKDF expand failed: {e}")))?;

    Ok(DerivedKey {
        bytes: okm,
        label: label.to_string(),
    })
}

/// Derive the note content key (`"content"`).
pub fn derive_content_key(umk: &UserMasterKey) -> CryptoResult<ContentKey> {
    hkdf(umk, CONTENT_LABEL, DEFAULT_DERIVED_KEY_LEN)?.into_content_key()
}

/// Derive the blind-index search key (`"search"`).
pub fn derive_search_key(umk: &UserMasterKey) -> CryptoResult<SearchKey> {
    hkdf(umk, SEARCH_LABEL, DEFAULT_DERIVED_KEY_LEN)?.into_search_key()
}

//! UMK wrapping under the password-derived KEK (AES-256-KW, RFC 3394)
//!
//! Wrapped record:
//! ```text
//! wrapped_key: 40 bytes = AES-KW(KEK, UMK)  (32-byte key + 8-byte integrity block)
//! salt:        the salt the KEK was derived from
//! params:      the exact KdfParams the KEK was derived with
//! ```
//!
//! AES-KW is deterministic and carries its own integrity check, so a wrong
//! password fails at unwrap instead of producing a garbage key. That failure
//! is the only "does this password open the vault" check there is.

use aes_kw::KekAes256;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{Kek, KdfParams};
use crate::keys::UserMasterKey;
use crate::{KEY_SIZE, WRAPPED_KEY_SIZE};

/// The only durable representation of key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub wrapped_key: Vec<u8>,
    pub salt: Vec<u8>,
    pub params: KdfParams,
}

/// Wrap the UMK under `kek`.
///
/// The record carries the salt and params `kek` was derived with, so the
/// next session re-derives the same KEK.
pub fn wrap_umk(umk: &UserMasterKey, kek: &Kek) -> CryptoResult<WrappedKey> {
    let wrapper = KekAes256::from(*kek.as_bytes());

    let mut out = [0u8; WRAPPED_KEY_SIZE];
    wrapper
        .wrap(umk.as_bytes(), &mut out)
        .map_err(|e| CryptoError::Derivation(format!("AES-KW wrap failed: {e:?}")))?;

    Ok(WrappedKey {
        wrapped_key: out.to_vec(),
        salt: kek.salt().to_vec(),
        params: *kek.params(),
    })
}

/// Unwrap the UMK.
///
/// `kek` must have been derived from `wrapped.salt` and `wrapped.params`.
/// A KEK derived with anything else, a wrong password, or a corrupted record
/// all fail with [`CryptoError::UnwrapAuthentication`].
pub fn unwrap_umk(wrapped: &WrappedKey, kek: &Kek) -> CryptoResult<UserMasterKey> {
    if kek.salt() != wrapped.salt.as_slice() || kek.params() != &wrapped.params {
        tracing::debug!("KEK salt/params do not match the wrapped key record");
        return Err(CryptoError::UnwrapAuthentication);
    }
    if wrapped.wrapped_key.len() != WRAPPED_KEY_SIZE {
        tracing::debug!(
            len = wrapped.wrapped_key.len(),
            "wrapped key has unexpected length"
        );
        return Err(CryptoError::UnwrapAuthentication);
    }

    let unwrapper = KekAes256::from(*kek.as_bytes());
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    unwrapper
        .unwrap(&wrapped.wrapped_key, &mut key[..])
        .map_err(|_| CryptoError::UnwrapAuthentication)?;

    Ok(UserMasterKey::from_bytes(*key))
}

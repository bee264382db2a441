//! AES-256-GCM content encryption
//!
//! Each call draws its own 96-bit IV from the OS RNG; there is no counter,
//! so concurrent encryptions under one key need no coordination.
//!
//! ```text
//! ciphertext = AES-256-GCM(content_key, iv, plaintext) || 16-byte tag
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::ContentKey;
use crate::random::generate_iv;
use crate::{IV_SIZE, TAG_SIZE};

/// Durable form of any encrypted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// Ciphertext with the GCM tag appended
    pub ciphertext: Vec<u8>,
    /// 12-byte IV, unique per encryption
    pub iv: Vec<u8>,
}

/// Encrypt `plaintext` under the content key with a fresh random IV.
pub fn aes_gcm_encrypt(key: &ContentKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    let iv = generate_iv();
    let ciphertext = seal(key, &iv, plaintext)?;
    Ok(EncryptedData {
        ciphertext,
        iv: iv.to_vec(),
    })
}

/// Decrypt and authenticate.
///
/// Any tag mismatch, a malformed IV, or a truncated ciphertext fails with
/// [`CryptoError::DecryptionAuthentication`]; partial plaintext is never
/// returned.
pub fn aes_gcm_decrypt(key: &ContentKey, data: &EncryptedData) -> CryptoResult<Vec<u8>> {
    if data.iv.len() != IV_SIZE || data.ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::DecryptionAuthentication);
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(&data.iv), data.ciphertext.as_ref())
        .map_err(|_| CryptoError::DecryptionAuthentication)
}

fn seal(key: &ContentKey, iv: &[u8; IV_SIZE], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|e| CryptoError::Derivation(format!("AES-GCM encryption failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{derive_content_key, generate_umk, UserMasterKey};
    use crate::KEY_SIZE;
    use proptest::prelude::*;

    fn test_key() -> ContentKey {
        derive_content_key(&UserMasterKey::from_bytes([42u8; KEY_SIZE])).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = b"Hello, World!";

        let encrypted = aes_gcm_encrypt(&key, plaintext).unwrap();
        assert_eq!(encrypted.iv.len(), IV_SIZE);

        let decrypted = aes_gcm_decrypt(&key, &encrypted).unwrap();
        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = test_key();
        let encrypted = aes_gcm_encrypt(&key, b"").unwrap();
        assert_eq!(encrypted.ciphertext.len(), TAG_SIZE);
        assert_eq!(aes_gcm_decrypt(&key, &encrypted).unwrap(), b"");
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let key = test_key();
        let e1 = aes_gcm_encrypt(&key, b"same").unwrap();
        let e2 = aes_gcm_encrypt(&key, b"same").unwrap();
        assert_ne!(e1.iv, e2.iv);
        assert_ne!(e1.ciphertext, e2.ciphertext);
    }

    #[test]
    fn test_same_key_and_iv_is_deterministic() {
        let iv = [9u8; IV_SIZE];
        let c1 = seal(&test_key(), &iv, b"note").unwrap();
        let c2 = seal(&test_key(), &iv, b"note").unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_encrypted_size() {
        let encrypted = aes_gcm_encrypt(&test_key(), &[0u8; 1000]).unwrap();
        assert_eq!(encrypted.ciphertext.len(), 1000 + TAG_SIZE);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let encrypted = aes_gcm_encrypt(&test_key(), b"secret data").unwrap();
        let other = derive_content_key(&generate_umk()).unwrap();
        assert!(matches!(
            aes_gcm_decrypt(&other, &encrypted),
            Err(CryptoError::DecryptionAuthentication)
        ));
    }

    #[test]
    fn test_tampered_iv() {
        let key = test_key();
        let mut encrypted = aes_gcm_encrypt(&key, b"secret data").unwrap();
        encrypted.iv[0] ^= 0x80;
        assert!(aes_gcm_decrypt(&key, &encrypted).is_err());
    }

    #[test]
    fn test_malformed_inputs() {
        let key = test_key();
        let mut encrypted = aes_gcm_encrypt(&key, b"secret data").unwrap();

        let mut short_iv = encrypted.clone();
        short_iv.iv.truncate(8);
        assert!(matches!(
            aes_gcm_decrypt(&key, &short_iv),
            Err(CryptoError::DecryptionAuthentication)
        ));

        encrypted.ciphertext.truncate(TAG_SIZE - 1);
        assert!(matches!(
            aes_gcm_decrypt(&key, &encrypted),
            Err(CryptoError::DecryptionAuthentication)
        ));
    }

    proptest! {
        #[test]
        fn roundtrip_any_plaintext(data in proptest::collection::vec(any::<u8>(), 0..=2048)) {
            let key = test_key();
            let encrypted = aes_gcm_encrypt(&key, &data).unwrap();
            prop_assert_eq!(aes_gcm_decrypt(&key, &encrypted).unwrap(), data);
        }

        #[test]
        fn any_bit_flip_is_detected(
            data in proptest::collection::vec(any::<u8>(), 1..=256),
            pos in any::<prop::sample::Index>(),
            bit in 0u8..8,
            flip_iv in any::<bool>(),
        ) {
            let key = test_key();
            let mut encrypted = aes_gcm_encrypt(&key, &data).unwrap();
            if flip_iv {
                let i = pos.index(encrypted.iv.len());
                encrypted.iv[i] ^= 1 << bit;
            } else {
                let i = pos.index(encrypted.ciphertext.len());
                encrypted.ciphertext[i] ^= 1 << bit;
            }
            prop_assert!(matches!(
                aes_gcm_decrypt(&key, &encrypted),
                Err(CryptoError::DecryptionAuthentication)
            ));
        }
    }
}

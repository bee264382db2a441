//! zkn-crypto: client-side key hierarchy and blind indexing for zknotes
//!
//! The server only ever sees ciphertext and keyed term hashes. Everything that
//! can turn those back into plaintext lives here and never leaves the client.
//!
//! Key hierarchy:
//! ```text
//! password + salt ──Argon2id──▶ KEK (AES-KW only, never stored)
//!                                 │ wraps
//!                                 ▼
//! User Master Key (256-bit random, stored only as WrappedKey)
//!   ├── Content Key  = HKDF-SHA256(UMK, salt=0³², info="content")  → AES-256-GCM, 96-bit random IV
//!   └── Search Key   = HKDF-SHA256(UMK, salt=0³², info="search")   → HMAC-SHA256 term hashes
//! ```
//!
//! All operations are also reachable through [`worker::CryptoWorker`], which
//! has an inline and a background (blocking-pool) implementation.

pub mod aead;
pub mod blind_index;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod random;
pub mod worker;
pub mod wrap;

pub use aead::{aes_gcm_decrypt, aes_gcm_encrypt, EncryptedData};
pub use blind_index::{dedup_hashes, generate_search_hashes, query_hashes, tokenize, TermHash};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_kek, Kek, KdfAlgorithm, KdfParams};
pub use keys::{
    derive_content_key, derive_search_key, generate_umk, hkdf, ContentKey, DerivedKey, SearchKey,
    UserMasterKey, CONTENT_LABEL, SEARCH_LABEL,
};
pub use random::{check_salt_len, generate_salt};
pub use worker::{build_worker, BackgroundWorker, CryptoWorker, InlineWorker, WorkerMode};
pub use wrap::{unwrap_umk, wrap_umk, WrappedKey};

/// Size of every symmetric key in the hierarchy (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM IV (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of an AES-GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of an AES-KW wrapped 256-bit key (key + 8-byte integrity block)
pub const WRAPPED_KEY_SIZE: usize = KEY_SIZE + 8;

/// Size of a blind-index term hash (HMAC-SHA256 output)
pub const TERM_HASH_SIZE: usize = 32;

/// Default salt length for KEK derivation
pub const DEFAULT_SALT_LEN: usize = 32;

/// Shortest salt accepted by the KDF
pub const MIN_SALT_LEN: usize = 16;

/// Longest salt accepted by the KDF
pub const MAX_SALT_LEN: usize = 1024;

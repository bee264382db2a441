//! Crypto worker interface
//!
//! One capability surface over every primitive in this crate, with two
//! implementations:
//!   - [`InlineWorker`]: runs on the calling task.
//!   - [`BackgroundWorker`]: runs on tokio's blocking pool so the KDF's
//!     deliberate slowness never stalls the async scheduler.
//!
//! Both return identical results for identical inputs. Callers hold an
//! `Arc<dyn CryptoWorker>` chosen by [`build_worker`] from config.
//!
//! A background task keeps running if its caller is dropped. It only
//! returns a value, so an abandoned derivation never persists anything.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::aead::{self, EncryptedData};
use crate::blind_index::{self, TermHash};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{self, Kek, KdfParams};
use crate::keys::{self, ContentKey, DerivedKey, SearchKey, UserMasterKey};
use crate::random;
use crate::wrap::{self, WrappedKey};

/// Uniform async contract over the key hierarchy.
#[async_trait]
pub trait CryptoWorker: Send + Sync {
    async fn derive_kek(
        &self,
        password: &SecretString,
        salt: &[u8],
        params: &KdfParams,
    ) -> CryptoResult<Kek>;

    async fn wrap_umk(&self, umk: &UserMasterKey, kek: &Kek) -> CryptoResult<WrappedKey>;

    async fn unwrap_umk(&self, wrapped: &WrappedKey, kek: &Kek) -> CryptoResult<UserMasterKey>;

    async fn hkdf(
        &self,
        parent: &UserMasterKey,
        label: &str,
        length: usize,
    ) -> CryptoResult<DerivedKey>;

    async fn aes_gcm_encrypt(
        &self,
        key: &ContentKey,
        plaintext: &[u8],
    ) -> CryptoResult<EncryptedData>;

    async fn aes_gcm_decrypt(&self, key: &ContentKey, data: &EncryptedData)
        -> CryptoResult<Vec<u8>>;

    async fn generate_umk(&self) -> CryptoResult<UserMasterKey>;

    async fn generate_salt(&self, len: usize) -> CryptoResult<Vec<u8>>;

    async fn search_hashes(&self, text: &str, key: &SearchKey) -> CryptoResult<Vec<TermHash>>;
}

/// Which worker the composing layer wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    Inline,
    #[default]
    Background,
}

/// Build the worker selected by `mode`.
pub fn build_worker(
    mode: WorkerMode,
    max_concurrent_derivations: usize,
) -> CryptoResult<Arc<dyn CryptoWorker>> {
    match mode {
        WorkerMode::Inline => Ok(Arc::new(InlineWorker)),
        WorkerMode::Background => Ok(Arc::new(BackgroundWorker::new(
            max_concurrent_derivations,
        )?)),
    }
}

// ── InlineWorker ──────────────────────────────────────────────────────────────

/// Runs every operation directly on the caller's task.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineWorker;

#[async_trait]
impl CryptoWorker for InlineWorker {
    async fn derive_kek(
        &self,
        password: &SecretString,
        salt: &[u8],
        params: &KdfParams,
    ) -> CryptoResult<Kek> {
        kdf::derive_kek(password, salt, params)
    }

    async fn wrap_umk(&self, umk: &UserMasterKey, kek: &Kek) -> CryptoResult<WrappedKey> {
        wrap::wrap_umk(umk, kek)
    }

    async fn unwrap_umk(&self, wrapped: &WrappedKey, kek: &Kek) -> CryptoResult<UserMasterKey> {
        wrap::unwrap_umk(wrapped, kek)
    }

    async fn hkdf(
        &self,
        parent: &UserMasterKey,
        label: &str,
        length: usize,
    ) -> CryptoResult<DerivedKey> {
        keys::hkdf(parent, label, length)
    }

    async fn aes_gcm_encrypt(
        &self,
        key: &ContentKey,
        plaintext: &[u8],
    ) -> CryptoResult<EncryptedData> {
        aead::aes_gcm_encrypt(key, plaintext)
    }

    async fn aes_gcm_decrypt(
        &self,
        key: &ContentKey,
        data: &EncryptedData,
    ) -> CryptoResult<Vec<u8>> {
        aead::aes_gcm_decrypt(key, data)
    }

    async fn generate_umk(&self) -> CryptoResult<UserMasterKey> {
        Ok(keys::generate_umk())
    }

    async fn generate_salt(&self, len: usize) -> CryptoResult<Vec<u8>> {
        random::generate_salt(len)
    }

    async fn search_hashes(&self, text: &str, key: &SearchKey) -> CryptoResult<Vec<TermHash>> {
        blind_index::generate_search_hashes(text, key)
    }
}

// ── BackgroundWorker ──────────────────────────────────────────────────────────

/// Offloads every operation to `spawn_blocking`.
///
/// KDF runs are additionally bounded by a semaphore: each Argon2id call
/// reserves `mem_cost_kib` of RAM for its whole duration.
#[derive(Debug, Clone)]
pub struct BackgroundWorker {
    kdf_permits: Arc<Semaphore>,
}

impl BackgroundWorker {
    pub fn new(max_concurrent_derivations: usize) -> CryptoResult<Self> {
        if max_concurrent_derivations == 0 {
            return Err(CryptoError::Configuration(
                "max_concurrent_derivations must be at least 1".into(),
            ));
        }
        Ok(Self {
            kdf_permits: Arc::new(Semaphore::new(max_concurrent_derivations)),
        })
    }
}

async fn run_blocking<T, F>(op: &'static str, f: F) -> CryptoResult<T>
where
    F: FnOnce() -> CryptoResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!(op, "background crypto task failed: {e}");
        CryptoError::Derivation(format!("{op}: background task did not complete"))
    })?
}

#[async_trait]
impl CryptoWorker for BackgroundWorker {
    async fn derive_kek(
        &self,
        password: &SecretString,
        salt: &[u8],
        params: &KdfParams,
    ) -> CryptoResult<Kek> {
        // Held by the blocking task, so the bound survives caller cancellation
        let permit = self
            .kdf_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CryptoError::Derivation("KDF worker pool is closed".into()))?;

        let password = SecretString::from(password.expose_secret().to_owned());
        let salt = salt.to_vec();
        let params = *params;
        run_blocking("derive_kek", move || {
            let _permit = permit;
            kdf::derive_kek(&password, &salt, &params)
        })
        .await
    }

    async fn wrap_umk(&self, umk: &UserMasterKey, kek: &Kek) -> CryptoResult<WrappedKey> {
        let (umk, kek) = (umk.clone(), kek.clone());
        run_blocking("wrap_umk", move || wrap::wrap_umk(&umk, &kek)).await
    }

    async fn unwrap_umk(&self, wrapped: &WrappedKey, kek: &Kek) -> CryptoResult<UserMasterKey> {
        let (wrapped, kek) = (wrapped.clone(), kek.clone());
        run_blocking("unwrap_umk", move || wrap::unwrap_umk(&wrapped, &kek)).await
    }

    async fn hkdf(
        &self,
        parent: &UserMasterKey,
        label: &str,
        length: usize,
    ) -> CryptoResult<DerivedKey> {
        let (parent, label) = (parent.clone(), label.to_string());
        run_blocking("hkdf", move || keys::hkdf(&parent, &label, length)).await
    }

    async fn aes_gcm_encrypt(
        &self,
        key: &ContentKey,
        plaintext: &[u8],
    ) -> CryptoResult<EncryptedData> {
        let key = key.clone();
        let plaintext = zeroize::Zeroizing::new(plaintext.to_vec());
        run_blocking("aes_gcm_encrypt", move || {
            aead::aes_gcm_encrypt(&key, &plaintext)
        })
        .await
    }

    async fn aes_gcm_decrypt(
        &self,
        key: &ContentKey,
        data: &EncryptedData,
    ) -> CryptoResult<Vec<u8>> {
        let (key, data) = (key.clone(), data.clone());
        run_blocking("aes_gcm_decrypt", move || aead::aes_gcm_decrypt(&key, &data)).await
    }

    async fn generate_umk(&self) -> CryptoResult<UserMasterKey> {
        run_blocking("generate_umk", || Ok(keys::generate_umk())).await
    }

    async fn generate_salt(&self, len: usize) -> CryptoResult<Vec<u8>> {
        run_blocking("generate_salt", move || random::generate_salt(len)).await
    }

    async fn search_hashes(&self, text: &str, key: &SearchKey) -> CryptoResult<Vec<TermHash>> {
        let text = zeroize::Zeroizing::new(text.to_string());
        let key = key.clone();
        run_blocking("search_hashes", move || {
            blind_index::generate_search_hashes(&text, &key)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::KdfAlgorithm;
    use crate::keys::{CONTENT_LABEL, SEARCH_LABEL};

    fn fast_params() -> KdfParams {
        KdfParams {
            algorithm: KdfAlgorithm::Argon2id,
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn workers() -> Vec<Arc<dyn CryptoWorker>> {
        vec![
            build_worker(WorkerMode::Inline, 1).unwrap(),
            build_worker(WorkerMode::Background, 2).unwrap(),
        ]
    }

    #[test]
    fn test_zero_permits_rejected() {
        assert!(matches!(
            BackgroundWorker::new(0),
            Err(CryptoError::Configuration(_))
        ));
    }

    #[test]
    fn test_worker_mode_serde() {
        let mode: WorkerMode = serde_json::from_str("\"inline\"").unwrap();
        assert_eq!(mode, WorkerMode::Inline);
        assert_eq!(WorkerMode::default(), WorkerMode::Background);
    }

    #[tokio::test]
    async fn test_full_flow_on_each_worker() {
        for worker in workers() {
            let password = SecretString::from("Secret123");
            let salt = worker.generate_salt(32).await.unwrap();
            let kek = worker.derive_kek(&password, &salt, &fast_params()).await.unwrap();

            let umk = worker.generate_umk().await.unwrap();
            let wrapped = worker.wrap_umk(&umk, &kek).await.unwrap();
            let restored = worker.unwrap_umk(&wrapped, &kek).await.unwrap();

            let content = worker
                .hkdf(&restored, CONTENT_LABEL, 32)
                .await
                .unwrap()
                .into_content_key()
                .unwrap();
            let encrypted = worker.aes_gcm_encrypt(&content, b"My Body").await.unwrap();
            let decrypted = worker.aes_gcm_decrypt(&content, &encrypted).await.unwrap();
            assert_eq!(decrypted, b"My Body");

            let search = worker
                .hkdf(&umk, SEARCH_LABEL, 32)
                .await
                .unwrap()
                .into_search_key()
                .unwrap();
            let hashes = worker.search_hashes("Hello, World!", &search).await.unwrap();
            assert_eq!(hashes.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_workers_interchangeable() {
        let inline = InlineWorker;
        let background = BackgroundWorker::new(1).unwrap();
        let password = SecretString::from("Secret123");
        let salt = [5u8; 32];

        let kek_a = inline.derive_kek(&password, &salt, &fast_params()).await.unwrap();
        let kek_b = background
            .derive_kek(&password, &salt, &fast_params())
            .await
            .unwrap();
        assert_eq!(kek_a.as_bytes(), kek_b.as_bytes());

        let umk = inline.generate_umk().await.unwrap();
        let wrapped = background.wrap_umk(&umk, &kek_b).await.unwrap();
        let restored = inline.unwrap_umk(&wrapped, &kek_a).await.unwrap();

        let a = inline.hkdf(&umk, SEARCH_LABEL, 32).await.unwrap();
        let b = background.hkdf(&restored, SEARCH_LABEL, 32).await.unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[tokio::test]
    async fn test_background_wrong_password_is_typed() {
        let worker = BackgroundWorker::new(1).unwrap();
        let salt = [6u8; 32];
        let good = worker
            .derive_kek(&SecretString::from("Secret123"), &salt, &fast_params())
            .await
            .unwrap();
        let bad = worker
            .derive_kek(&SecretString::from("WrongPass"), &salt, &fast_params())
            .await
            .unwrap();

        let wrapped = worker.wrap_umk(&keys::generate_umk(), &good).await.unwrap();
        assert!(matches!(
            worker.unwrap_umk(&wrapped, &bad).await,
            Err(CryptoError::UnwrapAuthentication)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_derivations_respect_bound() {
        let worker = Arc::new(BackgroundWorker::new(1).unwrap());
        let mut handles = Vec::new();
        for i in 0..4u8 {
            let worker = worker.clone();
            handles.push(tokio::spawn(async move {
                worker
                    .derive_kek(&SecretString::from("pw"), &[i; 16], &fast_params())
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(worker.kdf_permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_encryptions_use_distinct_ivs() {
        let worker = Arc::new(BackgroundWorker::new(2).unwrap());
        let key = worker.generate_umk().await.unwrap();
        let content_key = worker
            .hkdf(&key, CONTENT_LABEL, crate::KEY_SIZE)
            .await
            .unwrap()
            .into_content_key()
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16u8 {
            let worker = worker.clone();
            let content_key = content_key.clone();
            handles.push(tokio::spawn(async move {
                let data = worker.aes_gcm_encrypt(&content_key, &[i; 64]).await?;
                Ok::<_, CryptoError>((i, data))
            }));
        }

        let mut ivs = std::collections::HashSet::new();
        for handle in handles {
            let (i, data) = handle.await.unwrap().unwrap();
            assert!(ivs.insert(data.iv.clone()));
            let plain = worker.aes_gcm_decrypt(&content_key, &data).await.unwrap();
            assert_eq!(plain, vec![i; 64]);
        }
        assert_eq!(ivs.len(), 16);
    }
}

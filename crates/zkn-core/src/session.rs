//! Key session and note service
//!
//! [`KeyService`] composes the crypto worker into the account-level flows:
//! registration, unlocking, and turning notes, tags and queries into their
//! storage-boundary forms. [`Session`] adds the persisted vault record and
//! tracks whether keys are currently held in memory.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, info};
use zkn_crypto::{
    build_worker, check_salt_len, dedup_hashes, ContentKey, CryptoError, CryptoWorker, KdfParams,
    SearchKey, UserMasterKey, WrappedKey, CONTENT_LABEL, KEY_SIZE, SEARCH_LABEL,
};

use crate::config::ZknConfig;
use crate::error::{ZknError, ZknResult};
use crate::types::{EncryptedNote, EncryptedTag, NotePlaintext, SearchRequest};
use crate::vault::VaultStore;

/// Everything needed to read and write one user's notes.
///
/// Memory only; every key zeroizes on drop.
#[derive(Debug, Clone)]
pub struct UserKeys {
    umk: UserMasterKey,
    content_key: ContentKey,
    search_key: SearchKey,
}

impl UserKeys {
    pub fn umk(&self) -> &UserMasterKey {
        &self.umk
    }

    pub fn content_key(&self) -> &ContentKey {
        &self.content_key
    }

    pub fn search_key(&self) -> &SearchKey {
        &self.search_key
    }
}

/// Account and note operations over an injected [`CryptoWorker`].
#[derive(Clone)]
pub struct KeyService {
    worker: Arc<dyn CryptoWorker>,
    params: KdfParams,
    salt_len: usize,
}

impl KeyService {
    /// `params` and `salt_len` apply to new registrations only.
    pub fn new(
        worker: Arc<dyn CryptoWorker>,
        params: KdfParams,
        salt_len: usize,
    ) -> ZknResult<Self> {
        params.validate()?;
        check_salt_len(salt_len)?;
        Ok(Self {
            worker,
            params,
            salt_len,
        })
    }

    pub fn from_config(config: &ZknConfig) -> ZknResult<Self> {
        let params = config.kdf.to_params()?;
        let worker = build_worker(config.worker.mode, config.worker.max_concurrent_derivations)
            .map_err(|e| ZknError::Config(format!("worker: {e}")))?;
        Self::new(worker, params, config.kdf.salt_len)
    }

    pub fn worker(&self) -> &Arc<dyn CryptoWorker> {
        &self.worker
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Create a fresh key hierarchy for a new account.
    ///
    /// Returns the in-memory keys and the wrapped record to persist.
    pub async fn register(&self, password: &SecretString) -> ZknResult<(UserKeys, WrappedKey)> {
        let salt = self.worker.generate_salt(self.salt_len).await?;
        let kek = self.worker.derive_kek(password, &salt, &self.params).await?;
        let umk = self.worker.generate_umk().await?;
        let wrapped = self.worker.wrap_umk(&umk, &kek).await?;
        let keys = self.derive_user_keys(umk).await?;

        info!(algorithm = ?self.params.algorithm, "registered new key hierarchy");
        Ok((keys, wrapped))
    }

    /// Open an existing wrapped record.
    ///
    /// The KEK is derived with the record's own salt and params, not the
    /// service's registration defaults. A wrong password yields
    /// [`CryptoError::UnwrapAuthentication`] and no key material, and so
    /// does a record whose salt or params are out of range.
    pub async fn unlock(
        &self,
        wrapped: &WrappedKey,
        password: &SecretString,
    ) -> ZknResult<UserKeys> {
        check_salt_len(wrapped.salt.len())
            .and_then(|()| wrapped.params.validate())
            .map_err(|e| {
                debug!(error = %e, "stored key record is malformed");
                CryptoError::UnwrapAuthentication
            })?;

        let kek = self
            .worker
            .derive_kek(password, &wrapped.salt, &wrapped.params)
            .await?;
        let umk = self.worker.unwrap_umk(wrapped, &kek).await?;
        self.derive_user_keys(umk).await
    }

    /// Derive the content and search keys under their fixed labels.
    pub async fn derive_user_keys(&self, umk: UserMasterKey) -> ZknResult<UserKeys> {
        let content_key = self
            .worker
            .hkdf(&umk, CONTENT_LABEL, KEY_SIZE)
            .await?
            .into_content_key()?;
        let search_key = self
            .worker
            .hkdf(&umk, SEARCH_LABEL, KEY_SIZE)
            .await?
            .into_search_key()?;

        Ok(UserKeys {
            umk,
            content_key,
            search_key,
        })
    }

    /// Encrypt title and body separately and index `title + " " + body`.
    pub async fn encrypt_note(
        &self,
        title: &str,
        body: &str,
        keys: &UserKeys,
    ) -> ZknResult<EncryptedNote> {
        let title_data = self
            .worker
            .aes_gcm_encrypt(&keys.content_key, title.as_bytes())
            .await?;
        let body_data = self
            .worker
            .aes_gcm_encrypt(&keys.content_key, body.as_bytes())
            .await?;

        let searchable = format!("{title} {body}");
        let hashes = self
            .worker
            .search_hashes(&searchable, &keys.search_key)
            .await?;
        let term_hashes = dedup_hashes(hashes);

        debug!(terms = term_hashes.len(), "encrypted note");
        Ok(EncryptedNote::new(title_data, body_data, term_hashes))
    }

    /// Decrypt a note and all of its tags.
    pub async fn decrypt_note(
        &self,
        note: &EncryptedNote,
        keys: &UserKeys,
    ) -> ZknResult<NotePlaintext> {
        let title = self.open_text(&note.title(), keys).await?;
        let body = self.open_text(&note.body(), keys).await?;

        let mut tags = Vec::with_capacity(note.tags.len());
        for tag in &note.tags {
            tags.push(self.decrypt_tag(tag, keys).await?);
        }

        Ok(NotePlaintext { title, body, tags })
    }

    pub async fn encrypt_tag(&self, name: &str, keys: &UserKeys) -> ZknResult<EncryptedTag> {
        let data = self
            .worker
            .aes_gcm_encrypt(&keys.content_key, name.as_bytes())
            .await?;
        let hashes = self.worker.search_hashes(name, &keys.search_key).await?;
        let tag_term_hashes = dedup_hashes(hashes);

        Ok(EncryptedTag {
            tag_ct: data.ciphertext,
            iv_tag: data.iv,
            tag_term_hashes,
        })
    }

    pub async fn decrypt_tag(&self, tag: &EncryptedTag, keys: &UserKeys) -> ZknResult<String> {
        self.open_text(&tag.data(), keys).await
    }

    /// Blind search request for `query` with default paging and ordering.
    pub async fn search_query(&self, query: &str, keys: &UserKeys) -> ZknResult<SearchRequest> {
        let hashes = self.worker.search_hashes(query, &keys.search_key).await?;
        Ok(SearchRequest::new(dedup_hashes(hashes)))
    }

    async fn open_text(
        &self,
        data: &zkn_crypto::EncryptedData,
        keys: &UserKeys,
    ) -> ZknResult<String> {
        let bytes = self.worker.aes_gcm_decrypt(&keys.content_key, data).await?;
        String::from_utf8(bytes).map_err(|_| CryptoError::DecryptionAuthentication.into())
    }
}

impl std::fmt::Debug for KeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyService")
            .field("params", &self.params)
            .field("salt_len", &self.salt_len)
            .finish_non_exhaustive()
    }
}

/// Account lifecycle bound to a vault record.
///
/// Keys are held only between a successful `register`/`login` and the next
/// `logout`/`expire`.
#[derive(Debug)]
pub struct Session {
    service: KeyService,
    vault: VaultStore,
    keys: Option<UserKeys>,
}

impl Session {
    pub fn new(service: KeyService, vault: VaultStore) -> Self {
        Self {
            service,
            vault,
            keys: None,
        }
    }

    pub fn service(&self) -> &KeyService {
        &self.service
    }

    pub fn vault(&self) -> &VaultStore {
        &self.vault
    }

    pub fn keys(&self) -> Option<&UserKeys> {
        self.keys.as_ref()
    }

    pub fn is_unlocked(&self) -> bool {
        self.keys.is_some()
    }

    /// Create a new account and persist its wrapped key.
    ///
    /// Refuses to replace an existing record: that would orphan every note
    /// encrypted under the old UMK.
    pub async fn register(&mut self, password: &SecretString) -> ZknResult<&UserKeys> {
        if self.vault.exists() {
            return Err(ZknError::Vault(format!(
                "a vault already exists at {}",
                self.vault.path().display()
            )));
        }

        let (keys, wrapped) = self.service.register(password).await?;
        self.vault.save(&wrapped)?;
        Ok(self.keys.insert(keys))
    }

    /// Unlock the persisted record with `password`.
    ///
    /// On failure the session stays locked and the record is untouched.
    pub async fn login(&mut self, password: &SecretString) -> ZknResult<&UserKeys> {
        let wrapped = self.vault.load()?.ok_or(ZknError::VaultNotFound)?;
        self.keys = None;

        let keys = self.service.unlock(&wrapped, password).await.map_err(|e| {
            debug!(error = %e, "unlock failed");
            e
        })?;
        info!("vault unlocked");
        Ok(self.keys.insert(keys))
    }

    /// Drop the in-memory keys and remove the vault record.
    pub fn logout(&mut self) -> ZknResult<()> {
        self.keys = None;
        self.vault.delete()?;
        info!("logged out");
        Ok(())
    }

    /// The external session token expired. Same effect as [`Session::logout`].
    pub fn expire(&mut self) -> ZknResult<()> {
        debug!("session expired");
        self.logout()
    }

    fn unlocked_keys(&self) -> ZknResult<&UserKeys> {
        self.keys
            .as_ref()
            .ok_or_else(|| ZknError::Vault("session is locked".into()))
    }

    pub async fn encrypt_note(&self, title: &str, body: &str) -> ZknResult<EncryptedNote> {
        self.service
            .encrypt_note(title, body, self.unlocked_keys()?)
            .await
    }

    pub async fn decrypt_note(&self, note: &EncryptedNote) -> ZknResult<NotePlaintext> {
        self.service.decrypt_note(note, self.unlocked_keys()?).await
    }

    pub async fn search_query(&self, query: &str) -> ZknResult<SearchRequest> {
        self.service.search_query(query, self.unlocked_keys()?).await
    }
}

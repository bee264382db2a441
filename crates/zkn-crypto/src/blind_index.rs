//! Blind index: keyed term hashes the server can match but not read
//!
//! Indexing and querying must go through the same [`tokenize`] +
//! [`hash_term`] path, otherwise query hashes never match stored ones.
//! Matching is exact byte equality; there is no prefix or fuzzy search.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::SearchKey;
use crate::TERM_HASH_SIZE;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of one normalized token.
pub type TermHash = [u8; TERM_HASH_SIZE];

/// Split text into normalized search tokens.
///
/// Lowercases, turns every character that is neither a word character
/// (alphanumeric or `_`) nor whitespace into a space, then splits on
/// whitespace. Empty and all-punctuation input yields no tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();

    normalized.split_whitespace().map(str::to_string).collect()
}

/// Keyed hash of a single, already normalized token.
pub fn hash_term(key: &SearchKey, token: &str) -> CryptoResult<TermHash> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Derivation(format!("invalid HMAC key: {e}")))?;
    mac.update(token.as_bytes());

    let digest = mac.finalize().into_bytes();
    let mut hash = [0u8; TERM_HASH_SIZE];
    hash.copy_from_slice(&digest);
    Ok(hash)
}

/// Term hashes for every token of `text`, in token order.
///
/// Duplicates are kept; use [`dedup_hashes`] if the storage side wants a set.
pub fn generate_search_hashes(text: &str, key: &SearchKey) -> CryptoResult<Vec<TermHash>> {
    tokenize(text)
        .iter()
        .map(|token| hash_term(key, token))
        .collect()
}

/// Hashes for a search query. Same derivation as indexing.
pub fn query_hashes(query: &str, key: &SearchKey) -> CryptoResult<Vec<TermHash>> {
    generate_search_hashes(query, key)
}

/// Drop repeated hashes, keeping the first occurrence of each.
pub fn dedup_hashes(hashes: Vec<TermHash>) -> Vec<TermHash> {
    let mut seen = std::collections::HashSet::with_capacity(hashes.len());
    hashes.into_iter().filter(|h| seen.insert(*h)).collect()
}

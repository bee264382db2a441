//! Storage-boundary types
//!
//! Everything here is already encrypted or keyed-hashed and is what the
//! storage collaborator persists verbatim. Byte fields travel as standard
//! base64 strings; field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zkn_crypto::{EncryptedData, TermHash};

use crate::error::{ZknError, ZknResult};

/// Server-assigned note identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub Uuid);

impl NoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An encrypted note as submitted for storage
///
/// `id` is absent on a freshly encrypted note and filled in by the storage
/// collaborator once it has assigned one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NoteId>,
    #[serde(with = "b64")]
    pub title_ct: Vec<u8>,
    #[serde(with = "b64")]
    pub iv_title: Vec<u8>,
    #[serde(with = "b64")]
    pub body_ct: Vec<u8>,
    #[serde(with = "b64")]
    pub iv_body: Vec<u8>,
    #[serde(with = "b64_hashes")]
    pub term_hashes: Vec<TermHash>,
    #[serde(default)]
    pub tags: Vec<EncryptedTag>,
}

impl EncryptedNote {
    pub(crate) fn new(
        title: EncryptedData,
        body: EncryptedData,
        term_hashes: Vec<TermHash>,
    ) -> Self {
        Self {
            id: None,
            title_ct: title.ciphertext,
            iv_title: title.iv,
            body_ct: body.ciphertext,
            iv_body: body.iv,
            term_hashes,
            tags: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: NoteId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn title(&self) -> EncryptedData {
        EncryptedData {
            ciphertext: self.title_ct.clone(),
            iv: self.iv_title.clone(),
        }
    }

    pub fn body(&self) -> EncryptedData {
        EncryptedData {
            ciphertext: self.body_ct.clone(),
            iv: self.iv_body.clone(),
        }
    }
}

/// An encrypted tag with its own blind index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedTag {
    #[serde(with = "b64")]
    pub tag_ct: Vec<u8>,
    #[serde(with = "b64")]
    pub iv_tag: Vec<u8>,
    #[serde(with = "b64_hashes")]
    pub tag_term_hashes: Vec<TermHash>,
}

impl EncryptedTag {
    pub fn data(&self) -> EncryptedData {
        EncryptedData {
            ciphertext: self.tag_ct.clone(),
            iv: self.iv_tag.clone(),
        }
    }
}

/// Decrypted note content. Lives only on the client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotePlaintext {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    All,
    Tags,
    Notes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    #[default]
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

pub const DEFAULT_SEARCH_LIMIT: u32 = 50;
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// A blind search request: query term hashes plus paging and ordering
///
/// Deserialization applies the same limit check as [`SearchRequest::with_limit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "SearchRequestWire")]
pub struct SearchRequest {
    #[serde(with = "b64_hashes")]
    pub term_hashes: Vec<TermHash>,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub order: SortOrder,
}

fn default_limit() -> u32 {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequestWire {
    #[serde(with = "b64_hashes")]
    term_hashes: Vec<TermHash>,
    #[serde(default)]
    mode: SearchMode,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    sort: SortField,
    #[serde(default)]
    order: SortOrder,
}

impl TryFrom<SearchRequestWire> for SearchRequest {
    type Error = ZknError;

    fn try_from(wire: SearchRequestWire) -> ZknResult<Self> {
        let request = Self {
            term_hashes: wire.term_hashes,
            mode: wire.mode,
            limit: wire.limit,
            cursor: wire.cursor,
            sort: wire.sort,
            order: wire.order,
        };
        request.validate()?;
        Ok(request)
    }
}

impl SearchRequest {
    pub fn new(term_hashes: Vec<TermHash>) -> Self {
        Self {
            term_hashes,
            mode: SearchMode::default(),
            limit: DEFAULT_SEARCH_LIMIT,
            cursor: None,
            sort: SortField::default(),
            order: SortOrder::default(),
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> ZknResult<Self> {
        self.limit = limit;
        self.validate()?;
        Ok(self)
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_sort(mut self, sort: SortField, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn validate(&self) -> ZknResult<()> {
        if !(1..=MAX_SEARCH_LIMIT).contains(&self.limit) {
            return Err(ZknError::Config(format!(
                "search limit must be in 1..={MAX_SEARCH_LIMIT}, got {}",
                self.limit
            )));
        }
        Ok(())
    }
}

pub(crate) mod b64 {
    use base64::{engine::general_purpose::STANDARD as B64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        B64.decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

mod b64_hashes {
    use base64::{engine::general_purpose::STANDARD as B64, Engine};
    use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serializer};
    use zkn_crypto::TermHash;

    pub fn serialize<S: Serializer>(hashes: &[TermHash], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(hashes.len()))?;
        for hash in hashes {
            seq.serialize_element(&B64.encode(hash))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<TermHash>, D::Error> {
        let encoded = Vec::<String>::deserialize(d)?;
        encoded
            .iter()
            .map(|e| {
                let bytes = B64.decode(e.as_bytes()).map_err(serde::de::Error::custom)?;
                TermHash::try_from(bytes.as_slice()).map_err(|_| {
                    serde::de::Error::invalid_length(bytes.len(), &"a 32-byte term hash")
                })
            })
            .collect()
    }
}

use thiserror::Error;
use zkn_crypto::CryptoError;

pub type ZknResult<T> = Result<T, ZknError>;

#[derive(Debug, Error)]
pub enum ZknError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("config error: {0}")]
    Config(String),

    #[error("vault error: {0}")]
    Vault(String),

    #[error("no vault found; run `zkn init` first")]
    VaultNotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ZknError {
    /// Message safe to show an end user.
    ///
    /// Crypto failures collapse to their generic text; nothing derived from
    /// key material or provider errors leaks through.
    pub fn user_message(&self) -> String {
        match self {
            ZknError::Crypto(e) => e.user_message().to_string(),
            ZknError::VaultNotFound => self.to_string(),
            ZknError::Config(_) => "invalid configuration".into(),
            ZknError::Vault(_) | ZknError::Io(_) => "vault could not be read or written".into(),
            ZknError::Other(_) => "unexpected error".into(),
        }
    }
}

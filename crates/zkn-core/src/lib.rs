pub mod config;
pub mod error;
pub mod session;
pub mod types;
pub mod vault;

pub use error::{ZknError, ZknResult};
pub use session::{KeyService, Session, UserKeys};
pub use vault::VaultStore;

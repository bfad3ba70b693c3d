pub mod credentials;
pub mod error;
pub mod error_help;
pub mod path;

pub use credentials::{CredentialVault, KeyringVault, StoredCredentials};
pub use error::*;

//! Core utilities shared by the Rewind binary and library: the error
//! taxonomy, platform paths and the credential vault.

pub mod core;

pub use crate::core::error_help::{format_error_with_help, ErrorHelp};
pub use crate::core::path;
pub use crate::core::{
    AuthError, CredentialVault, DeliveryError, FetchError, KeyringVault, LinkError,
    PackagingError, ResolutionError, RewindError, RewindResult, StoredCredentials,
};

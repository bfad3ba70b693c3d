//! Rewind: roll an installed App Store application back to an earlier release
//!
//! This crate provides the main Rewind library, re-exporting the error
//! taxonomy and credential vault from `rewind-core` and organizing the
//! downgrade pipeline: sign-in, version resolution, fetching, packaging and
//! local delivery.

pub use rewind_core::{
    format_error_with_help, AuthError, CredentialVault, DeliveryError, ErrorHelp, FetchError,
    KeyringVault, LinkError, PackagingError, ResolutionError, RewindError, RewindResult,
    StoredCredentials,
};

/// Core module re-exported from rewind-core.
pub mod core {
    pub use rewind_core::core::*;
}

/// Configuration management.
pub mod config;

/// Local delivery server and install trigger.
pub mod delivery;

/// Dependency injection infrastructure.
pub mod di;

/// Downgrade state machine.
pub mod orchestrator;

/// Package download, extraction and re-archiving.
pub mod package;

/// Historical release resolution.
pub mod resolver;

/// Marketplace protocol client and session.
pub mod store;

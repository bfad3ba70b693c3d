//! Trait definitions for dependency injection

use crate::delivery::InstallTrigger;
use crate::resolver::HistoryEntry;
use crate::store::types::{AccountInfo, DownloadTicket};
use crate::store::AppId;
use async_trait::async_trait;
use rewind_core::{AuthError, FetchError, ResolutionError, RewindResult};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Trait for configuration access
///
/// Provides read-only access to application configuration.
/// Implementations should be thread-safe (Send + Sync).
pub trait ConfigProvider: Send + Sync {
    /// Marketplace sign-in endpoint
    fn auth_url(&self) -> &str;

    /// Marketplace download-ticket endpoint
    fn download_url(&self) -> &str;

    /// Base URL of the release history service
    fn history_url(&self) -> &str;

    /// Install-manifest generator endpoint
    fn manifest_generator_url(&self) -> &str;

    /// Address the delivery server binds to
    fn delivery_addr(&self) -> SocketAddr;

    /// Scratch directory for packages and archives
    fn work_dir(&self) -> RewindResult<PathBuf>;

    /// Timeout for metadata requests
    fn request_timeout(&self) -> Duration;

    /// User agent presented to the marketplace
    fn user_agent(&self) -> &str;
}

/// Trait for the marketplace's private protocol
///
/// Only [`crate::store::StoreSession`] talks to this directly; everything
/// else goes through the session so the authentication check is in one place.
#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    /// Sign in with a derived secret (password with any second-factor code appended).
    ///
    /// `request_code` marks the deliberate partial attempt whose only purpose
    /// is to get a second-factor code pushed to the account's devices.
    async fn authenticate(
        &self,
        account_id: &str,
        derived_secret: &SecretString,
        request_code: bool,
    ) -> Result<AccountInfo, AuthError>;

    /// Ask for a download ticket; `release_id: None` means the current release
    async fn download_ticket(
        &self,
        account: &AccountInfo,
        app_id: &AppId,
        release_id: Option<&str>,
    ) -> Result<DownloadTicket, FetchError>;

    /// Download the package behind a ticket URL to `dest`
    async fn download_package(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Trait for the public release history service
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Fetch the history for an app, in the order the service returns it
    async fn fetch_history(&self, app_id: &AppId) -> Result<Vec<HistoryEntry>, ResolutionError>;
}

/// Trait for the platform's install-manifest mechanism
#[cfg_attr(test, mockall::automock)]
pub trait InstallLauncher: Send + Sync {
    /// Hand the install trigger to the platform
    fn launch(&self, trigger: &InstallTrigger) -> RewindResult<()>;
}

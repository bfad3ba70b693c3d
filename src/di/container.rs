//! Service container for dependency injection

use super::traits::{ConfigProvider, HistoryProvider, InstallLauncher, MarketplaceClient};
use crate::config::Config;
use crate::delivery::SystemLauncher;
use crate::resolver::HistoryClient;
use crate::store::StoreClient;
use rewind_core::{CredentialVault, KeyringVault, RewindResult};
use std::sync::Arc;

/// Service container for dependency injection
///
/// This container holds all core services and provides access to them
/// through trait objects. It uses `Arc<dyn Trait>` for runtime polymorphism,
/// allowing easy swapping of implementations for testing.
///
/// # Example (Testing)
///
/// ```
/// use rewind::di::{ServiceContainer, mocks::*};
/// use std::sync::Arc;
///
/// let container = ServiceContainer::with_providers(
///     Arc::new(MockConfigProvider::default()),
///     Arc::new(MockMarketplace::new("user@example.com", "pw")),
///     Arc::new(MockHistoryProvider::new()),
///     Arc::new(MemoryVault::new()),
///     Arc::new(RecordingLauncher::new()),
/// );
/// assert_eq!(container.config().delivery_addr().ip().to_string(), "127.0.0.1");
/// ```
#[derive(Clone)]
pub struct ServiceContainer {
    pub config: Arc<dyn ConfigProvider>,
    pub marketplace: Arc<dyn MarketplaceClient>,
    pub history: Arc<dyn HistoryProvider>,
    pub vault: Arc<dyn CredentialVault>,
    pub launcher: Arc<dyn InstallLauncher>,
}

impl ServiceContainer {
    /// Create a new service container with production implementations
    ///
    /// - Loads config from disk
    /// - Builds HTTP clients for the marketplace and the history service
    /// - Opens the keychain-backed credential vault
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded or an HTTP client
    /// cannot be built.
    pub fn new() -> RewindResult<Self> {
        let config = Config::load()?;

        Ok(Self {
            marketplace: Arc::new(StoreClient::new(&config)?),
            history: Arc::new(HistoryClient::new(&config)?),
            vault: Arc::new(KeyringVault::default()),
            launcher: Arc::new(SystemLauncher),
            config: Arc::new(config),
        })
    }

    /// Create a service container with custom provider implementations
    pub fn with_providers(
        config: Arc<dyn ConfigProvider>,
        marketplace: Arc<dyn MarketplaceClient>,
        history: Arc<dyn HistoryProvider>,
        vault: Arc<dyn CredentialVault>,
        launcher: Arc<dyn InstallLauncher>,
    ) -> Self {
        Self {
            config,
            marketplace,
            history,
            vault,
            launcher,
        }
    }

    /// Get the configuration provider
    pub fn config(&self) -> &dyn ConfigProvider {
        self.config.as_ref()
    }

    /// Get the credential vault
    pub fn vault(&self) -> &dyn CredentialVault {
        self.vault.as_ref()
    }
}

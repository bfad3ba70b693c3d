//! Dependency injection infrastructure for Rewind
//!
//! Every collaborator that touches the network, the keychain or the platform
//! sits behind a trait, so the session, resolver, fetcher and orchestrator can
//! be driven entirely by the fakes in [`mocks`].
//!
//! # Example (Production)
//! ```no_run
//! use rewind::di::ServiceContainer;
//!
//! # fn example() -> rewind_core::RewindResult<()> {
//! let container = ServiceContainer::new()?;
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod mocks;
pub mod traits;

// Re-export key types
pub use container::ServiceContainer;
pub use traits::{ConfigProvider, HistoryProvider, InstallLauncher, MarketplaceClient};

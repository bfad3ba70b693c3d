//! Historical release resolution

pub mod history;
pub mod types;
pub mod version_resolver;

pub use history::{HistoryClient, HistoryEntry};
pub use types::{ReleaseCandidate, ReleaseSource, Resolution, ResolutionStrategy};
pub use version_resolver::VersionResolver;

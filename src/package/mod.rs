//! Release package retrieval and repackaging

pub mod extractor;
pub mod fetcher;
pub mod metadata;
pub mod packager;

pub use fetcher::{PackageFetcher, RawPackage};
pub use metadata::BundleInfo;
pub use packager::{ArtifactPackager, InstallableArtifact};

//! Release package retrieval
//!
//! A fetch asks the session for a download ticket, streams the encrypted
//! `.ipa` into the work directory, unpacks it into `<work>/<app>_<release>/`
//! and finalises the bundle: `iTunesMetadata.plist` at the root and the
//! ticket's sinfs inside the bundle's `SC_Info`.

use crate::package::extractor::PackageExtractor;
use crate::package::metadata::{find_app_bundle, read_info_plist};
use crate::store::types::DownloadTicket;
use crate::store::{AppId, StoreSession};
use rewind_core::FetchError;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// An unpacked release, owned by whoever holds it
///
/// Not `Clone`: the directory is handed from the fetcher to the packager.
#[derive(Debug)]
pub struct RawPackage {
    root: PathBuf,
}

impl RawPackage {
    /// Wrap an existing unpacked package directory
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete the package directory
    pub fn discard(self) {
        if let Err(e) = fs::remove_dir_all(&self.root) {
            warn!(path = %self.root.display(), error = %e, "could not remove raw package");
        }
    }
}

/// Downloads release packages into a private work directory
pub struct PackageFetcher {
    work_dir: PathBuf,
}

impl PackageFetcher {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Fetch one release of an app
    pub async fn fetch(
        &self,
        session: &StoreSession,
        app_id: &AppId,
        release_id: &str,
    ) -> Result<RawPackage, FetchError> {
        if !session.is_authenticated() {
            return Err(FetchError::NotAuthenticated);
        }
        // The id becomes part of a path
        if release_id.is_empty() || !release_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FetchError::ReleaseUnavailable {
                app_id: app_id.to_string(),
                release_id: release_id.to_string(),
                reason: "not a valid release identifier".to_string(),
            });
        }

        let ticket = session.download_ticket(app_id, release_id).await?;
        debug!(app = %app_id, release = %release_id, sinfs = ticket.sinfs.len(), "got download ticket");

        fs::create_dir_all(&self.work_dir).map_err(|e| FetchError::Storage(e.to_string()))?;
        let name = format!("{}_{}", app_id, release_id);
        let archive = self.work_dir.join(format!("{}.ipa", name));

        session.download_package(&ticket, &archive).await?;
        info!(app = %app_id, release = %release_id, "downloaded package");

        let account_id = session.account_id().unwrap_or_default().to_string();
        let work_dir = self.work_dir.clone();
        let result = tokio::task::spawn_blocking(move || {
            let extracted = PackageExtractor::new(work_dir).extract(&archive, &name);
            if let Err(e) = fs::remove_file(&archive) {
                warn!(path = %archive.display(), error = %e, "could not remove downloaded archive");
            }
            let root = extracted?;
            if let Err(e) = finalise(&root, &ticket, &account_id) {
                if let Err(cleanup) = fs::remove_dir_all(&root) {
                    warn!(path = %root.display(), error = %cleanup, "could not remove raw package");
                }
                return Err(e);
            }
            Ok(root)
        })
        .await
        .map_err(|e| FetchError::Storage(format!("unpacking task failed: {}", e)))?;

        result.map(RawPackage::from_dir)
    }
}

/// Write store metadata and sinfs into an unpacked package
fn finalise(root: &Path, ticket: &DownloadTicket, account_id: &str) -> Result<(), FetchError> {
    write_itunes_metadata(root, ticket, account_id)?;
    if ticket.sinfs.is_empty() {
        return Ok(());
    }

    let bundle = find_app_bundle(root).map_err(|e| FetchError::CorruptDownload(e.to_string()))?;
    for (relative, sinf) in sinf_targets(&bundle)?.into_iter().zip(&ticket.sinfs) {
        let path = bundle.join(&relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FetchError::Storage(e.to_string()))?;
        }
        fs::write(&path, sinf).map_err(|e| FetchError::Storage(e.to_string()))?;
        debug!(path = %path.display(), "wrote sinf");
    }
    Ok(())
}

fn write_itunes_metadata(
    root: &Path,
    ticket: &DownloadTicket,
    account_id: &str,
) -> Result<(), FetchError> {
    let mut metadata = ticket.metadata.clone();
    metadata.insert("apple-id".to_string(), account_id.into());
    metadata.insert("userName".to_string(), account_id.into());
    plist::Value::Dictionary(metadata)
        .to_file_xml(root.join("iTunesMetadata.plist"))
        .map_err(|e| FetchError::Storage(format!("cannot write iTunesMetadata.plist: {}", e)))
}

/// Where the sinfs go, relative to the bundle, paired with sinfs by index
fn sinf_targets(bundle: &Path) -> Result<Vec<PathBuf>, FetchError> {
    let manifest = bundle.join("SC_Info").join("Manifest.plist");
    if manifest.exists() {
        let value = plist::Value::from_file(&manifest)
            .map_err(|e| FetchError::CorruptDownload(format!("unreadable sinf manifest: {}", e)))?;
        let paths = value
            .as_dictionary()
            .and_then(|dict| dict.get("SinfPaths"))
            .and_then(plist::Value::as_array)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(plist::Value::as_string)
                    .map(PathBuf::from)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        for path in &paths {
            let escapes = path
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if escapes {
                return Err(FetchError::CorruptDownload(format!(
                    "sinf path escapes the bundle: {}",
                    path.display()
                )));
            }
        }
        return Ok(paths);
    }

    let info = read_info_plist(bundle).map_err(|e| FetchError::CorruptDownload(e.to_string()))?;
    let executable = info.executable.ok_or_else(|| {
        FetchError::CorruptDownload("bundle has no CFBundleExecutable".to_string())
    })?;
    Ok(vec![PathBuf::from("SC_Info").join(format!("{}.sinf", executable))])
}

use rewind_core::FetchError;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::warn;
use zip::ZipArchive;

/// Unpacks downloaded `.ipa` archives into raw package directories
pub struct PackageExtractor {
    dest_dir: PathBuf,
}

impl PackageExtractor {
    /// Create a new PackageExtractor
    pub fn new(dest_dir: PathBuf) -> Self {
        Self { dest_dir }
    }

    /// Extract `archive_path` into `<dest_dir>/<name>/`.
    ///
    /// The archive is unpacked into a temporary sibling first and renamed into
    /// place, so a failed extraction never leaves a half-populated package.
    pub fn extract(&self, archive_path: &Path, name: &str) -> Result<PathBuf, FetchError> {
        let target = self.dest_dir.join(name);
        let temp_dir = self.dest_dir.join(format!(".tmp-{}", name));

        let result = self.extract_zip(archive_path, &temp_dir).and_then(|()| {
            if target.exists() {
                fs::remove_dir_all(&target).map_err(storage)?;
            }
            fs::rename(&temp_dir, &target).map_err(storage)
        });

        if let Err(e) = result {
            if temp_dir.exists() {
                if let Err(cleanup) = fs::remove_dir_all(&temp_dir) {
                    warn!(path = %temp_dir.display(), error = %cleanup, "could not clean up extraction directory");
                }
            }
            return Err(e);
        }
        Ok(target)
    }

    fn extract_zip(&self, archive_path: &Path, temp_dir: &Path) -> Result<(), FetchError> {
        let file = File::open(archive_path).map_err(storage)?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| FetchError::CorruptDownload(format!("Invalid package archive: {}", e)))?;

        // Clean up any existing temp dir
        if temp_dir.exists() {
            fs::remove_dir_all(temp_dir).map_err(storage)?;
        }
        fs::create_dir_all(temp_dir).map_err(storage)?;

        // Entries escaping the target directory are rejected by the zip crate
        archive
            .extract(temp_dir)
            .map_err(|e| FetchError::CorruptDownload(format!("Extract failed: {}", e)))?;

        let has_payload = temp_dir.join("Payload").is_dir();
        if !has_payload {
            return Err(FetchError::CorruptDownload(
                "Package archive has no Payload directory".to_string(),
            ));
        }
        Ok(())
    }
}

fn storage(e: std::io::Error) -> FetchError {
    FetchError::Storage(e.to_string())
}

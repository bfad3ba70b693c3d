use crate::package::fetcher::RawPackage;
use crate::package::metadata::{find_app_bundle, read_info_plist};
use rewind_core::PackagingError;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A finished, closed archive ready to serve
///
/// Not `Clone`: it is bound to exactly one delivery server.
#[derive(Debug)]
pub struct InstallableArtifact {
    archive_path: PathBuf,
    bundle_identifier: String,
    version_string: String,
}

impl InstallableArtifact {
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn bundle_identifier(&self) -> &str {
        &self.bundle_identifier
    }

    pub fn version_string(&self) -> &str {
        &self.version_string
    }

    /// Delete the archive
    pub fn remove(self) -> io::Result<()> {
        fs::remove_file(&self.archive_path)
    }
}

/// Turns raw package directories into installable `.ipa` archives
pub struct ArtifactPackager {
    output_dir: PathBuf,
}

impl ArtifactPackager {
    /// Create a new packager writing archives into `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Archive path for a raw package: `<output_dir>/<package dir name>.ipa`
    pub fn archive_path_for(&self, raw: &RawPackage) -> Result<PathBuf, PackagingError> {
        let name = raw
            .root()
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PackagingError::MalformedPackage(format!(
                    "raw package path has no name: {}",
                    raw.root().display()
                ))
            })?;
        Ok(self.output_dir.join(format!("{}.ipa", name)))
    }

    /// Package a raw package directory.
    ///
    /// The whole directory is archived, not just the bundle, so unpacking
    /// the result reproduces the original top-level layout. The archive is
    /// written next to its final path and renamed into place once closed.
    /// The raw package is consumed and removed either way.
    pub fn package(&self, raw: RawPackage) -> Result<InstallableArtifact, PackagingError> {
        let result = self.archive(&raw);
        raw.discard();
        result
    }

    fn archive(&self, raw: &RawPackage) -> Result<InstallableArtifact, PackagingError> {
        let bundle = find_app_bundle(raw.root())?;
        let info = read_info_plist(&bundle)?;
        debug!(
            bundle = %bundle.display(),
            identifier = %info.bundle_identifier,
            version = %info.version_string,
            "read bundle metadata"
        );

        let archive_path = self.archive_path_for(raw)?;
        fs::create_dir_all(&self.output_dir).map_err(archive_error)?;
        let partial = archive_path.with_extension("ipa.partial");

        if let Err(e) = create_zip(raw.root(), &partial) {
            let _ = fs::remove_file(&partial); // Ignore cleanup errors
            return Err(e);
        }
        fs::rename(&partial, &archive_path).map_err(archive_error)?;

        info!(
            archive = %archive_path.display(),
            identifier = %info.bundle_identifier,
            version = %info.version_string,
            "packaged artifact"
        );
        Ok(InstallableArtifact {
            archive_path,
            bundle_identifier: info.bundle_identifier,
            version_string: info.version_string,
        })
    }
}

fn archive_error(e: impl std::fmt::Display) -> PackagingError {
    PackagingError::Archive(e.to_string())
}

/// Zip `source_dir`'s contents with paths relative to it
fn create_zip(source_dir: &Path, archive_path: &Path) -> Result<(), PackagingError> {
    let file = File::create(archive_path).map_err(archive_error)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let walker = WalkDir::new(source_dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(archive_error)?;
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(archive_error)?;
        // Zip entry names always use forward slashes
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let mut options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = entry.metadata().map_err(archive_error)?.permissions().mode();
            options = options.unix_permissions(mode & 0o7777);
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            zip.add_directory(format!("{}/", name), options)
                .map_err(archive_error)?;
        } else if file_type.is_file() {
            zip.start_file(name, options).map_err(archive_error)?;
            let mut source = File::open(entry.path()).map_err(archive_error)?;
            io::copy(&mut source, &mut zip).map_err(archive_error)?;
        } else {
            debug!(path = %entry.path().display(), "skipping non-regular file");
        }
    }

    let mut writer = zip.finish().map_err(archive_error)?;
    writer.flush().map_err(archive_error)?;
    let file = writer.into_inner().map_err(|e| archive_error(e.error()))?;
    file.sync_all().map_err(archive_error)?;
    Ok(())
}

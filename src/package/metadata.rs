//! Application bundle discovery and `Info.plist` reading

use rewind_core::PackagingError;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory inside a raw package that holds the application bundle
pub const PAYLOAD_DIR: &str = "Payload";

/// Suffix of application bundle directories
pub const APP_SUFFIX: &str = ".app";

/// What the install manifest needs to know about a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    pub bundle_identifier: String,
    pub version_string: String,
    /// `CFBundleExecutable`, used to name the default sinf
    pub executable: Option<String>,
}

/// First `*.app` directory in `<root>/Payload`, by file name
pub fn find_app_bundle(root: &Path) -> Result<PathBuf, PackagingError> {
    let payload = root.join(PAYLOAD_DIR);
    let entries = fs::read_dir(&payload).map_err(|e| {
        PackagingError::MalformedPackage(format!("cannot read {}: {}", payload.display(), e))
    })?;

    let mut bundles: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(APP_SUFFIX))
        })
        .collect();
    // read_dir order is platform-defined
    bundles.sort();

    bundles.into_iter().next().ok_or_else(|| {
        PackagingError::MalformedPackage(format!(
            "no {} bundle in {}",
            APP_SUFFIX,
            payload.display()
        ))
    })
}

/// Read identifier, version and executable name from `<bundle>/Info.plist`
pub fn read_info_plist(bundle: &Path) -> Result<BundleInfo, PackagingError> {
    let path = bundle.join("Info.plist");
    let value = plist::Value::from_file(&path).map_err(|e| {
        PackagingError::MalformedPackage(format!("cannot read {}: {}", path.display(), e))
    })?;
    let dict = value.as_dictionary().ok_or_else(|| {
        PackagingError::MalformedPackage(format!("{} is not a dictionary", path.display()))
    })?;

    let string_key = |key: &str| {
        dict.get(key)
            .and_then(plist::Value::as_string)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let required = |key: &str| {
        string_key(key).ok_or_else(|| {
            PackagingError::MalformedPackage(format!("{} has no {}", path.display(), key))
        })
    };

    Ok(BundleInfo {
        bundle_identifier: required("CFBundleIdentifier")?,
        version_string: required("CFBundleShortVersionString")?,
        executable: string_key("CFBundleExecutable"),
    })
}

//! Install-manifest URLs and the install page
//!
//! The platform installs from an `itms-services` URL that points at a
//! manifest generator, which in turn points back at the local `/signed.ipa`.

use crate::package::InstallableArtifact;
use rewind_core::DeliveryError;
use std::net::SocketAddr;
use url::Url;

/// Route serving the archive bytes
pub const ARCHIVE_ROUTE: &str = "/signed.ipa";

/// Route serving the install page
pub const INSTALL_ROUTE: &str = "/install";

/// Everything needed to start an install from the local server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTrigger {
    /// `http://<addr>/install`
    pub install_page_url: String,
    /// `itms-services://?action=download-manifest&url=<encoded manifest url>`
    pub itms_url: String,
    /// Manifest generator URL carrying bundle id, name, version and fetch URL
    pub manifest_url: String,
}

impl InstallTrigger {
    /// Build the trigger for an artifact served from `local_addr`
    pub fn new(
        generator_url: &str,
        artifact: &InstallableArtifact,
        local_addr: SocketAddr,
    ) -> Result<Self, DeliveryError> {
        let fetch_url = format!("http://{}{}", local_addr, ARCHIVE_ROUTE);
        let manifest_url = manifest_url(
            generator_url,
            artifact.bundle_identifier(),
            artifact.version_string(),
            &fetch_url,
        )?;
        Ok(Self {
            install_page_url: format!("http://{}{}", local_addr, INSTALL_ROUTE),
            itms_url: itms_url(&manifest_url),
            manifest_url,
        })
    }

    /// Minimal page that sends the browser to the `itms-services` URL
    ///
    /// The script gets the URL verbatim: it is percent-encoded past the
    /// query marker and carries no quotes or angle brackets.
    pub fn install_page(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Install</title></head>
<body>
<script type="text/javascript">
    window.location = "{script_url}";
</script>
<p><a href="{itms}">Install</a></p>
<p><small>{manifest}</small></p>
</body>
</html>
"#,
            script_url = self.itms_url,
            itms = html_escape(&self.itms_url),
            manifest = html_escape(&self.manifest_url),
        )
    }
}

/// Manifest generator URL; the bundle id doubles as the display name
///
/// Bundle id and version are percent-encoded. The fetch URL goes in raw and
/// only gets encoded once, as part of the outer `itms-services` URL.
pub fn manifest_url(
    generator_url: &str,
    bundle_identifier: &str,
    version: &str,
    fetch_url: &str,
) -> Result<String, DeliveryError> {
    let mut url = Url::parse(generator_url)
        .map_err(|e| DeliveryError::Server(format!("bad manifest generator URL: {}", e)))?;
    let bundle = urlencoding::encode(bundle_identifier);
    let query = format!(
        "bundleid={bundle}&name={bundle}&version={}&fetchurl={}",
        urlencoding::encode(version),
        fetch_url
    );
    url.set_query(Some(&query));
    Ok(url.into())
}

/// `itms-services` URL for a manifest URL
pub fn itms_url(manifest_url: &str) -> String {
    format!(
        "itms-services://?action=download-manifest&url={}",
        urlencoding::encode(manifest_url)
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

//! In-memory implementations of the service traits for testing

use super::traits::{ConfigProvider, HistoryProvider, InstallLauncher, MarketplaceClient};
use crate::delivery::InstallTrigger;
use crate::resolver::HistoryEntry;
use crate::store::client::device_guid;
use crate::store::types::{AccountInfo, DownloadTicket};
use crate::store::AppId;
use async_trait::async_trait;
use rewind_core::{
    AuthError, CredentialVault, FetchError, ResolutionError, RewindError, RewindResult,
    StoredCredentials,
};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const MOCK_TOKEN: &str = "mock-password-token";

/// Mock configuration provider for testing
///
/// Binds delivery to an ephemeral loopback port.
///
/// # Example
///
/// ```
/// use rewind::di::mocks::MockConfigProvider;
/// use rewind::di::ConfigProvider;
/// use std::path::PathBuf;
///
/// let mut config = MockConfigProvider::default();
/// config.work_dir = PathBuf::from("/tmp/rewind-test-work");
///
/// assert_eq!(config.delivery_addr().port(), 0);
/// ```
#[derive(Clone)]
pub struct MockConfigProvider {
    pub auth_url: String,
    pub download_url: String,
    pub history_url: String,
    pub manifest_generator_url: String,
    pub delivery_addr: SocketAddr,
    pub work_dir: PathBuf,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for MockConfigProvider {
    fn default() -> Self {
        Self {
            auth_url: "http://127.0.0.1:9/auth".to_string(),
            download_url: "http://127.0.0.1:9/download".to_string(),
            history_url: "http://127.0.0.1:9/history".to_string(),
            manifest_generator_url: "https://gen.example.invalid/genPlist".to_string(),
            delivery_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            work_dir: std::env::temp_dir().join("rewind-test-work"),
            request_timeout: Duration::from_secs(5),
            user_agent: "rewind-test".to_string(),
        }
    }
}

impl ConfigProvider for MockConfigProvider {
    fn auth_url(&self) -> &str {
        &self.auth_url
    }

    fn download_url(&self) -> &str {
        &self.download_url
    }

    fn history_url(&self) -> &str {
        &self.history_url
    }

    fn manifest_generator_url(&self) -> &str {
        &self.manifest_generator_url
    }

    fn delivery_addr(&self) -> SocketAddr {
        self.delivery_addr
    }

    fn work_dir(&self) -> RewindResult<PathBuf> {
        Ok(self.work_dir.clone())
    }

    fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

struct MockListing {
    release_ids: Vec<String>,
    current_release_id: String,
    current_version: String,
}

/// Mock marketplace for testing
///
/// Accepts one account. With a second factor configured, the accepted derived
/// secret is the password followed by the code. Package downloads copy a
/// local `.ipa` file.
///
/// # Example
///
/// ```
/// use rewind::di::mocks::MockMarketplace;
///
/// let marketplace = MockMarketplace::new("user@example.com", "pw")
///     .with_second_factor("123456")
///     .with_releases("123456789", &["700", "999"], "999", "2.1.0");
/// marketplace.set_offline(false);
/// assert_eq!(marketplace.code_requests(), 0);
/// ```
pub struct MockMarketplace {
    account_id: String,
    password: String,
    second_factor: Option<String>,
    listings: HashMap<String, MockListing>,
    package: Option<PathBuf>,
    unavailable: Vec<String>,
    offline: AtomicBool,
    code_requests: AtomicUsize,
}

impl MockMarketplace {
    /// Create a mock marketplace accepting one account
    pub fn new(account_id: &str, password: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            password: password.to_string(),
            second_factor: None,
            listings: HashMap::new(),
            package: None,
            unavailable: Vec::new(),
            offline: AtomicBool::new(false),
            code_requests: AtomicUsize::new(0),
        }
    }

    /// Require a second-factor code
    pub fn with_second_factor(mut self, code: &str) -> Self {
        self.second_factor = Some(code.to_string());
        self
    }

    /// Release record for an app, in marketplace order
    pub fn with_releases(
        mut self,
        app_id: &str,
        release_ids: &[&str],
        current_release_id: &str,
        current_version: &str,
    ) -> Self {
        self.listings.insert(
            app_id.to_string(),
            MockListing {
                release_ids: release_ids.iter().map(|s| s.to_string()).collect(),
                current_release_id: current_release_id.to_string(),
                current_version: current_version.to_string(),
            },
        );
        self
    }

    /// Local `.ipa` served for every release
    pub fn with_package(mut self, path: impl AsRef<Path>) -> Self {
        self.package = Some(path.as_ref().to_path_buf());
        self
    }

    /// Mark a release as withdrawn
    pub fn with_unavailable_release(mut self, release_id: &str) -> Self {
        self.unavailable.push(release_id.to_string());
        self
    }

    /// Simulate an unreachable marketplace
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of partial sign-ins made to request a code
    pub fn code_requests(&self) -> usize {
        self.code_requests.load(Ordering::SeqCst)
    }

    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn account(&self) -> AccountInfo {
        AccountInfo {
            account_id: self.account_id.clone(),
            display_name: Some("Test User".to_string()),
            dsid: "1000000001".to_string(),
            password_token: SecretString::from(MOCK_TOKEN.to_string()),
            store_front: Some("143441-1,29".to_string()),
            guid: device_guid(&self.account_id),
        }
    }

    fn metadata(&self, app_id: &AppId) -> plist::Dictionary {
        let mut metadata = plist::Dictionary::new();
        metadata.insert("itemId".to_string(), app_id.as_str().into());
        if let Some(listing) = self.listings.get(app_id.as_str()) {
            metadata.insert(
                "softwareVersionExternalIdentifiers".to_string(),
                plist::Value::Array(
                    listing
                        .release_ids
                        .iter()
                        .map(|id| plist::Value::String(id.clone()))
                        .collect(),
                ),
            );
            metadata.insert(
                "softwareVersionExternalIdentifier".to_string(),
                listing.current_release_id.as_str().into(),
            );
            metadata.insert(
                "bundleShortVersionString".to_string(),
                listing.current_version.as_str().into(),
            );
        }
        metadata
    }
}

#[async_trait]
impl MarketplaceClient for MockMarketplace {
    async fn authenticate(
        &self,
        account_id: &str,
        derived_secret: &SecretString,
        request_code: bool,
    ) -> Result<AccountInfo, AuthError> {
        if self.is_offline() {
            return Err(AuthError::NetworkUnavailable("mock marketplace is offline".to_string()));
        }
        if request_code {
            self.code_requests.fetch_add(1, Ordering::SeqCst);
        }
        if account_id != self.account_id {
            return Err(AuthError::InvalidCredentials);
        }

        let secret = derived_secret.expose_secret();
        let expected = match &self.second_factor {
            Some(code) => format!("{}{}", self.password, code),
            None => self.password.clone(),
        };
        if secret == expected {
            return Ok(self.account());
        }
        if self.second_factor.is_some() && secret == self.password {
            return Err(AuthError::SecondFactorRequired);
        }
        if self.second_factor.is_some() && secret.starts_with(&self.password) {
            return Err(AuthError::MarketplaceRejected(
                "the verification code is incorrect".to_string(),
            ));
        }
        Err(AuthError::InvalidCredentials)
    }

    async fn download_ticket(
        &self,
        account: &AccountInfo,
        app_id: &AppId,
        release_id: Option<&str>,
    ) -> Result<DownloadTicket, FetchError> {
        if self.is_offline() {
            return Err(FetchError::NetworkInterrupted("mock marketplace is offline".to_string()));
        }
        if account.password_token.expose_secret() != MOCK_TOKEN {
            return Err(FetchError::NotAuthenticated);
        }

        let unavailable = |reason: &str| FetchError::ReleaseUnavailable {
            app_id: app_id.to_string(),
            release_id: release_id.unwrap_or("current").to_string(),
            reason: reason.to_string(),
        };
        if let Some(release) = release_id {
            if self.unavailable.iter().any(|r| r == release) {
                return Err(unavailable("release has been withdrawn"));
            }
        }
        let url = match (&self.package, release_id) {
            (Some(path), _) => path.to_string_lossy().to_string(),
            (None, None) => String::new(),
            (None, Some(_)) => return Err(unavailable("no package configured")),
        };

        Ok(DownloadTicket {
            url,
            sinfs: vec![b"mock-sinf".to_vec()],
            metadata: self.metadata(app_id),
        })
    }

    async fn download_package(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        if self.is_offline() {
            return Err(FetchError::NetworkInterrupted("mock marketplace is offline".to_string()));
        }
        fs::copy(url, dest)
            .map(|_| ())
            .map_err(|e| FetchError::Storage(format!("mock download of {} failed: {}", url, e)))
    }
}

/// Mock release history service for testing
///
/// Apps without a configured history answer with an empty list.
pub struct MockHistoryProvider {
    histories: Mutex<HashMap<String, Vec<HistoryEntry>>>,
    offline: AtomicBool,
}

impl MockHistoryProvider {
    pub fn new() -> Self {
        Self {
            histories: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Set the `(external_identifier, bundle_version)` list for an app
    pub fn set_history(&self, app_id: &str, entries: Vec<(&str, &str)>) {
        let entries = entries
            .into_iter()
            .map(|(id, version)| HistoryEntry {
                external_identifier: id.to_string(),
                bundle_version: version.to_string(),
            })
            .collect();
        self.histories
            .lock()
            .unwrap()
            .insert(app_id.to_string(), entries);
    }

    /// Simulate an unreachable history service
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl Default for MockHistoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryProvider for MockHistoryProvider {
    async fn fetch_history(&self, app_id: &AppId) -> Result<Vec<HistoryEntry>, ResolutionError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ResolutionError::NetworkUnavailable(
                "mock history service is offline".to_string(),
            ));
        }
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(app_id.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

struct VaultState {
    record: Option<(StoredCredentials, usize)>,
    generation: usize,
    corrupt: bool,
}

/// In-memory credential vault for testing
///
/// Tracks key generations: a record saved under an older key no longer loads.
pub struct MemoryVault {
    state: Mutex<VaultState>,
}

impl MemoryVault {
    /// Empty vault without a key
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VaultState {
                record: None,
                generation: 0,
                corrupt: false,
            }),
        }
    }

    /// Vault holding credentials under its first key
    pub fn with_credentials(credentials: StoredCredentials) -> Self {
        Self {
            state: Mutex::new(VaultState {
                record: Some((credentials, 1)),
                generation: 1,
                corrupt: false,
            }),
        }
    }

    /// Make the stored record unreadable
    pub fn corrupt(&self) {
        self.state.lock().unwrap().corrupt = true;
    }

    /// How many keys have been generated
    pub fn key_generation(&self) -> usize {
        self.state.lock().unwrap().generation
    }
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialVault for MemoryVault {
    fn generate_key(&self) -> RewindResult<()> {
        self.state.lock().unwrap().generation += 1;
        Ok(())
    }

    fn has_credentials(&self) -> bool {
        self.state.lock().unwrap().record.is_some()
    }

    fn load(&self) -> RewindResult<Option<StoredCredentials>> {
        let state = self.state.lock().unwrap();
        match &state.record {
            None => Ok(None),
            Some(_) if state.corrupt => {
                Err(RewindError::Vault("Stored credentials are unreadable".to_string()))
            }
            Some((_, generation)) if *generation != state.generation => Err(RewindError::Vault(
                "Stored credentials were written under a different vault key".to_string(),
            )),
            Some((credentials, _)) => Ok(Some(credentials.clone())),
        }
    }

    fn save(&self, credentials: &StoredCredentials) -> RewindResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.generation == 0 {
            state.generation = 1;
        }
        state.record = Some((credentials.clone(), state.generation));
        state.corrupt = false;
        Ok(())
    }

    fn wipe(&self) -> RewindResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record = None;
        state.corrupt = false;
        Ok(())
    }
}

/// Launcher that records triggers instead of opening anything
pub struct RecordingLauncher {
    launched: Mutex<Vec<InstallTrigger>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self {
            launched: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// Launcher whose every launch fails (after recording it)
    pub fn failing() -> Self {
        Self {
            launched: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn launches(&self) -> Vec<InstallTrigger> {
        self.launched.lock().unwrap().clone()
    }
}

impl Default for RecordingLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallLauncher for RecordingLauncher {
    fn launch(&self, trigger: &InstallTrigger) -> RewindResult<()> {
        self.launched.lock().unwrap().push(trigger.clone());
        if self.fail {
            return Err(RewindError::Launch("no URL opener in tests".to_string()));
        }
        Ok(())
    }
}

/// Write a minimal `.ipa`: `Payload/Demo.app` with an `Info.plist` and an
/// executable named `Demo`, plus `iTunesArtwork` at the root.
pub fn build_test_ipa(path: &Path, bundle_identifier: &str, version: &str) -> RewindResult<()> {
    use zip::write::{FileOptions, ZipWriter};

    let mut info = plist::Dictionary::new();
    info.insert("CFBundleIdentifier".to_string(), bundle_identifier.into());
    info.insert("CFBundleShortVersionString".to_string(), version.into());
    info.insert("CFBundleExecutable".to_string(), "Demo".into());
    let mut info_bytes = Vec::new();
    plist::Value::Dictionary(info)
        .to_writer_xml(&mut info_bytes)
        .map_err(|e| RewindError::Input(e.to_string()))?;

    let zip_error = |e: zip::result::ZipError| RewindError::Input(e.to_string());
    let mut zip = ZipWriter::new(File::create(path)?);
    zip.add_directory("Payload/", FileOptions::default())
        .map_err(zip_error)?;
    zip.add_directory("Payload/Demo.app/", FileOptions::default())
        .map_err(zip_error)?;
    zip.start_file("Payload/Demo.app/Info.plist", FileOptions::default())
        .map_err(zip_error)?;
    zip.write_all(&info_bytes)?;
    zip.start_file("Payload/Demo.app/Demo", FileOptions::default())
        .map_err(zip_error)?;
    zip.write_all(b"\xCF\xFA\xED\xFEdemo executable")?;
    zip.start_file("iTunesArtwork", FileOptions::default())
        .map_err(zip_error)?;
    zip.write_all(b"artwork")?;
    zip.finish().map_err(zip_error)?;
    Ok(())
}

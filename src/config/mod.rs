use crate::di::ConfigProvider;
use rewind_core::path::{config_file, default_work_dir, ensure_dir};
use rewind_core::{RewindError, RewindResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Marketplace sign-in endpoint
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Marketplace endpoint that hands out download tickets
    #[serde(default = "default_download_url")]
    pub download_url: String,

    /// Base URL of the public release history service; `/<appId>` is appended
    #[serde(default = "default_history_url")]
    pub history_url: String,

    /// Service that turns bundle id, version and fetch URL into an install manifest
    #[serde(default = "default_manifest_generator_url")]
    pub manifest_generator_url: String,

    /// Address the delivery server binds to. Only loopback makes sense here.
    #[serde(default = "default_delivery_host")]
    pub delivery_host: IpAddr,

    /// Fixed delivery port. There is no fallback port: a taken port aborts the downgrade.
    #[serde(default = "default_delivery_port")]
    pub delivery_port: u16,

    /// Scratch directory for downloads and built archives
    ///
    /// Defaults to `<cache dir>/work`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,

    /// Timeout for marketplace and history requests (package downloads are exempt)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// User agent presented to the marketplace
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_auth_url() -> String {
    "https://p46-buy.itunes.apple.com/WebObjects/MZFinance.woa/wa/authenticate".to_string()
}

fn default_download_url() -> String {
    "https://p25-buy.itunes.apple.com/WebObjects/MZFinance.woa/wa/volumeStoreDownloadProduct"
        .to_string()
}

fn default_history_url() -> String {
    "https://apis.bilin.eu.org/history".to_string()
}

fn default_manifest_generator_url() -> String {
    "https://api.palera.in/genPlist".to_string()
}

fn default_delivery_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_delivery_port() -> u16 {
    9090
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Configurator/2.15 (Macintosh; OS X 11.0.0; 16G29) AppleWebKit/2603.3.8".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            download_url: default_download_url(),
            history_url: default_history_url(),
            manifest_generator_url: default_manifest_generator_url(),
            delivery_host: default_delivery_host(),
            delivery_port: default_delivery_port(),
            work_dir: None,
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Load config from the Rewind home directory, creating a default one if it doesn't exist
    ///
    /// Config locations (`$REWIND_HOME/config.yaml` when set):
    /// - Windows: %APPDATA%\rewind\config.yaml
    /// - Linux: ~/.config/rewind/config.yaml
    /// - macOS: ~/Library/Application Support/rewind/config.yaml
    pub fn load() -> RewindResult<Self> {
        let config_path = config_file()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&config_path)?;
        let config = Self::from_yaml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the Rewind home directory
    pub fn save(&self) -> RewindResult<()> {
        let config_path = config_file()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| RewindError::Path("Invalid config path".to_string()))?;

        ensure_dir(config_dir)?;

        let content = serde_yaml::to_string(self)
            .map_err(|e| RewindError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn from_yaml(content: &str) -> RewindResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| RewindError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Reject settings that would expose the delivery server or break URLs
    pub fn validate(&self) -> RewindResult<()> {
        if !self.delivery_host.is_loopback() {
            return Err(RewindError::Config(format!(
                "delivery_host must be a loopback address, got {}",
                self.delivery_host
            )));
        }
        for (name, value) in [
            ("auth_url", &self.auth_url),
            ("download_url", &self.download_url),
            ("history_url", &self.history_url),
            ("manifest_generator_url", &self.manifest_generator_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| RewindError::Config(format!("{} is not a URL: {}", name, e)))?;
        }
        Ok(())
    }

    /// Get the work directory path
    pub fn get_work_dir(&self) -> RewindResult<PathBuf> {
        if let Some(ref dir) = self.work_dir {
            Ok(PathBuf::from(dir))
        } else {
            default_work_dir()
        }
    }
}

// Implement ConfigProvider trait
impl ConfigProvider for Config {
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
        SocketAddr::new(self.delivery_host, self.delivery_port)
    }

    fn work_dir(&self) -> RewindResult<PathBuf> {
        self.get_work_dir()
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

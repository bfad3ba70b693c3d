//! Short-lived local HTTP server for one downgrade
//!
//! Lifecycle: `Idle -> Starting -> Running -> Stopping -> Stopped`. A server
//! is started once with one artifact. There is no idle timeout and no
//! graceful drain; stopping aborts in-flight responses.

use crate::delivery::manifest::{InstallTrigger, ARCHIVE_ROUTE, INSTALL_ROUTE};
use crate::package::InstallableArtifact;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rewind_core::DeliveryError;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Delivery server lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// What the handlers serve; read-only once bound
struct Binding {
    archive_path: PathBuf,
    trigger: InstallTrigger,
}

type SharedBinding = Arc<RwLock<Option<Arc<Binding>>>>;

fn current(binding: &SharedBinding) -> Option<Arc<Binding>> {
    binding.read().ok().and_then(|guard| guard.clone())
}

fn set_binding(binding: &SharedBinding, value: Option<Arc<Binding>>) {
    match binding.write() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

/// Local delivery server
pub struct DeliveryServer {
    addr: SocketAddr,
    manifest_generator_url: String,
    state: ServerState,
    binding: SharedBinding,
    artifact: Option<InstallableArtifact>,
    trigger: Option<InstallTrigger>,
    local_addr: Option<SocketAddr>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DeliveryServer {
    pub fn new(addr: SocketAddr, manifest_generator_url: impl Into<String>) -> Self {
        Self {
            addr,
            manifest_generator_url: manifest_generator_url.into(),
            state: ServerState::Idle,
            binding: Arc::new(RwLock::new(None)),
            artifact: None,
            trigger: None,
            local_addr: None,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Address actually bound, once running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Install trigger for the bound artifact, once running
    pub fn trigger(&self) -> Option<&InstallTrigger> {
        self.trigger.as_ref()
    }

    /// Bind the port and start serving `artifact`.
    ///
    /// The artifact stays with the server even when starting fails; take it
    /// back with [`DeliveryServer::release_artifact`].
    pub async fn start(
        &mut self,
        artifact: InstallableArtifact,
    ) -> Result<InstallTrigger, DeliveryError> {
        if self.state != ServerState::Idle {
            return Err(DeliveryError::InvalidState(format!(
                "cannot start a server that is {:?}",
                self.state
            )));
        }
        self.state = ServerState::Starting;
        let archive_path = artifact.archive_path().to_path_buf();
        self.artifact = Some(artifact);

        match self.bind_and_serve(archive_path).await {
            Ok(trigger) => {
                self.state = ServerState::Running;
                self.trigger = Some(trigger.clone());
                Ok(trigger)
            }
            Err(e) => {
                self.state = ServerState::Stopped;
                Err(e)
            }
        }
    }

    async fn bind_and_serve(&mut self, archive_path: PathBuf) -> Result<InstallTrigger, DeliveryError> {
        // Only a complete, closed archive may be served
        let metadata = tokio::fs::metadata(&archive_path)
            .await
            .map_err(|e| DeliveryError::PartialWrite(format!("{}: {}", archive_path.display(), e)))?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(DeliveryError::PartialWrite(format!(
                "{} is empty or not a file",
                archive_path.display()
            )));
        }

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| DeliveryError::PortBindFailure {
                addr: self.addr.to_string(),
                reason: e.to_string(),
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DeliveryError::Server(e.to_string()))?;

        let artifact = self
            .artifact
            .as_ref()
            .ok_or_else(|| DeliveryError::InvalidState("no artifact to serve".to_string()))?;
        let trigger = InstallTrigger::new(&self.manifest_generator_url, artifact, local_addr)?;

        set_binding(
            &self.binding,
            Some(Arc::new(Binding {
                archive_path,
                trigger: trigger.clone(),
            })),
        );

        let app = Router::new()
            .route(ARCHIVE_ROUTE, get(serve_archive))
            .route(INSTALL_ROUTE, get(serve_install_page))
            .with_state(Arc::clone(&self.binding));

        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!("delivery server cancelled"),
                result = axum::serve(listener, app).into_future() => {
                    if let Err(e) = result {
                        error!(error = %e, "delivery server failed");
                    }
                }
            }
        }));
        self.local_addr = Some(local_addr);

        info!(addr = %local_addr, "delivery server listening");
        Ok(trigger)
    }

    /// Stop serving; in-flight responses are aborted
    pub fn stop(&mut self) {
        match self.state {
            ServerState::Stopped => return,
            ServerState::Idle => {
                self.state = ServerState::Stopped;
                return;
            }
            _ => {}
        }
        self.state = ServerState::Stopping;
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        set_binding(&self.binding, None);
        self.state = ServerState::Stopped;
        info!("delivery server stopped");
    }

    /// Unbind and hand back the artifact; later requests get 503
    pub fn release_artifact(&mut self) -> Option<InstallableArtifact> {
        set_binding(&self.binding, None);
        self.artifact.take()
    }
}

impl Drop for DeliveryServer {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "no artifact is being served").into_response()
}

async fn serve_archive(State(binding): State<SharedBinding>) -> Response {
    let Some(binding) = current(&binding) else {
        warn!("archive requested with nothing bound");
        return unavailable();
    };

    let file = match tokio::fs::File::open(&binding.archive_path).await {
        Ok(file) => file,
        Err(e) => {
            error!(path = %binding.archive_path.display(), error = %e, "cannot open archive");
            return (StatusCode::INTERNAL_SERVER_ERROR, "archive unavailable").into_response();
        }
    };
    let len = match file.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            error!(error = %e, "cannot stat archive");
            return (StatusCode::INTERNAL_SERVER_ERROR, "archive unavailable").into_response();
        }
    };

    info!(bytes = len, "serving archive");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

async fn serve_install_page(State(binding): State<SharedBinding>) -> Response {
    match current(&binding) {
        Some(binding) => {
            info!("serving install page");
            Html(binding.trigger.install_page()).into_response()
        }
        None => unavailable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{ArtifactPackager, RawPackage};
    use std::fs;
    use std::net::{Ipv4Addr, TcpListener as StdTcpListener};
    use tempfile::TempDir;

    const GENERATOR: &str = "https://api.palera.in/genPlist";

    fn any_port() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
    }

    fn artifact(temp: &TempDir) -> InstallableArtifact {
        let root = temp.path().join("123456789_999");
        let bundle = root.join("Payload").join("Demo.app");
        fs::create_dir_all(&bundle).unwrap();
        let mut dict = plist::Dictionary::new();
        dict.insert("CFBundleIdentifier".into(), "com.example.app".into());
        dict.insert("CFBundleShortVersionString".into(), "2.1.0".into());
        plist::Value::Dictionary(dict)
            .to_file_xml(bundle.join("Info.plist"))
            .unwrap();
        fs::write(bundle.join("Demo"), vec![0xAB; 64 * 1024]).unwrap();
        ArtifactPackager::new(temp.path().join("out"))
            .package(RawPackage::from_dir(root))
            .unwrap()
    }

    #[tokio::test]
    async fn test_serves_archive_bytes() {
        let temp = TempDir::new().unwrap();
        let artifact = artifact(&temp);
        let expected = fs::read(artifact.archive_path()).unwrap();

        let mut server = DeliveryServer::new(any_port(), GENERATOR);
        assert_eq!(server.state(), ServerState::Idle);
        server.start(artifact).await.unwrap();
        assert_eq!(server.state(), ServerState::Running);

        let addr = server.local_addr().unwrap();
        let response = reqwest::get(format!("http://{}/signed.ipa", addr)).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()["content-type"],
            "application/octet-stream"
        );
        let body = response.bytes().await.unwrap();
        assert_eq!(body.as_ref(), expected.as_slice());

        server.stop();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_install_page_embeds_manifest() {
        let temp = TempDir::new().unwrap();
        let mut server = DeliveryServer::new(any_port(), GENERATOR);
        let trigger = server.start(artifact(&temp)).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_eq!(trigger.install_page_url, format!("http://{}/install", addr));

        let response = reqwest::get(format!("http://{}/install", addr)).await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        let page = response.text().await.unwrap();

        let start = page.find("itms-services://").unwrap();
        let end = start + page[start..].find('"').unwrap();
        let itms = &page[start..end];
        let encoded = itms.split("&url=").nth(1).unwrap();
        let manifest = urlencoding::decode(encoded).unwrap();
        assert!(manifest.contains("bundleid=com.example.app"));
        assert!(manifest.contains("version=2.1.0"));
        assert!(manifest.contains(&format!("fetchurl=http://{}/signed.ipa", addr)));
        server.stop();
    }

    #[tokio::test]
    async fn test_port_in_use() {
        let temp = TempDir::new().unwrap();
        let occupied = StdTcpListener::bind(any_port()).unwrap();
        let addr = occupied.local_addr().unwrap();

        let mut server = DeliveryServer::new(addr, GENERATOR);
        let result = server.start(artifact(&temp)).await;

        assert!(matches!(result, Err(DeliveryError::PortBindFailure { .. })));
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().is_none());
        assert!(server.trigger().is_none());
        assert!(server.release_artifact().is_some());
    }

    #[tokio::test]
    async fn test_unbound_artifact_is_server_error() {
        let temp = TempDir::new().unwrap();
        let mut server = DeliveryServer::new(any_port(), GENERATOR);
        server.start(artifact(&temp)).await.unwrap();
        let addr = server.local_addr().unwrap();

        let released = server.release_artifact().unwrap();
        assert!(released.archive_path().exists());

        let archive = reqwest::get(format!("http://{}/signed.ipa", addr)).await.unwrap();
        assert!(archive.status().is_server_error());
        let page = reqwest::get(format!("http://{}/install", addr)).await.unwrap();
        assert!(page.status().is_server_error());
        server.stop();
    }

    #[tokio::test]
    async fn test_cannot_start_twice() {
        let temp = TempDir::new().unwrap();
        let mut server = DeliveryServer::new(any_port(), GENERATOR);
        server.start(artifact(&temp)).await.unwrap();

        let other = TempDir::new().unwrap();
        let result = server.start(artifact(&other)).await;
        assert!(matches!(result, Err(DeliveryError::InvalidState(_))));
        assert_eq!(server.state(), ServerState::Running);
        server.stop();
    }

    #[tokio::test]
    async fn test_stop_closes_port() {
        let temp = TempDir::new().unwrap();
        let mut server = DeliveryServer::new(any_port(), GENERATOR);
        server.start(artifact(&temp)).await.unwrap();
        let addr = server.local_addr().unwrap();

        server.stop();
        // Give the runtime a moment to drop the aborted listener
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(reqwest::get(format!("http://{}/install", addr)).await.is_err());
    }

    #[test]
    fn test_stop_before_start() {
        let mut server = DeliveryServer::new(any_port(), GENERATOR);
        server.stop();
        assert_eq!(server.state(), ServerState::Stopped);
    }
}

//! End-to-end downgrade state machine
//!
//! ```text
//! AwaitingInput -> ResolvingVersions -> AwaitingSelection -> Fetching
//!   -> Packaging -> Serving -> AwaitingInstallConfirmation -> Done
//! ```
//!
//! Every non-terminal state can move to `Failed`. The front end drives the
//! machine with method calls and watches it through [`DowngradeOrchestrator::subscribe`];
//! nothing flows the other way.

pub mod state;

pub use state::{DowngradeState, FailureReason};

use crate::delivery::{DeliveryServer, InstallTrigger};
use crate::di::{InstallLauncher, ServiceContainer};
use crate::package::{ArtifactPackager, InstallableArtifact, PackageFetcher};
use crate::resolver::{Resolution, ResolutionStrategy, VersionResolver};
use crate::store::{AppId, StoreSession};
use rewind_core::{RewindError, RewindResult};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Drives one downgrade at a time
pub struct DowngradeOrchestrator {
    session: StoreSession,
    resolver: VersionResolver,
    fetcher: PackageFetcher,
    artifacts_dir: PathBuf,
    delivery_addr: SocketAddr,
    manifest_generator_url: String,
    launcher: Arc<dyn InstallLauncher>,
    server: Option<DeliveryServer>,
    state: watch::Sender<DowngradeState>,
}

impl DowngradeOrchestrator {
    /// Wire an orchestrator from the container's services
    pub fn new(container: &ServiceContainer, session: StoreSession) -> RewindResult<Self> {
        let config = container.config();
        let work_dir = config.work_dir()?;
        let (state, _) = watch::channel(DowngradeState::AwaitingInput);

        Ok(Self {
            session,
            resolver: VersionResolver::new(Arc::clone(&container.history)),
            fetcher: PackageFetcher::new(work_dir.join("packages")),
            artifacts_dir: work_dir.join("artifacts"),
            delivery_addr: config.delivery_addr(),
            manifest_generator_url: config.manifest_generator_url().to_string(),
            launcher: Arc::clone(&container.launcher),
            server: None,
            state,
        })
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<DowngradeState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> DowngradeState {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> &StoreSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut StoreSession {
        &mut self.session
    }

    fn transition(&self, next: DowngradeState) {
        info!(from = self.state.borrow().name(), to = next.name(), "downgrade state");
        self.state.send_replace(next);
    }

    fn fail(&mut self, reason: FailureReason) -> RewindError {
        warn!(%reason, "downgrade failed");
        self.shutdown_server();
        self.transition(DowngradeState::Failed(reason.clone()));
        reason.into()
    }

    fn invalid(&self, action: &str) -> RewindError {
        RewindError::Input(format!(
            "cannot {} while {}",
            action,
            self.state.borrow().name()
        ))
    }

    /// Take a share link or app id and resolve candidates.
    ///
    /// An empty result returns to `AwaitingInput` so the caller can offer
    /// `strategy.other()`. A link that does not parse leaves the state alone.
    pub async fn submit(
        &mut self,
        input: &str,
        strategy: ResolutionStrategy,
    ) -> RewindResult<Resolution> {
        if self.state() != DowngradeState::AwaitingInput {
            return Err(self.invalid("submit an app"));
        }
        let app_id = AppId::parse(input)?;

        self.transition(DowngradeState::ResolvingVersions {
            app_id: app_id.clone(),
            strategy,
        });
        match self.resolver.resolve(strategy, &app_id, &self.session).await {
            Ok(Resolution::Candidates(candidates)) => {
                self.transition(DowngradeState::AwaitingSelection {
                    app_id,
                    candidates: candidates.clone(),
                });
                Ok(Resolution::Candidates(candidates))
            }
            Ok(Resolution::NoHistoryAvailable) => {
                info!(app = %app_id, other = %strategy.other(), "nothing found, other strategy available");
                self.transition(DowngradeState::AwaitingInput);
                Ok(Resolution::NoHistoryAvailable)
            }
            Err(e) => Err(self.fail(FailureReason::Resolution(e))),
        }
    }

    /// Pick a release: fetch, package, serve and trigger the install
    pub async fn select(&mut self, release_id: &str) -> RewindResult<InstallTrigger> {
        let (app_id, candidates) = match self.state() {
            DowngradeState::AwaitingSelection { app_id, candidates } => (app_id, candidates),
            _ => return Err(self.invalid("select a release")),
        };
        if !candidates.iter().any(|c| c.release_id == release_id) {
            warn!(release = %release_id, "release is not among the resolved candidates");
        }

        self.transition(DowngradeState::Fetching {
            app_id: app_id.clone(),
            release_id: release_id.to_string(),
        });
        let raw = match self.fetcher.fetch(&self.session, &app_id, release_id).await {
            Ok(raw) => raw,
            Err(e) => return Err(self.fail(FailureReason::Fetch(e))),
        };

        self.transition(DowngradeState::Packaging {
            app_id,
            release_id: release_id.to_string(),
        });
        let packager = ArtifactPackager::new(self.artifacts_dir.clone());
        let artifact = match tokio::task::spawn_blocking(move || packager.package(raw)).await {
            Ok(Ok(artifact)) => artifact,
            Ok(Err(e)) => return Err(self.fail(FailureReason::Packaging(e))),
            Err(e) => {
                return Err(self.fail(FailureReason::Internal(format!(
                    "packaging task failed: {}",
                    e
                ))))
            }
        };

        self.transition(DowngradeState::Serving);
        self.serve(artifact).await
    }

    async fn serve(&mut self, artifact: InstallableArtifact) -> RewindResult<InstallTrigger> {
        let mut server = DeliveryServer::new(self.delivery_addr, self.manifest_generator_url.clone());
        let started = server.start(artifact).await;
        self.server = Some(server);
        let trigger = match started {
            Ok(trigger) => trigger,
            Err(e) => return Err(self.fail(FailureReason::Delivery(e))),
        };

        // Not fatal: the caller also shows the page URL
        if let Err(e) = self.launcher.launch(&trigger) {
            warn!(error = %e, url = %trigger.install_page_url, "could not hand install page to the platform");
        }

        self.transition(DowngradeState::AwaitingInstallConfirmation {
            trigger: trigger.clone(),
        });
        Ok(trigger)
    }

    /// The user confirmed the install finished
    pub fn finish(&mut self) -> RewindResult<()> {
        if !matches!(self.state(), DowngradeState::AwaitingInstallConfirmation { .. }) {
            return Err(self.invalid("finish"));
        }
        self.shutdown_server();
        self.transition(DowngradeState::Done);
        Ok(())
    }

    /// Cancel whatever is in progress
    pub fn abort(&mut self) -> RewindResult<()> {
        if self.state().is_terminal() {
            return Err(self.invalid("abort"));
        }
        self.fail(FailureReason::Cancelled);
        Ok(())
    }

    /// Start over after `Done` or `Failed`
    pub fn reset(&mut self) -> RewindResult<()> {
        if !self.state().is_terminal() {
            return Err(self.invalid("reset"));
        }
        self.transition(DowngradeState::AwaitingInput);
        Ok(())
    }

    fn shutdown_server(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.stop();
            if let Some(artifact) = server.release_artifact() {
                let path = artifact.archive_path().to_path_buf();
                if let Err(e) = artifact.remove() {
                    warn!(path = %path.display(), error = %e, "could not remove served archive");
                }
            }
        }
    }
}

impl Drop for DowngradeOrchestrator {
    fn drop(&mut self) {
        self.shutdown_server();
    }
}

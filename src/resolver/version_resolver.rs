//! Candidate release lookup
//!
//! Two independent strategies, picked by the caller. Results keep the order of
//! their source and are never merged or deduplicated across strategies.

use crate::di::HistoryProvider;
use crate::resolver::types::{ReleaseCandidate, ReleaseSource, Resolution, ResolutionStrategy};
use crate::store::types::ReleaseListing;
use crate::store::{AppId, StoreSession};
use rewind_core::ResolutionError;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves candidate releases for an app
pub struct VersionResolver {
    history: Arc<dyn HistoryProvider>,
}

impl VersionResolver {
    pub fn new(history: Arc<dyn HistoryProvider>) -> Self {
        Self { history }
    }

    /// Resolve with the given strategy
    pub async fn resolve(
        &self,
        strategy: ResolutionStrategy,
        app_id: &AppId,
        session: &StoreSession,
    ) -> Result<Resolution, ResolutionError> {
        let resolution = match strategy {
            ResolutionStrategy::Device => self.from_device(app_id, session).await?,
            ResolutionStrategy::RemoteHistory => self.from_history(app_id).await?,
        };
        match &resolution {
            Resolution::Candidates(candidates) => {
                info!(app = %app_id, %strategy, count = candidates.len(), "resolved releases")
            }
            Resolution::NoHistoryAvailable => {
                info!(app = %app_id, %strategy, "no releases available")
            }
        }
        Ok(resolution)
    }

    /// The marketplace's own release list; needs a signed-in session
    pub async fn from_device(
        &self,
        app_id: &AppId,
        session: &StoreSession,
    ) -> Result<Resolution, ResolutionError> {
        if !session.is_authenticated() {
            return Err(ResolutionError::NotAuthenticated);
        }
        let listing = session.release_listing(app_id).await?;
        Ok(Resolution::from_candidates(device_candidates(listing)))
    }

    /// The public history service's list; works signed out
    pub async fn from_history(&self, app_id: &AppId) -> Result<Resolution, ResolutionError> {
        let entries = self.history.fetch_history(app_id).await?;
        debug!(app = %app_id, entries = entries.len(), "history service answered");
        let candidates = entries
            .into_iter()
            .map(|entry| ReleaseCandidate {
                release_id: entry.external_identifier,
                display_version: entry.bundle_version,
                source: ReleaseSource::RemoteHistory,
            })
            .collect();
        Ok(Resolution::from_candidates(candidates))
    }
}

/// Only the current release carries a version string in the marketplace record;
/// the rest are labelled with their id.
fn device_candidates(listing: ReleaseListing) -> Vec<ReleaseCandidate> {
    let ReleaseListing {
        release_ids,
        current_release_id,
        current_version,
    } = listing;

    release_ids
        .into_iter()
        .map(|release_id| {
            let display_version = match (&current_release_id, &current_version) {
                (Some(current), Some(version)) if *current == release_id => version.clone(),
                _ => release_id.clone(),
            };
            ReleaseCandidate {
                release_id,
                display_version,
                source: ReleaseSource::Device,
            }
        })
        .collect()
}

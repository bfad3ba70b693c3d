pub mod config;
pub mod downgrade;
pub mod input;
pub mod login;
pub mod logout;
pub mod status;
pub mod versions;

use rewind::di::ServiceContainer;
use rewind::store::{restore_session, RestoreOutcome, StoreSession};
use rewind::{AuthError, FetchError, RewindError, RewindResult};
use std::sync::Arc;

/// Restore the stored session, failing unless it is usable
pub async fn signed_in_session(container: &ServiceContainer) -> RewindResult<StoreSession> {
    let mut session = StoreSession::new(Arc::clone(&container.marketplace));
    match restore_session(container.vault(), &mut session).await? {
        RestoreOutcome::Restored(_) => Ok(session),
        RestoreOutcome::NoCredentials => Err(RewindError::Fetch(FetchError::NotAuthenticated)),
        RestoreOutcome::Reset { reason } => {
            Err(RewindError::Auth(AuthError::MarketplaceRejected(reason)))
        }
        RestoreOutcome::Offline { reason } => {
            Err(RewindError::Auth(AuthError::NetworkUnavailable(reason)))
        }
    }
}


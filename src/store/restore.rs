//! Startup session restore and sign-out
//!
//! Stored credentials are retried once at startup. When the marketplace
//! rejects them the vault is wiped and re-keyed; when the marketplace simply
//! cannot be reached they are kept for the next run.

use crate::store::session::{Authenticated, StoreSession};
use rewind_core::{AuthError, CredentialVault, RewindResult};
use tracing::{info, warn};

/// What happened to the stored credentials at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing was stored; a fresh vault key is in place
    NoCredentials,
    Restored(Authenticated),
    /// Stored credentials were rejected or unreadable; the vault was reset
    Reset { reason: String },
    /// The marketplace was unreachable; credentials were kept
    Offline { reason: String },
}

/// Restore a session from the vault
pub async fn restore_session(
    vault: &dyn CredentialVault,
    session: &mut StoreSession,
) -> RewindResult<RestoreOutcome> {
    let credentials = match vault.load() {
        Ok(Some(credentials)) => credentials,
        Ok(None) => {
            vault.generate_key()?;
            return Ok(RestoreOutcome::NoCredentials);
        }
        Err(e) => {
            warn!(error = %e, "stored credentials are unreadable, resetting vault");
            reset_vault(vault)?;
            return Ok(RestoreOutcome::Reset {
                reason: e.to_string(),
            });
        }
    };

    match session.reauthenticate(&credentials).await {
        Ok(authenticated) => {
            info!(account = %authenticated.account_id, "restored session");
            Ok(RestoreOutcome::Restored(authenticated))
        }
        Err(AuthError::NetworkUnavailable(reason)) => {
            warn!(%reason, "marketplace unreachable, keeping stored credentials");
            Ok(RestoreOutcome::Offline { reason })
        }
        Err(e) => {
            warn!(error = %e, "stored credentials were rejected, resetting vault");
            session.sign_out();
            reset_vault(vault)?;
            Ok(RestoreOutcome::Reset {
                reason: e.to_string(),
            })
        }
    }
}

/// Sign out and destroy the stored credentials
pub fn forget_account(vault: &dyn CredentialVault, session: &mut StoreSession) -> RewindResult<()> {
    session.sign_out();
    reset_vault(vault)
}

fn reset_vault(vault: &dyn CredentialVault) -> RewindResult<()> {
    vault.wipe()?;
    vault.generate_key()
}

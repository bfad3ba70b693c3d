//! Authentication state against the marketplace
//!
//! `StoreSession` is the only owner of the signed-in account. The resolver and
//! the fetcher borrow it for authenticated calls and get `NotAuthenticated`
//! back when there is no signed-in account.

use crate::di::MarketplaceClient;
use crate::store::types::{AccountInfo, DownloadTicket, ReleaseListing};
use crate::store::AppId;
use rewind_core::{AuthError, FetchError, ResolutionError, StoredCredentials};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Proof of a successful round-trip with the marketplace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub account_id: String,
    pub display_name: Option<String>,
}

/// Result of [`StoreSession::sign_in`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    /// A second-factor code was pushed to the account's devices; call
    /// `sign_in` again with the code
    ChallengeIssued,
    Authenticated(Authenticated),
}

struct Session {
    account_id: String,
    derived_secret: SecretString,
    account: Option<AccountInfo>,
}

/// Marketplace session
pub struct StoreSession {
    marketplace: Arc<dyn MarketplaceClient>,
    session: Option<Session>,
}

/// Password with the second-factor code appended, as the marketplace expects
fn derive_secret(secret: &SecretString, second_factor: Option<&str>) -> SecretString {
    match second_factor.map(str::trim).filter(|code| !code.is_empty()) {
        Some(code) => SecretString::from(format!("{}{}", secret.expose_secret(), code)),
        None => copy_secret(secret),
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

impl StoreSession {
    pub fn new(marketplace: Arc<dyn MarketplaceClient>) -> Self {
        Self {
            marketplace,
            session: None,
        }
    }

    /// Sign in.
    ///
    /// Without `second_factor` this is the partial attempt that makes the
    /// marketplace push a code to the account's devices. It never
    /// authenticates: a second-factor demand or even an outright success both
    /// come back as [`SignInOutcome::ChallengeIssued`].
    ///
    /// Answers that no code could change still come back as errors from the
    /// partial attempt, and callers stop there instead of prompting for a code:
    /// - wrong password: [`AuthError::InvalidCredentials`]
    /// - locked or disabled account: [`AuthError::MarketplaceRejected`]
    /// - unreachable marketplace: [`AuthError::NetworkUnavailable`]
    pub async fn sign_in(
        &mut self,
        account_id: &str,
        secret: &SecretString,
        second_factor: Option<&str>,
    ) -> Result<SignInOutcome, AuthError> {
        let account_id = account_id.trim();
        if account_id.is_empty() || secret.expose_secret().is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let derived_secret = derive_secret(secret, second_factor);
        let requesting_code = second_factor.map_or(true, |code| code.trim().is_empty());

        if requesting_code {
            let result = self
                .marketplace
                .authenticate(account_id, &derived_secret, true)
                .await;
            self.session = Some(Session {
                account_id: account_id.to_string(),
                derived_secret,
                account: None,
            });
            return match result {
                Ok(_) | Err(AuthError::SecondFactorRequired) => {
                    info!(account = %account_id, "second-factor code requested");
                    Ok(SignInOutcome::ChallengeIssued)
                }
                Err(e) => Err(e),
            };
        }

        self.authenticate(account_id, derived_secret)
            .await
            .map(SignInOutcome::Authenticated)
    }

    /// Sign in again from stored credentials; the stored secret is already derived
    pub async fn reauthenticate(
        &mut self,
        credentials: &StoredCredentials,
    ) -> Result<Authenticated, AuthError> {
        self.authenticate(&credentials.account_id, copy_secret(&credentials.secret))
            .await
    }

    async fn authenticate(
        &mut self,
        account_id: &str,
        derived_secret: SecretString,
    ) -> Result<Authenticated, AuthError> {
        let result = self
            .marketplace
            .authenticate(account_id, &derived_secret, false)
            .await;

        let mut session = Session {
            account_id: account_id.to_string(),
            derived_secret,
            account: None,
        };

        match result {
            Ok(account) => {
                let authenticated = Authenticated {
                    account_id: account.account_id.clone(),
                    display_name: account.display_name.clone(),
                };
                session.account = Some(account);
                self.session = Some(session);
                info!(account = %account_id, "signed in");
                Ok(authenticated)
            }
            Err(e) => {
                debug!(account = %account_id, error = %e, "sign-in failed");
                self.session = Some(session);
                Err(e)
            }
        }
    }

    /// Discard the session
    pub fn sign_out(&mut self) {
        if let Some(session) = self.session.take() {
            info!(account = %session.account_id, "signed out");
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |session| session.account.is_some())
    }

    /// Account id of the current session, authenticated or not
    pub fn account_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.account_id.as_str())
    }

    /// Display name of the signed-in account
    pub fn display_name(&self) -> Option<&str> {
        self.account().and_then(|account| account.display_name.as_deref())
    }

    /// Credentials worth persisting; only available once authenticated
    pub fn credentials(&self) -> Option<StoredCredentials> {
        let session = self.session.as_ref()?;
        session.account.as_ref()?;
        Some(StoredCredentials {
            account_id: session.account_id.clone(),
            secret: copy_secret(&session.derived_secret),
        })
    }

    fn account(&self) -> Option<&AccountInfo> {
        self.session.as_ref().and_then(|session| session.account.as_ref())
    }

    /// Marketplace's own release record for an app
    pub async fn release_listing(&self, app_id: &AppId) -> Result<ReleaseListing, ResolutionError> {
        let account = self.account().ok_or(ResolutionError::NotAuthenticated)?;
        let ticket = self
            .marketplace
            .download_ticket(account, app_id, None)
            .await
            .map_err(|e| match e {
                FetchError::NotAuthenticated => ResolutionError::NotAuthenticated,
                FetchError::NetworkInterrupted(msg) => ResolutionError::NetworkUnavailable(msg),
                FetchError::CorruptDownload(msg) => ResolutionError::MalformedResponse(msg),
                FetchError::ReleaseUnavailable { reason, .. } => ResolutionError::Rejected(reason),
                FetchError::Storage(msg) => ResolutionError::Rejected(msg),
            })?;
        Ok(ticket.release_listing())
    }

    /// Download ticket for a specific release
    pub async fn download_ticket(
        &self,
        app_id: &AppId,
        release_id: &str,
    ) -> Result<DownloadTicket, FetchError> {
        let account = self.account().ok_or(FetchError::NotAuthenticated)?;
        self.marketplace
            .download_ticket(account, app_id, Some(release_id))
            .await
    }

    /// Download a ticket's package to `dest`
    pub async fn download_package(
        &self,
        ticket: &DownloadTicket,
        dest: &Path,
    ) -> Result<(), FetchError> {
        if !self.is_authenticated() {
            return Err(FetchError::NotAuthenticated);
        }
        self.marketplace.download_package(&ticket.url, dest).await
    }
}

//! User-facing rendering of errors with a remediation hint.

use crate::core::error::{AuthError, DeliveryError, FetchError, RewindError};

/// Something the user can do about an error.
pub trait ErrorHelp {
    fn help(&self) -> Option<String>;
}

impl ErrorHelp for RewindError {
    fn help(&self) -> Option<String> {
        let hint = match self {
            RewindError::Auth(AuthError::InvalidCredentials) => {
                "Check the account id and password, then run `rewind login` again."
            }
            RewindError::Auth(AuthError::SecondFactorRequired) => {
                "Run `rewind login` and enter the code sent to your trusted devices."
            }
            RewindError::Auth(AuthError::NetworkUnavailable(_)) => {
                "The marketplace could not be reached. Your saved credentials were kept; retry once online."
            }
            RewindError::Auth(AuthError::MarketplaceRejected(_)) => {
                "The marketplace refused the sign-in. Run `rewind login` to sign in again."
            }
            RewindError::Resolution(_) => {
                "Try the other release source (`--history` toggles the public history service)."
            }
            RewindError::Fetch(FetchError::NotAuthenticated) => {
                "You are not signed in or the session expired. Run `rewind login`."
            }
            RewindError::Fetch(FetchError::ReleaseUnavailable { .. }) => {
                "That release has been withdrawn. Pick a different release id."
            }
            RewindError::Fetch(_) => "Restart the downgrade once the connection is stable.",
            RewindError::Packaging(_) => {
                "The downloaded package is not a usable application. Try another release."
            }
            RewindError::Delivery(DeliveryError::PortBindFailure { .. }) => {
                "Another program is using the delivery port. Close it or change `delivery_port` in config.yaml."
            }
            RewindError::Link(_) => {
                "Paste the App Store share link, e.g. https://apps.apple.com/us/app/name/id123456789"
            }
            RewindError::Vault(_) => "Run `rewind logout` to reset the credential vault.",
            RewindError::Config(_) | RewindError::Yaml(_) => {
                "Fix or delete config.yaml (see `rewind config path`)."
            }
            RewindError::Launch(_) => {
                "Open the install page printed above in Safari on the device."
            }
            _ => return None,
        };
        Some(hint.to_string())
    }
}

/// Format an error followed by its hint, if it has one
pub fn format_error_with_help(error: &RewindError) -> String {
    match error.help() {
        Some(hint) => format!("Error: {}\n\n  hint: {}", error, hint),
        None => format!("Error: {}", error),
    }
}

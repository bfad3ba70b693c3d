use crate::cli::input::{DialoguerInput, UserInput};
use rewind::di::ServiceContainer;
use rewind::store::{Authenticated, SignInOutcome, StoreSession};
use rewind::{AuthError, RewindError, RewindResult};
use secrecy::SecretString;
use std::sync::Arc;

pub const ACCOUNT_PROMPT: &str = "Apple ID";
pub const PASSWORD_PROMPT: &str = "Password";
pub const CODE_PROMPT: &str = "Verification code";

pub async fn run(account: Option<String>) -> RewindResult<()> {
    let container = ServiceContainer::new()?;

    println!("App Store Login");
    println!();

    let authenticated = sign_in(&container, &DialoguerInput, account).await?;

    println!();
    match authenticated.display_name {
        Some(name) => println!("✓ Signed in as {} ({})", name, authenticated.account_id),
        None => println!("✓ Signed in as {}", authenticated.account_id),
    }
    println!("✓ Credentials stored securely");
    Ok(())
}

/// Two-step sign-in: the first attempt gets a code pushed to the account's
/// devices, the second finishes with it. Credentials are saved on success.
pub async fn sign_in(
    container: &ServiceContainer,
    input: &dyn UserInput,
    account: Option<String>,
) -> RewindResult<Authenticated> {
    let account_id = match account {
        Some(account) => account,
        None => input.prompt_string(ACCOUNT_PROMPT)?,
    };
    let password = SecretString::from(input.prompt_password(PASSWORD_PROMPT)?);

    let mut session = StoreSession::new(Arc::clone(&container.marketplace));
    session.sign_in(&account_id, &password, None).await?;
    println!("A verification code was sent to your trusted devices.");

    let code = input.prompt_string(CODE_PROMPT)?;
    let authenticated = match session.sign_in(&account_id, &password, Some(&code)).await? {
        SignInOutcome::Authenticated(authenticated) => authenticated,
        SignInOutcome::ChallengeIssued => return Err(AuthError::SecondFactorRequired.into()),
    };

    let credentials = session
        .credentials()
        .ok_or_else(|| RewindError::Vault("signed in but no credentials to store".to_string()))?;
    container.vault().save(&credentials)?;
    Ok(authenticated)
}

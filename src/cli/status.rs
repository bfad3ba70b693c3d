use rewind::di::ServiceContainer;
use rewind::store::{restore_session, RestoreOutcome, StoreSession};
use rewind::RewindResult;
use std::sync::Arc;

pub async fn run() -> RewindResult<()> {
    let container = ServiceContainer::new()?;
    let mut session = StoreSession::new(Arc::clone(&container.marketplace));
    let outcome = restore_session(container.vault(), &mut session).await?;

    println!("{}", describe(&outcome));
    Ok(())
}

pub fn describe(outcome: &RestoreOutcome) -> String {
    match outcome {
        RestoreOutcome::NoCredentials => "Not signed in. Run `rewind login`.".to_string(),
        RestoreOutcome::Restored(authenticated) => match &authenticated.display_name {
            Some(name) => format!("✓ Signed in as {} ({})", name, authenticated.account_id),
            None => format!("✓ Signed in as {}", authenticated.account_id),
        },
        RestoreOutcome::Reset { reason } => format!(
            "Stored credentials were discarded ({}). Run `rewind login`.",
            reason
        ),
        RestoreOutcome::Offline { reason } => format!(
            "Marketplace unreachable ({}). Stored credentials were kept.",
            reason
        ),
    }
}

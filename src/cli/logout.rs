use rewind::di::ServiceContainer;
use rewind::store::{forget_account, StoreSession};
use rewind::RewindResult;
use std::sync::Arc;

pub fn run() -> RewindResult<()> {
    let container = ServiceContainer::new()?;
    let mut session = StoreSession::new(Arc::clone(&container.marketplace));
    forget_account(container.vault(), &mut session)?;

    println!("✓ Signed out and removed stored credentials");
    Ok(())
}

//! Marketplace access: protocol client, session and share links

pub mod app_id;
pub mod client;
pub mod restore;
pub mod session;
pub mod types;

pub use app_id::AppId;
pub use client::StoreClient;
pub use restore::{forget_account, restore_session, RestoreOutcome};
pub use session::{Authenticated, SignInOutcome, StoreSession};

//! Local delivery of a packaged artifact

pub mod launcher;
pub mod manifest;
pub mod server;

pub use launcher::SystemLauncher;
pub use manifest::InstallTrigger;
pub use server::{DeliveryServer, ServerState};

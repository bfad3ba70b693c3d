use crate::delivery::InstallTrigger;
use crate::di::InstallLauncher;
use rewind_core::{RewindError, RewindResult};
use std::process::Command;
use tracing::info;

/// Hands the install page to the platform's URL opener
pub struct SystemLauncher;

impl SystemLauncher {
    fn opener(url: &str) -> Command {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.arg(url);
            cmd
        } else if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", "", url]);
            cmd
        } else {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(url);
            cmd
        }
    }
}

impl InstallLauncher for SystemLauncher {
    fn launch(&self, trigger: &InstallTrigger) -> RewindResult<()> {
        info!(url = %trigger.install_page_url, itms = %trigger.itms_url, "issuing install trigger");
        let status = Self::opener(&trigger.install_page_url)
            .status()
            .map_err(|e| RewindError::Launch(e.to_string()))?;
        if !status.success() {
            return Err(RewindError::Launch(format!("URL opener exited with {}", status)));
        }
        Ok(())
    }
}

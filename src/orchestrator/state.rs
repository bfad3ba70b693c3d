use crate::delivery::InstallTrigger;
use crate::resolver::{ReleaseCandidate, ResolutionStrategy};
use crate::store::AppId;
use rewind_core::{DeliveryError, FetchError, PackagingError, ResolutionError, RewindError};
use thiserror::Error;

/// Where a downgrade currently stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DowngradeState {
    AwaitingInput,
    ResolvingVersions {
        app_id: AppId,
        strategy: ResolutionStrategy,
    },
    AwaitingSelection {
        app_id: AppId,
        candidates: Vec<ReleaseCandidate>,
    },
    Fetching {
        app_id: AppId,
        release_id: String,
    },
    Packaging {
        app_id: AppId,
        release_id: String,
    },
    Serving,
    AwaitingInstallConfirmation {
        trigger: InstallTrigger,
    },
    Done,
    Failed(FailureReason),
}

impl DowngradeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Short name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitingInput => "awaiting input",
            Self::ResolvingVersions { .. } => "resolving versions",
            Self::AwaitingSelection { .. } => "awaiting selection",
            Self::Fetching { .. } => "fetching",
            Self::Packaging { .. } => "packaging",
            Self::Serving => "serving",
            Self::AwaitingInstallConfirmation { .. } => "awaiting install confirmation",
            Self::Done => "done",
            Self::Failed(_) => "failed",
        }
    }
}

/// Why a downgrade ended in `Failed`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("version resolution failed: {0}")]
    Resolution(ResolutionError),

    #[error("package fetch failed: {0}")]
    Fetch(FetchError),

    #[error("packaging failed: {0}")]
    Packaging(PackagingError),

    #[error("delivery failed: {0}")]
    Delivery(DeliveryError),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

impl From<FailureReason> for RewindError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Resolution(e) => RewindError::Resolution(e),
            FailureReason::Fetch(e) => RewindError::Fetch(e),
            FailureReason::Packaging(e) => RewindError::Packaging(e),
            FailureReason::Delivery(e) => RewindError::Delivery(e),
            FailureReason::Cancelled => RewindError::Cancelled,
            FailureReason::Internal(msg) => RewindError::Input(msg),
        }
    }
}

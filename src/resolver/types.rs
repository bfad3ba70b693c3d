//! Release candidates and resolution strategies

use std::fmt;

/// Where a release candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseSource {
    /// The marketplace's own record, read through a signed-in session
    Device,
    /// The public release history service
    RemoteHistory,
}

/// One installable historical release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseCandidate {
    pub release_id: String,
    pub display_version: String,
    pub source: ReleaseSource,
}

impl fmt::Display for ReleaseCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.display_version == self.release_id {
            write!(f, "{}", self.release_id)
        } else {
            write!(f, "{} ({})", self.display_version, self.release_id)
        }
    }
}

/// How to look up candidates; always chosen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    Device,
    RemoteHistory,
}

impl ResolutionStrategy {
    /// The strategy to offer when this one comes back empty
    pub fn other(self) -> Self {
        match self {
            Self::Device => Self::RemoteHistory,
            Self::RemoteHistory => Self::Device,
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => f.write_str("marketplace"),
            Self::RemoteHistory => f.write_str("release history"),
        }
    }
}

/// Outcome of a resolution; an empty source is an outcome, not an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Candidates in the order the source returned them
    Candidates(Vec<ReleaseCandidate>),
    NoHistoryAvailable,
}

impl Resolution {
    pub(crate) fn from_candidates(candidates: Vec<ReleaseCandidate>) -> Self {
        if candidates.is_empty() {
            Self::NoHistoryAvailable
        } else {
            Self::Candidates(candidates)
        }
    }

    pub fn candidates(&self) -> &[ReleaseCandidate] {
        match self {
            Self::Candidates(candidates) => candidates,
            Self::NoHistoryAvailable => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_strategy() {
        assert_eq!(ResolutionStrategy::Device.other(), ResolutionStrategy::RemoteHistory);
        assert_eq!(ResolutionStrategy::RemoteHistory.other(), ResolutionStrategy::Device);
    }

    #[test]
    fn test_empty_candidates_mean_no_history() {
        assert_eq!(Resolution::from_candidates(Vec::new()), Resolution::NoHistoryAvailable);
        assert!(Resolution::NoHistoryAvailable.candidates().is_empty());
    }

    #[test]
    fn test_candidate_display() {
        let labelled = ReleaseCandidate {
            release_id: "999".to_string(),
            display_version: "2.1.0".to_string(),
            source: ReleaseSource::RemoteHistory,
        };
        assert_eq!(labelled.to_string(), "2.1.0 (999)");

        let bare = ReleaseCandidate {
            release_id: "999".to_string(),
            display_version: "999".to_string(),
            source: ReleaseSource::Device,
        };
        assert_eq!(bare.to_string(), "999");
    }
}

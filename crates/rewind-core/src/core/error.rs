use thiserror::Error;

pub type RewindResult<T> = Result<T, RewindError>;

#[derive(Error, Debug)]
pub enum RewindError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WalkDir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential vault error: {0}")]
    Vault(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Could not open the install page: {0}")]
    Launch(String),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Version resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Package fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Packaging failed: {0}")]
    Packaging(#[from] PackagingError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Invalid share link: {0}")]
    Link(#[from] LinkError),

    /// The user backed out of an interactive step.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Failures while signing in to the marketplace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("the marketplace rejected the account id or password")]
    InvalidCredentials,

    #[error("a second-factor code is required to finish signing in")]
    SecondFactorRequired,

    #[error("marketplace unreachable: {0}")]
    NetworkUnavailable(String),

    #[error("marketplace rejected the sign-in: {0}")]
    MarketplaceRejected(String),
}

impl AuthError {
    /// True when the marketplace looked at the credentials and said no,
    /// as opposed to never being reached.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AuthError::NetworkUnavailable(_))
    }
}

/// Failures while listing candidate releases.
///
/// An empty history is not one of these; it is reported as
/// `Resolution::NoHistoryAvailable` by the resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("not signed in to the marketplace")]
    NotAuthenticated,

    #[error("release list unreachable: {0}")]
    NetworkUnavailable(String),

    #[error("release list rejected: {0}")]
    Rejected(String),

    #[error("malformed release list: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("not signed in to the marketplace")]
    NotAuthenticated,

    #[error("release {release_id} of app {app_id} is no longer served: {reason}")]
    ReleaseUnavailable {
        app_id: String,
        release_id: String,
        reason: String,
    },

    #[error("download interrupted: {0}")]
    NetworkInterrupted(String),

    #[error("downloaded package is corrupt: {0}")]
    CorruptDownload(String),

    #[error("could not write package to disk: {0}")]
    Storage(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackagingError {
    #[error("malformed package: {0}")]
    MalformedPackage(String),

    #[error("could not write archive: {0}")]
    Archive(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("cannot bind delivery server to {addr}: {reason}")]
    PortBindFailure { addr: String, reason: String },

    #[error("artifact is incomplete: {0}")]
    PartialWrite(String),

    #[error("delivery server is already {0}")]
    InvalidState(String),

    #[error("delivery server error: {0}")]
    Server(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("share link is empty")]
    Empty,

    #[error("not a URL: {0}")]
    InvalidUrl(String),

    #[error("no numeric app id in {0}")]
    MissingAppId(String),
}

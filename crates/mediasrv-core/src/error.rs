//! Crate-wide error taxonomy.
//!
//! Each subsystem gets its own error enum (mirroring the teacher's
//! `HlsError`/`FfmpegError` split) composed into [`CoreError`], which is
//! what crosses module boundaries.

use thiserror::Error;

/// Segment index / recording template errors (spec.md §4.A).
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no segments found for path {0:?}")]
    NoSegmentsFound(String),

    #[error("filename does not match template: {0}")]
    TemplateMismatch(String),

    #[error("invalid recording template: {0}")]
    InvalidTemplate(String),
}

/// fMP4 box parsing / re-muxing errors (spec.md §4.B).
#[derive(Error, Debug)]
pub enum MuxError {
    #[error("malformed box: {0}")]
    MalformedBox(String),

    #[error("missing required box: {0}")]
    MissingBox(&'static str),

    #[error("initializations are not structurally compatible")]
    IncompatibleInit,

    #[error("no sync sample found before the requested start")]
    NoSyncSample,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authentication errors (spec.md §4.D, §7).
#[derive(Error, Debug)]
pub enum AuthError {
    /// `askCredentials` is true iff the request carried no credentials at all.
    #[error("authentication failed")]
    AuthenticationFailed { ask_credentials: bool },

    #[error("http auth callback rejected the request: {0}")]
    CallbackRejected(String),

    #[error("http auth callback request failed: {0}")]
    CallbackTransport(String),

    #[error("jwks fetch failed and no cached set is available: {0}")]
    JwksUnavailable(String),

    #[error("jwt verification failed: {0}")]
    JwtInvalid(String),
}

impl AuthError {
    pub fn ask_credentials(&self) -> bool {
        matches!(
            self,
            AuthError::AuthenticationFailed {
                ask_credentials: true
            }
        )
    }
}

/// Path dispatch errors (spec.md §4.E/§4.F, §7).
#[derive(Error, Debug)]
pub enum PathError {
    #[error("path is already being published to")]
    AlreadyPublishing,

    #[error("no one is publishing to this path")]
    NoOnePublishing,

    #[error("path is not configured: {0}")]
    NotConfigured(String),

    #[error("the path coordinator shut down while handling the request")]
    CoordinatorGone,
}

/// Config load / reload errors (spec.md §4.G, §7). A reload failure is
/// reported but never propagated into a crash: the caller retains the
/// previous configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid path pattern {0:?}: {1}")]
    InvalidPattern(String, regex::Error),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Mux(#[from] MuxError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("client disconnected")]
    ClientDisconnected,

    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

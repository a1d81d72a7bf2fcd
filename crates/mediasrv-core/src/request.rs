//! Value types passed between boundary handlers and the dispatch core
//! (spec.md §3, §4.D, module H in the overview table).

use std::net::IpAddr;
use uuid::Uuid;

/// Which streaming protocol a request arrived over. Purely informational
/// at the core — wire-level framing is out of scope (spec.md §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Rtsp,
    Rtmp,
    Hls,
    WebRtc,
    Srt,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Rtsp => "rtsp",
            Protocol::Rtmp => "rtmp",
            Protocol::Hls => "hls",
            Protocol::WebRtc => "webrtc",
            Protocol::Srt => "srt",
        }
    }
}

/// The action a request is attempting, spanning all six boundary kinds
/// (spec.md §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Publish,
    Read,
    Playback,
    Api,
    Metrics,
    Pprof,
}

impl Action {
    /// Per-path actions are the three whose permissions may be scoped to
    /// a specific path pattern (spec.md §4.D permission matching rules).
    pub fn is_per_path(&self) -> bool {
        matches!(self, Action::Publish | Action::Read | Action::Playback)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Publish => "publish",
            Action::Read => "read",
            Action::Playback => "playback",
            Action::Api => "api",
            Action::Metrics => "metrics",
            Action::Pprof => "pprof",
        }
    }
}

/// Credentials extracted from whatever protocol envelope carried them
/// (RTSP basic/digest header, HTTP basic/bearer, JWT query parameter,
/// ...). Any field may be absent.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user: Option<String>,
    pub pass: Option<String>,
    pub token: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.pass.is_none() && self.token.is_none()
    }
}

/// A hook a boundary can install so that password verification is
/// delegated to it instead of the internal backend's own logic — used
/// by RTSP digest auth, where only the boundary has the challenge
/// context needed to validate a response (spec.md §4.D).
pub trait CustomVerify: Send + Sync {
    fn verify(&self, password: &str) -> bool;
}

/// Everything a boundary handler fills in before asking the Path Manager
/// to resolve, authenticate, and hand back a path handle (spec.md §3).
#[derive(Clone)]
pub struct PathAccessRequest {
    pub path_name: String,
    pub query: String,
    pub publish: bool,
    pub skip_auth: bool,
    pub credentials: Credentials,
    pub ip: IpAddr,
    pub protocol: Option<Protocol>,
    pub session_id: Option<Uuid>,
    pub custom_verify: Option<std::sync::Arc<dyn CustomVerify>>,
}

impl std::fmt::Debug for PathAccessRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathAccessRequest")
            .field("path_name", &self.path_name)
            .field("query", &self.query)
            .field("publish", &self.publish)
            .field("skip_auth", &self.skip_auth)
            .field("credentials", &self.credentials)
            .field("ip", &self.ip)
            .field("protocol", &self.protocol)
            .field("session_id", &self.session_id)
            .field("custom_verify", &self.custom_verify.is_some())
            .finish()
    }
}

impl PathAccessRequest {
    pub fn new(path_name: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            path_name: path_name.into(),
            query: String::new(),
            publish: false,
            skip_auth: false,
            credentials: Credentials::default(),
            ip,
            protocol: None,
            session_id: None,
            custom_verify: None,
        }
    }
}

/// A `PathAccessRequest` plus the action being attempted — the uniform
/// shape the Auth Manager evaluates (spec.md §4.D).
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub action: Action,
    pub path_name: String,
    pub query: String,
    pub protocol: Option<Protocol>,
    pub session_id: Option<Uuid>,
    pub credentials: Credentials,
    pub ip: IpAddr,
}

impl AuthRequest {
    pub fn from_access(req: &PathAccessRequest, action: Action) -> Self {
        Self {
            action,
            path_name: req.path_name.clone(),
            query: req.query.clone(),
            protocol: req.protocol,
            session_id: req.session_id,
            credentials: req.credentials.clone(),
            ip: req.ip,
        }
    }
}

/// The JSON body POSTed to an HTTP auth callback (spec.md §6). Field
/// order is insertion order here but §8 invariant 5 only requires the
/// field *set* to match, not the order.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthCallbackBody {
    pub ip: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub action: &'static str,
    pub path: String,
    pub protocol: Option<&'static str>,
    pub id: Option<String>,
    pub query: String,
}

impl AuthCallbackBody {
    pub fn from_request(req: &AuthRequest) -> Self {
        Self {
            ip: req.ip.to_string(),
            user: req.credentials.user.clone(),
            password: req.credentials.pass.clone(),
            token: req.credentials.token.clone(),
            action: req.action.as_str(),
            path: req.path_name.clone(),
            protocol: req.protocol.map(|p| p.as_str()),
            id: req.session_id.map(|id| id.to_string()),
            query: req.query.clone(),
        }
    }
}

//! Auth Manager: three pluggable backends behind one `authenticate` call
//! (spec.md §4.D).

pub mod http;
pub mod internal;
pub mod jwt;
pub mod password;
pub mod permission;

use std::time::Duration;

use tokio::time::sleep;

use crate::config::AuthMethod;
use crate::error::AuthError;
use crate::request::{AuthRequest, CustomVerify};

use self::http::HttpBackend;
use self::internal::InternalBackend;
use self::jwt::JwtBackend;

/// Boundaries must pause this long after any authentication failure
/// (spec.md §4.D "Failure behavior").
pub const FAILURE_PAUSE: Duration = Duration::from_secs(2);

enum Backend {
    Internal(InternalBackend),
    Http(HttpBackend),
    Jwt(JwtBackend),
}

pub struct AuthManager {
    backend: Backend,
}

impl AuthManager {
    pub fn new(method: &AuthMethod) -> Self {
        let backend = match method {
            AuthMethod::Internal { users } => Backend::Internal(InternalBackend::new(users.clone())),
            AuthMethod::Http { url, exclude } => {
                Backend::Http(HttpBackend::new(url.clone(), &split_exclude(exclude)))
            }
            AuthMethod::Jwt {
                jwks_url,
                claim_key,
                exclude,
            } => Backend::Jwt(JwtBackend::new(
                jwks_url.clone(),
                claim_key.clone(),
                &split_exclude(exclude),
            )),
        };
        Self { backend }
    }

    /// Authenticates `req`. On failure, sleeps [`FAILURE_PAUSE`] before
    /// returning the error, per the mandatory brute-force throttle.
    pub async fn authenticate(
        &self,
        req: &AuthRequest,
        custom_verify: Option<&dyn CustomVerify>,
    ) -> Result<(), AuthError> {
        let result = match &self.backend {
            Backend::Internal(b) => b.authenticate(req, custom_verify),
            Backend::Http(b) => b.authenticate(req).await,
            Backend::Jwt(b) => b.authenticate(req).await,
        };
        if result.is_err() {
            sleep(FAILURE_PAUSE).await;
        }
        result
    }
}

/// Exclude entries are configured as `"action:path"`; empty path is
/// allowed and means "any path" is not implied here (exact-match only).
fn split_exclude(entries: &[String]) -> Vec<(String, String)> {
    entries
        .iter()
        .map(|e| match e.split_once(':') {
            Some((a, p)) => (a.to_string(), p.to_string()),
            None => (e.clone(), String::new()),
        })
        .collect()
}

//! Internal auth backend: statically configured users (spec.md §4.D, 1).

use std::net::IpAddr;

use ipnet::IpNet;

use super::password;
use super::permission::{self, Permission};
use crate::config::AuthInternalUser;
use crate::error::AuthError;
use crate::request::{Action, AuthRequest, CustomVerify};

pub struct InternalBackend {
    users: Vec<AuthInternalUser>,
}

impl InternalBackend {
    pub fn new(users: Vec<AuthInternalUser>) -> Self {
        Self { users }
    }

    /// Authenticates `req`, trying every user in configuration order and
    /// accepting on the first full match (spec.md §4.D, 1).
    pub fn authenticate(
        &self,
        req: &AuthRequest,
        custom_verify: Option<&dyn CustomVerify>,
    ) -> Result<(), AuthError> {
        for user in &self.users {
            if !ip_allowed(&user.ips, req.ip) {
                continue;
            }
            if !name_matches(&user.user, req.credentials.user.as_deref()) {
                continue;
            }
            if !password_ok(user, req, custom_verify) {
                continue;
            }
            let perms: Vec<Permission> = user
                .permissions
                .iter()
                .filter_map(|p| {
                    Some(Permission {
                        action: parse_action(&p.action)?,
                        path: p.path.clone(),
                    })
                })
                .collect();
            if permission::any_matches(&perms, req.action, &req.path_name) {
                return Ok(());
            }
        }
        Err(AuthError::AuthenticationFailed {
            ask_credentials: req.credentials.is_empty(),
        })
    }
}

fn parse_action(s: &str) -> Option<Action> {
    match s {
        "publish" => Some(Action::Publish),
        "read" => Some(Action::Read),
        "playback" => Some(Action::Playback),
        "api" => Some(Action::Api),
        "metrics" => Some(Action::Metrics),
        "pprof" => Some(Action::Pprof),
        _ => None,
    }
}

fn ip_allowed(allow_list: &[String], ip: IpAddr) -> bool {
    if allow_list.is_empty() {
        return true;
    }
    allow_list.iter().any(|entry| {
        entry
            .parse::<IpNet>()
            .map(|net| net.contains(&ip))
            .or_else(|_| entry.parse::<IpAddr>().map(|a| a == ip))
            .unwrap_or(false)
    })
}

fn name_matches(configured: &str, given: Option<&str>) -> bool {
    configured == "any" || Some(configured) == given
}

fn password_ok(
    user: &AuthInternalUser,
    req: &AuthRequest,
    custom_verify: Option<&dyn CustomVerify>,
) -> bool {
    let Some(stored) = user.pass.as_deref() else {
        return true;
    };
    let candidate = req.credentials.pass.as_deref().unwrap_or("");
    if let Some(verifier) = custom_verify {
        return verifier.verify(candidate);
    }
    password::verify(stored, candidate)
}

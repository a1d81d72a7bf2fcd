//! Pure permission-matching routine shared by all three backends
//! (spec.md §4.D "Permission matching").

use regex::Regex;

use crate::request::Action;

/// A single scoped permission, backend-agnostic.
#[derive(Debug, Clone)]
pub struct Permission {
    pub action: Action,
    /// Empty string means "any path". A leading `~` denotes a regex.
    pub path: String,
}

/// True when `perm` authorizes `action` on `path_name`.
pub fn matches(perm: &Permission, action: Action, path_name: &str) -> bool {
    if perm.action != action {
        return false;
    }
    if !action.is_per_path() {
        return true;
    }
    if perm.path.is_empty() {
        return true;
    }
    if let Some(pattern) = perm.path.strip_prefix('~') {
        return Regex::new(pattern)
            .map(|re| re.is_match(path_name))
            .unwrap_or(false);
    }
    perm.path == path_name
}

/// True when any permission in the set authorizes the request.
pub fn any_matches(perms: &[Permission], action: Action, path_name: &str) -> bool {
    perms.iter().any(|p| matches(p, action, path_name))
}

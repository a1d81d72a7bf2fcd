//! Configuration data model and TOML loading (spec.md §4.G, §2).

use std::path::Path;

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Where a path's media comes from (spec.md §2 Path).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    /// Media arrives via an inbound publish (RTSP/RTMP/WebRTC/SRT push).
    Publisher,
    /// The path pulls continuously from a remote URL.
    StaticUrl { url: String },
    /// Readers are redirected to another path name instead of being
    /// served directly.
    Redirect { source_path: String },
}

/// Recording output format for a path (spec.md §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    Fmp4,
    Mp4,
}

/// One scoped permission granted to an internal user (spec.md §4.D).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthInternalUserPermission {
    pub action: String,
    /// Empty string matches any path for this action (spec.md §4.D
    /// permission-matching rule).
    #[serde(default)]
    pub path: String,
}

/// A statically configured user for the internal auth backend
/// (spec.md §4.D). The password scheme is named by `pass`'s own prefix
/// (`sha256:<base64>`, `argon2:<argon2-encoded>`, or plaintext
/// otherwise, per spec.md §3) — there is no separate scheme field.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthInternalUser {
    /// `"any"` matches every username (and requests with no username at all).
    pub user: String,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default)]
    pub ips: Vec<String>,
    pub permissions: Vec<AuthInternalUserPermission>,
}

/// Per-path settings (spec.md §2 Path, §4.A, §4.E/F).
#[derive(Debug, Clone, Deserialize)]
pub struct PathConfiguration {
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub record: bool,
    #[serde(default = "default_record_path")]
    pub record_path: String,
    #[serde(default = "default_record_format")]
    pub record_format: RecordFormat,
    #[serde(default = "default_record_segment_duration")]
    pub record_segment_duration_secs: u64,
    #[serde(default)]
    pub source_on_demand: bool,
    #[serde(default = "default_source_on_demand_close_after")]
    pub source_on_demand_close_after_secs: u64,
}

fn default_record_path() -> String {
    "./recordings/%path/%Y-%m-%d_%H-%M-%S-%f".to_string()
}

fn default_record_format() -> RecordFormat {
    RecordFormat::Fmp4
}

fn default_record_segment_duration() -> u64 {
    3600
}

fn default_source_on_demand_close_after() -> u64 {
    10
}

impl Default for PathConfiguration {
    fn default() -> Self {
        Self {
            source: None,
            record: false,
            record_path: default_record_path(),
            record_format: default_record_format(),
            record_segment_duration_secs: default_record_segment_duration(),
            source_on_demand: false,
            source_on_demand_close_after_secs: default_source_on_demand_close_after(),
        }
    }
}

/// Which auth backend is active (spec.md §4.D).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthMethod {
    Internal {
        #[serde(default)]
        users: Vec<AuthInternalUser>,
    },
    Http {
        url: String,
        #[serde(default)]
        exclude: Vec<String>,
    },
    Jwt {
        jwks_url: String,
        #[serde(default = "default_jwt_claim_key")]
        claim_key: String,
        #[serde(default)]
        exclude: Vec<String>,
    },
}

fn default_jwt_claim_key() -> String {
    "mediasrv_permissions".to_string()
}

/// Top-level configuration (spec.md §2, §4.G).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_addr")]
    pub api_addr: String,

    pub auth: AuthMethod,

    /// Keyed by path pattern; exact names and `~`-prefixed regex
    /// patterns share this table. Declaration order is preserved so
    /// regex resolution can try patterns in config order (spec.md §4.F).
    #[serde(default)]
    pub paths: IndexMap<String, PathConfiguration>,
}

fn default_api_addr() -> String {
    "127.0.0.1:9997".to_string()
}

impl Default for AuthMethod {
    fn default() -> Self {
        AuthMethod::Internal {
            users: vec![AuthInternalUser {
                user: "any".to_string(),
                pass: None,
                ips: Vec::new(),
                permissions: vec![AuthInternalUserPermission {
                    action: "publish".to_string(),
                    path: String::new(),
                }, AuthInternalUserPermission {
                    action: "read".to_string(),
                    path: String::new(),
                }, AuthInternalUserPermission {
                    action: "playback".to_string(),
                    path: String::new(),
                }],
            }],
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(text).map_err(ConfigError::Parse)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates every `~`-prefixed path key compiles as a regex, so
    /// that resolution (spec.md §4.F) never hits a bad pattern lazily.
    fn validate(&self) -> Result<()> {
        for key in self.paths.keys() {
            if let Some(pattern) = key.strip_prefix('~') {
                Regex::new(pattern)
                    .map_err(|e| ConfigError::InvalidPattern(key.clone(), e))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let text = r#"
            [auth]
            method = "internal"

            [paths.cam1]
            record = true
        "#;
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.api_addr, "127.0.0.1:9997");
        assert!(cfg.paths.contains_key("cam1"));
        assert!(cfg.paths["cam1"].record);
    }

    #[test]
    fn rejects_invalid_regex_pattern() {
        let text = r#"
            [auth]
            method = "internal"

            [paths."~("]
        "#;
        assert!(Config::parse(text).is_err());
    }

    #[test]
    fn default_internal_user_allows_everything() {
        let auth = AuthMethod::default();
        match auth {
            AuthMethod::Internal { users } => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].user, "any");
                assert_eq!(users[0].permissions.len(), 3);
            }
            _ => panic!("expected internal"),
        }
    }
}

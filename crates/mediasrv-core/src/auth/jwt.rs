//! JWT auth backend with a cached JWKS fetch (spec.md §4.D, 3).

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, DecodingKey, Validation};
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::Value;

use super::permission::{self, Permission};
use crate::error::AuthError;
use crate::request::{Action, AuthRequest};

const JWKS_TTL: Duration = Duration::from_secs(3600);

struct CachedJwks {
    set: JwkSet,
    fetched_at: Instant,
}

pub struct JwtBackend {
    client: Client,
    jwks_url: String,
    claim_key: String,
    exclude: Vec<(Action, String)>,
    cache: Mutex<Option<CachedJwks>>,
}

impl JwtBackend {
    pub fn new(jwks_url: String, claim_key: String, exclude_raw: &[(String, String)]) -> Self {
        let exclude = exclude_raw
            .iter()
            .filter_map(|(a, p)| Some((parse_action(a)?, p.clone())))
            .collect();
        Self {
            client: Client::new(),
            jwks_url,
            claim_key,
            exclude,
            cache: Mutex::new(None),
        }
    }

    fn is_excluded(&self, req: &AuthRequest) -> bool {
        self.exclude
            .iter()
            .any(|(a, p)| *a == req.action && p == &req.path_name)
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksUnavailable(e.to_string()))?;
        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::JwksUnavailable(e.to_string()))
    }

    /// Returns a cached JWKS if still fresh, otherwise refetches. On a
    /// failed refetch, falls back to a stale cached set if one exists
    /// (spec.md §4.D: "force-refresh hook available", cache survives
    /// transient fetch failures).
    async fn jwks(&self, force_refresh: bool) -> Result<JwkSet, AuthError> {
        if !force_refresh {
            if let Some(cached) = self.cache.lock().as_ref() {
                if cached.fetched_at.elapsed() < JWKS_TTL {
                    return Ok(cached.set.clone());
                }
            }
        }
        match self.fetch_jwks().await {
            Ok(set) => {
                *self.cache.lock() = Some(CachedJwks {
                    set: set.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(set)
            }
            Err(e) => {
                if let Some(cached) = self.cache.lock().as_ref() {
                    tracing::warn!(error = %e, "jwks refresh failed, using stale cache");
                    return Ok(cached.set.clone());
                }
                Err(e)
            }
        }
    }

    pub async fn authenticate(&self, req: &AuthRequest) -> Result<(), AuthError> {
        if self.is_excluded(req) {
            return Ok(());
        }
        let token = req
            .credentials
            .token
            .as_deref()
            .ok_or(AuthError::AuthenticationFailed {
                ask_credentials: true,
            })?;

        let claims = self.verify_token(token, false).await;
        let claims = match claims {
            Ok(c) => c,
            Err(_) => self.verify_token(token, true).await?,
        };

        let perms = extract_permissions(&claims, &self.claim_key);
        if permission::any_matches(&perms, req.action, &req.path_name) {
            Ok(())
        } else {
            Err(AuthError::AuthenticationFailed {
                ask_credentials: false,
            })
        }
    }

    async fn verify_token(&self, token: &str, force_refresh: bool) -> Result<Value, AuthError> {
        let jwks = self.jwks(force_refresh).await?;
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::JwtInvalid(e.to_string()))?;
        let kid = header.kid.as_deref();

        let jwk = jwks
            .keys
            .iter()
            .find(|k| kid.is_none() || k.common.key_id.as_deref() == kid)
            .ok_or_else(|| AuthError::JwtInvalid("no matching key in jwks".to_string()))?;

        let key = DecodingKey::from_jwk(jwk).map_err(|e| AuthError::JwtInvalid(e.to_string()))?;
        let algorithm = header.alg;
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;

        let data = decode::<Value>(token, &key, &validation)
            .map_err(|e| AuthError::JwtInvalid(e.to_string()))?;
        Ok(data.claims)
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

/// Extracts the permissions array from a JWT claim, accepting either a
/// direct JSON array or a JSON-encoded string holding one (spec.md §4.D).
fn extract_permissions(claims: &Value, claim_key: &str) -> Vec<Permission> {
    let Some(raw) = claims.get(claim_key) else {
        return Vec::new();
    };
    let array = match raw {
        Value::Array(_) => raw.clone(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    let Value::Array(items) = array else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| {
            let action = parse_action(item.get("action")?.as_str()?)?;
            let path = item
                .get("path")
                .and_then(|p| p.as_str())
                .unwrap_or("")
                .to_string();
            Some(Permission { action, path })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_direct_array() {
        let claims = serde_json::json!({
            "perms": [{"action": "read", "path": "cam1"}]
        });
        let perms = extract_permissions(&claims, "perms");
        assert_eq!(perms.len(), 1);
        assert_eq!(perms[0].path, "cam1");
    }

    #[test]
    fn extracts_from_double_encoded_string() {
        let inner = serde_json::json!([{"action": "publish", "path": ""}]).to_string();
        let claims = serde_json::json!({ "perms": inner });
        let perms = extract_permissions(&claims, "perms");
        assert_eq!(perms.len(), 1);
        assert_eq!(perms[0].action, Action::Publish);
    }

    #[test]
    fn missing_claim_yields_no_permissions() {
        let claims = serde_json::json!({});
        assert!(extract_permissions(&claims, "perms").is_empty());
    }
}

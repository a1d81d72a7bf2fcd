//! Credential extraction from an HTTP request envelope (spec.md §6).

use axum::http::HeaderMap;
use base64::Engine;
use mediasrv_core::request::Credentials;

/// Reads `Authorization: Basic ...` / `Authorization: Bearer ...` and the
/// `jwt=` query parameter into a uniform [`Credentials`] value:
/// - Basic: lifted directly into `user`/`pass`.
/// - Bearer whose payload decodes as `user:pass`: treated as basic.
/// - Bearer otherwise, or `jwt=` query param: treated as a JWT `token`.
pub fn extract(headers: &HeaderMap, jwt_query_param: Option<&str>) -> Credentials {
    let mut creds = Credentials::default();

    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(encoded) = auth.strip_prefix("Basic ") {
            if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) {
                if let Ok(text) = String::from_utf8(decoded) {
                    if let Some((user, pass)) = text.split_once(':') {
                        creds.user = Some(user.to_string());
                        creds.pass = Some(pass.to_string());
                        return creds;
                    }
                }
            }
        } else if let Some(payload) = auth.strip_prefix("Bearer ") {
            if let Some((user, pass)) = payload.split_once(':') {
                creds.user = Some(user.to_string());
                creds.pass = Some(pass.to_string());
            } else {
                creds.token = Some(payload.to_string());
            }
            return creds;
        }
    }

    if creds.token.is_none() {
        if let Some(token) = jwt_query_param {
            creds.token = Some(token.to_string());
        }
    }

    creds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn basic_header_lifts_user_and_pass() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("alice:secret");
        let headers = headers_with(&format!("Basic {encoded}"));
        let creds = extract(&headers, None);
        assert_eq!(creds.user.as_deref(), Some("alice"));
        assert_eq!(creds.pass.as_deref(), Some("secret"));
    }

    #[test]
    fn bearer_with_colon_payload_is_treated_as_basic() {
        let headers = headers_with("Bearer alice:secret");
        let creds = extract(&headers, None);
        assert_eq!(creds.user.as_deref(), Some("alice"));
        assert_eq!(creds.pass.as_deref(), Some("secret"));
    }

    #[test]
    fn bearer_without_colon_is_treated_as_jwt() {
        let headers = headers_with("Bearer abc.def.ghi");
        let creds = extract(&headers, None);
        assert_eq!(creds.token.as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn jwt_query_param_is_used_when_no_header_present() {
        let creds = extract(&HeaderMap::new(), Some("abc.def.ghi"));
        assert_eq!(creds.token.as_deref(), Some("abc.def.ghi"));
    }
}

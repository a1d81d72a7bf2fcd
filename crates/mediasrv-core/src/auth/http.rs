//! HTTP callback auth backend (spec.md §4.D, 2).

use reqwest::Client;

use crate::error::AuthError;
use crate::request::{Action, AuthCallbackBody, AuthRequest};

pub struct HttpBackend {
    client: Client,
    url: String,
    exclude: Vec<(Action, String)>,
}

impl HttpBackend {
    pub fn new(url: String, exclude_raw: &[(String, String)]) -> Self {
        let exclude = exclude_raw
            .iter()
            .filter_map(|(a, p)| Some((parse_action(a)?, p.clone())))
            .collect();
        Self {
            client: Client::new(),
            url,
            exclude,
        }
    }

    fn is_excluded(&self, req: &AuthRequest) -> bool {
        self.exclude
            .iter()
            .any(|(a, p)| *a == req.action && p == &req.path_name)
    }

    pub async fn authenticate(&self, req: &AuthRequest) -> Result<(), AuthError> {
        if self.is_excluded(req) {
            return Ok(());
        }
        let body = AuthCallbackBody::from_request(req);
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::CallbackTransport(e.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        tracing::debug!(%status, body = %text, "auth callback rejected request");
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn req(action: Action, path_name: &str) -> AuthRequest {
        AuthRequest {
            action,
            path_name: path_name.to_string(),
            query: String::new(),
            protocol: None,
            session_id: None,
            credentials: Default::default(),
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        }
    }

    #[tokio::test]
    async fn accepts_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(format!("{}/auth", server.uri()), &[]);
        assert!(backend.authenticate(&req(Action::Read, "cam1")).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_on_non_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(format!("{}/auth", server.uri()), &[]);
        assert!(backend.authenticate(&req(Action::Read, "cam1")).await.is_err());
    }

    #[tokio::test]
    async fn excluded_action_path_bypasses_callback() {
        let backend = HttpBackend::new(
            "http://127.0.0.1:1/unreachable".to_string(),
            &[("read".to_string(), "cam1".to_string())],
        );
        assert!(backend.authenticate(&req(Action::Read, "cam1")).await.is_ok());
    }
}

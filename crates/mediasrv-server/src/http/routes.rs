//! Axum router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers::{get_handler, health_check, list_handler, reload_handler, version_check};

/// Creates the Axum router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::RANGE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_check))
        .route("/version", get(version_check))
        .route("/list", get(list_handler))
        .route("/get", get(get_handler))
        .route("/reload", post(reload_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasrv_core::config::{AuthMethod, Config};

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(Config {
            api_addr: "127.0.0.1:9997".to_string(),
            auth: AuthMethod::default(),
            paths: Default::default(),
        }))
    }

    #[tokio::test]
    async fn health_check_responds_ok() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::util::ServiceExt;

        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_returns_not_found_from_list() {
        use axum::body::Body;
        use axum::extract::ConnectInfo;
        use axum::http::{Request, StatusCode};
        use std::net::{Ipv4Addr, SocketAddr};
        use tower::util::ServiceExt;

        let app = create_router(test_state());
        let mut request = Request::builder()
            .uri("/list?path=nope")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(SocketAddr::from((
            Ipv4Addr::LOCALHOST,
            0,
        ))));

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

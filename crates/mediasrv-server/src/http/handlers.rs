//! Playback HTTP API: `/list`, `/get`, plus health and admin reload
//! (spec.md §4.C, §6).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Local};
use mediasrv_core::config::RecordFormat;
use mediasrv_core::error::{CoreError, PathError};
use mediasrv_core::path::manager::resolve;
use mediasrv_core::playback;
use mediasrv_core::request::{Action, AuthRequest};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};
use crate::http::credentials;
use crate::state::AppState;

pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

pub async fn version_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "online",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub path: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub jwt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListEntryJson {
    pub start: String,
    pub duration: f64,
    pub url: String,
}

impl From<playback::ListEntry> for ListEntryJson {
    fn from(entry: playback::ListEntry) -> Self {
        Self {
            start: entry.start.to_rfc3339(),
            duration: entry.duration.as_secs_f64(),
            url: entry.url,
        }
    }
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<ListEntryJson>>> {
    authenticate(&state, &headers, peer, &params.path, params.jwt.as_deref()).await?;

    let effective = resolve_path(&state, &params.path)?;
    let start = params.start.as_deref().map(parse_rfc3339).transpose()?;
    let end = params.end.as_deref().map(parse_rfc3339).transpose()?;
    let path_name = params.path.clone();

    let entries = tokio::task::spawn_blocking(move || {
        playback::list(&effective.record_path, &path_name, start, end)
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))?
    .map_err(ServerError::Core)?;

    Ok(Json(entries.into_iter().map(ListEntryJson::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct GetQuery {
    pub path: String,
    pub start: String,
    pub duration: f64,
    #[serde(default = "default_format")]
    pub format: String,
    pub jwt: Option<String>,
}

fn default_format() -> String {
    "fmp4".to_string()
}

pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<GetQuery>,
) -> Result<Response> {
    authenticate(&state, &headers, peer, &params.path, params.jwt.as_deref()).await?;

    let effective = resolve_path(&state, &params.path)?;
    let start = parse_rfc3339(&params.start)?;
    let duration = Duration::from_secs_f64(params.duration.max(0.0));
    let format = match params.format.as_str() {
        "fmp4" => RecordFormat::Fmp4,
        "mp4" => RecordFormat::Mp4,
        other => return Err(ServerError::BadRequest(format!("unknown format {other:?}"))),
    };

    let cache_key = format!(
        "{}:{}:{}:{}",
        params.path,
        start.to_rfc3339(),
        params.duration,
        params.format
    );
    let path_name = params.path.clone();

    let body = state
        .get_or_generate(cache_key, move || {
            playback::get(&effective.record_path, &path_name, start, duration, format)
        })
        .await
        .map_err(ServerError::Core)?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none"));
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    Ok((response_headers, body).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ReloadRequest {
    pub config_path: String,
}

/// Admin endpoint: reloads configuration from the given path on demand,
/// in addition to the background watcher (spec.md §4.G).
pub async fn reload_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReloadRequest>,
) -> Result<StatusCode> {
    let config = mediasrv_core::config::Config::load(&req.config_path).map_err(ServerError::Core)?;
    state.reload(config).await;
    Ok(StatusCode::NO_CONTENT)
}

fn resolve_path(state: &AppState, path_name: &str) -> Result<mediasrv_core::config::PathConfiguration> {
    let config = state.path_manager.config();
    resolve(&config, path_name)
        .map(|(_, cfg)| cfg)
        .ok_or_else(|| ServerError::Core(CoreError::Path(PathError::NotConfigured(path_name.to_string()))))
}

fn parse_rfc3339(text: &str) -> Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| ServerError::BadRequest(format!("invalid RFC3339 timestamp {text:?}: {e}")))
}

async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    peer: SocketAddr,
    path_name: &str,
    jwt_query_param: Option<&str>,
) -> Result<()> {
    let creds = credentials::extract(headers, jwt_query_param);
    let req = AuthRequest {
        action: Action::Playback,
        path_name: path_name.to_string(),
        query: String::new(),
        protocol: None,
        session_id: None,
        credentials: creds,
        ip: peer.ip(),
    };
    state
        .auth_manager()
        .authenticate(&req, None)
        .await
        .map_err(|e| ServerError::Core(CoreError::Auth(e)))
}

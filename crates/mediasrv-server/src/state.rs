//! Application state shared across all handlers.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use mediasrv_core::auth::AuthManager;
use mediasrv_core::config::Config;
use mediasrv_core::path::manager::PathManager;
use parking_lot::RwLock;
use tokio::sync::OnceCell;

/// State shared across the HTTP layer: the Path Manager (path table +
/// per-path coordinators) and the Auth Manager, which is swapped whole
/// on reload since it has no reload-in-place support of its own.
pub struct AppState {
    pub path_manager: Arc<PathManager>,
    auth_manager: RwLock<Arc<AuthManager>>,

    /// Single-flight `/get` generation, keyed by `path:start:duration:format`,
    /// mirroring the teacher's `segments_in_flight` so concurrent requests
    /// for the same window don't redrive the re-muxer redundantly.
    gets_in_flight: DashMap<String, Arc<OnceCell<Bytes>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let auth_manager = AuthManager::new(&config.auth);
        Self {
            path_manager: Arc::new(PathManager::new(config)),
            auth_manager: RwLock::new(Arc::new(auth_manager)),
            gets_in_flight: DashMap::new(),
        }
    }

    pub fn auth_manager(&self) -> Arc<AuthManager> {
        self.auth_manager.read().clone()
    }

    /// Replaces path config and auth backend together so a single
    /// `/reload` leaves no window where one is stale relative to the
    /// other (spec.md §5 "copy-on-write", §4.G "push... atomically").
    pub async fn reload(&self, new_config: Config) {
        *self.auth_manager.write() = Arc::new(AuthManager::new(&new_config.auth));
        self.path_manager.reload(new_config).await;
        self.gets_in_flight.clear();
    }

    /// Runs `generate` at most once per `key` concurrently; later callers
    /// for the same key await the first call's result instead of
    /// re-driving the re-muxer.
    pub async fn get_or_generate(
        &self,
        key: String,
        generate: impl FnOnce() -> mediasrv_core::error::Result<Vec<u8>> + Send + 'static,
    ) -> mediasrv_core::error::Result<Bytes> {
        let cell = self
            .gets_in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(generate)
                    .await
                    .map_err(|e| mediasrv_core::error::CoreError::BadRequest(e.to_string()))?
                    .map(Bytes::from)
            })
            .await
            .cloned();

        self.gets_in_flight.remove(&key);
        result
    }
}

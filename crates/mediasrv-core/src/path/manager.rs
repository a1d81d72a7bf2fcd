//! Path Manager: resolution, routing, and reload diffing (spec.md §4.F).

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use regex::Regex;

use crate::config::{Config, PathConfiguration, Source};
use crate::error::{CoreError, PathError, Result};

use super::source::{self, SourceDriverFactory};
use super::{spawn, PathHandle};

/// Resolves `path_name` against `config`: exact key first, then
/// `~`-prefixed regex patterns in declaration order, interpolating
/// captures as `$1`, `$2`, ... into the matched template's effective
/// configuration the way `regex::Regex::replace` would (spec.md §4.F).
pub fn resolve<'a>(config: &'a Config, path_name: &'a str) -> Option<(&'a str, PathConfiguration)> {
    if let Some(cfg) = config.paths.get(path_name) {
        return Some((path_name, cfg.clone()));
    }
    for (pattern, cfg) in &config.paths {
        let Some(raw) = pattern.strip_prefix('~') else {
            continue;
        };
        let Ok(re) = Regex::new(raw) else { continue };
        if let Some(caps) = re.captures(path_name) {
            return Some((pattern.as_str(), interpolate(cfg, &caps)));
        }
    }
    None
}

fn interpolate(cfg: &PathConfiguration, caps: &regex::Captures) -> PathConfiguration {
    let mut effective = cfg.clone();
    effective.record_path = interpolate_captures(&cfg.record_path, caps);
    if let Some(Source::StaticUrl { url }) = &cfg.source {
        effective.source = Some(Source::StaticUrl {
            url: interpolate_captures(url, caps),
        });
    }
    effective
}

/// Substitutes `$G<n>` placeholders (spec.md §4.F, §9) with the
/// corresponding regex capture group of `caps`, leaving unmatched
/// placeholders and any other `$`-prefixed text untouched.
fn interpolate_captures(template: &str, caps: &regex::Captures) -> String {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'G') {
            let mut lookahead = chars.clone();
            lookahead.next(); // consume 'G'
            let mut digits = String::new();
            while let Some(d) = lookahead.peek() {
                if d.is_ascii_digit() {
                    digits.push(*d);
                    lookahead.next();
                } else {
                    break;
                }
            }
            if let Ok(index) = digits.parse::<usize>() {
                if let Some(m) = caps.get(index) {
                    out.push_str(m.as_str());
                    chars = lookahead;
                    continue;
                }
            }
            out.push(c);
        } else {
            out.push(c);
        }
    }
    out
}

/// Lazily creates and routes to per-path coordinators, and diffs
/// configuration on reload (spec.md §4.F).
pub struct PathManager {
    config: RwLock<Arc<Config>>,
    handles: DashMap<String, PathHandle>,
    driver_factory: Option<Arc<dyn SourceDriverFactory>>,
}

impl PathManager {
    pub fn new(config: Config) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            handles: DashMap::new(),
            driver_factory: None,
        }
    }

    /// Supplies the factory used to build a [`source::SourceDriver`] for
    /// `Source::StaticUrl` paths (spec.md §4.E). Without one, such paths
    /// behave like `Source::Publisher` and only come up on an explicit
    /// `add_publisher`/`start_publisher` call.
    pub fn with_source_driver_factory(mut self, factory: Arc<dyn SourceDriverFactory>) -> Self {
        self.driver_factory = Some(factory);
        self
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.read().clone()
    }

    /// Routes `path_name` to its coordinator, creating one on demand.
    /// Returns `PathNotConfigured` when no exact or regex entry matches.
    /// A `Source::StaticUrl` path also gets a reconnect-with-backoff task
    /// spawned against its driver the first time it's routed (spec.md
    /// §4.E "Static source driver").
    pub async fn route(&self, path_name: &str) -> Result<PathHandle> {
        if let Some(existing) = self.handles.get(path_name) {
            return Ok(existing.clone());
        }

        let config = self.config();
        let (_, effective) = resolve(&config, path_name)
            .ok_or_else(|| CoreError::Path(PathError::NotConfigured(path_name.to_string())))?;

        let redirect = match &effective.source {
            Some(Source::Redirect { source_path }) => Some(source_path.clone()),
            _ => None,
        };

        let handle = spawn(redirect);
        self.handles.insert(path_name.to_string(), handle.clone());

        if let Some(Source::StaticUrl { url }) = &effective.source {
            if let Some(factory) = &self.driver_factory {
                let driver = factory.build(url);
                let driver_handle = handle.clone();
                tokio::spawn(async move {
                    source::run_with_backoff(driver.as_ref(), &driver_handle).await;
                });
            }
        }

        Ok(handle)
    }

    /// Replaces the configuration. Paths whose pattern disappears from
    /// the new config are shut down; their coordinators finish any
    /// in-flight command before tearing down since `Shutdown` is just
    /// another command in their serial queue (spec.md §4.F).
    pub async fn reload(&self, new_config: Config) {
        let new_config = Arc::new(new_config);
        let mut removed = Vec::new();

        for entry in self.handles.iter() {
            if resolve(&new_config, entry.key()).is_none() {
                removed.push(entry.key().clone());
            }
        }

        *self.config.write() = new_config;

        for path_name in removed {
            if let Some((_, handle)) = self.handles.remove(&path_name) {
                let _ = handle.shutdown().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMethod;
    use std::time::Duration;

    fn config_with(paths: Vec<(&str, PathConfiguration)>) -> Config {
        Config {
            api_addr: "127.0.0.1:9997".to_string(),
            auth: AuthMethod::default(),
            paths: paths.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    #[test]
    fn exact_match_wins_over_regex() {
        let config = config_with(vec![
            ("~^cam.*", PathConfiguration::default()),
            ("cam1", PathConfiguration::default()),
        ]);
        let (matched, _) = resolve(&config, "cam1").unwrap();
        assert_eq!(matched, "cam1");
    }

    #[test]
    fn regex_capture_interpolates_into_record_path() {
        let cfg = PathConfiguration {
            record_path: "recordings/$G1/%Y".to_string(),
            ..Default::default()
        };
        let config = config_with(vec![("~^cam-([0-9]+)$", cfg)]);
        let (_, effective) = resolve(&config, "cam-42").unwrap();
        assert_eq!(effective.record_path, "recordings/42/%Y");
    }

    #[test]
    fn dollar_not_followed_by_g_passes_through() {
        let cfg = PathConfiguration {
            record_path: "recordings/$1/%Y".to_string(),
            ..Default::default()
        };
        let config = config_with(vec![("~^cam-([0-9]+)$", cfg)]);
        let (_, effective) = resolve(&config, "cam-42").unwrap();
        assert_eq!(effective.record_path, "recordings/$1/%Y");
    }

    #[tokio::test]
    async fn route_creates_and_reuses_handle() {
        let config = config_with(vec![("cam1", PathConfiguration::default())]);
        let manager = PathManager::new(config);
        let h1 = manager.route("cam1").await.unwrap();
        let h2 = manager.route("cam1").await.unwrap();
        assert!(h1.describe().await.is_err()); // no publisher yet, but same coordinator
        let _ = h2;
    }

    #[tokio::test]
    async fn unconfigured_path_is_rejected() {
        let config = config_with(vec![]);
        let manager = PathManager::new(config);
        assert!(manager.route("unknown").await.is_err());
    }

    struct CountingFactory {
        attempts: Arc<std::sync::atomic::AtomicUsize>,
    }

    struct CountingDriver {
        attempts: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl super::source::SourceDriver for CountingDriver {
        async fn run(&self, _path: &PathHandle) -> Result<Vec<crate::path::stream::TrackDescriptor>> {
            self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(CoreError::Path(PathError::NoOnePublishing))
        }
    }

    impl super::source::SourceDriverFactory for CountingFactory {
        fn build(&self, _url: &str) -> Arc<dyn super::source::SourceDriver> {
            Arc::new(CountingDriver {
                attempts: self.attempts.clone(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn static_url_path_spawns_source_driver() {
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let factory = Arc::new(CountingFactory {
            attempts: attempts.clone(),
        });
        let cfg = PathConfiguration {
            source: Some(Source::StaticUrl {
                url: "rtsp://example.test/stream".to_string(),
            }),
            ..Default::default()
        };
        let config = config_with(vec![("cam1", cfg)]);
        let manager = PathManager::new(config).with_source_driver_factory(factory);

        manager.route("cam1").await.unwrap();
        tokio::task::yield_now().await;
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert!(attempts.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn publisher_path_never_invokes_driver_factory() {
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let factory = Arc::new(CountingFactory {
            attempts: attempts.clone(),
        });
        let config = config_with(vec![("cam1", PathConfiguration::default())]);
        let manager = PathManager::new(config).with_source_driver_factory(factory);

        manager.route("cam1").await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}

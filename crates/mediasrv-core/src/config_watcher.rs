//! Watches a config file's parent directory so rename-replace editor
//! saves are still observed, rate-limits reload signals, and waits out
//! a short settle delay before each one (spec.md §4.G).

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Minimum spacing between delivered reload signals.
const RATE_LIMIT: Duration = Duration::from_secs(1);
/// Delay after a write event before signaling, to let the writer finish.
const SETTLE_DELAY: Duration = Duration::from_millis(10);

pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

impl ConfigWatcher {
    /// Starts watching the parent directory of `config_path` for
    /// modifications to that specific file (or its target, if a symlink).
    pub fn new(config_path: impl AsRef<Path>) -> notify::Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let parent = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = config_path.file_name().map(|n| n.to_os_string());

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = raw_tx.send(event);
            }
        })?;
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut last_sent: Option<Instant> = None;
            while let Some(event) = raw_rx.recv().await {
                if !is_relevant(&event, file_name.as_deref()) {
                    continue;
                }
                if let Some(last) = last_sent {
                    if last.elapsed() < RATE_LIMIT {
                        continue;
                    }
                }
                tokio::time::sleep(SETTLE_DELAY).await;
                if tx.send(()).await.is_err() {
                    break;
                }
                last_sent = Some(Instant::now());
            }
        });

        Ok(Self { _watcher: watcher, rx })
    }

    /// Awaits the next rate-limited reload signal.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

fn is_relevant(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    if !matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    match file_name {
        Some(name) => event.paths.iter().any(|p| p.file_name() == Some(name)),
        None => true,
    }
}

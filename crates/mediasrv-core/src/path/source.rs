//! Static source driver: connects a path whose `source` is a URL,
//! reconnecting with backoff on failure (spec.md §4.E "Static source
//! driver").

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::stream::TrackDescriptor;
use super::PathHandle;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Implemented per protocol (RTSP pull, HLS pull, ...); out of scope
/// for this crate beyond the trait boundary (wire protocols are not
/// implemented here).
#[async_trait]
pub trait SourceDriver: Send + Sync {
    /// Connects, parses media descriptions, and pumps data into the
    /// given path until disconnected or cancelled. Returns the tracks
    /// it was able to negotiate on success, or an error to trigger a
    /// reconnect with backoff.
    async fn run(&self, path: &PathHandle) -> crate::error::Result<Vec<TrackDescriptor>>;
}

/// Builds a [`SourceDriver`] for a `Source::StaticUrl` path's configured
/// URL. Concrete protocols (RTSP pull, HLS pull, ...) live outside this
/// crate; the Path Manager calls through this factory so that spawning
/// the reconnect loop stays generic (spec.md §4.E "Static source driver").
pub trait SourceDriverFactory: Send + Sync {
    fn build(&self, url: &str) -> Arc<dyn SourceDriver>;
}

/// Runs `driver` against `path` forever, doubling the backoff delay
/// after each failure up to [`MAX_BACKOFF`] and resetting it after a
/// success (spec.md §4.E "reconnect after a backoff").
pub async fn run_with_backoff(driver: &dyn SourceDriver, path: &PathHandle) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match driver.run(path).await {
            Ok(_tracks) => {
                backoff = INITIAL_BACKOFF;
            }
            Err(e) => {
                tracing::warn!(error = %e, delay_ms = backoff.as_millis(), "static source failed, reconnecting");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FlakyDriver {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SourceDriver for FlakyDriver {
        async fn run(&self, _path: &PathHandle) -> crate::error::Result<Vec<TrackDescriptor>> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(crate::error::CoreError::Path(crate::error::PathError::NoOnePublishing))
            } else {
                Err(crate::error::CoreError::ClientDisconnected) // force the test to observe >=3 attempts then stop
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_growing_backoff() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let driver = FlakyDriver {
            attempts: attempts.clone(),
        };
        let path = super::super::spawn(None);

        let task = tokio::spawn(async move {
            run_with_backoff(&driver, &path).await;
        });

        tokio::task::yield_now().await;
        for _ in 0..10 {
            tokio::time::advance(Duration::from_millis(500)).await;
        }
        assert!(attempts.load(Ordering::SeqCst) >= 3);
        task.abort();
    }
}

//! `Stream` (§3.1): a single upstream transcoding session and its lifecycle
//! state. Grounded on `dog4ik-media-server/src/watch/hls_stream/job.rs`'s
//! child lifecycle (`child.kill().await`, background ticker tasks) and the
//! teacher's `main.rs` graceful-shutdown use of a per-task cancellation
//! signal.

pub mod registry;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

const SELF_DESTRUCT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

struct StreamInner {
    seek_start_segment: usize,
    has_child: bool,
    /// Bumped on every `adopt_child`/`kill_transcoder`, so a child-exit
    /// watcher from a superseded spawn can tell it's been replaced and must
    /// not clobber the newer one's bookkeeping.
    generation: u64,
    kill_signal: Option<CancellationToken>,
    self_destruct: Option<JoinHandle<()>>,
}

/// A single live (or dying) RTSP→HLS transcoding session, keyed by its
/// opaque `identifier`. Shared behind an `Arc` between the registry, the
/// poller, and its own self-destruct ticker.
pub struct StreamHandle {
    pub identifier: String,
    pub source_url: String,
    inner: Mutex<StreamInner>,
    last_activity: Mutex<Instant>,
    finished: AtomicBool,
    on_finish: Box<dyn Fn() + Send + Sync>,
}

impl StreamHandle {
    pub fn new(
        identifier: String,
        source_url: String,
        on_finish: impl Fn() + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            identifier,
            source_url,
            inner: Mutex::new(StreamInner {
                seek_start_segment: 0,
                has_child: false,
                generation: 0,
                kill_signal: None,
                self_destruct: None,
            }),
            last_activity: Mutex::new(Instant::now()),
            finished: AtomicBool::new(false),
            on_finish: Box::new(on_finish),
        })
    }

    /// Resets the inactivity clock. Called on every admitted request that
    /// touches this stream (§4.4 step 2).
    pub async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    pub async fn seek_start_segment(&self) -> usize {
        self.inner.lock().await.seek_start_segment
    }

    pub async fn has_live_transcoder(&self) -> bool {
        self.inner.lock().await.has_child
    }

    /// Records a freshly spawned transcoder child as this stream's current
    /// one (the caller is responsible for having already killed any
    /// previous child via [`kill_transcoder`]) and installs a background
    /// watcher that awaits its exit.
    ///
    /// §4.1 step 4: on a clean (status-success) exit this tears the whole
    /// `Stream` down (natural end-of-stream); on any other exit it just
    /// clears the transcoder handle so the next `/segment.ts` request
    /// triggers a respawn (§4.4 scenario 6) instead of polling forever.
    pub async fn adopt_child(self: &Arc<Self>, mut child: Child, seek_start_segment: usize, config: &'static Config) {
        let kill_signal = CancellationToken::new();
        let generation = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.has_child = true;
            inner.seek_start_segment = seek_start_segment;
            inner.kill_signal = Some(kill_signal.clone());
            inner.generation
        };

        let stream = Arc::clone(self);
        let transcode_dir = config.transcode_dir.clone();
        tokio::spawn(async move {
            let exit = tokio::select! {
                _ = kill_signal.cancelled() => {
                    let _ = child.kill().await;
                    None
                }
                status = child.wait() => Some(status),
            };

            let ticker = {
                let mut inner = stream.inner.lock().await;
                if inner.generation != generation {
                    // A restart already replaced this child; its own
                    // kill_transcoder()/adopt_child() own the bookkeeping.
                    return;
                }
                inner.has_child = false;
                inner.kill_signal = None;
                inner.self_destruct.take()
            };
            if let Some(ticker) = ticker {
                ticker.abort();
            }

            match exit {
                Some(Ok(status)) if status.success() => {
                    tracing::info!(identifier = %stream.identifier, "transcoder finished, tearing down stream");
                    stream.kill(true, &transcode_dir).await;
                }
                Some(Ok(status)) => {
                    tracing::warn!(identifier = %stream.identifier, %status, "transcoder exited with error");
                }
                Some(Err(err)) => {
                    tracing::warn!(identifier = %stream.identifier, "error waiting on transcoder: {err}");
                }
                None => {}
            }
        });
    }

    pub async fn set_seek_start_segment(&self, segment: usize) {
        self.inner.lock().await.seek_start_segment = segment;
    }

    /// Kills the running transcoder, if any, and cancels its self-destruct
    /// ticker. Leaves the `Stream` itself intact, for the restart-on-seek
    /// path (§4.4).
    pub async fn kill_transcoder(&self) {
        let (kill_signal, ticker) = {
            let mut inner = self.inner.lock().await;
            inner.has_child = false;
            inner.generation += 1;
            (inner.kill_signal.take(), inner.self_destruct.take())
        };
        if let Some(signal) = kill_signal {
            signal.cancel();
        }
        if let Some(ticker) = ticker {
            ticker.abort();
        }
    }

    /// Idempotent teardown: kills the transcoder, optionally sweeps every
    /// file under `transcode_dir` prefixed by this stream's identifier, and
    /// fires `on_finish` exactly once. Safe to call concurrently from both
    /// the self-destruct ticker and an explicit shutdown.
    pub async fn kill(&self, remove_files: bool, transcode_dir: &Path) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.kill_transcoder().await;
        if remove_files {
            if let Err(err) = remove_stream_files(transcode_dir, &self.identifier).await {
                tracing::warn!(identifier = %self.identifier, "failed to clean up stream files: {err}");
            }
        }
        (self.on_finish)();
    }

    /// Installs the periodic self-destruct check, replacing any previous
    /// ticker. Called once after every successful spawn (initial or
    /// restart-on-seek).
    pub async fn start_self_destructor(self: &Arc<Self>, config: &'static Config) {
        let stream = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(SELF_DESTRUCT_CHECK_INTERVAL);
            loop {
                ticker.tick().await;
                let idle_for = stream.last_activity.lock().await.elapsed();
                if idle_for > Duration::from_secs(config.self_destruct_duration) {
                    tracing::info!(
                        identifier = %stream.identifier,
                        idle_secs = idle_for.as_secs(),
                        "self-destructing idle stream"
                    );
                    stream.kill(true, &config.transcode_dir).await;
                    return;
                }
            }
        });
        self.inner.lock().await.self_destruct = Some(handle);
    }
}

async fn remove_stream_files(transcode_dir: &Path, identifier: &str) -> std::io::Result<()> {
    let mut dir = tokio::fs::read_dir(transcode_dir).await?;
    while let Some(entry) = dir.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if name.starts_with(identifier) {
            if let Err(err) = tokio::fs::remove_file(entry.path()).await {
                tracing::warn!(file = %name, "failed to remove stream file: {err}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn kill_fires_on_finish_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let stream = StreamHandle::new(
            "deadbeef".to_string(),
            "rtsp://example/stream".to_string(),
            move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
        );

        let dir = std::env::temp_dir();
        stream.kill(false, &dir).await;
        stream.kill(false, &dir).await;
        stream.kill(false, &dir).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn touch_resets_activity_clock() {
        let stream = StreamHandle::new(
            "deadbeef".to_string(),
            "rtsp://example/stream".to_string(),
            || {},
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.touch().await;
        let elapsed = stream.last_activity.lock().await.elapsed();
        assert!(elapsed < Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn self_destructs_after_idle_duration() {
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = Arc::clone(&finished);
        let stream = StreamHandle::new(
            "idlestrm".to_string(),
            "rtsp://example/stream".to_string(),
            move || {
                finished_clone.store(true, Ordering::SeqCst);
            },
        );

        let dir = tempdir_path();
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let config = Box::leak(Box::new(Config {
            self_destruct_duration: 1,
            transcode_dir: dir.clone(),
            ..Config::default()
        }));

        stream.start_self_destructor(config).await;
        tokio::time::advance(Duration::from_secs(7)).await;
        tokio::time::advance(Duration::from_secs(7)).await;

        assert!(finished.load(Ordering::SeqCst));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    fn leaked_config(transcode_dir: std::path::PathBuf) -> &'static Config {
        Box::leak(Box::new(Config { transcode_dir, ..Config::default() }))
    }

    #[tokio::test]
    async fn crash_clears_handle_without_tearing_down() {
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = Arc::clone(&finished);
        let stream = StreamHandle::new(
            "crshtest".to_string(),
            "rtsp://example/stream".to_string(),
            move || {
                finished_clone.store(true, Ordering::SeqCst);
            },
        );

        let dir = tempdir_path();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let config = leaked_config(dir.clone());

        let child = tokio::process::Command::new("sh")
            .args(["-c", "exit 1"])
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        stream.adopt_child(child, 0, config).await;

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!stream.has_live_transcoder().await);
        assert!(!finished.load(Ordering::SeqCst));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn natural_end_of_stream_tears_down() {
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = Arc::clone(&finished);
        let stream = StreamHandle::new(
            "eostest1".to_string(),
            "rtsp://example/stream".to_string(),
            move || {
                finished_clone.store(true, Ordering::SeqCst);
            },
        );

        let dir = tempdir_path();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let config = leaked_config(dir.clone());

        let child = tokio::process::Command::new("sh")
            .args(["-c", "exit 0"])
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        stream.adopt_child(child, 0, config).await;

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(finished.load(Ordering::SeqCst));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    fn tempdir_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("rtsp-hls-gateway-stream-test-{}", uuid::Uuid::new_v4()))
    }
}

pub mod event;
pub mod state;

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecursiveMode, Watcher as _};
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;

use crate::config::{DEFAULT_DEBOUNCE_MS, WatchConfig};
use crate::event::EventBus;
use crate::event::normalize;
use crate::walker::PathFilter;
use event::RawEvent;
use state::WatchState;

/// Handle to a running watcher. Keeps the debouncer alive (dropping stops watching).
pub struct WatcherHandle {
    /// Keep alive: dropping the debouncer stops the OS watcher.
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    /// The bridge task classifying debounced paths and forwarding raw events.
    _bridge_task: JoinHandle<()>,
}

/// Knobs for one watch subscription.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub debounce: Duration,
    /// Report every pre-existing entry as added when the watch starts.
    pub initial_scan: bool,
    pub filter: PathFilter,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            initial_scan: true,
            filter: PathFilter::default(),
        }
    }
}

impl WatchOptions {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)),
            initial_scan: config.initial_scan.unwrap_or(true),
            filter: PathFilter::from_config(config),
        }
    }
}

/// Start a debounced file watcher on `watch_root`.
///
/// Returns a `WatcherHandle` (must be kept alive) and a tokio mpsc receiver
/// that yields classified `RawEvent`s. The sequence never ends on its own;
/// it stops when the handle is dropped.
///
/// The OS watch is armed before the initial scan, so a change racing the scan
/// is reported at least once.
pub fn start_watcher(
    watch_root: &Path,
    options: WatchOptions,
) -> anyhow::Result<(WatcherHandle, tokio_mpsc::Receiver<RawEvent>)> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<DebounceEventResult>();

    let mut debouncer = new_debouncer(options.debounce, move |res| {
        let _ = std_tx.send(res);
    })?;
    debouncer
        .watcher()
        .watch(watch_root, RecursiveMode::Recursive)?;

    let (tokio_tx, tokio_rx) = tokio_mpsc::channel::<RawEvent>(256);

    // Bridge: spawn_blocking to receive from std channel, classify, forward to tokio
    let root = watch_root.to_path_buf();
    let bridge_task = tokio::task::spawn_blocking(move || {
        let mut state = WatchState::new(root, options.filter);

        for raw in state.scan(options.initial_scan) {
            if tokio_tx.blocking_send(raw).is_err() {
                return;
            }
        }
        tracing::debug!(entries = state.len(), "watcher initial scan done");

        while let Ok(result) = std_rx.recv() {
            match result {
                Ok(events) => {
                    let mut paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                    // Parents before children, each path once.
                    paths.sort_by(|a, b| {
                        a.components()
                            .count()
                            .cmp(&b.components().count())
                            .then_with(|| a.cmp(b))
                    });
                    paths.dedup();

                    for path in paths {
                        for raw in state.observe(&path) {
                            tracing::debug!(kind = ?raw.kind, path = %raw.path.display(), "watch");
                            if tokio_tx.blocking_send(raw).is_err() {
                                return; // receiver dropped, shutdown
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = ?err, "watcher error");
                }
            }
        }
    });

    Ok((
        WatcherHandle {
            _debouncer: debouncer,
            _bridge_task: bridge_task,
        },
        tokio_rx,
    ))
}

/// A watcher wired to the event bus: raw events are normalized and published
/// until [`WatchPipeline::stop`] is called or the pipeline is dropped.
///
/// Restarting is just spawning a new pipeline; with `initial_scan` on, the
/// new one re-reports everything that already exists.
pub struct WatchPipeline {
    handle: Option<WatcherHandle>,
    forward: JoinHandle<()>,
}

impl WatchPipeline {
    pub fn spawn(root: &Path, options: WatchOptions, bus: EventBus) -> anyhow::Result<Self> {
        let (handle, mut rx) = start_watcher(root, options)?;
        let root = root.to_path_buf();
        let forward = tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                bus.publish(normalize::from_raw(&root, raw));
            }
        });
        tracing::info!("watching for external changes");
        Ok(Self {
            handle: Some(handle),
            forward,
        })
    }

    pub fn stop(&mut self) {
        self.handle.take();
        self.forward.abort();
    }
}

impl Drop for WatchPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

use std::path::Path;

use serde::Deserialize;

/// File name looked up in the managed root when no `--config` is given.
/// Dot-prefixed so the watcher never reports it.
pub const CONFIG_FILE: &str = ".treecast.toml";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_NOTIFY_PORT: u16 = 6875;
pub const DEFAULT_NAMESPACE: &str = "box-clone";
pub const DEFAULT_CATEGORY: &str = "clients";
pub const DEFAULT_BUS_CAPACITY: usize = 1024;
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 256;
pub const DEFAULT_DEBOUNCE_MS: u64 = 75;

/// Configuration loaded from `.treecast.toml`.
///
/// Every key is optional; command-line flags and environment variables take
/// precedence over what is set here.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct TreecastConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// `[server]` section: the HTTP request surface.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// `[notify]` section: the TCP notification channel.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    pub port: Option<u16>,
    /// First element of every wire envelope.
    pub namespace: Option<String>,
    /// Second element of every wire envelope.
    pub category: Option<String>,
    /// Event bus capacity before slow consumers start lagging.
    pub buffer: Option<usize>,
    /// Frames queued per subscriber before it is dropped as too slow.
    pub subscriber_queue: Option<usize>,
}

/// `[watch]` section: the filesystem watcher.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    pub enabled: Option<bool>,
    pub debounce_ms: Option<u64>,
    /// Report every pre-existing entry as added when the watcher (re)starts.
    pub initial_scan: Option<bool>,
    /// Glob patterns excluded from watching, on top of dot-prefixed entries.
    pub exclude: Option<Vec<String>>,
}

impl TreecastConfig {
    /// Load configuration from `path`.
    ///
    /// Returns a default (empty) configuration if the file does not exist or
    /// cannot be parsed.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to parse config; using defaults");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read config; using defaults");
                Self::default()
            }
        }
    }

    /// Load `.treecast.toml` from the managed root.
    pub fn load_from_root(root: &Path) -> Self {
        Self::load(&root.join(CONFIG_FILE))
    }
}

//! Wires the pieces together: one event bus, the executor behind the HTTP
//! surface, the notification channel, and the optional watcher.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tokio::net::TcpListener;

use crate::channel::wire::WireFormat;
use crate::channel::{ChannelOptions, NotificationChannel};
use crate::cli::ServeArgs;
use crate::config::{
    DEFAULT_BUS_CAPACITY, DEFAULT_CATEGORY, DEFAULT_HOST, DEFAULT_NAMESPACE, DEFAULT_NOTIFY_PORT,
    DEFAULT_PORT, DEFAULT_SUBSCRIBER_QUEUE, TreecastConfig,
};
use crate::event::EventBus;
use crate::executor::Executor;
use crate::http;
use crate::resolver::Resolver;
use crate::watcher::{WatchOptions, WatchPipeline};

/// Effective settings after merging command line, environment, config file
/// and defaults, in that order of precedence.
#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub host: String,
    pub port: u16,
    pub notify_port: u16,
    pub bus_capacity: usize,
    pub channel: ChannelOptions,
    /// `None` disables the watcher.
    pub watch: Option<WatchOptions>,
}

impl Settings {
    pub fn resolve(args: &ServeArgs) -> Result<Self> {
        let root = match &args.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("cannot determine current directory")?,
        };
        let root = canonical_root(&root)?;

        let config = match &args.config {
            Some(path) => {
                if !path.is_file() {
                    bail!("config file {} does not exist", path.display());
                }
                TreecastConfig::load(path)
            }
            None => TreecastConfig::load_from_root(&root),
        };

        Ok(Self::merge(root, args, &config))
    }

    fn merge(root: PathBuf, args: &ServeArgs, config: &TreecastConfig) -> Self {
        let notify = &config.notify;
        let watch_enabled = !args.no_watch && config.watch.enabled.unwrap_or(true);

        Self {
            host: args
                .host
                .clone()
                .or_else(|| config.server.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: args.port.or(config.server.port).unwrap_or(DEFAULT_PORT),
            notify_port: args
                .notify_port
                .or(notify.port)
                .unwrap_or(DEFAULT_NOTIFY_PORT),
            bus_capacity: notify.buffer.unwrap_or(DEFAULT_BUS_CAPACITY).max(1),
            channel: ChannelOptions {
                wire: WireFormat {
                    namespace: notify
                        .namespace
                        .clone()
                        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
                    category: notify
                        .category
                        .clone()
                        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                },
                subscriber_queue: notify.subscriber_queue.unwrap_or(DEFAULT_SUBSCRIBER_QUEUE),
            },
            watch: watch_enabled.then(|| WatchOptions::from_config(&config.watch)),
            root,
        }
    }
}

fn canonical_root(dir: &Path) -> Result<PathBuf> {
    let root = dir
        .canonicalize()
        .with_context(|| format!("cannot open directory {}", dir.display()))?;
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    Ok(root)
}

/// A bound but not yet running server.
///
/// Both listeners are open once [`Server::bind`] returns, so callers can read
/// the actual addresses (useful with port 0) before calling [`Server::run`].
pub struct Server {
    root: PathBuf,
    executor: Executor,
    http_listener: TcpListener,
    http_addr: SocketAddr,
    channel: NotificationChannel,
    watcher: Option<WatchPipeline>,
}

impl Server {
    pub async fn bind(settings: Settings) -> Result<Self> {
        let bus = EventBus::new(settings.bus_capacity);
        let executor = Executor::new(Resolver::new(settings.root.clone()), bus.clone());

        let http_listener = TcpListener::bind((settings.host.as_str(), settings.port))
            .await
            .with_context(|| {
                format!("failed to bind HTTP on {}:{}", settings.host, settings.port)
            })?;
        let http_addr = http_listener.local_addr()?;

        let notify_listener = TcpListener::bind((settings.host.as_str(), settings.notify_port))
            .await
            .with_context(|| {
                format!(
                    "failed to bind notification channel on {}:{}",
                    settings.host, settings.notify_port
                )
            })?;
        let channel = NotificationChannel::serve(notify_listener, &bus, settings.channel)
            .context("notification channel listener")?;

        // Subscribed after the channel so the initial scan reaches the hub.
        let watcher = match settings.watch {
            Some(options) => Some(WatchPipeline::spawn(&settings.root, options, bus.clone())?),
            None => {
                tracing::info!("watcher disabled");
                None
            }
        };

        Ok(Self {
            root: settings.root,
            executor,
            http_listener,
            http_addr,
            channel,
            watcher,
        })
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn notify_addr(&self) -> SocketAddr {
        self.channel.local_addr()
    }

    pub fn subscriber_count(&self) -> usize {
        self.channel.subscriber_count()
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(?err, "failed to install Ctrl-C handler");
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves, then stop the watcher and close every
    /// subscriber connection.
    pub async fn run_until(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let Self {
            root,
            executor,
            http_listener,
            http_addr,
            channel,
            mut watcher,
        } = self;

        tracing::info!(
            root = %root.display(),
            http = %http_addr,
            notify = %channel.local_addr(),
            "serving"
        );

        axum::serve(http_listener, http::router(executor))
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("shutting down");
            })
            .await
            .context("HTTP server failed")?;

        if let Some(watcher) = watcher.as_mut() {
            watcher.stop();
        }
        channel.shutdown();
        Ok(())
    }
}

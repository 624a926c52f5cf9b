use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Serve a directory tree over HTTP and push live change notifications.
///
/// Clients read, create, replace and delete files through plain HTTP verbs;
/// every change, whether it came through HTTP or straight from disk, is pushed
/// to subscribers connected to the notification port.
#[derive(Parser, Debug)]
#[command(
    name = "treecast",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Log output format.
#[derive(Clone, Copy, Debug, ValueEnum, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines on stderr (default).
    #[default]
    Text,
    /// One JSON object per line on stderr.
    Json,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log level or filter directive (e.g. "debug" or "treecast=trace"). RUST_LOG wins when set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve a directory over HTTP and broadcast its changes.
    Serve(ServeArgs),

    /// Connect to a notification channel and print every event received.
    Listen {
        /// Address of the notification channel.
        #[arg(default_value = "127.0.0.1:6875")]
        addr: SocketAddr,

        /// Print the raw JSON envelope instead of a one-line summary.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Directory to expose. Defaults to the current directory.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Interface the HTTP server binds to.
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// HTTP port.
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// TCP port of the notification channel.
    #[arg(long, env = "TCP_PORT")]
    pub notify_port: Option<u16>,

    /// Do not watch the directory for changes made by other processes.
    #[arg(long)]
    pub no_watch: bool,

    /// Config file. Defaults to `.treecast.toml` inside the served directory.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

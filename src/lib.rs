//! Serve a directory tree over HTTP and push every change made to it, through
//! HTTP or by any other process, to subscribers on a TCP notification channel.

pub mod channel;
pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod http;
pub mod logging;
pub mod output;
pub mod resolver;
pub mod server;
pub mod walker;
pub mod watcher;

pub use error::{FsError, FsResult};
pub use event::{ChangeEvent, ChangeKind, EventBus, TargetKind};
pub use server::{Server, Settings};

use std::io;
use std::path::{Path, PathBuf};

/// Failure of a single filesystem request.
///
/// Every variant is local to the request that produced it: the HTTP layer turns
/// it into a status code, the watcher logs it and moves on.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// The request path escapes the managed root (or targets the root where that is not allowed).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The operation needs an existing entry and there is none.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// Create never overwrites.
    #[error("the file or directory exists: {0}")]
    AlreadyExists(String),

    /// The operation needs a file and found a directory.
    #[error("is a directory: {0}")]
    IsDirectory(String),

    /// Anything the OS refused for its own reasons (permissions, disk full, ...).
    #[error("i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Map an `io::Error` raised while touching `path`.
    ///
    /// `rel` is the root-relative spelling used in messages so that absolute
    /// paths never reach a client through the typed variants.
    pub fn from_io(err: io::Error, path: &Path, rel: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(rel.to_string()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(rel.to_string()),
            io::ErrorKind::IsADirectory => Self::IsDirectory(rel.to_string()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

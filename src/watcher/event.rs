use std::io;
use std::path::PathBuf;

/// Raw watcher observation kinds, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    FileAdded,
    FileChanged,
    DirAdded,
    FileRemoved,
    DirRemoved,
}

impl RawKind {
    /// Only additions and changes of files carry content.
    pub fn reads_content(self) -> bool {
        matches!(self, Self::FileAdded | Self::FileChanged)
    }
}

/// One classified filesystem change, carrying an absolute path.
///
/// `content` is `Some` for `FileAdded`/`FileChanged` and holds the outcome of
/// reading the file at observation time; a failed read is kept as the error so
/// the normalizer can decide what to do with it.
#[derive(Debug)]
pub struct RawEvent {
    pub kind: RawKind,
    pub path: PathBuf,
    pub content: Option<io::Result<String>>,
}

impl RawEvent {
    pub fn new(kind: RawKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            content: None,
        }
    }

    pub fn with_content(kind: RawKind, path: PathBuf, content: io::Result<String>) -> Self {
        Self {
            kind,
            path,
            content: Some(content),
        }
    }
}

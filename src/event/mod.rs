pub mod bus;
pub mod normalize;

use std::time::{SystemTime, UNIX_EPOCH};

pub use bus::EventBus;

/// What happened to the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// Verb used on the notification wire (`put` / `post` / `delete`).
    pub fn verb(self) -> &'static str {
        match self {
            Self::Created => "put",
            Self::Updated => "post",
            Self::Deleted => "delete",
        }
    }

    pub fn from_verb(verb: &str) -> Option<Self> {
        match verb {
            "put" => Some(Self::Created),
            "post" => Some(Self::Updated),
            "delete" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Whether the changed entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    File,
    Directory,
}

impl TargetKind {
    pub fn is_dir(self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// Canonical notification for one filesystem mutation, whichever producer saw it.
///
/// Built once, published once, never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    kind: ChangeKind,
    target: TargetKind,
    path: String,
    content: Option<String>,
    timestamp: u64,
}

impl ChangeEvent {
    /// Stamp a new event with the current wall-clock time.
    pub fn new(kind: ChangeKind, target: TargetKind, path: String, content: Option<String>) -> Self {
        Self::with_timestamp(kind, target, path, content, now_millis())
    }

    pub fn with_timestamp(
        kind: ChangeKind,
        target: TargetKind,
        path: String,
        content: Option<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            kind,
            target,
            path,
            content,
            timestamp,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn target(&self) -> TargetKind {
        self.target
    }

    /// Root-relative path (`/a/b.txt`).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! Shape translation into [`ChangeEvent`].
//!
//! Both producers go through here so a request-triggered mutation and the same
//! mutation seen by the watcher look identical to subscribers.

use std::path::Path;

use super::{ChangeEvent, ChangeKind, TargetKind};
use crate::resolver::{self, ManagedPath};
use crate::watcher::event::{RawEvent, RawKind};

/// Canonical kind pair for a raw watcher kind.
pub fn classify(kind: RawKind) -> (ChangeKind, TargetKind) {
    match kind {
        RawKind::FileAdded => (ChangeKind::Created, TargetKind::File),
        RawKind::FileChanged => (ChangeKind::Updated, TargetKind::File),
        RawKind::DirAdded => (ChangeKind::Created, TargetKind::Directory),
        RawKind::FileRemoved => (ChangeKind::Deleted, TargetKind::File),
        RawKind::DirRemoved => (ChangeKind::Deleted, TargetKind::Directory),
    }
}

/// Normalize a watcher observation.
///
/// Never fails: an unreadable file yields an event without content.
pub fn from_raw(root: &Path, raw: RawEvent) -> ChangeEvent {
    let (kind, target) = classify(raw.kind);
    let path = resolver::relativize(root, &raw.path).unwrap_or_else(|| {
        // The OS watcher only reports paths below the root; keep the name alone
        // rather than leak an absolute path if that ever changes.
        tracing::warn!(path = %raw.path.display(), "watched path outside managed root");
        let name = raw
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("/{name}")
    });

    let content = match raw.content {
        Some(Ok(text)) => Some(text),
        Some(Err(err)) => {
            tracing::warn!(%path, error = %err, "content read failed; publishing without body");
            None
        }
        None => None,
    };

    ChangeEvent::new(kind, target, path, content)
}

/// Normalize a confirmed executor mutation.
pub fn from_request(
    kind: ChangeKind,
    target: TargetKind,
    path: &ManagedPath,
    content: Option<String>,
) -> ChangeEvent {
    ChangeEvent::new(kind, target, path.relative().to_string(), content)
}

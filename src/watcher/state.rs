use std::collections::BTreeMap;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::event::TargetKind;
use crate::walker::{self, EntryKind, PathFilter};

use super::event::{RawEvent, RawKind};

/// Table of entries the watcher has already reported, used to turn bare
/// "something happened at this path" notifications into typed raw events.
///
/// The debouncer only says *which* path changed. Whether that is an addition,
/// a change or a removal, and whether a removed path was a file or a
/// directory, is decided against this table.
///
/// Files are remembered with their size and modification time. The OS also
/// notifies opens and reads, including the read done here to attach the new
/// content, so a notification that leaves both unchanged is dropped.
#[derive(Debug)]
pub struct WatchState {
    root: PathBuf,
    filter: PathFilter,
    known: BTreeMap<PathBuf, Known>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Known {
    kind: TargetKind,
    /// `None` for directories.
    stamp: Option<Stamp>,
}

/// Size and modification time.
type Stamp = (u64, Option<SystemTime>);

impl Known {
    /// `meta` must describe the link target, not the link.
    fn of(meta: &Metadata) -> Self {
        if meta.is_dir() {
            Self {
                kind: TargetKind::Directory,
                stamp: None,
            }
        } else {
            Self {
                kind: TargetKind::File,
                stamp: Some((meta.len(), meta.modified().ok())),
            }
        }
    }
}

impl WatchState {
    pub fn new(root: PathBuf, filter: PathFilter) -> Self {
        Self {
            root,
            filter,
            known: BTreeMap::new(),
        }
    }

    pub fn known(&self, path: &Path) -> Option<TargetKind> {
        self.known.get(path).map(|k| k.kind)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Rebuild the table from disk.
    ///
    /// With `emit` set, every visible entry is reported as added (parents
    /// first), which is what a freshly (re)started watch looks like to
    /// consumers.
    pub fn scan(&mut self, emit: bool) -> Vec<RawEvent> {
        self.known.clear();
        let mut out = Vec::new();
        for entry in walker::walk_visible(&self.root, &self.filter) {
            self.admit(entry.path, entry.kind, emit, &mut out);
        }
        out
    }

    /// Classify a path reported by the OS watcher.
    pub fn observe(&mut self, path: &Path) -> Vec<RawEvent> {
        let mut out = Vec::new();
        if path == self.root || self.filter.is_excluded(&self.root, path) {
            return out;
        }

        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => std::fs::metadata(path),
            other => other,
        };
        let meta = match meta {
            Ok(meta) => meta,
            // Gone, or a link whose target is gone.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.forget(path, &mut out);
                return out;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot stat watched path");
                return out;
            }
        };

        // A path under a directory we never saw: report from the topmost unseen
        // ancestor down so consumers get the parent before the child.
        if let Some(ancestor) = self.topmost_unknown_ancestor(path) {
            self.admit_dir(ancestor, &mut out);
            return out;
        }

        let now = Known::of(&meta);
        match (self.known.get(path).copied(), now.kind) {
            (None, TargetKind::File) => {
                self.known.insert(path.to_path_buf(), now);
                out.push(file_event(RawKind::FileAdded, path));
            }
            (Some(before), TargetKind::File) if before.kind == TargetKind::File => {
                if before.stamp != now.stamp {
                    self.known.insert(path.to_path_buf(), now);
                    out.push(file_event(RawKind::FileChanged, path));
                }
            }
            (None, TargetKind::Directory) => self.admit_dir(path.to_path_buf(), &mut out),
            (Some(before), TargetKind::Directory) if before.kind == TargetKind::Directory => {}
            (Some(_), _) => {
                // Same name, different kind: the old entry is gone.
                self.forget(path, &mut out);
                match now.kind {
                    TargetKind::Directory => self.admit_dir(path.to_path_buf(), &mut out),
                    TargetKind::File => {
                        self.known.insert(path.to_path_buf(), now);
                        out.push(file_event(RawKind::FileAdded, path));
                    }
                }
            }
        }
        out
    }

    /// Report a new directory and everything already inside it. Files written
    /// into a fresh directory can land before the OS watch on it exists.
    fn admit_dir(&mut self, dir: PathBuf, out: &mut Vec<RawEvent>) {
        let children = walker::walk_visible(&dir, &PathFilter::default());
        self.admit(dir, EntryKind::Dir, true, out);
        for entry in children {
            if self.filter.is_excluded(&self.root, &entry.path) {
                continue;
            }
            self.admit(entry.path, entry.kind, true, out);
        }
    }

    fn admit(&mut self, path: PathBuf, kind: EntryKind, emit: bool, out: &mut Vec<RawEvent>) {
        let known = match kind {
            EntryKind::Dir => Known {
                kind: TargetKind::Directory,
                stamp: None,
            },
            // Links are reported by what they point at, without descending.
            EntryKind::File | EntryKind::Symlink => match std::fs::metadata(&path) {
                Ok(meta) => Known::of(&meta),
                Err(_) => return,
            },
        };
        if self.known.insert(path.clone(), known).is_some() || !emit {
            return;
        }
        match known.kind {
            TargetKind::Directory => out.push(RawEvent::new(RawKind::DirAdded, path)),
            TargetKind::File => out.push(file_event(RawKind::FileAdded, &path)),
        }
    }

    /// Drop `path` and everything known below it, reporting removals deepest first.
    fn forget(&mut self, path: &Path, out: &mut Vec<RawEvent>) {
        let gone: Vec<(PathBuf, TargetKind)> = self
            .known
            .range(path.to_path_buf()..)
            .take_while(|(p, _)| p.starts_with(path))
            .map(|(p, k)| (p.clone(), k.kind))
            .collect();

        for (p, kind) in gone.into_iter().rev() {
            self.known.remove(&p);
            let raw = match kind {
                TargetKind::Directory => RawKind::DirRemoved,
                TargetKind::File => RawKind::FileRemoved,
            };
            out.push(RawEvent::new(raw, p));
        }
    }

    fn topmost_unknown_ancestor(&self, path: &Path) -> Option<PathBuf> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut current = self.root.clone();
        let mut components = rel.components().peekable();
        while let Some(component) = components.next() {
            if components.peek().is_none() {
                break;
            }
            current.push(component);
            if !self.known.contains_key(&current) {
                return Some(current);
            }
        }
        None
    }
}

fn file_event(kind: RawKind, path: &Path) -> RawEvent {
    RawEvent::with_content(kind, path.to_path_buf(), read_content(path))
}

/// Whole file as text; invalid utf-8 is replaced rather than rejected.
fn read_content(path: &Path) -> io::Result<String> {
    std::fs::read(path).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

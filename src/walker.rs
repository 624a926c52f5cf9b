use std::io;
use std::path::{Component, Path, PathBuf};

use crate::config::WatchConfig;

/// Kind of a walked entry. Symlinks are reported as such and never followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: PathBuf,
    /// Depth below the walk root (direct children are 1).
    pub depth: usize,
    pub kind: EntryKind,
}

/// Decides which paths below the managed root the watcher reports.
///
/// Dot-prefixed entries are always hidden. Extra glob patterns from the
/// `[watch] exclude` config key are matched against the root-relative path and
/// against each path component.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    patterns: Vec<glob::Pattern>,
}

impl PathFilter {
    pub fn new(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    tracing::warn!(pattern = %p, error = %err, "ignoring invalid exclude pattern");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(config.exclude.as_deref().unwrap_or_default())
    }

    /// True when `path` (absolute, below `root`) must not be reported.
    pub fn is_excluded(&self, root: &Path, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(root) else {
            return true;
        };
        if is_hidden(rel) {
            return true;
        }
        if self.patterns.is_empty() {
            return false;
        }

        let rel_str = rel.to_string_lossy();
        for pattern in &self.patterns {
            if pattern.matches(&rel_str) {
                return true;
            }
            for component in rel.components() {
                if let Component::Normal(name) = component
                    && let Some(s) = name.to_str()
                    && pattern.matches(s)
                {
                    return true;
                }
            }
        }
        false
    }
}

/// Returns true if any component of `rel` starts with a dot.
pub fn is_hidden(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Walk the visible part of `root` (everything `filter` lets through), parents
/// before children. The root itself is not reported.
///
/// Unreadable entries are logged and skipped.
pub fn walk_visible(root: &Path, filter: &PathFilter) -> Vec<WalkEntry> {
    let prune = filter.clone();
    let prune_root = root.to_path_buf();
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(true)
        .follow_links(false)
        .filter_entry(move |entry| {
            entry.depth() == 0 || !prune.is_excluded(&prune_root, entry.path())
        })
        .build();

    let mut out = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "walk error");
                continue;
            }
        };
        let depth = entry.depth();
        if depth == 0 {
            continue;
        }
        if let Some(kind) = entry_kind(entry.file_type()) {
            out.push(WalkEntry {
                path: entry.into_path(),
                depth,
                kind,
            });
        }
    }
    out
}

/// Walk every entry below `root` without following links. Dot-prefixed
/// entries (and everything under them) are skipped unless `include_hidden`.
///
/// Fails on the first unreadable entry: callers (archive, recursive removal)
/// must not silently skip part of a subtree.
pub fn walk_all(root: &Path, include_hidden: bool) -> io::Result<Vec<WalkEntry>> {
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(!include_hidden)
        .follow_links(false)
        .build();

    let mut out = Vec::new();
    for result in walker {
        let entry = result.map_err(io::Error::other)?;
        let depth = entry.depth();
        if depth == 0 {
            continue;
        }
        if let Some(kind) = entry_kind(entry.file_type()) {
            out.push(WalkEntry {
                path: entry.into_path(),
                depth,
                kind,
            });
        }
    }
    Ok(out)
}

/// Remove `dir` and everything below it with an explicit, non-recursive walk:
/// leaves first (deepest entries), then `dir` itself.
pub fn remove_tree(dir: &Path) -> io::Result<()> {
    let mut entries = walk_all(dir, true)?;
    entries.sort_by(|a, b| b.depth.cmp(&a.depth));

    for entry in entries {
        let result = match entry.kind {
            EntryKind::Dir => std::fs::remove_dir(&entry.path),
            EntryKind::File | EntryKind::Symlink => std::fs::remove_file(&entry.path),
        };
        match result {
            Ok(()) => {}
            // Someone else got there first.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    std::fs::remove_dir(dir)
}

fn entry_kind(ft: Option<std::fs::FileType>) -> Option<EntryKind> {
    let ft = ft?;
    if ft.is_symlink() {
        Some(EntryKind::Symlink)
    } else if ft.is_dir() {
        Some(EntryKind::Dir)
    } else if ft.is_file() {
        Some(EntryKind::File)
    } else {
        None
    }
}

//! Request path resolution.
//!
//! Turns the path part of a request URL into an absolute path under the
//! managed root. Resolution is purely lexical: no filesystem call happens here,
//! so a traversal attempt is rejected before anything touches the disk.

use std::path::{Component, Path, PathBuf};

use crate::error::{FsError, FsResult};

/// What a write request means to create, judged from the path string alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    File,
    Directory,
}

/// A request path that is known to lie inside the managed root.
///
/// Built fresh for every request and never cached: what is on disk behind it
/// is looked up by the executor at call time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedPath {
    absolute: PathBuf,
    relative: String,
    intent: Intent,
}

impl ManagedPath {
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Root-relative spelling, always `/`-prefixed and `/`-separated.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn is_root(&self) -> bool {
        self.relative == "/"
    }
}

/// Maps request paths onto the managed root.
#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
}

impl Resolver {
    /// `root` should already be canonical; the server canonicalizes it once at startup.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a raw request path (leading slash optional) to a [`ManagedPath`].
    ///
    /// `.` segments and empty segments are dropped, `..` pops one level.
    /// Popping past the root is an [`FsError::InvalidPath`].
    pub fn resolve(&self, raw: &str) -> FsResult<ManagedPath> {
        let mut segments: Vec<&str> = Vec::new();

        for segment in raw.split(std::path::is_separator) {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(FsError::InvalidPath(raw.to_string()));
                    }
                }
                s if s.contains('\0') || !is_plain_segment(s) => {
                    return Err(FsError::InvalidPath(raw.to_string()));
                }
                s => segments.push(s),
            }
        }

        let mut absolute = self.root.clone();
        absolute.extend(&segments);

        Ok(ManagedPath {
            absolute,
            relative: format!("/{}", segments.join("/")),
            intent: classify_intent(raw, segments.last().copied()),
        })
    }

    /// Root-relative spelling of an absolute path, or `None` when it lies outside the root.
    pub fn relativize(&self, absolute: &Path) -> Option<String> {
        relativize(&self.root, absolute)
    }
}

/// Strip `root` from `absolute` and render the rest with `/` separators.
pub fn relativize(root: &Path, absolute: &Path) -> Option<String> {
    let rest = absolute.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in rest.components() {
        match component {
            Component::Normal(name) => {
                out.push('/');
                out.push_str(&name.to_string_lossy());
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    Some(out)
}

/// A segment that `Path` would read back as exactly one normal component.
///
/// Rejects things like `C:` on Windows that would re-anchor a join.
fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Directory-intent heuristic: a trailing separator or a last segment without an
/// extension means "directory".
///
/// This misreads extensionless file names such as `Makefile`; clients that
/// need such a file have to create it through a path the heuristic accepts.
fn classify_intent(raw: &str, last: Option<&str>) -> Intent {
    if raw.ends_with(std::path::is_separator) {
        return Intent::Directory;
    }
    match last {
        Some(name) if Path::new(name).extension().is_some() => Intent::File,
        _ => Intent::Directory,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> Resolver {
        Resolver::new("/srv/box")
    }

    #[test]
    fn test_resolve_joins_under_root() {
        let p = resolver().resolve("/docs/readme.md").unwrap();
        assert_eq!(p.absolute(), Path::new("/srv/box/docs/readme.md"));
        assert_eq!(p.relative(), "/docs/readme.md");
        assert_eq!(p.intent(), Intent::File);
        assert!(!p.is_root());
    }

    #[test]
    fn test_resolve_empty_is_root() {
        let p = resolver().resolve("").unwrap();
        assert_eq!(p.absolute(), Path::new("/srv/box"));
        assert_eq!(p.relative(), "/");
        assert!(p.is_root());
        assert_eq!(p.intent(), Intent::Directory);
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        for raw in ["..", "/../etc/passwd", "a/../../b", "a/./../../..", "../box/x.txt"] {
            let err = resolver().resolve(raw).unwrap_err();
            assert!(
                matches!(err, FsError::InvalidPath(_)),
                "{raw:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_resolve_allows_inner_parent_segments() {
        let p = resolver().resolve("a/b/../c.txt").unwrap();
        assert_eq!(p.relative(), "/a/c.txt");
        assert_eq!(p.absolute(), Path::new("/srv/box/a/c.txt"));
    }

    #[test]
    fn test_resolve_rejects_nul() {
        assert!(matches!(
            resolver().resolve("a\0b.txt"),
            Err(FsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_directory_intent_heuristic() {
        let r = resolver();
        assert_eq!(r.resolve("photos").unwrap().intent(), Intent::Directory);
        assert_eq!(r.resolve("photos/").unwrap().intent(), Intent::Directory);
        assert_eq!(r.resolve("a.b/c").unwrap().intent(), Intent::Directory);
        assert_eq!(r.resolve("notes/todo.txt/").unwrap().intent(), Intent::Directory);
        assert_eq!(r.resolve("Makefile").unwrap().intent(), Intent::Directory);
        assert_eq!(r.resolve("notes/todo.txt").unwrap().intent(), Intent::File);
    }

    #[test]
    fn test_relativize() {
        let r = resolver();
        assert_eq!(
            r.relativize(Path::new("/srv/box/a/b.txt")).as_deref(),
            Some("/a/b.txt")
        );
        assert_eq!(r.relativize(Path::new("/srv/box")).as_deref(), Some("/"));
        assert_eq!(r.relativize(Path::new("/srv/other/a")), None);
    }
}

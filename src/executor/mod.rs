//! Filesystem operations behind the request surface.
//!
//! Each operation stats the target once, branches on what it found, performs
//! the disk call and, once that call has completed successfully, publishes
//! exactly one [`ChangeEvent`](crate::event::ChangeEvent). The stat and the
//! mutation are not atomic; a concurrent change in between surfaces as the
//! typed error of the disk call itself.
//!
//! Paths are resolved lexically, so before touching the disk every operation
//! also checks that the deepest existing ancestor of its target, with
//! symlinks resolved, is still below the root. A link that points outside
//! the root is treated like `..`.

pub mod archive;

use std::io;
use std::path::Path;

use archive::DirArchive;

use tokio::io::AsyncWriteExt;

use crate::error::{FsError, FsResult};
use crate::event::normalize;
use crate::event::{ChangeKind, EventBus, TargetKind};
use crate::resolver::{Intent, ManagedPath, Resolver};

/// On-disk status of a path at the moment it was looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Missing,
    File { len: u64 },
    Directory,
}

/// How a directory should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Directory listing.
    #[default]
    Plain,
    /// Zip archive of the subtree. Files are read as usual.
    Archive,
}

/// An open file ready to be streamed.
#[derive(Debug)]
pub struct FileBody {
    pub file: tokio::fs::File,
    pub len: u64,
    pub content_type: String,
}

#[derive(Debug)]
pub enum ReadOutcome {
    /// Entry names of a directory, in the order the OS returned them.
    Listing(Vec<String>),
    File(FileBody),
    /// A directory subtree to be zipped when the body is consumed.
    Archive(DirArchive),
}

/// Performs create/read/replace/remove under the managed root and reports
/// successful mutations on the event bus.
#[derive(Debug, Clone)]
pub struct Executor {
    resolver: Resolver,
    bus: EventBus,
}

impl Executor {
    pub fn new(resolver: Resolver, bus: EventBus) -> Self {
        Self { resolver, bus }
    }

    pub fn resolve(&self, raw: &str) -> FsResult<ManagedPath> {
        self.resolver.resolve(raw)
    }

    /// Look up what is currently on disk at `path` (following symlinks).
    pub async fn stat(&self, path: &ManagedPath) -> FsResult<Stat> {
        match tokio::fs::metadata(path.absolute()).await {
            Ok(meta) if meta.is_dir() => Ok(Stat::Directory),
            Ok(meta) => Ok(Stat::File { len: meta.len() }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Stat::Missing),
            Err(err) => Err(io_error(err, path)),
        }
    }

    pub async fn read(&self, path: &ManagedPath, mode: ReadMode) -> FsResult<ReadOutcome> {
        self.confine(path, path.absolute()).await?;
        match self.stat(path).await? {
            Stat::Missing => Err(FsError::NotFound(path.relative().to_string())),
            Stat::Directory if mode == ReadMode::Archive => {
                tracing::debug!(path = path.relative(), "directory archive");
                Ok(ReadOutcome::Archive(DirArchive::new(
                    path.absolute().to_path_buf(),
                    path.relative(),
                )))
            }
            Stat::Directory => {
                let names = list_dir(path.absolute())
                    .await
                    .map_err(|err| io_error(err, path))?;
                tracing::debug!(path = path.relative(), entries = names.len(), "directory list");
                Ok(ReadOutcome::Listing(names))
            }
            Stat::File { len } => {
                let file = tokio::fs::File::open(path.absolute())
                    .await
                    .map_err(|err| io_error(err, path))?;
                Ok(ReadOutcome::File(FileBody {
                    file,
                    len,
                    content_type: content_type(path.absolute()),
                }))
            }
        }
    }

    /// Write-if-absent. Never overwrites; creates missing parents.
    pub async fn create(&self, path: &ManagedPath, body: &[u8]) -> FsResult<()> {
        self.confine(path, path.absolute()).await?;
        if self.stat(path).await? != Stat::Missing {
            return Err(FsError::AlreadyExists(path.relative().to_string()));
        }

        match path.intent() {
            Intent::Directory => {
                tokio::fs::create_dir_all(path.absolute())
                    .await
                    .map_err(|err| io_error(err, path))?;
                tracing::info!(path = path.relative(), "folder created");
                self.emit(ChangeKind::Created, TargetKind::Directory, path, None);
            }
            Intent::File => {
                if let Some(parent) = path.absolute().parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|err| io_error(err, path))?;
                }
                let mut file = tokio::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(path.absolute())
                    .await
                    .map_err(|err| io_error(err, path))?;
                write_all(&mut file, body)
                    .await
                    .map_err(|err| io_error(err, path))?;
                tracing::info!(path = path.relative(), bytes = body.len(), "file created");
                self.emit(ChangeKind::Created, TargetKind::File, path, Some(text(body)));
            }
        }
        Ok(())
    }

    /// Write-if-present. Only files can be replaced.
    pub async fn replace(&self, path: &ManagedPath, body: &[u8]) -> FsResult<()> {
        self.confine(path, path.absolute()).await?;
        match self.stat(path).await? {
            Stat::Missing => return Err(FsError::NotFound(path.relative().to_string())),
            Stat::Directory => return Err(FsError::IsDirectory(path.relative().to_string())),
            Stat::File { .. } => {}
        }

        // No `create`: if the file vanished since the stat this fails with NotFound.
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path.absolute())
            .await
            .map_err(|err| io_error(err, path))?;
        write_all(&mut file, body)
            .await
            .map_err(|err| io_error(err, path))?;

        tracing::info!(path = path.relative(), bytes = body.len(), "file updated");
        self.emit(ChangeKind::Updated, TargetKind::File, path, Some(text(body)));
        Ok(())
    }

    /// Delete a file, or a directory with all its descendants.
    pub async fn remove(&self, path: &ManagedPath) -> FsResult<()> {
        if path.is_root() {
            return Err(FsError::InvalidPath(path.relative().to_string()));
        }
        // Only the parent: removing a link that points outside is fine, it
        // never touches the target.
        if let Some(parent) = path.absolute().parent() {
            self.confine(path, parent).await?;
        }

        let target = match self.stat(path).await? {
            Stat::Missing => return Err(FsError::NotFound(path.relative().to_string())),
            Stat::Directory => TargetKind::Directory,
            Stat::File { .. } => TargetKind::File,
        };

        let is_link = tokio::fs::symlink_metadata(path.absolute())
            .await
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);

        if target.is_dir() && !is_link {
            let dir = path.absolute().to_path_buf();
            tokio::task::spawn_blocking(move || crate::walker::remove_tree(&dir))
                .await
                .map_err(|err| io_error(io::Error::other(err), path))?
                .map_err(|err| io_error(err, path))?;
            tracing::info!(path = path.relative(), "folder deleted");
        } else {
            tokio::fs::remove_file(path.absolute())
                .await
                .map_err(|err| io_error(err, path))?;
            tracing::info!(path = path.relative(), "file deleted");
        }

        self.emit(ChangeKind::Deleted, target, path, None);
        Ok(())
    }

    /// Fail with [`FsError::InvalidPath`] when the deepest existing ancestor
    /// of `target` (itself included) resolves to somewhere outside the root.
    async fn confine(&self, path: &ManagedPath, target: &Path) -> FsResult<()> {
        let root = self.resolver.root();
        let mut current = target;
        loop {
            match tokio::fs::canonicalize(current).await {
                Ok(real) if real.starts_with(root) => return Ok(()),
                Ok(real) => {
                    tracing::warn!(
                        path = path.relative(),
                        resolved = %real.display(),
                        "path escapes the root through a symlink"
                    );
                    return Err(FsError::InvalidPath(path.relative().to_string()));
                }
                // Missing, or a file where a directory was expected: the
                // operation itself reports that.
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                    ) =>
                {
                    match current.parent() {
                        Some(parent) => current = parent,
                        None => return Ok(()),
                    }
                }
                Err(err) => return Err(io_error(err, path)),
            }
        }
    }

    fn emit(&self, kind: ChangeKind, target: TargetKind, path: &ManagedPath, content: Option<String>) {
        self.bus.publish(normalize::from_request(kind, target, path, content));
    }
}

async fn list_dir(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

async fn write_all(file: &mut tokio::fs::File, body: &[u8]) -> io::Result<()> {
    file.write_all(body).await?;
    // tokio hands writes to a blocking thread; flush waits for them to land.
    file.flush().await
}

/// Content type from the file extension, with a utf-8 charset for text.
pub fn content_type(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}

fn text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

fn io_error(err: io::Error, path: &ManagedPath) -> FsError {
    FsError::from_io(err, path.absolute(), path.relative())
}

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tokio::io::DuplexStream;
use tokio_util::io::SyncIoBridge;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::walker::{self, EntryKind};

/// Capacity of the pipe between the zip writer and the response body.
const PIPE_CAPACITY: usize = 64 * 1024;

/// A directory that will be sent as a zip archive.
///
/// Nothing is read from disk until [`DirArchive::stream`] is called, so a
/// HEAD request can answer without building the archive.
#[derive(Debug)]
pub struct DirArchive {
    dir: PathBuf,
    label: String,
}

impl DirArchive {
    pub fn new(dir: PathBuf, label: impl Into<String>) -> Self {
        Self {
            dir,
            label: label.into(),
        }
    }

    /// Start zipping on a blocking thread and return the read end of the pipe.
    ///
    /// Entry names are relative to the directory and use `/`. Hidden entries
    /// and symlinks are left out. The archive is never held in memory: the
    /// writer blocks whenever the pipe is full. If the walk fails midway the
    /// stream ends early and the failure is logged. Must be called from
    /// within a tokio runtime.
    pub fn stream(self) -> DuplexStream {
        let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
        let sink = SyncIoBridge::new(writer);
        let Self { dir, label } = self;

        tokio::task::spawn_blocking(move || match write_zip(&dir, sink) {
            Ok(entries) => tracing::info!(path = %label, entries, "directory archive sent"),
            Err(err) => tracing::warn!(path = %label, %err, "directory archive aborted"),
        });
        reader
    }
}

fn write_zip<W: Write>(dir: &Path, sink: W) -> io::Result<usize> {
    let mut zip = ZipWriter::new_stream(sink);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut entries = 0;

    for entry in walker::walk_all(dir, false)? {
        let rel = entry.path.strip_prefix(dir).unwrap_or(entry.path.as_path());
        let name = rel.to_string_lossy().replace('\\', "/");

        match entry.kind {
            EntryKind::Dir => {
                zip.add_directory(name, options).map_err(io::Error::other)?;
            }
            EntryKind::File => {
                zip.start_file(name, options).map_err(io::Error::other)?;
                let mut file = std::fs::File::open(&entry.path)?;
                io::copy(&mut file, &mut zip)?;
            }
            EntryKind::Symlink => continue,
        }
        entries += 1;
    }

    zip.finish().map_err(io::Error::other)?.flush()?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{Cursor, Read};

    use tokio::io::AsyncReadExt;

    async fn collect(archive: DirArchive) -> Vec<u8> {
        let mut bytes = Vec::new();
        archive.stream().read_to_end(&mut bytes).await.unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_zip_contains_visible_subtree() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("top.txt"), "top").unwrap();
        fs::write(dir.path().join(".treecast.toml"), "[server]\n").unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();
        fs::write(dir.path().join("sub/.env"), "SECRET=1").unwrap();
        fs::write(dir.path().join("sub/deeper/leaf.md"), "# leaf").unwrap();

        let bytes = collect(DirArchive::new(dir.path().to_path_buf(), "/")).await;
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["sub/", "sub/deeper/", "sub/deeper/leaf.md", "top.txt"]
        );

        let mut leaf = String::new();
        archive
            .by_name("sub/deeper/leaf.md")
            .unwrap()
            .read_to_string(&mut leaf)
            .unwrap();
        assert_eq!(leaf, "# leaf");
    }

    #[tokio::test]
    async fn test_zip_larger_than_pipe() {
        let dir = tempfile::tempdir().unwrap();
        // Incompressible enough to overflow the pipe several times.
        let blob: Vec<u8> = (0..PIPE_CAPACITY * 4)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        fs::write(dir.path().join("blob.bin"), &blob).unwrap();

        let bytes = collect(DirArchive::new(dir.path().to_path_buf(), "/")).await;
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut back = Vec::new();
        archive
            .by_name("blob.bin")
            .unwrap()
            .read_to_end(&mut back)
            .unwrap();
        assert_eq!(back, blob);
    }

    #[tokio::test]
    async fn test_missing_directory_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let bytes = collect(DirArchive::new(gone, "/gone")).await;
        assert!(zip::ZipArchive::new(Cursor::new(bytes)).is_err());
    }
}

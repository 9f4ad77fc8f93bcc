//! Offline access to a cbcollect bundle

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::catalog::LogFile;
use crate::error::SourceError;

/// Extracted (or already unpacked) cbcollect material
#[derive(Debug)]
pub struct Bundle {
    /// Directory holding the log files
    root: PathBuf,

    /// Scratch directory the archive was extracted into, removed on drop
    _extracted: Option<TempDir>,
}

impl Bundle {
    /// Open a bundle from a zip archive or an already-extracted directory
    pub async fn open(path: &Path) -> Result<Self, SourceError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| SourceError::MissingBundle(path.to_path_buf()))?;

        if metadata.is_dir() {
            let root = locate_root(path).map_err(|source| SourceError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            return Ok(Self {
                root,
                _extracted: None,
            });
        }

        let archive_path = path.to_path_buf();
        tokio::task::spawn_blocking(move || extract(&archive_path))
            .await
            .map_err(|e| SourceError::Io {
                path: path.to_path_buf(),
                source: io::Error::other(e),
            })?
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read one log file, replacing invalid UTF-8
    pub async fn fetch(&self, log: &LogFile) -> Result<String, SourceError> {
        let path = self.root.join(log.bundle_file);
        debug!(path = %path.display(), "Reading log");
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SourceError::MissingLog {
                file: log.bundle_file,
            }),
            Err(source) => Err(SourceError::Io { path, source }),
        }
    }
}

fn extract(archive_path: &Path) -> Result<Bundle, SourceError> {
    let archive_err = |source| SourceError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };
    let io_err = |source| SourceError::Io {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(io_err)?;
    let mut archive = zip::ZipArchive::new(file).map_err(archive_err)?;
    let scratch = tempfile::Builder::new()
        .prefix("cbeventlog-")
        .tempdir()
        .map_err(io_err)?;
    archive.extract(scratch.path()).map_err(archive_err)?;
    debug!(
        archive = %archive_path.display(),
        entries = archive.len(),
        "Extracted bundle"
    );

    let root = locate_root(scratch.path()).map_err(io_err)?;
    Ok(Bundle {
        root,
        _extracted: Some(scratch),
    })
}

/// Descend into the single `cbcollect_info_*` wrapper directory, if there is one
fn locate_root(dir: &Path) -> io::Result<PathBuf> {
    let mut dirs = Vec::new();
    let mut has_files = false;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        } else {
            has_files = true;
        }
    }

    match (has_files, dirs.len()) {
        (false, 1) => Ok(dirs.remove(0)),
        _ => Ok(dir.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, body) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn test_open_zip_with_wrapper_directory() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("collect.zip");
        write_zip(
            &zip_path,
            &[(
                "cbcollect_info_ns_1@127.0.0.1_20210304-101522/ns_server.info.log",
                "hello\n",
            )],
        );

        let bundle = Bundle::open(&zip_path).await.unwrap();
        assert!(bundle.root().ends_with("cbcollect_info_ns_1@127.0.0.1_20210304-101522"));
        assert_eq!(bundle.fetch(&LogFile::INFO).await.unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn test_extracted_files_are_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("collect.zip");
        write_zip(&zip_path, &[("ns_server.info.log", "x\n")]);

        let bundle = Bundle::open(&zip_path).await.unwrap();
        let root = bundle.root().to_path_buf();
        assert!(root.exists());
        drop(bundle);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_open_directory_and_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ns_server.babysitter.log"), "a\n").unwrap();

        let bundle = Bundle::open(dir.path()).await.unwrap();
        assert_eq!(bundle.root(), dir.path());
        assert!(bundle.fetch(&LogFile::BABYSITTER).await.is_ok());
        assert!(matches!(
            bundle.fetch(&LogFile::AUDIT).await,
            Err(SourceError::MissingLog { file: "audit.log" })
        ));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ns_server.fts.log"), b"ok \xff\n").unwrap();

        let bundle = Bundle::open(dir.path()).await.unwrap();
        assert_eq!(bundle.fetch(&LogFile::FTS).await.unwrap(), "ok \u{fffd}\n");
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.zip");
        assert!(matches!(
            Bundle::open(&missing).await,
            Err(SourceError::MissingBundle(_))
        ));

        let corrupt = dir.path().join("corrupt.zip");
        std::fs::write(&corrupt, "not a zip").unwrap();
        assert!(matches!(
            Bundle::open(&corrupt).await,
            Err(SourceError::Archive { .. })
        ));
    }
}

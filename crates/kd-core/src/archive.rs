//! Unpacking forge zipballs into a scratch directory that lives for one invocation.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use zip::ZipArchive;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("repository archive is not a readable zip file")]
    Unreadable(#[source] zip::result::ZipError),
    #[error("repository archive has no top-level directory")]
    NoRootDirectory,
    #[error("repository archive has {count} top-level directories, expected exactly one")]
    MultipleRootDirectories { count: usize },
    #[error("failed to prepare scratch directory for the repository archive")]
    Io(#[from] std::io::Error),
}

/// An extracted snapshot; the scratch directory is removed when this is dropped.
#[derive(Debug)]
pub struct ExtractedTree {
    scratch: TempDir,
    root: PathBuf,
}

impl ExtractedTree {
    /// The single repository folder inside the scratch directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Remove the scratch directory now, reporting failures instead of ignoring them.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while deleting the tree.
    pub fn close(self) -> std::io::Result<()> {
        self.scratch.close()
    }
}

/// Unpack `bytes` into a fresh scratch directory and locate the repository root.
///
/// # Errors
///
/// Fails when the bytes are not a zip archive, or when the archive does not wrap its
/// content in exactly one top-level directory.
pub fn extract_snapshot(bytes: &[u8]) -> Result<ExtractedTree, ArchiveError> {
    let scratch = tempfile::Builder::new().prefix("kd-snapshot-").tempdir()?;
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(ArchiveError::Unreadable)?;
    archive
        .extract(scratch.path())
        .map_err(|err| match err {
            zip::result::ZipError::Io(io) => ArchiveError::Io(io),
            other => ArchiveError::Unreadable(other),
        })?;

    let mut roots = Vec::new();
    for entry in fs_err::read_dir(scratch.path())? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            roots.push(entry.path());
        }
    }
    let root = match roots.len() {
        0 => return Err(ArchiveError::NoRootDirectory),
        1 => roots.remove(0),
        count => return Err(ArchiveError::MultipleRootDirectories { count }),
    };
    debug!(root = %root.display(), entries = archive.len(), "extracted repository archive");
    Ok(ExtractedTree { scratch, root })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    /// Build a zip in memory; names ending in `/` become directory entries.
    pub(crate) fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();
        for (name, contents) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(contents.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn locates_single_root_directory() {
        let bytes = zip_bytes(&[
            ("acme-kb-abc123/", ""),
            ("acme-kb-abc123/config/kb.keymap", "/ { };"),
        ]);
        let tree = extract_snapshot(&bytes).unwrap();
        assert_eq!(tree.root().file_name().unwrap(), "acme-kb-abc123");
        assert!(tree.root().join("config/kb.keymap").is_file());
    }

    #[test]
    fn root_is_found_without_explicit_directory_entries() {
        let bytes = zip_bytes(&[("acme-kb-abc123/kb.keymap", "")]);
        let tree = extract_snapshot(&bytes).unwrap();
        assert!(tree.root().join("kb.keymap").is_file());
    }

    #[test]
    fn scratch_directory_is_removed_on_drop() {
        let bytes = zip_bytes(&[("repo/kb.keymap", "")]);
        let tree = extract_snapshot(&bytes).unwrap();
        let scratch = tree.scratch_dir().to_path_buf();
        assert!(scratch.exists());
        drop(tree);
        assert!(!scratch.exists());
    }

    #[test]
    fn archive_without_directory_fails() {
        let bytes = zip_bytes(&[("README.md", "hello")]);
        let err = extract_snapshot(&bytes).unwrap_err();
        assert!(matches!(err, ArchiveError::NoRootDirectory));
    }

    #[test]
    fn archive_with_two_roots_fails() {
        let bytes = zip_bytes(&[("one/a.keymap", ""), ("two/b.keymap", "")]);
        let err = extract_snapshot(&bytes).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MultipleRootDirectories { count: 2 }
        ));
    }

    #[test]
    fn garbage_bytes_are_unreadable() {
        let err = extract_snapshot(b"<html>rate limited</html>").unwrap_err();
        assert!(matches!(err, ArchiveError::Unreadable(_)));
    }
}

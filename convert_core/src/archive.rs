//! Moving processed originals out of the input folder.

use crate::errors::{ConvertError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Moved(PathBuf),
    /// An entry with the same name already exists in the archive; the
    /// original stays where it is.
    Collision(PathBuf),
}

#[derive(Debug, Default)]
pub struct ArchiveSummary {
    pub moved: usize,
    pub collisions: Vec<PathBuf>,
    pub errors: Vec<ConvertError>,
}

/// Move `source` into `archive_dir`, keeping its file name.
///
/// Tries a rename first and falls back to copy-then-remove when the archive
/// is on another filesystem.
pub fn archive_file(source: &Path, archive_dir: &Path) -> Result<ArchiveOutcome> {
    let archive_error = |e: std::io::Error| ConvertError::Archive {
        path: source.to_path_buf(),
        source: e,
    };

    let file_name = source.file_name().ok_or_else(|| {
        archive_error(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no file name",
        ))
    })?;
    let dest = archive_dir.join(file_name);

    if dest.exists() {
        warn!(
            source = %source.display(),
            dest = %dest.display(),
            "Archive target already exists, leaving original in place"
        );
        return Ok(ArchiveOutcome::Collision(dest));
    }

    fs::create_dir_all(archive_dir).map_err(archive_error)?;

    if let Err(rename_err) = fs::rename(source, &dest) {
        debug!(
            source = %source.display(),
            error = %rename_err,
            "Rename failed, falling back to copy"
        );
        fs::copy(source, &dest).map_err(archive_error)?;
        if let Err(e) = fs::remove_file(source) {
            // Keep a single copy: drop the one we just made.
            let _ = fs::remove_file(&dest);
            return Err(archive_error(e));
        }
    }

    debug!(source = %source.display(), dest = %dest.display(), "Archived original");
    Ok(ArchiveOutcome::Moved(dest))
}

/// Archive every file in `sources`. Failures are collected, not fatal.
pub fn archive_files(sources: &[PathBuf], archive_dir: &Path) -> ArchiveSummary {
    let mut summary = ArchiveSummary::default();
    for source in sources {
        match archive_file(source, archive_dir) {
            Ok(ArchiveOutcome::Moved(_)) => summary.moved += 1,
            Ok(ArchiveOutcome::Collision(dest)) => summary.collisions.push(dest),
            Err(e) => {
                warn!(error = %e, "Archiving failed");
                summary.errors.push(e);
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_archive_moves_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.flac");
        fs::write(&source, b"audio").unwrap();
        let archive = dir.path().join("archived");

        let outcome = archive_file(&source, &archive).unwrap();
        assert_eq!(outcome, ArchiveOutcome::Moved(archive.join("a.flac")));
        assert!(!source.exists());
        assert_eq!(fs::read(archive.join("a.flac")).unwrap(), b"audio");
    }

    #[test]
    fn test_archive_collision_leaves_original() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("archived");
        fs::create_dir_all(&archive).unwrap();
        fs::write(archive.join("a.flac"), b"old").unwrap();
        let source = dir.path().join("a.flac");
        fs::write(&source, b"new").unwrap();

        let outcome = archive_file(&source, &archive).unwrap();
        assert!(matches!(outcome, ArchiveOutcome::Collision(_)));
        assert!(source.exists());
        assert_eq!(fs::read(archive.join("a.flac")).unwrap(), b"old");
    }

    #[test]
    fn test_archive_missing_source_is_error() {
        let dir = TempDir::new().unwrap();
        let err = archive_file(&dir.path().join("gone.wav"), &dir.path().join("archived"))
            .unwrap_err();
        assert!(matches!(err, ConvertError::Archive { .. }));
    }

    #[test]
    fn test_archive_files_summary() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("archived");
        fs::create_dir_all(&archive).unwrap();
        fs::write(archive.join("taken.wav"), b"x").unwrap();

        let mut sources = Vec::new();
        for name in ["one.wav", "two.wav", "taken.wav"] {
            let path = dir.path().join(name);
            fs::write(&path, b"x").unwrap();
            sources.push(path);
        }
        sources.push(dir.path().join("missing.wav"));

        let summary = archive_files(&sources, &archive);
        assert_eq!(summary.moved, 2);
        assert_eq!(summary.collisions, vec![archive.join("taken.wav")]);
        assert_eq!(summary.errors.len(), 1);
    }
}

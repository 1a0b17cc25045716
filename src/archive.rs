//! Archive extraction
//!
//! Unpacks the export archive into a session-private scratch directory and
//! locates domain files by glob pattern anywhere under it.

use crate::error::{AnalysisError, Result};
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// An export archive extracted into a temporary directory.
///
/// The directory lives as long as the extractor.
pub struct ArchiveExtractor {
    dir: TempDir,
}

impl ArchiveExtractor {
    /// Extract an in-memory archive
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    /// Extract an archive file
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            AnalysisError::archive(format!("cannot open {}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
    }

    /// Extract any seekable archive stream
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let dir = tempfile::Builder::new()
            .prefix("garmin-flux-")
            .tempdir()
            .map_err(|e| AnalysisError::archive(format!("cannot create scratch directory: {}", e)))?;

        archive.extract(dir.path())?;
        tracing::info!(
            entries = archive.len(),
            root = %dir.path().display(),
            "extracted export archive"
        );

        Ok(Self { dir })
    }

    /// Extraction root
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Files whose name matches `pattern` at any depth, sorted by path
    pub fn find_files(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let root = glob::Pattern::escape(&self.root().to_string_lossy());
        let full = format!("{}/**/{}", root, pattern);

        let paths = glob::glob(&full)
            .map_err(|e| AnalysisError::parse(format!("invalid file pattern {}: {}", pattern, e)))?;

        let mut files: Vec<PathBuf> = paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::debug!("skipping unreadable path: {}", e);
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        files.dedup();

        Ok(files)
    }
}

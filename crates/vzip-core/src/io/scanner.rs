use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::Path;

use crate::VzipError;
use crate::telemetry::tags;
use crate::types::{FrameSource, Result};

/// File name suffix selecting frame files.
pub const DEFAULT_FRAME_SUFFIX: &str = ".ppm";

/// Lists the frame files of one directory in archive order.
///
/// Only the top level is read. Entries are kept when they are regular files
/// (symlinks are followed) and their name ends with the suffix, compared
/// byte for byte. The result is sorted by the raw bytes of the file name and
/// numbered from zero.
#[derive(Debug, Clone)]
pub struct FrameScanner {
    suffix: String,
}

impl FrameScanner {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Returns true if `name` would be selected by this scanner.
    pub fn matches(&self, name: &OsStr) -> bool {
        name.as_encoded_bytes().ends_with(self.suffix.as_bytes())
    }

    /// Scans `dir` and returns its frames in index order.
    ///
    /// # Errors
    /// Fails with [`VzipError::Io`], wrapped in context naming the
    /// directory, if it cannot be listed.
    pub fn scan(&self, dir: &Path) -> Result<Vec<FrameSource>> {
        let describe = || format!("listing frame directory {}", dir.display());
        let entries =
            fs::read_dir(dir).map_err(|error| VzipError::from(error).with_context(describe()))?;

        let mut names: Vec<OsString> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| VzipError::from(error).with_context(describe()))?;
            let name = entry.file_name();
            if !self.matches(&name) {
                continue;
            }
            match fs::metadata(entry.path()) {
                Ok(metadata) if metadata.is_file() => names.push(name),
                Ok(_) => {}
                Err(error) => {
                    tracing::debug!(
                        target: tags::TARGET_PIPELINE,
                        path = %entry.path().display(),
                        %error,
                        "skipping unreadable directory entry"
                    );
                }
            }
        }

        names.sort_unstable_by(|a, b| a.as_encoded_bytes().cmp(b.as_encoded_bytes()));
        let sources: Vec<FrameSource> = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| FrameSource::new(index, dir.join(name)))
            .collect();

        tracing::debug!(
            target: tags::TARGET_PIPELINE,
            dir = %dir.display(),
            frames = sources.len(),
            suffix = %self.suffix,
            "frame directory scanned"
        );
        Ok(sources)
    }
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_match_is_case_sensitive() {
        let scanner = FrameScanner::default();
        assert!(scanner.matches(OsStr::new("frame001.ppm")));
        assert!(scanner.matches(OsStr::new(".ppm")));
        assert!(!scanner.matches(OsStr::new("frame001.PPM")));
        assert!(!scanner.matches(OsStr::new("frame001.ppm.bak")));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let scanner = FrameScanner::default();
        let err = scanner
            .scan(Path::new("/definitely/not/a/frame/dir"))
            .unwrap_err();
        assert!(matches!(err.root(), VzipError::Io(_)));
    }
}

//! File discovery module for cycling data directories
//!
//! Finds the DTA and MPT exports directly inside one data directory, matched
//! by extension regardless of case and returned in lexicographic order.

use crate::config::ProcessorConfig;
use crate::constants::has_extension;
use crate::error::{CyclerError, Result};
use glob::{MatchOptions, Pattern, glob_with};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

/// Source files found in one data directory, each list sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredFiles {
    pub dta: Vec<PathBuf>,
    pub mpt: Vec<PathBuf>,
}

impl DiscoveredFiles {
    pub fn len(&self) -> usize {
        self.dta.len() + self.mpt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dta.is_empty() && self.mpt.is_empty()
    }
}

/// File discovery component for one data directory
#[derive(Debug)]
pub struct FileDiscovery {
    data_dir: PathBuf,
}

impl FileDiscovery {
    /// Create a new file discovery instance
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Discover the files of every format the configuration selects
    ///
    /// A missing or unreadable directory aborts the scan; subdirectories are
    /// not searched.
    pub async fn discover(&self, config: &ProcessorConfig) -> Result<DiscoveredFiles> {
        match fs::metadata(&self.data_dir).await {
            Ok(metadata) if metadata.is_dir() => {}
            _ => {
                return Err(CyclerError::DirectoryNotFound {
                    path: self.data_dir.clone(),
                });
            }
        }

        // Surface permission problems before globbing silently skips them
        fs::read_dir(&self.data_dir)
            .await
            .map_err(|e| CyclerError::Discovery {
                pattern: self.data_dir.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut files = DiscoveredFiles::default();
        if config.formats.includes_dta() {
            files.dta = self.files_with_extension(&config.dta.extension)?;
        }
        if config.formats.includes_mpt() {
            files.mpt = self.files_with_extension(&config.mpt.extension)?;
        }

        debug!(
            "Found {} DTA and {} MPT files in {}",
            files.dta.len(),
            files.mpt.len(),
            self.data_dir.display()
        );

        Ok(files)
    }

    /// Glob `<dir>/*.<extension>` case-insensitively and sort the matches
    fn files_with_extension(&self, extension: &str) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/*.{}",
            Pattern::escape(&self.data_dir.to_string_lossy()),
            Pattern::escape(extension)
        );
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };

        let entries = glob_with(&pattern, options).map_err(|e| CyclerError::Discovery {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() && has_extension(&path, extension) => {
                    files.push(path)
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry {}: {}", e.path().display(), e),
            }
        }
        files.sort();

        Ok(files)
    }
}

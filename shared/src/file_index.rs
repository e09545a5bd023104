/*!
Resumable output numbering.

Acquisitions write `<base>_<n>.txt` with `n` starting at 1. Before a session
starts the output directory is scanned so that numbering continues after the
highest index already present instead of overwriting earlier runs.
*/

use crate::error::{Result, SharedError};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Base name used when none is configured
pub const DEFAULT_BASE_NAME: &str = "file";

/// Scans a directory for `<base>_<n>.txt` files
#[derive(Debug, Clone)]
pub struct FileIndexer {
    base_name: String,
    pattern: Regex,
}

impl FileIndexer {
    /// Create an indexer; an empty base name falls back to `file`
    pub fn new(base_name: &str) -> Result<Self> {
        let base_name = match base_name.trim() {
            "" => DEFAULT_BASE_NAME.to_string(),
            name => name.to_string(),
        };
        let pattern = Regex::new(&format!(r"^{}_(\d+)\.txt$", regex::escape(&base_name)))
            .map_err(|e| SharedError::invalid_config(format!("base name '{base_name}': {e}")))?;
        Ok(Self { base_name, pattern })
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Index encoded in a file name, if it belongs to this base
    pub fn index_of(&self, file_name: &str) -> Option<u32> {
        self.pattern
            .captures(file_name)
            .and_then(|caps| caps[1].parse().ok())
    }

    /// One past the highest existing index, or 1 if none (or no directory).
    /// Fails if the highest index is already `u32::MAX`.
    pub fn next_index<P: AsRef<Path>>(&self, dir: P) -> Result<u32> {
        let dir = dir.as_ref();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot scan {}: {}, starting at 1", dir.display(), e);
                return Ok(1);
            }
        };

        let highest = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| self.index_of(name))
            })
            .max();

        match highest {
            Some(max) => {
                debug!(
                    "Found {} in {}, continuing numbering",
                    self.file_name(max),
                    dir.display()
                );
                max.checked_add(1).ok_or_else(|| {
                    SharedError::invalid_config(format!(
                        "{} exists, no higher file index is available",
                        self.file_name(max)
                    ))
                })
            }
            None => Ok(1),
        }
    }

    /// First index of a run of `count` new files. Fails unless every index
    /// of the run fits in `u32`.
    pub fn reserve<P: AsRef<Path>>(&self, dir: P, count: u32) -> Result<u32> {
        let start = self.next_index(dir)?;
        if start.checked_add(count.saturating_sub(1)).is_none() {
            return Err(SharedError::invalid_config(format!(
                "{count} files starting at {} exceed the highest file index",
                self.file_name(start)
            )));
        }
        Ok(start)
    }

    /// File name for an index
    pub fn file_name(&self, index: u32) -> String {
        format!("{}_{}.txt", self.base_name, index)
    }

    /// Full path of an index inside `dir`
    pub fn path_in<P: AsRef<Path>>(&self, dir: P, index: u32) -> PathBuf {
        dir.as_ref().join(self.file_name(index))
    }
}

//! Advisory record of blocked addresses

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("IO error on mirror file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Append-only text file, one blocked address per line.
///
/// Written only after the firewall accepted a rule, so it may under-count
/// but never lists an address the firewall refused.
#[derive(Debug, Clone)]
pub struct BlockedMirror {
    path: PathBuf,
}

impl BlockedMirror {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        BlockedMirror { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one address
    pub fn record(&self, address: &str) -> Result<(), MirrorError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        writeln!(file, "{}", address).map_err(|source| self.io_error(source))?;
        Ok(())
    }

    /// Addresses recorded so far, oldest first. A missing file is empty.
    pub fn entries(&self) -> Result<Vec<String>, MirrorError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_error(source)),
        };
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn io_error(&self, source: std::io::Error) -> MirrorError {
        MirrorError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

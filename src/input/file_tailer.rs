use crate::signal::ShutdownCheck;
use crate::sleeper::Sleeper;
use std::fs::{File, Metadata};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the stream reader
#[derive(Error, Debug)]
pub enum TailError {
    #[error("Alert log not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tail a growing log file line by line
pub struct FileTailer {
    file_path: PathBuf,
    reader: BufReader<File>,
    file_position: u64,
    identity: Option<(u64, u64)>,
    pending: Vec<u8>,
    follow_rotation: bool,
}

impl FileTailer {
    /// Open the file and seek to its end.
    ///
    /// Only lines written after this call are ever returned.
    pub fn open<P: Into<PathBuf>>(file_path: P) -> Result<Self, TailError> {
        let file_path = file_path.into();
        let file = File::open(&file_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TailError::NotFound(file_path.clone()),
            _ => TailError::Io(e),
        })?;
        let identity = file_identity(&file.metadata()?);
        let mut reader = BufReader::new(file);

        // Seek to end of file to start tailing
        let file_position = reader.seek(SeekFrom::End(0))?;

        Ok(FileTailer {
            file_path,
            reader,
            file_position,
            identity,
            pending: Vec::new(),
            follow_rotation: true,
        })
    }

    /// Enable or disable reopening on truncation and rotation
    pub fn with_rotation(mut self, follow_rotation: bool) -> Self {
        self.follow_rotation = follow_rotation;
        self
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Byte offset of the next unread byte
    pub fn position(&self) -> u64 {
        self.file_position
    }

    /// Read the next complete line, if one is available.
    ///
    /// Returns `Ok(None)` at end of file. A trailing fragment without a
    /// newline is kept back until the rest of the line is written.
    pub fn read_line(&mut self) -> Result<Option<String>, TailError> {
        let bytes_read = self.reader.read_until(b'\n', &mut self.pending)?;
        if bytes_read == 0 {
            return Ok(None);
        }
        self.file_position += bytes_read as u64;

        if self.pending.last() != Some(&b'\n') {
            return Ok(None);
        }

        let bytes = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&bytes)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        Ok(Some(line))
    }

    /// Detect truncation or replacement of the log and reset the reader.
    ///
    /// Returns true when the reader was repositioned. A path that is
    /// missing mid-rotation is not an error; the old handle is kept.
    pub fn check_rotation(&mut self) -> Result<bool, TailError> {
        let metadata = match std::fs::metadata(&self.file_path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if file_identity(&metadata) != self.identity {
            let file = match File::open(&self.file_path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(e.into()),
            };
            log::info!("Alert log {:?} was rotated, reopening", self.file_path);
            self.identity = file_identity(&file.metadata()?);
            self.reader = BufReader::new(file);
            self.reset();
            return Ok(true);
        }

        if metadata.len() < self.file_position {
            log::warn!(
                "Alert log {:?} shrank from {} to {} bytes, reading from start",
                self.file_path,
                self.file_position,
                metadata.len()
            );
            self.reader.seek(SeekFrom::Start(0))?;
            self.reset();
            return Ok(true);
        }

        Ok(false)
    }

    /// Turn the tailer into an endless line sequence.
    ///
    /// The sequence waits `interval` at end of file and ends only when
    /// `shutdown` reports a stop request.
    pub fn follow<'a>(
        self,
        interval: Duration,
        sleeper: &'a dyn Sleeper,
        shutdown: &'a dyn ShutdownCheck,
    ) -> Follow<'a> {
        Follow {
            tailer: self,
            interval,
            sleeper,
            shutdown,
        }
    }

    fn reset(&mut self) {
        self.file_position = 0;
        self.pending.clear();
    }
}

#[cfg(unix)]
fn file_identity(metadata: &Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
fn file_identity(_metadata: &Metadata) -> Option<(u64, u64)> {
    None
}

/// Endless sequence of lines appended to a followed log
pub struct Follow<'a> {
    tailer: FileTailer,
    interval: Duration,
    sleeper: &'a dyn Sleeper,
    shutdown: &'a dyn ShutdownCheck,
}

impl Follow<'_> {
    pub fn tailer(&self) -> &FileTailer {
        &self.tailer
    }
}

impl Iterator for Follow<'_> {
    type Item = Result<String, TailError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.shutdown.should_stop() {
                return None;
            }

            match self.tailer.read_line() {
                Ok(Some(line)) => return Some(Ok(line)),
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }

            if self.tailer.follow_rotation {
                match self.tailer.check_rotation() {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => return Some(Err(e)),
                }
            }

            self.sleeper.sleep(self.interval);
        }
    }
}

use std::{
    fs::File,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::debug;
use thiserror::Error;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(300);
const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// An exclusive advisory lock on a file, released when dropped.
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error locking {0}: {1}")]
    IO(PathBuf, std::io::Error),
    #[error("Gave up waiting for the lock on {0} after {1:?}")]
    Timeout(PathBuf, Duration),
}

impl FileLock {
    pub fn new(path: &Path) -> Result<Self, Error> {
        Self::with_timeout(path, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_timeout(path: &Path, timeout: Duration) -> Result<Self, Error> {
        let io_error = |error| Error::IO(path.to_path_buf(), error);
        let file = File::create(path).map_err(io_error)?;
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(_) => {
                    return Ok(Self {
                        _file: file,
                        path: path.to_path_buf(),
                    });
                }
                Err(error)
                    if error.raw_os_error() == fs4::lock_contended_error().raw_os_error() =>
                {
                    if start.elapsed() >= timeout {
                        return Err(Error::Timeout(path.to_path_buf(), timeout));
                    }
                    debug!("Failed to acquire a lock on {}, retrying", path.display());
                    std::thread::sleep(RETRY_INTERVAL.min(timeout));
                }
                Err(error) => return Err(io_error(error)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

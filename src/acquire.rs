//! Opening source files for reading.
//!
//! Acquisition happens in two stages: a regular shared-read open, and, when another process holds
//! the file locked (the live logs under `%SystemRoot%\System32\winevt\Logs`), a raw volume read
//! which bypasses sharing restrictions but needs administrator privileges.

use crate::decoder::ReadSeek;
use crate::err::FatalError;

use log::{debug, warn};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

/// Windows `ERROR_SHARING_VIOLATION`.
const ERROR_SHARING_VIOLATION: i32 = 32;
/// Windows `ERROR_LOCK_VIOLATION`.
const ERROR_LOCK_VIOLATION: i32 = 33;

/// Result of the first, regular, open attempt.
pub enum Acquisition {
    Opened(Box<dyn ReadSeek>),
    /// Another process holds the file with an incompatible lock.
    Locked(io::Error),
    Failed(io::Error),
}

/// Result of the whole acquisition, once the locked-file fallback has been considered.
pub enum Acquired {
    Stream(Box<dyn ReadSeek>),
    /// The file could not be read, but the run may continue.
    Unavailable(io::Error),
}

pub trait SourceAccess {
    fn open_shared(&self, path: &Path) -> Acquisition;
}

/// Reads files which are locked by another process straight off the volume.
pub trait RawVolumeReader {
    fn is_elevated(&self) -> bool;

    fn open_locked(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>>;
}

/// Regular file system access.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsAccess;

impl SourceAccess for FsAccess {
    fn open_shared(&self, path: &Path) -> Acquisition {
        match File::open(path) {
            Ok(f) => Acquisition::Opened(Box::new(BufReader::new(f))),
            Err(e) if is_lock_error(&e) => Acquisition::Locked(e),
            Err(e) => Acquisition::Failed(e),
        }
    }
}

/// Sharing and lock violations only. A plain access denial is not a lock.
pub fn is_lock_error(e: &io::Error) -> bool {
    cfg!(windows)
        && matches!(
            e.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
        )
}

/// Opens `path`, falling back to `raw_reader` once if the file is locked.
///
/// A locked file without an elevated raw reader is fatal for the whole run.
pub fn acquire(
    path: &Path,
    access: &dyn SourceAccess,
    raw_reader: Option<&dyn RawVolumeReader>,
) -> Result<Acquired, FatalError> {
    let source = match access.open_shared(path) {
        Acquisition::Opened(stream) => return Ok(Acquired::Stream(stream)),
        Acquisition::Failed(e) => return Ok(Acquired::Unavailable(e)),
        Acquisition::Locked(e) => e,
    };

    let raw_reader = match raw_reader {
        Some(reader) if reader.is_elevated() => reader,
        _ => {
            return Err(FatalError::LockedWithoutPrivileges {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    warn!("'{}' is in use. Rerouting...", path.display());
    debug!("Shared open failed with: {}", source);

    match raw_reader.open_locked(path) {
        Ok(stream) => Ok(Acquired::Stream(stream)),
        Err(e) => Ok(Acquired::Unavailable(e)),
    }
}

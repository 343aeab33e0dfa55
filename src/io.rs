//! The file-like handle the core depends on.
//!
//! Opening the underlying file, choosing its path, and wiring up CLI/env
//! configuration are explicitly out of scope; this module only
//! defines the narrow surface the B+tree core needs from a file: positional
//! reads, append-style batched writes, fsync, truncate, file size, and an
//! advisory exclusive lock. [`OsFile`] is the one production implementation,
//! built directly on `std::fs::File`.

use std::fs::{File, OpenOptions as FsOpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use fs2::FileExt;

use crate::error::{Error, Result};

/// A random-access handle supporting the operations the btree core needs.
///
/// Implementors are not required to be thread-safe; the core never issues
/// concurrent calls against a single handle.
pub trait RandomAccessFile {
    /// Read exactly `buf.len()` bytes starting at byte `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Append `buf` at the given byte `offset`, which must equal (or be
    /// within) the file's current logical length; callers only ever write
    /// pages at their own page-aligned offset.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Flush the handle's buffered writes.
    fn flush(&mut self) -> Result<()>;

    /// Force previously written bytes to stable storage.
    fn sync(&mut self) -> Result<()>;

    /// Current length of the file in bytes.
    fn len(&mut self) -> Result<u64>;

    /// Returns true when the file is empty.
    fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncate the file to exactly `len` bytes.
    fn truncate(&mut self, len: u64) -> Result<()>;

    /// Acquire the advisory exclusive lock without blocking. Returns
    /// `Ok(false)` if another process (or handle) already holds it.
    fn try_lock_exclusive(&mut self) -> Result<bool>;

    /// Release a previously acquired exclusive lock.
    fn unlock(&mut self) -> Result<()>;
}

/// [`RandomAccessFile`] over a real OS file, with advisory locking via `fs2`.
pub struct OsFile {
    file: File,
}

impl OsFile {
    /// Open `path`, creating it (and any missing parent metadata is the
    /// caller's concern) unless `read_only`.
    pub fn open(path: &Path, read_only: bool) -> Result<Self> {
        let file = FsOpenOptions::new()
            .read(true)
            .write(!read_only)
            .create(!read_only)
            .open(path)?;
        Ok(OsFile { file })
    }

    /// Open a brand-new file for exclusive creation (used by the compactor
    /// for its temporary target file).
    pub fn create_new(path: &Path, mode: u32) -> Result<Self> {
        #[cfg(unix)]
        let file = {
            use std::os::unix::fs::OpenOptionsExt;
            FsOpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .mode(mode)
                .open(path)?
        };
        #[cfg(not(unix))]
        let file = {
            let _ = mode;
            FsOpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(path)?
        };
        Ok(OsFile { file })
    }
}

impl RandomAccessFile for OsFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn len(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    fn try_lock_exclusive(&mut self) -> Result<bool> {
        match self.file.try_lock_exclusive() {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn unlock(&mut self) -> Result<()> {
        fs2::FileExt::unlock(&self.file)?;
        Ok(())
    }
}

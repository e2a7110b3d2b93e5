//! Incremental blob I/O as a [`std::io`] stream.

use std::io::{self, Read, Seek, SeekFrom, Write};

use super::error::{DbError, DbResult};
use super::ffi::RawBlob;

/// A handle on a single blob cell, opened with
/// [`Connection::open_blob`](super::Connection::open_blob).
///
/// The blob has a fixed size; writes cannot extend it. Use `zeroblob(N)`
/// or [`Statement::bind_zeroblob`](super::Statement::bind_zeroblob) to
/// reserve space first.
pub struct BlobStream<'conn> {
    raw: RawBlob<'conn>,
    position: u64,
    writable: bool,
}

fn to_io(err: DbError) -> io::Error {
    io::Error::other(err)
}

impl<'conn> BlobStream<'conn> {
    pub(super) const fn new(raw: RawBlob<'conn>, writable: bool) -> Self {
        Self {
            raw,
            position: 0,
            writable,
        }
    }

    /// Size of the blob in bytes.
    pub fn len(&self) -> u64 {
        u64::try_from(self.raw.len()).unwrap_or(0)
    }

    /// Returns `true` for a zero-length blob.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current stream position.
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Whether the blob was opened for writing.
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    /// Points the handle at the same column of another row and rewinds.
    pub fn reopen(&mut self, rowid: i64) -> DbResult<()> {
        self.raw.reopen(rowid)?;
        self.position = 0;
        Ok(())
    }

    fn offset(&self) -> io::Result<i32> {
        i32::try_from(self.position)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "blob offset overflows"))
    }
}

impl Read for BlobStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len().saturating_sub(self.position);
        let n = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        if n == 0 {
            return Ok(0);
        }
        self.raw.read(&mut buf[..n], self.offset()?).map_err(to_io)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for BlobStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                DbError::InvalidArgument("blob was opened read-only".to_string()),
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let end = self.position + buf.len() as u64;
        if end > self.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                DbError::InvalidArgument(format!(
                    "write of {} bytes at {} exceeds blob size {}",
                    buf.len(),
                    self.position,
                    self.len()
                )),
            ));
        }
        self.raw.write(buf, self.offset()?).map_err(to_io)?;
        self.position = end;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for BlobStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(n) => (0, i64::try_from(n).unwrap_or(i64::MAX)),
            SeekFrom::Current(n) => (self.position, n),
            SeekFrom::End(n) => (self.len(), n),
        };
        let target = i64::try_from(base)
            .ok()
            .and_then(|b| b.checked_add(delta))
            .filter(|t| *t >= 0)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative position")
            })?;
        self.position = target.unsigned_abs();
        Ok(self.position)
    }
}

impl std::fmt::Debug for BlobStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStream")
            .field("len", &self.len())
            .field("position", &self.position)
            .field("writable", &self.writable)
            .finish()
    }
}

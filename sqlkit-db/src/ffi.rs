//! Raw FFI layer over the native `SQLite` library.
//!
//! The entry points come from `libsqlite3-sys`, which compiles the bundled
//! amalgamation and links it statically. They are resolved once, at compile
//! time, and every other module reaches them only through the handle types
//! defined here ([`RawDb`], [`RawStmt`], [`RawBlob`]).
//!
//! This is the **only** file in the crate that contains `unsafe` code or C
//! types.

#![allow(unsafe_code)]

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;

use libsqlite3_sys as native;

use super::error::{DbError, DbResult};

// ── SQLite constants ────────────────────────────────────────────────────

pub use native::{
    SQLITE_BLOB, SQLITE_DONE, SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_MISUSE, SQLITE_OK,
    SQLITE_OPEN_CREATE, SQLITE_OPEN_FULLMUTEX, SQLITE_OPEN_NOMUTEX, SQLITE_OPEN_READONLY,
    SQLITE_OPEN_READWRITE, SQLITE_ROW, SQLITE_TEXT,
};

/// Converts a Rust string into a C string, rejecting interior NUL bytes.
pub fn c_string(what: &str, s: &str) -> DbResult<CString> {
    CString::new(s).map_err(|e| DbError::InvalidArgument(format!("nul in {what}: {e}")))
}

/// Narrows a length or index to the `c_int` the C API expects.
pub fn to_c_int(what: &str, n: usize) -> DbResult<c_int> {
    c_int::try_from(n).map_err(|_| DbError::InvalidArgument(format!("{what} overflows c_int: {n}")))
}

/// Copies a borrowed, NUL-terminated C string. `None` for a null pointer.
fn borrowed_str(p: *const c_char) -> Option<String> {
    if p.is_null() {
        return None;
    }
    // SAFETY: SQLite returns NUL-terminated strings valid until the next call
    // on the same object; we copy immediately.
    Some(unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
}

/// Copies a string SQLite allocated for us and frees the original.
fn owned_str(p: *mut c_char) -> Option<String> {
    let s = borrowed_str(p);
    if !p.is_null() {
        // SAFETY: `p` was allocated by sqlite3_malloc and is not used again.
        unsafe { native::sqlite3_free(p.cast::<c_void>()) };
    }
    s
}

fn errmsg_of(db: *mut native::sqlite3) -> String {
    // SAFETY: `db` is either null (SQLite handles it) or a live connection.
    borrowed_str(unsafe { native::sqlite3_errmsg(db) })
        .unwrap_or_else(|| "unknown error".to_string())
}

// ── Library-wide calls ──────────────────────────────────────────────────

/// `sqlite3_libversion`.
pub fn lib_version() -> String {
    // SAFETY: returns a pointer to a static string.
    borrowed_str(unsafe { native::sqlite3_libversion() }).unwrap_or_default()
}

/// `sqlite3_sourceid`.
pub fn lib_source_id() -> String {
    // SAFETY: returns a pointer to a static string.
    borrowed_str(unsafe { native::sqlite3_sourceid() }).unwrap_or_default()
}

/// `sqlite3_libversion_number`.
pub fn lib_version_number() -> i32 {
    // SAFETY: no arguments, no side effects.
    unsafe { native::sqlite3_libversion_number() }
}

/// `sqlite3_memory_used`.
pub fn memory_used() -> i64 {
    // SAFETY: no arguments.
    unsafe { native::sqlite3_memory_used() }
}

/// `sqlite3_memory_highwater`.
pub fn memory_highwater(reset: bool) -> i64 {
    // SAFETY: plain integer flag.
    unsafe { native::sqlite3_memory_highwater(c_int::from(reset)) }
}

// ── Connection handle ───────────────────────────────────────────────────

/// Owning wrapper around a `sqlite3*`. Closed on drop.
pub struct RawDb {
    db: *mut native::sqlite3,
}

impl RawDb {
    /// `sqlite3_open_v2`.
    pub fn open(path: &str, flags: c_int, vfs: Option<&str>) -> DbResult<Self> {
        let c_path = c_string("path", path)?;
        let c_vfs = vfs.map(|v| c_string("vfs name", v)).transpose()?;
        let vfs_ptr = c_vfs.as_ref().map_or(ptr::null(), |v| v.as_ptr());

        let mut db: *mut native::sqlite3 = ptr::null_mut();
        // SAFETY: all pointers are valid for the duration of the call.
        let rc = unsafe { native::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, vfs_ptr) };
        if rc != SQLITE_OK {
            // A handle may be returned even on failure; it still must be closed.
            let msg = if db.is_null() {
                format!("sqlite3_open_v2 returned {rc}")
            } else {
                let m = errmsg_of(db);
                // SAFETY: `db` came from sqlite3_open_v2, has no statements and
                // is not used again.
                unsafe { native::sqlite3_close(db) };
                m
            };
            return Err(DbError::sqlite(rc, msg));
        }
        Ok(Self { db })
    }

    /// Most recent error message on this connection.
    pub fn errmsg(&self) -> String {
        errmsg_of(self.db)
    }

    fn check(&self, rc: c_int) -> DbResult<()> {
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(DbError::sqlite(rc, self.errmsg()))
        }
    }

    /// `sqlite3_exec` without a row callback.
    pub fn exec(&self, sql: &str) -> DbResult<()> {
        let c_sql = c_string("SQL", sql)?;
        let mut errmsg: *mut c_char = ptr::null_mut();
        // SAFETY: `self.db` is live, `c_sql` outlives the call.
        let rc = unsafe {
            native::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };
        if rc != SQLITE_OK {
            let msg = owned_str(errmsg).unwrap_or_else(|| self.errmsg());
            return Err(DbError::sqlite(rc, msg));
        }
        Ok(())
    }

    /// `sqlite3_prepare_v2` for the first statement in `sql`.
    ///
    /// Returns the statement, or `None` when `sql` starts with nothing but
    /// whitespace, comments or an empty `;`, together with the number of
    /// bytes of `sql` that were consumed.
    pub fn prepare_next(&self, sql: &str) -> DbResult<(Option<RawStmt<'_>>, usize)> {
        let c_sql = c_string("SQL", sql)?;
        let n_byte = to_c_int("SQL length", sql.len() + 1)?;
        let mut stmt: *mut native::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();
        // SAFETY: `self.db` is live, `c_sql` is NUL-terminated and `n_byte`
        // includes the terminator.
        let rc = unsafe {
            native::sqlite3_prepare_v2(self.db, c_sql.as_ptr(), n_byte, &mut stmt, &mut tail)
        };
        self.check(rc)?;
        let consumed = if tail.is_null() {
            sql.len()
        } else {
            // SAFETY: SQLite sets `tail` to a position inside `c_sql`.
            let offset = unsafe { tail.offset_from(c_sql.as_ptr()) };
            usize::try_from(offset).map_or(sql.len(), |o| o.min(sql.len()))
        };
        let stmt = (!stmt.is_null()).then_some(RawStmt {
            stmt,
            db: self.db,
            _conn: PhantomData,
        });
        Ok((stmt, consumed))
    }

    /// `sqlite3_prepare_v2` for `sql`, which must hold exactly one statement.
    pub fn prepare(&self, sql: &str) -> DbResult<RawStmt<'_>> {
        let (stmt, consumed) = self.prepare_next(sql)?;
        let Some(stmt) = stmt else {
            // Empty input or a lone comment.
            return Err(DbError::sqlite(SQLITE_MISUSE, "no SQL statement to prepare"));
        };
        let trailing = sql.get(consumed..).unwrap_or_default();
        let mut rest = trailing;
        while !rest.is_empty() {
            match self.prepare_next(rest) {
                Ok((None, 0)) => break,
                Ok((None, n)) => rest = rest.get(n..).unwrap_or_default(),
                _ => {
                    return Err(DbError::InvalidArgument(format!(
                        "SQL contains more than one statement; unused: {}",
                        trailing.trim()
                    )))
                }
            }
        }
        Ok(stmt)
    }

    /// `sqlite3_changes`.
    pub fn changes(&self) -> i32 {
        // SAFETY: `self.db` is live.
        unsafe { native::sqlite3_changes(self.db) }
    }

    /// `sqlite3_changes64`.
    pub fn changes64(&self) -> i64 {
        // SAFETY: `self.db` is live.
        unsafe { native::sqlite3_changes64(self.db) }
    }

    /// `sqlite3_total_changes`.
    pub fn total_changes(&self) -> i32 {
        // SAFETY: `self.db` is live.
        unsafe { native::sqlite3_total_changes(self.db) }
    }

    /// `sqlite3_total_changes64`.
    pub fn total_changes64(&self) -> i64 {
        // SAFETY: `self.db` is live.
        unsafe { native::sqlite3_total_changes64(self.db) }
    }

    /// `sqlite3_last_insert_rowid`.
    pub fn last_insert_rowid(&self) -> i64 {
        // SAFETY: `self.db` is live.
        unsafe { native::sqlite3_last_insert_rowid(self.db) }
    }

    /// `sqlite3_busy_timeout`.
    pub fn busy_timeout(&self, ms: c_int) -> DbResult<()> {
        // SAFETY: `self.db` is live.
        let rc = unsafe { native::sqlite3_busy_timeout(self.db, ms) };
        self.check(rc)
    }

    /// `sqlite3_interrupt`.
    pub fn interrupt(&self) {
        // SAFETY: `self.db` is live; interrupt is safe to call at any time.
        unsafe { native::sqlite3_interrupt(self.db) };
    }

    /// `sqlite3_is_interrupted`.
    pub fn is_interrupted(&self) -> bool {
        // SAFETY: `self.db` is live.
        unsafe { native::sqlite3_is_interrupted(self.db) != 0 }
    }

    /// `sqlite3_blob_open`.
    pub fn blob_open(
        &self,
        db_name: &str,
        table: &str,
        column: &str,
        rowid: i64,
        writable: bool,
    ) -> DbResult<RawBlob<'_>> {
        let c_db = c_string("database name", db_name)?;
        let c_table = c_string("table name", table)?;
        let c_column = c_string("column name", column)?;
        let mut blob: *mut native::sqlite3_blob = ptr::null_mut();
        // SAFETY: all strings outlive the call, `self.db` is live.
        let rc = unsafe {
            native::sqlite3_blob_open(
                self.db,
                c_db.as_ptr(),
                c_table.as_ptr(),
                c_column.as_ptr(),
                rowid,
                c_int::from(writable),
                &mut blob,
            )
        };
        if rc != SQLITE_OK {
            return Err(DbError::sqlite(rc, self.errmsg()));
        }
        Ok(RawBlob { blob, db: self.db, _conn: PhantomData })
    }
}

impl Drop for RawDb {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and never used after this point.
        // Statements and blobs borrow `RawDb`, so they are already finalized.
        let rc = unsafe { native::sqlite3_close(self.db) };
        if rc != SQLITE_OK {
            log::warn!("sqlite3_close returned {rc}");
        }
    }
}

// ── Statement handle ────────────────────────────────────────────────────

/// Owning wrapper around a `sqlite3_stmt*`. Finalized on drop.
pub struct RawStmt<'conn> {
    stmt: *mut native::sqlite3_stmt,
    db: *mut native::sqlite3,
    _conn: PhantomData<&'conn RawDb>,
}

impl RawStmt<'_> {
    fn check(&self, rc: c_int) -> DbResult<()> {
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(DbError::sqlite(rc, errmsg_of(self.db)))
        }
    }

    /// `sqlite3_step`; returns `SQLITE_ROW` or `SQLITE_DONE`.
    pub fn step(&self) -> DbResult<c_int> {
        // SAFETY: `self.stmt` is a live prepared statement.
        let rc = unsafe { native::sqlite3_step(self.stmt) };
        match rc {
            SQLITE_ROW | SQLITE_DONE => Ok(rc),
            _ => Err(DbError::sqlite(rc, errmsg_of(self.db))),
        }
    }

    /// `sqlite3_reset`.
    pub fn reset(&self) -> DbResult<()> {
        // SAFETY: `self.stmt` is live.
        let rc = unsafe { native::sqlite3_reset(self.stmt) };
        self.check(rc)
    }

    /// `sqlite3_clear_bindings`.
    pub fn clear_bindings(&self) -> DbResult<()> {
        // SAFETY: `self.stmt` is live.
        let rc = unsafe { native::sqlite3_clear_bindings(self.stmt) };
        self.check(rc)
    }

    // ── Binding ─────────────────────────────────────────────────────────

    /// `sqlite3_bind_int64`.
    pub fn bind_i64(&self, idx: c_int, v: i64) -> DbResult<()> {
        // SAFETY: `self.stmt` is live.
        let rc = unsafe { native::sqlite3_bind_int64(self.stmt, idx, v) };
        self.check(rc)
    }

    /// `sqlite3_bind_double`.
    pub fn bind_f64(&self, idx: c_int, v: f64) -> DbResult<()> {
        // SAFETY: `self.stmt` is live.
        let rc = unsafe { native::sqlite3_bind_double(self.stmt, idx, v) };
        self.check(rc)
    }

    /// `sqlite3_bind_text` with `SQLITE_TRANSIENT` (SQLite copies the data).
    pub fn bind_text(&self, idx: c_int, v: &str) -> DbResult<()> {
        let len = to_c_int("text length", v.len())?;
        // SAFETY: the buffer is valid for `len` bytes; TRANSIENT makes SQLite copy it.
        let rc = unsafe {
            native::sqlite3_bind_text(
                self.stmt,
                idx,
                v.as_ptr().cast::<c_char>(),
                len,
                native::SQLITE_TRANSIENT(),
            )
        };
        self.check(rc)
    }

    /// `sqlite3_bind_blob` with `SQLITE_TRANSIENT` (SQLite copies the data).
    pub fn bind_blob(&self, idx: c_int, v: &[u8]) -> DbResult<()> {
        let len = to_c_int("blob length", v.len())?;
        // SAFETY: the buffer is valid for `len` bytes; TRANSIENT makes SQLite copy it.
        let rc = unsafe {
            native::sqlite3_bind_blob(
                self.stmt,
                idx,
                v.as_ptr().cast::<c_void>(),
                len,
                native::SQLITE_TRANSIENT(),
            )
        };
        self.check(rc)
    }

    /// `sqlite3_bind_zeroblob`.
    pub fn bind_zeroblob(&self, idx: c_int, len: c_int) -> DbResult<()> {
        // SAFETY: `self.stmt` is live.
        let rc = unsafe { native::sqlite3_bind_zeroblob(self.stmt, idx, len) };
        self.check(rc)
    }

    /// `sqlite3_bind_null`.
    pub fn bind_null(&self, idx: c_int) -> DbResult<()> {
        // SAFETY: `self.stmt` is live.
        let rc = unsafe { native::sqlite3_bind_null(self.stmt, idx) };
        self.check(rc)
    }

    /// `sqlite3_bind_parameter_count`.
    pub fn parameter_count(&self) -> c_int {
        // SAFETY: `self.stmt` is live.
        unsafe { native::sqlite3_bind_parameter_count(self.stmt) }
    }

    /// `sqlite3_bind_parameter_index`; 0 when no parameter has that name.
    pub fn parameter_index(&self, name: &str) -> DbResult<c_int> {
        let c_name = c_string("parameter name", name)?;
        // SAFETY: `c_name` outlives the call.
        Ok(unsafe { native::sqlite3_bind_parameter_index(self.stmt, c_name.as_ptr()) })
    }

    /// `sqlite3_bind_parameter_name`; `None` for nameless or out-of-range.
    pub fn parameter_name(&self, idx: c_int) -> Option<String> {
        // SAFETY: `self.stmt` is live; out-of-range yields null.
        borrowed_str(unsafe { native::sqlite3_bind_parameter_name(self.stmt, idx) })
    }

    // ── Statement text ──────────────────────────────────────────────────

    /// `sqlite3_sql`.
    pub fn sql(&self) -> String {
        // SAFETY: `self.stmt` is live.
        borrowed_str(unsafe { native::sqlite3_sql(self.stmt) }).unwrap_or_default()
    }

    /// `sqlite3_expanded_sql`.
    pub fn expanded_sql(&self) -> Option<String> {
        // SAFETY: `self.stmt` is live; the result is freed by `owned_str`.
        owned_str(unsafe { native::sqlite3_expanded_sql(self.stmt) })
    }

    // ── Column reading ──────────────────────────────────────────────────
    //
    // Out-of-range column indices are harmless at the C level: SQLite
    // returns the NULL-value defaults and flags SQLITE_RANGE.

    /// `sqlite3_column_count`.
    pub fn column_count(&self) -> c_int {
        // SAFETY: `self.stmt` is live.
        unsafe { native::sqlite3_column_count(self.stmt) }
    }

    /// `sqlite3_column_name`.
    pub fn column_name(&self, idx: c_int) -> Option<String> {
        // SAFETY: `self.stmt` is live.
        borrowed_str(unsafe { native::sqlite3_column_name(self.stmt, idx) })
    }

    /// `sqlite3_column_type`.
    pub fn column_type(&self, idx: c_int) -> c_int {
        // SAFETY: `self.stmt` is live.
        unsafe { native::sqlite3_column_type(self.stmt, idx) }
    }

    /// `sqlite3_column_int`.
    pub fn column_i32(&self, idx: c_int) -> i32 {
        // SAFETY: `self.stmt` is live.
        unsafe { native::sqlite3_column_int(self.stmt, idx) }
    }

    /// `sqlite3_column_int64`.
    pub fn column_i64(&self, idx: c_int) -> i64 {
        // SAFETY: `self.stmt` is live.
        unsafe { native::sqlite3_column_int64(self.stmt, idx) }
    }

    /// `sqlite3_column_double`.
    pub fn column_f64(&self, idx: c_int) -> f64 {
        // SAFETY: `self.stmt` is live.
        unsafe { native::sqlite3_column_double(self.stmt, idx) }
    }

    /// `sqlite3_column_text`. Empty string for NULL.
    pub fn column_text(&self, idx: c_int) -> String {
        // SAFETY: text pointer and byte count are read back to back, and the
        // bytes are copied before any other call on the statement.
        unsafe {
            let p = native::sqlite3_column_text(self.stmt, idx);
            let len = native::sqlite3_column_bytes(self.stmt, idx);
            if p.is_null() || len <= 0 {
                return String::new();
            }
            let bytes = std::slice::from_raw_parts(p, usize::try_from(len).unwrap_or(0));
            String::from_utf8_lossy(bytes).into_owned()
        }
    }

    /// `sqlite3_column_blob`. Empty vector for NULL.
    pub fn column_blob(&self, idx: c_int) -> Vec<u8> {
        // SAFETY: as for `column_text`.
        unsafe {
            let p = native::sqlite3_column_blob(self.stmt, idx);
            let len = native::sqlite3_column_bytes(self.stmt, idx);
            if p.is_null() || len <= 0 {
                return Vec::new();
            }
            std::slice::from_raw_parts(p.cast::<u8>(), usize::try_from(len).unwrap_or(0)).to_vec()
        }
    }
}

impl Drop for RawStmt<'_> {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and never used after this point. The
        // return code repeats the last step error, which was already reported.
        unsafe { native::sqlite3_finalize(self.stmt) };
    }
}

// ── Incremental BLOB handle ─────────────────────────────────────────────

/// Owning wrapper around a `sqlite3_blob*`. Closed on drop.
pub struct RawBlob<'conn> {
    blob: *mut native::sqlite3_blob,
    db: *mut native::sqlite3,
    _conn: PhantomData<&'conn RawDb>,
}

impl RawBlob<'_> {
    fn check(&self, rc: c_int) -> DbResult<()> {
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(DbError::sqlite(rc, errmsg_of(self.db)))
        }
    }

    /// `sqlite3_blob_bytes`.
    pub fn len(&self) -> c_int {
        // SAFETY: `self.blob` is live.
        unsafe { native::sqlite3_blob_bytes(self.blob) }
    }

    /// `sqlite3_blob_read` into `buf` starting at `offset`.
    pub fn read(&self, buf: &mut [u8], offset: c_int) -> DbResult<()> {
        let n = to_c_int("read length", buf.len())?;
        // SAFETY: `buf` is writable for `n` bytes; the caller keeps
        // `offset + n` within the blob.
        let rc = unsafe {
            native::sqlite3_blob_read(self.blob, buf.as_mut_ptr().cast::<c_void>(), n, offset)
        };
        self.check(rc)
    }

    /// `sqlite3_blob_write` of `buf` starting at `offset`.
    pub fn write(&self, buf: &[u8], offset: c_int) -> DbResult<()> {
        let n = to_c_int("write length", buf.len())?;
        // SAFETY: `buf` is readable for `n` bytes.
        let rc = unsafe {
            native::sqlite3_blob_write(self.blob, buf.as_ptr().cast::<c_void>(), n, offset)
        };
        self.check(rc)
    }

    /// `sqlite3_blob_reopen`.
    pub fn reopen(&self, rowid: i64) -> DbResult<()> {
        // SAFETY: `self.blob` is live.
        let rc = unsafe { native::sqlite3_blob_reopen(self.blob, rowid) };
        self.check(rc)
    }
}

impl Drop for RawBlob<'_> {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and never used after this point.
        let rc = unsafe { native::sqlite3_blob_close(self.blob) };
        if rc != SQLITE_OK {
            log::warn!("sqlite3_blob_close returned {rc}");
        }
    }
}

//! Safe wrapper around a `SQLite` database connection.
//!
//! This file contains **no `unsafe` code**. All FFI interaction is delegated to
//! [`ffi::RawDb`].

use std::path::Path;
use std::time::Duration;

use super::blob::BlobStream;
use super::columns::ColumnAccess;
use super::error::{DbError, DbResult};
use super::ffi::{self, RawDb};
use super::statement::{Statement, StepResult};
use super::transaction::{Transaction, TransactionBehavior};
use super::value::Value;

/// How a connection is opened.
///
/// The default opens read-write, creates the file if missing and uses the
/// serialized threading mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    read_only: bool,
    create: bool,
    full_mutex: bool,
    vfs: Option<String>,
    busy_timeout: Option<Duration>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            create: true,
            full_mutex: true,
            vfs: None,
            busy_timeout: None,
        }
    }
}

impl OpenOptions {
    /// Same as [`OpenOptions::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the database read-only. Implies `create(false)`.
    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Creates the file if it does not exist. Ignored for read-only opens.
    #[must_use]
    pub const fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Serialized (`FULLMUTEX`) or multi-thread (`NOMUTEX`) mode.
    #[must_use]
    pub const fn full_mutex(mut self, full_mutex: bool) -> Self {
        self.full_mutex = full_mutex;
        self
    }

    /// Name of the VFS module to use instead of the default one.
    #[must_use]
    pub fn vfs(mut self, vfs: impl Into<String>) -> Self {
        self.vfs = Some(vfs.into());
        self
    }

    /// Busy handler timeout applied right after opening.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    fn flags(&self) -> i32 {
        let access = if self.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else if self.create {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        } else {
            ffi::SQLITE_OPEN_READWRITE
        };
        let threading = if self.full_mutex {
            ffi::SQLITE_OPEN_FULLMUTEX
        } else {
            ffi::SQLITE_OPEN_NOMUTEX
        };
        access | threading
    }
}

/// A `SQLite` database connection.
///
/// The connection is closed when dropped. It is neither `Send` nor `Sync`;
/// statements, transactions and blob streams borrow it.
pub struct Connection {
    db: RawDb,
}

impl Connection {
    /// Opens (or creates) a database at `path`.
    ///
    /// Pass `read_only = true` for read-only access.
    pub fn open(path: &Path, read_only: bool) -> DbResult<Self> {
        Self::open_with(path, &OpenOptions::new().read_only(read_only))
    }

    /// Opens a database at `path` with explicit [`OpenOptions`].
    pub fn open_with(path: &Path, options: &OpenOptions) -> DbResult<Self> {
        let path_str = path.to_string_lossy();
        let db = RawDb::open(&path_str, options.flags(), options.vfs.as_deref())?;
        let conn = Self { db };
        if let Some(timeout) = options.busy_timeout {
            conn.set_busy_timeout(timeout)?;
        }
        log::debug!("opened database {path_str}");
        Ok(conn)
    }

    /// Opens an in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open(Path::new(":memory:"), false)
    }

    // ── execute_batch ───────────────────────────────────────────────────

    /// Executes one or more SQL statements separated by semicolons.
    ///
    /// No result rows are returned. This is suitable for DDL, PRAGMAs, and
    /// multi-statement scripts.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.db.exec(sql)
    }

    /// Runs every statement in `sql` in order, passing each result row to
    /// `callback` as column names and text values (`None` for NULL).
    ///
    /// Returning `false` from the callback skips the remaining rows of the
    /// current statement; later statements still run. The first failing
    /// statement aborts the script.
    pub fn execute_with(
        &self,
        sql: &str,
        mut callback: impl FnMut(&[String], &[Option<String>]) -> bool,
    ) -> DbResult<()> {
        let mut rest = sql;
        while !rest.is_empty() {
            let (raw, consumed) = self.db.prepare_next(rest)?;
            if let Some(raw) = raw {
                let stmt = Statement::new(raw);
                let mut names: Option<Vec<String>> = None;
                while stmt.step()? == StepResult::Row {
                    let names = names.get_or_insert_with(|| stmt.column_names());
                    let values: Vec<Option<String>> = (0..names.len())
                        .map(|i| stmt.get_nullable_text_unchecked(i))
                        .collect();
                    if !callback(names, &values) {
                        break;
                    }
                }
            }
            if consumed == 0 {
                break;
            }
            rest = rest.get(consumed..).unwrap_or_default();
        }
        Ok(())
    }

    // ── prepare ─────────────────────────────────────────────────────────

    /// Prepares a single SQL statement.
    ///
    /// Fails with [`DbError::InvalidArgument`] if anything other than
    /// whitespace or comments follows the first statement.
    pub fn prepare(&self, sql: &str) -> DbResult<Statement<'_>> {
        self.db.prepare(sql).map(Statement::new)
    }

    // ── execute (single statement) ──────────────────────────────────────

    /// Prepares and executes a single SQL statement with the given parameters.
    ///
    /// Returns the number of rows changed.
    pub fn execute(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        let stmt = self.prepare(sql)?;
        stmt.bind_values(params)?;
        stmt.step()?;
        Ok(self.changes())
    }

    // ── query_row ───────────────────────────────────────────────────────

    /// Prepares and executes a statement, mapping exactly one result row.
    ///
    /// Returns an error if no row is returned.
    pub fn query_row<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnOnce(&Statement<'_>) -> DbResult<T>,
    ) -> DbResult<T> {
        self.query_row_optional(sql, params, mapper)?
            .ok_or_else(|| DbError::sqlite(ffi::SQLITE_DONE, "query returned no rows"))
    }

    /// Like [`query_row`](Self::query_row) but returns `Ok(None)` when no row
    /// is returned.
    pub fn query_row_optional<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnOnce(&Statement<'_>) -> DbResult<T>,
    ) -> DbResult<Option<T>> {
        let stmt = self.prepare(sql)?;
        stmt.bind_values(params)?;
        match stmt.step()? {
            StepResult::Row => mapper(&stmt).map(Some),
            StepResult::Done => Ok(None),
        }
    }

    // ── Rows iteration ──────────────────────────────────────────────────

    /// Prepares a statement and collects all matching rows.
    pub fn query_map<T>(
        &self,
        sql: &str,
        params: &[Value],
        mut mapper: impl FnMut(&Statement<'_>) -> DbResult<T>,
    ) -> DbResult<Vec<T>> {
        let mut results = Vec::new();
        self.for_each_row(sql, params, |stmt| {
            results.push(mapper(stmt)?);
            Ok(true)
        })?;
        Ok(results)
    }

    /// Runs `callback` for every result row. Iteration stops early when the
    /// callback returns `Ok(false)`.
    pub fn for_each_row(
        &self,
        sql: &str,
        params: &[Value],
        mut callback: impl FnMut(&Statement<'_>) -> DbResult<bool>,
    ) -> DbResult<()> {
        let stmt = self.prepare(sql)?;
        stmt.bind_values(params)?;
        while stmt.step()? == StepResult::Row {
            if !callback(&stmt)? {
                break;
            }
        }
        Ok(())
    }

    // ── Transactions ─────────────────────────────────────────────────────

    /// Begins a deferred transaction.
    pub fn transaction(&self) -> DbResult<Transaction<'_>> {
        Transaction::begin(self, TransactionBehavior::Deferred)
    }

    /// Begins an immediate transaction (acquires RESERVED lock).
    pub fn transaction_immediate(&self) -> DbResult<Transaction<'_>> {
        Transaction::begin(self, TransactionBehavior::Immediate)
    }

    /// Begins an exclusive transaction.
    pub fn transaction_exclusive(&self) -> DbResult<Transaction<'_>> {
        Transaction::begin(self, TransactionBehavior::Exclusive)
    }

    // ── Blobs ───────────────────────────────────────────────────────────

    /// Opens incremental I/O on the blob stored in `table.column` of the row
    /// `rowid` in the attached database `db` (`"main"` for the primary one).
    pub fn open_blob(
        &self,
        db: &str,
        table: &str,
        column: &str,
        rowid: i64,
        writable: bool,
    ) -> DbResult<BlobStream<'_>> {
        let raw = self.db.blob_open(db, table, column, rowid, writable)?;
        Ok(BlobStream::new(raw, writable))
    }

    // ── Counters ────────────────────────────────────────────────────────

    /// Returns the rowid of the most recent successful INSERT.
    pub fn last_insert_rowid(&self) -> i64 {
        self.db.last_insert_rowid()
    }

    /// Returns the number of rows changed by the most recent statement.
    pub fn changes(&self) -> usize {
        usize::try_from(self.db.changes()).unwrap_or(0)
    }

    /// Returns the number of rows changed since the connection was opened.
    pub fn total_changes(&self) -> usize {
        usize::try_from(self.db.total_changes()).unwrap_or(0)
    }

    /// 64-bit variant of [`changes`](Self::changes).
    pub fn changes64(&self) -> i64 {
        self.db.changes64()
    }

    /// 64-bit variant of [`total_changes`](Self::total_changes).
    pub fn total_changes64(&self) -> i64 {
        self.db.total_changes64()
    }

    // ── Busy handling ───────────────────────────────────────────────────

    /// Current busy handler timeout.
    pub fn busy_timeout(&self) -> DbResult<Duration> {
        let ms = self.query_row("PRAGMA busy_timeout", &[], |stmt| stmt.get_int64(0))?;
        Ok(Duration::from_millis(u64::try_from(ms).unwrap_or(0)))
    }

    /// Sets the busy handler timeout. A zero duration disables the handler.
    pub fn set_busy_timeout(&self, timeout: Duration) -> DbResult<()> {
        let ms = i32::try_from(timeout.as_millis()).map_err(|_| {
            DbError::InvalidArgument(format!("busy timeout too large: {timeout:?}"))
        })?;
        self.db.busy_timeout(ms)
    }

    /// Asks any running query on this connection to abort at its earliest
    /// opportunity. The query fails with `SQLITE_INTERRUPT`.
    pub fn interrupt(&self) {
        self.db.interrupt();
    }

    /// Whether an interrupt is pending. The flag clears once no statement
    /// on the connection is running.
    pub fn is_interrupted(&self) -> bool {
        self.db.is_interrupted()
    }

    // ── Maintenance ─────────────────────────────────────────────────────

    /// Rebuilds the database file, repacking it into a minimal amount of
    /// disk space.
    pub fn vacuum(&self) -> DbResult<()> {
        self.execute_batch("VACUUM")
    }

    /// Gathers statistics about tables and indices for the query planner.
    pub fn analyze(&self) -> DbResult<()> {
        self.execute_batch("ANALYZE")
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

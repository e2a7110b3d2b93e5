//! Safe wrapper around a `SQLite` prepared statement.
//!
//! This file contains **no `unsafe` code**. All FFI interaction is delegated to
//! [`ffi::RawStmt`] which encapsulates the raw pointers and C type conversions.

use std::os::raw::c_int;

use super::columns::{Cursor, NameIndex};
use super::error::{DbError, DbResult};
use super::ffi::{self, RawStmt};
use super::value::{StorageClass, Value};

/// Result of a single `sqlite3_step` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A result row is available.
    Row,
    /// The statement has finished executing.
    Done,
}

/// A prepared `SQLite` statement.
///
/// Created via [`Connection::prepare`](super::Connection::prepare).
/// Tied to the lifetime of the connection that created it.
/// Finalized when dropped.
///
/// Column values of the current row are read through
/// [`ColumnAccess`](super::ColumnAccess), which every statement implements
/// via [`Cursor`]. The column count is read from the handle on every call,
/// since `SQLite` re-prepares a statement whose schema changed.
pub struct Statement<'conn> {
    raw: RawStmt<'conn>,
    names: NameIndex,
}

/// Converts a column ordinal for the C API. Ordinals past `c_int::MAX`
/// cannot name a column, so they are clamped to an index SQLite treats as
/// out of range.
fn col(idx: usize) -> c_int {
    c_int::try_from(idx).unwrap_or(c_int::MAX)
}

impl<'conn> Statement<'conn> {
    /// Wraps a raw statement handle.
    pub(super) const fn new(raw: RawStmt<'conn>) -> Self {
        Self {
            raw,
            names: NameIndex::new(),
        }
    }

    // ── Binding ─────────────────────────────────────────────────────────

    /// Binds a slice of [`Value`]s to the statement parameters (1-indexed).
    pub fn bind_values(&self, values: &[Value]) -> DbResult<()> {
        for (i, val) in values.iter().enumerate() {
            self.bind(i + 1, val)?;
        }
        Ok(())
    }

    /// Binds `value` to the 1-based parameter `index`.
    pub fn bind(&self, index: usize, value: &Value) -> DbResult<()> {
        let idx = ffi::to_c_int("parameter index", index)?;
        match value {
            Value::Integer(v) => self.raw.bind_i64(idx, *v),
            Value::Float(v) => self.raw.bind_f64(idx, *v),
            Value::Text(v) => self.raw.bind_text(idx, v),
            Value::Blob(v) => self.raw.bind_blob(idx, v),
            Value::Null => self.raw.bind_null(idx),
        }
    }

    /// Binds `value` to the parameter called `name` (including its prefix,
    /// e.g. `":id"`).
    pub fn bind_named(&self, name: &str, value: &Value) -> DbResult<()> {
        let index = self.parameter_index(name)?;
        self.bind(index, value)
    }

    /// Binds a zero-filled blob of `len` bytes, to be filled later through a
    /// [`BlobStream`](super::BlobStream).
    pub fn bind_zeroblob(&self, index: usize, len: usize) -> DbResult<()> {
        let idx = ffi::to_c_int("parameter index", index)?;
        let len = ffi::to_c_int("zeroblob length", len)?;
        self.raw.bind_zeroblob(idx, len)
    }

    /// Resets every parameter to NULL.
    pub fn clear_bindings(&self) -> DbResult<()> {
        self.raw.clear_bindings()
    }

    /// Number of SQL parameters (the largest parameter index).
    pub fn parameter_count(&self) -> usize {
        usize::try_from(self.raw.parameter_count()).unwrap_or(0)
    }

    /// 1-based index of the parameter called `name`.
    pub fn parameter_index(&self, name: &str) -> DbResult<usize> {
        match self.raw.parameter_index(name)? {
            0 => Err(DbError::UnknownParameter(name.to_string())),
            i => Ok(usize::try_from(i).unwrap_or(0)),
        }
    }

    /// Name of the 1-based parameter `index`; `None` for nameless (`?`) or
    /// out-of-range parameters.
    pub fn parameter_name(&self, index: usize) -> Option<String> {
        self.raw.parameter_name(col(index))
    }

    // ── Stepping ────────────────────────────────────────────────────────

    /// Executes a single step.
    pub fn step(&self) -> DbResult<StepResult> {
        let rc = self.raw.step()?;
        if rc == ffi::SQLITE_ROW {
            Ok(StepResult::Row)
        } else {
            Ok(StepResult::Done)
        }
    }

    /// Resets the statement so it can be stepped again. Bindings are kept.
    pub fn reset(&self) -> DbResult<()> {
        self.raw.reset()
    }

    // ── Introspection ───────────────────────────────────────────────────

    /// SQL text the statement was prepared from.
    pub fn sql(&self) -> String {
        self.raw.sql()
    }

    /// SQL text with bound parameters substituted.
    pub fn expanded_sql(&self) -> Option<String> {
        self.raw.expanded_sql()
    }

    /// Returns `true` if the column is SQL NULL.
    pub fn is_column_null(&self, idx: usize) -> bool {
        self.storage_class(idx) == StorageClass::Null
    }
}

impl Cursor for Statement<'_> {
    fn column_count(&self) -> usize {
        usize::try_from(self.raw.column_count()).unwrap_or(0)
    }

    fn column_name(&self, index: usize) -> Option<String> {
        self.raw.column_name(col(index))
    }

    fn storage_class(&self, index: usize) -> StorageClass {
        StorageClass::from_code(self.raw.column_type(col(index)))
    }

    fn raw_int(&self, index: usize) -> i32 {
        self.raw.column_i32(col(index))
    }

    fn raw_int64(&self, index: usize) -> i64 {
        self.raw.column_i64(col(index))
    }

    fn raw_double(&self, index: usize) -> f64 {
        self.raw.column_f64(col(index))
    }

    fn raw_text(&self, index: usize) -> String {
        self.raw.column_text(col(index))
    }

    fn raw_blob(&self, index: usize) -> Vec<u8> {
        self.raw.column_blob(col(index))
    }

    fn name_index(&self) -> &NameIndex {
        &self.names
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql())
            .field("column_count", &self.column_count())
            .finish_non_exhaustive()
    }
}

//! Error types for the safe `SQLite` wrapper.

use std::fmt;

use thiserror::Error;

use crate::header::HeaderViolation;
use crate::value::StorageClass;

/// Result code returned by the native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbErrorCode(pub i32);

impl fmt::Display for DbErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies the column a failed accessor call referred to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    /// Zero-based ordinal.
    Index(usize),
    /// Result column name.
    Name(String),
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "at {i}"),
            Self::Name(n) => write!(f, "of \"{n}\""),
        }
    }
}

/// Error returned by database, header and column-accessor operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// The native library reported a failure.
    #[error("sqlite error {code}: {message}")]
    Sqlite {
        /// `SQLite` result code.
        code: DbErrorCode,
        /// Message from `sqlite3_errmsg` when available.
        message: String,
    },

    /// Fewer than 100 bytes were available when reading a file header.
    #[error("file is too small to analyze as a SQLite3 file; {read} bytes")]
    TooSmallFile {
        /// Bytes actually read.
        read: usize,
    },

    /// The header does not start with `"SQLite format 3\0"`.
    #[error("not a SQLite3 database file")]
    NotASqliteFile,

    /// A header field is outside its documented range.
    #[error("invalid database header: {0}")]
    InvalidHeader(HeaderViolation),

    /// The header's text encoding code is not 1, 2 or 3.
    #[error("unrecognized text encoding value {0}")]
    UnsupportedEncoding(u32),

    /// A checked accessor was given an ordinal outside the result set.
    #[error("column index {index} is out of range (column count {count})")]
    IndexOutOfRange {
        /// Requested ordinal.
        index: usize,
        /// Number of result columns.
        count: usize,
    },

    /// A name-based accessor was given a name absent from the result set.
    #[error("no such column: \"{0}\"")]
    UnknownColumnName(String),

    /// A named bind was given a parameter name the statement does not have.
    #[error("no such parameter: \"{0}\"")]
    UnknownParameter(String),

    /// A strict accessor found a storage class other than the expected one.
    #[error(
        "attempt to get column value {column} as an improper type, \
         expected type is {expected}, but actual type is {actual}"
    )]
    TypeMismatch {
        /// Storage class the accessor requires.
        expected: StorageClass,
        /// Storage class of the cell.
        actual: StorageClass,
        /// Column the caller asked for.
        column: ColumnRef,
    },

    /// An argument could not be passed to the native library.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O failure while reading a database file directly.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Creates an error from a native result code and message.
    pub(crate) fn sqlite(code: i32, message: impl Into<String>) -> Self {
        Self::Sqlite {
            code: DbErrorCode(code),
            message: message.into(),
        }
    }

    /// Native result code, if this error came from the library.
    #[must_use]
    pub const fn code(&self) -> Option<DbErrorCode> {
        match self {
            Self::Sqlite { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

//! Safe `SQLite` toolkit: a database file header decoder and a typed column
//! accessor over a minimal connection/statement wrapper.
//!
//! The native library is the bundled amalgamation compiled by
//! `libsqlite3-sys`. Its symbols are resolved at compile time and reached
//! only through the `ffi` module, which is the **only** file that contains
//! `unsafe` code or C types.
//!
//! ```no_run
//! use sqlkit_db::{params, ColumnAccess, Connection};
//!
//! # fn main() -> sqlkit_db::DbResult<()> {
//! let conn = Connection::open_in_memory()?;
//! conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")?;
//! conn.execute("INSERT INTO t (name) VALUES (?1)", params!["alice"])?;
//! let name: Option<String> =
//!     conn.query_row("SELECT name FROM t", &[], |row| row.get_nullable_text("name"))?;
//! assert_eq!(name.as_deref(), Some("alice"));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod ffi;

mod blob;
pub mod columns;
mod connection;
pub mod error;
pub mod header;
pub mod library;
pub mod pragma;
mod statement;
mod transaction;
pub mod value;

pub use blob::BlobStream;
pub use columns::{ColumnAccess, ColumnIndex, Cursor, FromColumn, NameIndex};
pub use connection::{Connection, OpenOptions};
pub use error::{ColumnRef, DbError, DbErrorCode, DbResult};
pub use header::{
    read_header, read_header_with, FileHeader, HeaderPolicy, HeaderViolation, JournalMode,
    TextEncoding,
};
pub use library::LibraryInfo;
pub use statement::{Statement, StepResult};
pub use transaction::{Transaction, TransactionBehavior};
pub use value::{StorageClass, Value};

#[cfg(test)]
mod tests;

//! Safe wrapper around a `SQLite` transaction.

use super::connection::Connection;
use super::error::DbResult;
use super::statement::Statement;
use super::value::Value;

/// Transaction locking behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionBehavior {
    /// `BEGIN DEFERRED` (the default).
    #[default]
    Deferred,
    /// `BEGIN IMMEDIATE` – acquires a RESERVED lock immediately.
    Immediate,
    /// `BEGIN EXCLUSIVE`.
    Exclusive,
}

/// An open database transaction.
///
/// Automatically rolls back on drop unless explicitly committed or rolled
/// back.
pub struct Transaction<'conn> {
    conn: &'conn Connection,
    finished: bool,
}

/// Quotes a savepoint name as an SQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl<'conn> Transaction<'conn> {
    /// Begins a new transaction on `conn`.
    pub(super) fn begin(conn: &'conn Connection, behavior: TransactionBehavior) -> DbResult<Self> {
        let sql = match behavior {
            TransactionBehavior::Deferred => "BEGIN DEFERRED",
            TransactionBehavior::Immediate => "BEGIN IMMEDIATE",
            TransactionBehavior::Exclusive => "BEGIN EXCLUSIVE",
        };
        conn.execute_batch(sql)?;
        log::debug!("{sql}");
        Ok(Self {
            conn,
            finished: false,
        })
    }

    /// Commits the transaction.
    pub fn commit(mut self) -> DbResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        log::debug!("COMMIT");
        Ok(())
    }

    /// Rolls the transaction back.
    pub fn rollback(mut self) -> DbResult<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        log::debug!("ROLLBACK");
        Ok(())
    }

    /// Creates a savepoint called `name`.
    pub fn savepoint(&self, name: &str) -> DbResult<()> {
        self.conn.execute_batch(&format!("SAVEPOINT {}", quote_ident(name)))
    }

    /// Releases the savepoint called `name`, keeping its changes.
    pub fn release(&self, name: &str) -> DbResult<()> {
        self.conn.execute_batch(&format!("RELEASE SAVEPOINT {}", quote_ident(name)))
    }

    /// Undoes everything since the savepoint called `name`. The savepoint
    /// stays open.
    pub fn rollback_to(&self, name: &str) -> DbResult<()> {
        self.conn.execute_batch(&format!("ROLLBACK TO SAVEPOINT {}", quote_ident(name)))
    }

    // ── Delegated Connection methods ────────────────────────────────────

    /// See [`Connection::execute_batch`].
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.conn.execute_batch(sql)
    }

    /// See [`Connection::execute`].
    pub fn execute(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        self.conn.execute(sql, params)
    }

    /// See [`Connection::query_row`].
    pub fn query_row<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnOnce(&Statement<'_>) -> DbResult<T>,
    ) -> DbResult<T> {
        self.conn.query_row(sql, params, mapper)
    }

    /// See [`Connection::prepare`].
    pub fn prepare(&self, sql: &str) -> DbResult<Statement<'conn>> {
        self.conn.prepare(sql)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // Best-effort rollback.
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                log::warn!("rollback on drop failed: {e}");
            }
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

//! Typed records for `EXPLAIN`, `EXPLAIN QUERY PLAN`, schema and table
//! introspection.

use std::fmt;

use serde::Serialize;

use super::columns::ColumnAccess;
use super::connection::Connection;
use super::error::{DbError, DbResult};
use super::value::Value;

/// One VDBE instruction from `EXPLAIN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainRow {
    /// Instruction address.
    pub addr: i32,
    /// Opcode name.
    pub opcode: String,
    /// First operand.
    pub p1: i32,
    /// Second operand.
    pub p2: i32,
    /// Third operand.
    pub p3: i32,
    /// Fourth operand, rendered as text.
    pub p4: Option<String>,
    /// Fifth operand (flags).
    pub p5: u16,
    /// Comment, present only when the library was built with
    /// `SQLITE_ENABLE_EXPLAIN_COMMENTS`.
    pub comment: Option<String>,
}

impl fmt::Display for ExplainRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}] [{}] [{}] [{}] [{}]",
            self.addr,
            self.opcode,
            self.p1,
            self.p2,
            self.p3,
            self.p4.as_deref().unwrap_or(""),
            self.p5
        )?;
        if let Some(comment) = &self.comment {
            write!(f, "; {comment}")?;
        }
        Ok(())
    }
}

/// One node of an `EXPLAIN QUERY PLAN` tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryPlanRow {
    /// Node id.
    pub id: i32,
    /// Id of the parent node, 0 for top-level nodes.
    pub parent: i32,
    /// Reserved column.
    pub notused: i32,
    /// Human readable description of the step.
    pub detail: String,
}

impl fmt::Display for QueryPlanRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: parent={} [{}]: {}",
            self.id, self.parent, self.notused, self.detail
        )
    }
}

/// A column description from `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfoRow {
    /// Column ordinal within the table.
    pub cid: i32,
    /// Column name.
    pub name: String,
    /// Declared type, empty when none was declared.
    pub type_name: String,
    /// Column carries a NOT NULL constraint.
    pub not_null: bool,
    /// Default value expression, as written in the DDL.
    pub default_value: Option<String>,
    /// 1-based position within the primary key, 0 when not part of it.
    pub primary_key: i32,
}

impl fmt::Display for TableInfoRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.cid, self.name, self.type_name)?;
        if self.not_null {
            f.write_str(" NOT NULL")?;
        }
        if self.primary_key > 0 {
            f.write_str(" PRIMARY KEY")?;
        }
        if let Some(default) = &self.default_value {
            write!(f, " DEFAULT {default}")?;
        }
        Ok(())
    }
}

/// A key column from `PRAGMA index_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfoRow {
    /// Rank of the column within the index.
    pub seqno: i32,
    /// Column ordinal in the indexed table; -1 for the rowid, -2 for an
    /// expression.
    pub cid: i32,
    /// Column name; `None` for the rowid or an expression.
    pub name: Option<String>,
}

impl fmt::Display for IndexInfoRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seqno={} cid={} name={}",
            self.seqno,
            self.cid,
            self.name.as_deref().unwrap_or("")
        )
    }
}

/// Kind of a schema object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    /// Ordinary or virtual table.
    Table,
    /// Index, explicit or automatic.
    Index,
    /// View.
    View,
    /// Trigger.
    Trigger,
}

impl ObjectType {
    /// Parses the `type` column of `sqlite_schema`.
    pub fn from_name(name: &str) -> DbResult<Self> {
        match name {
            "table" => Ok(Self::Table),
            "index" => Ok(Self::Index),
            "view" => Ok(Self::View),
            "trigger" => Ok(Self::Trigger),
            other => Err(DbError::InvalidArgument(format!(
                "unknown schema object type: {other}"
            ))),
        }
    }

    /// Name as stored in `sqlite_schema`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Index => "index",
            Self::View => "view",
            Self::Trigger => "trigger",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `sqlite_schema`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaRow {
    /// Object kind.
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    /// Object name.
    pub name: String,
    /// Table the object belongs to (itself for tables and views).
    pub tbl_name: String,
    /// Root b-tree page; 0 for views and triggers.
    pub rootpage: i32,
    /// Defining SQL; `None` for automatic indexes.
    pub sql: Option<String>,
}

impl fmt::Display for SchemaRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={}, name={}, tbl_name={}, rootpage={}, sql={}",
            self.object_type,
            self.name,
            self.tbl_name,
            self.rootpage,
            self.sql.as_deref().unwrap_or("")
        )
    }
}

impl Connection {
    /// Compiles `sql` and returns its bytecode program.
    pub fn explain(&self, sql: &str) -> DbResult<Vec<ExplainRow>> {
        self.query_map(&format!("EXPLAIN {sql}"), &[], |stmt| {
            Ok(ExplainRow {
                addr: stmt.get_int(0)?,
                opcode: stmt.get_text(1)?,
                p1: stmt.get_int(2)?,
                p2: stmt.get_int(3)?,
                p3: stmt.get_int(4)?,
                p4: stmt.get_nullable_text(5)?,
                p5: u16::try_from(stmt.get_int(6)?).unwrap_or(u16::MAX),
                comment: stmt.get_nullable_text(7)?,
            })
        })
    }

    /// Returns the planner's strategy for `sql`.
    pub fn explain_query_plan(&self, sql: &str) -> DbResult<Vec<QueryPlanRow>> {
        self.query_map(&format!("EXPLAIN QUERY PLAN {sql}"), &[], |stmt| {
            Ok(QueryPlanRow {
                id: stmt.get_int(0)?,
                parent: stmt.get_int(1)?,
                notused: stmt.get_int(2)?,
                detail: stmt.get_text(3)?,
            })
        })
    }

    /// Columns of `table`. Empty if the table does not exist.
    pub fn table_info(&self, table: &str) -> DbResult<Vec<TableInfoRow>> {
        self.query_map(
            "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)",
            &[Value::from(table)],
            |stmt| {
                Ok(TableInfoRow {
                    cid: stmt.get_int("cid")?,
                    name: stmt.get_text("name")?,
                    type_name: stmt.get_text("type")?,
                    not_null: stmt.get_int("notnull")? != 0,
                    default_value: stmt.get_nullable_text("dflt_value")?,
                    primary_key: stmt.get_int("pk")?,
                })
            },
        )
    }

    /// Key columns of `index`. Empty if the index does not exist.
    pub fn index_info(&self, index: &str) -> DbResult<Vec<IndexInfoRow>> {
        self.query_map(
            "SELECT seqno, cid, name FROM pragma_index_info(?1)",
            &[Value::from(index)],
            |stmt| {
                Ok(IndexInfoRow {
                    seqno: stmt.get_int("seqno")?,
                    cid: stmt.get_int("cid")?,
                    name: stmt.get_nullable_text("name")?,
                })
            },
        )
    }

    /// Every object in the main database's schema table.
    pub fn schema(&self) -> DbResult<Vec<SchemaRow>> {
        self.query_map(
            "SELECT type, name, tbl_name, rootpage, sql FROM sqlite_schema ORDER BY rowid",
            &[],
            |stmt| {
                Ok(SchemaRow {
                    object_type: ObjectType::from_name(&stmt.get_text("type")?)?,
                    name: stmt.get_text("name")?,
                    tbl_name: stmt.get_text("tbl_name")?,
                    rootpage: stmt.get_int("rootpage")?,
                    sql: stmt.get_nullable_text("sql")?,
                })
            },
        )
    }
}

//! Developer CLI for `SQLite` database files.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use sqlkit_db::{
    read_header_with, ColumnAccess, Connection, Cursor, DbResult, HeaderPolicy, LibraryInfo,
    Statement, StepResult, StorageClass, Value,
};

#[derive(Parser)]
#[command(name = "sqlkit", version, about = "Inspect SQLite database files.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode the 100-byte file header.
    Header {
        /// Database file.
        #[arg(env = "SQLKIT_DB")]
        file: PathBuf,

        /// Decode even if the file lacks the SQLite signature.
        #[arg(long)]
        lenient: bool,

        /// Check every field against the file format rules.
        #[arg(long)]
        validate: bool,

        /// Print JSON instead of the `name=value; ` listing.
        #[arg(long)]
        json: bool,
    },
    /// Run a statement and dump every result row.
    Query {
        /// Database file, opened read-only.
        #[arg(env = "SQLKIT_DB")]
        db: PathBuf,

        /// SQL text of a single statement.
        sql: String,

        /// Print `{"columns": [...], "rows": [[...]]}` instead of `|`-separated rows.
        #[arg(long)]
        json: bool,
    },
    /// Print the version of the linked SQLite library.
    Version {
        /// Print JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    match Cli::parse().command {
        Command::Header {
            file,
            lenient,
            validate,
            json,
        } => header(&file, lenient, validate, json),
        Command::Query { db, sql, json } => query(&db, &sql, json),
        Command::Version { json } => {
            let info = LibraryInfo::get();
            if json {
                println!("{}", serde_json::to_string_pretty(info)?);
            } else {
                println!("{info}");
            }
            Ok(())
        }
    }
}

fn header(file: &Path, lenient: bool, validate: bool, json: bool) -> Result<()> {
    let policy = if lenient {
        HeaderPolicy::Lenient
    } else {
        HeaderPolicy::Strict
    };
    let header = read_header_with(file, policy)
        .wrap_err_with(|| format!("reading header of {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&header)?);
    } else {
        println!("{header}");
        match header.encoding() {
            Ok(encoding) => println!("encoding: {encoding:?}"),
            Err(e) => println!("encoding: {e}"),
        }
        println!("page size: {} bytes", header.page_size_bytes());
    }

    if validate {
        header
            .validate()
            .map_err(sqlkit_db::DbError::InvalidHeader)
            .wrap_err("header validation failed")?;
        tracing::info!("header of {} is valid", file.display());
    }
    Ok(())
}

fn query(db: &Path, sql: &str, json: bool) -> Result<()> {
    let conn = Connection::open(db, true).wrap_err_with(|| format!("opening {}", db.display()))?;
    let stmt = conn.prepare(sql)?;
    tracing::debug!(columns = stmt.column_count(), "prepared {}", stmt.sql());

    let rows = collect_rows(&stmt)?;
    if json {
        let doc = rows_json(&stmt.column_names(), &rows);
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        for row in &rows {
            let cells: Vec<String> = row.iter().map(render_cell).collect();
            println!("{}", cells.join("|"));
        }
    }
    Ok(())
}

/// Steps `stmt` to completion, converting each cell by its storage class.
fn collect_rows(stmt: &Statement<'_>) -> DbResult<Vec<Vec<serde_json::Value>>> {
    let mut rows = Vec::new();
    while stmt.step()? == StepResult::Row {
        // Ordinals come from column_count, so no bounds check is needed.
        let row = (0..stmt.column_count())
            .map(|i| match stmt.storage_class(i) {
                StorageClass::Integer => stmt.get_int64_unchecked(i).into(),
                StorageClass::Float => stmt.get_double_unchecked(i).into(),
                StorageClass::Text => stmt.get_text_unchecked(i).into(),
                StorageClass::Blob => Value::Blob(stmt.get_blob_unchecked(i)).to_string().into(),
                StorageClass::Null => serde_json::Value::Null,
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Rows stay positional so that duplicate column names keep every value.
fn rows_json(columns: &[String], rows: &[Vec<serde_json::Value>]) -> serde_json::Value {
    serde_json::json!({ "columns": columns, "rows": rows })
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

//! Unit tests for the safe SQLite wrapper against the bundled library.

use std::io::{Read, Seek, SeekFrom, Write};
use std::time::Duration;

use super::pragma::ObjectType;
use super::*;

fn pk_val_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch(
        "CREATE TABLE t (pk INTEGER PRIMARY KEY, val INTEGER);
         INSERT INTO t (pk, val) VALUES (1, 1), (2, 2), (3, NULL);",
    )
    .expect("create table");
    conn
}

#[test]
fn test_open_in_memory() {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT);")
        .expect("create table");
    conn.execute(
        "INSERT INTO t (id, val) VALUES (?1, ?2)",
        params![Value::Integer(1), Value::from("hello")],
    )
    .expect("insert");
    let result = conn
        .query_row("SELECT val FROM t WHERE id = ?1", params![1_i64], |stmt| {
            stmt.get_text(0)
        })
        .expect("query");
    assert_eq!(result, "hello");
}

#[test]
fn test_step_through_rows_with_accessors() {
    let conn = pk_val_db();
    let stmt = conn
        .prepare("SELECT pk AS pk_value, val FROM t ORDER BY pk")
        .expect("prepare");

    assert_eq!(stmt.step().expect("step"), StepResult::Row);
    assert_eq!(stmt.get_int("pk_value").expect("pk"), 1);
    assert_eq!(stmt.get_int("val").expect("val"), 1);

    assert_eq!(stmt.step().expect("step"), StepResult::Row);
    assert_eq!(stmt.get_int("pk_value").expect("pk"), 2);
    assert_eq!(stmt.get_int("val").expect("val"), 2);

    assert_eq!(stmt.step().expect("step"), StepResult::Row);
    assert_eq!(stmt.get_int("pk_value").expect("pk"), 3);
    assert_eq!(stmt.get_nullable_int("val").expect("val"), None);

    assert_eq!(stmt.step().expect("step"), StepResult::Done);
}

#[test]
fn test_null_cell_coerces_but_strict_fails() {
    let conn = pk_val_db();
    conn.query_row("SELECT val FROM t WHERE pk = 3", &[], |stmt| {
        assert_eq!(stmt.get_int("val")?, 0);
        assert_eq!(stmt.get_nullable_int_strict("val")?, None);
        let err = stmt.get_int_strict("val").expect_err("strict read of NULL");
        assert!(matches!(
            err,
            DbError::TypeMismatch {
                expected: StorageClass::Integer,
                actual: StorageClass::Null,
                ..
            }
        ));
        Ok(())
    })
    .expect("query");
}

#[test]
fn test_text_cell_coercion_and_strictness() {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.query_row("SELECT '42' AS n, 7 AS i", &[], |stmt| {
        assert_eq!(stmt.get_int("n")?, 42);
        assert_eq!(stmt.get_text("i")?, "7");
        assert_eq!(stmt.get_text_strict("n")?, "42");

        let err = stmt.get_int_strict("n").expect_err("text is not integer");
        assert_eq!(
            err.to_string(),
            "attempt to get column value of \"n\" as an improper type, \
             expected type is Integer, but actual type is Text"
        );
        let err = stmt.get_text_strict(1).expect_err("integer is not text");
        assert!(matches!(
            err,
            DbError::TypeMismatch {
                column: ColumnRef::Index(1),
                ..
            }
        ));
        Ok(())
    })
    .expect("query");
}

#[test]
fn test_checked_accessor_errors() {
    let conn = pk_val_db();
    conn.query_row("SELECT pk, val FROM t WHERE pk = 1", &[], |stmt| {
        assert!(matches!(
            stmt.get_int64(2),
            Err(DbError::IndexOutOfRange { index: 2, count: 2 })
        ));
        assert!(matches!(
            stmt.get_int64("nope"),
            Err(DbError::UnknownColumnName(name)) if name == "nope"
        ));
        Ok(())
    })
    .expect("query");
}

#[test]
fn test_name_map_is_per_statement() {
    let conn = pk_val_db();
    let first = conn.prepare("SELECT pk AS a, val FROM t").expect("prepare");
    first.step().expect("step");
    assert!(!first.name_index().is_built());
    assert_eq!(first.get_int64("a").expect("a"), 1);
    assert!(first.name_index().is_built());
    drop(first);

    let second = conn.prepare("SELECT val, pk AS a FROM t").expect("prepare");
    second.step().expect("step");
    assert!(!second.name_index().is_built());
    assert_eq!(second.column_ordinal("a").expect("ordinal"), 1);
}

#[test]
fn test_get_value_and_column_names() {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.query_row(
        "SELECT 1 AS i, 2.5 AS f, 'x' AS t, x'00ff' AS b, NULL AS n",
        &[],
        |stmt| {
            assert_eq!(stmt.column_names(), ["i", "f", "t", "b", "n"]);
            assert_eq!(stmt.get_value(0)?, Value::Integer(1));
            assert_eq!(stmt.get_value("f")?, Value::Float(2.5));
            assert_eq!(stmt.get_value("t")?, Value::from("x"));
            assert_eq!(stmt.get_value("b")?, Value::Blob(vec![0x00, 0xff]));
            assert_eq!(stmt.get_value("n")?, Value::Null);
            assert!(stmt.is_column_null(4));
            Ok(())
        },
    )
    .expect("query");
}

#[test]
fn test_query_row_optional_none() {
    let conn = pk_val_db();
    let result = conn
        .query_row_optional("SELECT pk FROM t WHERE pk = 999", &[], |stmt| {
            stmt.get_int64(0)
        })
        .expect("query");
    assert!(result.is_none());
}

#[test]
fn test_query_row_without_rows_fails() {
    let conn = pk_val_db();
    let err = conn
        .query_row("SELECT pk FROM t WHERE pk = 999", &[], |stmt| stmt.get_int64(0))
        .expect_err("no rows");
    assert_eq!(err.code(), Some(DbErrorCode(ffi::SQLITE_DONE)));
}

#[test]
fn test_for_each_row_stops_early() {
    let conn = pk_val_db();
    let mut seen = Vec::new();
    conn.for_each_row("SELECT pk FROM t ORDER BY pk", &[], |stmt| {
        seen.push(stmt.get_int64(0)?);
        Ok(seen.len() < 2)
    })
    .expect("iterate");
    assert_eq!(seen, [1, 2]);

    let all = conn
        .query_map("SELECT pk FROM t ORDER BY pk", &[], |stmt| stmt.get_int64(0))
        .expect("query_map");
    assert_eq!(all, [1, 2, 3]);
}

#[test]
fn test_named_parameters() {
    let conn = pk_val_db();
    let stmt = conn
        .prepare("SELECT val FROM t WHERE pk = :pk")
        .expect("prepare");
    assert_eq!(stmt.parameter_count(), 1);
    assert_eq!(stmt.parameter_index(":pk").expect("index"), 1);
    assert_eq!(stmt.parameter_name(1).as_deref(), Some(":pk"));
    assert!(matches!(
        stmt.bind_named(":missing", &Value::Integer(1)),
        Err(DbError::UnknownParameter(_))
    ));

    stmt.bind_named(":pk", &Value::Integer(2)).expect("bind");
    assert_eq!(
        stmt.expanded_sql().as_deref(),
        Some("SELECT val FROM t WHERE pk = 2")
    );
    assert_eq!(stmt.sql(), "SELECT val FROM t WHERE pk = :pk");
    assert_eq!(stmt.step().expect("step"), StepResult::Row);
    assert_eq!(stmt.get_int(0).expect("val"), 2);

    stmt.reset().expect("reset");
    stmt.clear_bindings().expect("clear");
    assert_eq!(stmt.step().expect("step"), StepResult::Done);
}

#[test]
fn test_changes_and_rowid() {
    let conn = pk_val_db();
    let changed = conn
        .execute("UPDATE t SET val = val + 10 WHERE val IS NOT NULL", &[])
        .expect("update");
    assert_eq!(changed, 2);
    assert_eq!(conn.changes(), 2);

    conn.execute("INSERT INTO t (val) VALUES (?1)", params![None::<i64>])
        .expect("insert");
    assert_eq!(conn.last_insert_rowid(), 4);
    assert_eq!(conn.total_changes(), 6);
}

#[test]
fn test_transaction_commit() {
    let conn = pk_val_db();
    {
        let tx = conn.transaction().expect("begin tx");
        tx.execute("INSERT INTO t (pk) VALUES (?1)", params![42_i64])
            .expect("insert");
        tx.commit().expect("commit");
    }
    let result = conn
        .query_row("SELECT pk FROM t WHERE pk = 42", &[], |stmt| stmt.get_int64(0))
        .expect("query");
    assert_eq!(result, 42);
}

#[test]
fn test_transaction_rollback_on_drop() {
    let conn = pk_val_db();
    {
        let tx = conn.transaction_immediate().expect("begin tx");
        tx.execute("INSERT INTO t (pk) VALUES (?1)", params![99_i64])
            .expect("insert");
        // Drop without commit -> rollback
    }
    let result = conn
        .query_row_optional("SELECT pk FROM t WHERE pk = 99", &[], |stmt| {
            stmt.get_int64(0)
        })
        .expect("query");
    assert!(result.is_none());
}

#[test]
fn test_savepoints() {
    let conn = pk_val_db();
    let tx = conn.transaction_exclusive().expect("begin tx");
    tx.execute("INSERT INTO t (pk) VALUES (10)", &[]).expect("insert");
    tx.savepoint("before \"eleven\"").expect("savepoint");
    tx.execute("INSERT INTO t (pk) VALUES (11)", &[]).expect("insert");
    tx.rollback_to("before \"eleven\"").expect("rollback to");
    tx.release("before \"eleven\"").expect("release");
    tx.commit().expect("commit");

    let pks = conn
        .query_map("SELECT pk FROM t WHERE pk >= 10", &[], |stmt| stmt.get_int64(0))
        .expect("query");
    assert_eq!(pks, [10]);
}

#[test]
fn test_explicit_rollback() {
    let conn = pk_val_db();
    let tx = conn.transaction().expect("begin tx");
    tx.execute_batch("DELETE FROM t").expect("delete");
    tx.rollback().expect("rollback");
    let count = conn
        .query_row("SELECT count(*) FROM t", &[], |stmt| stmt.get_int64(0))
        .expect("count");
    assert_eq!(count, 3);
}

#[test]
fn test_blob_stream() {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch("CREATE TABLE b (id INTEGER PRIMARY KEY, data BLOB);")
        .expect("create table");
    let stmt = conn
        .prepare("INSERT INTO b (id, data) VALUES (1, ?1)")
        .expect("prepare");
    stmt.bind_zeroblob(1, 8).expect("zeroblob");
    stmt.step().expect("insert");
    drop(stmt);

    let mut blob = conn.open_blob("main", "b", "data", 1, true).expect("open blob");
    assert_eq!(blob.len(), 8);
    assert!(blob.is_writable());
    blob.write_all(&[0xde, 0xad, 0xbe, 0xef]).expect("write");
    assert_eq!(blob.position(), 4);
    assert!(blob.write_all(&[0; 5]).is_err());

    assert_eq!(blob.seek(SeekFrom::End(-2)).expect("seek"), 6);
    assert!(blob.seek(SeekFrom::Current(-7)).is_err());
    blob.seek(SeekFrom::Start(0)).expect("rewind");
    let mut out = Vec::new();
    blob.read_to_end(&mut out).expect("read");
    assert_eq!(out, [0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0]);
    drop(blob);

    let stored = conn
        .query_row("SELECT data FROM b WHERE id = 1", &[], |stmt| stmt.get_blob_strict(0))
        .expect("query");
    assert_eq!(&stored[..4], &[0xde, 0xad, 0xbe, 0xef]);
}

#[test]
fn test_read_only_blob_rejects_writes() {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch(
        "CREATE TABLE b (id INTEGER PRIMARY KEY, data BLOB);
         INSERT INTO b VALUES (1, x'0102'), (2, x'030405');",
    )
    .expect("create table");
    let mut blob = conn.open_blob("main", "b", "data", 1, false).expect("open blob");
    assert!(blob.write(&[0]).is_err());

    blob.reopen(2).expect("reopen");
    assert_eq!(blob.len(), 3);
    let mut out = [0u8; 3];
    blob.read_exact(&mut out).expect("read");
    assert_eq!(out, [3, 4, 5]);
}

#[test]
fn test_busy_timeout_round_trip() {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.set_busy_timeout(Duration::from_millis(1500))
        .expect("set timeout");
    assert_eq!(
        conn.busy_timeout().expect("get timeout"),
        Duration::from_millis(1500)
    );
}

#[test]
fn test_open_options() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("opts.sqlite");

    let missing = Connection::open_with(&path, &OpenOptions::new().create(false));
    assert!(missing.is_err());

    let conn = Connection::open_with(
        &path,
        &OpenOptions::new().busy_timeout(Duration::from_millis(250)),
    )
    .expect("create");
    conn.execute_batch("CREATE TABLE t (x INTEGER);").expect("create table");
    assert_eq!(
        conn.busy_timeout().expect("timeout"),
        Duration::from_millis(250)
    );
    drop(conn);

    let ro = Connection::open(&path, true).expect("open read-only");
    assert!(ro.execute("INSERT INTO t VALUES (1)", &[]).is_err());
}

#[test]
fn test_header_of_real_database() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("header.sqlite");
    {
        let conn = Connection::open(&path, false).expect("open");
        conn.execute_batch(
            "PRAGMA page_size = 4096;
             PRAGMA user_version = 7;
             PRAGMA application_id = 1234;
             CREATE TABLE t (x INTEGER);
             INSERT INTO t VALUES (1);",
        )
        .expect("populate");
        conn.vacuum().expect("vacuum");
        conn.analyze().expect("analyze");
    }

    let header = read_header(&path).expect("read header");
    header.validate().expect("valid header");
    assert!(header.has_valid_magic());
    assert_eq!(header.page_size_bytes(), 4096);
    assert_eq!(header.encoding().expect("encoding"), TextEncoding::Utf8);
    assert_eq!(header.user_version, 7);
    assert_eq!(header.application_id, 1234);
    assert_eq!(header.write_mode(), JournalMode::Legacy);
    assert!(header.page_count >= 2);
    assert_eq!(
        i64::from(header.sqlite_version_number),
        i64::from(LibraryInfo::get().version_number)
    );
}

#[test]
fn test_non_database_file_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("plain.txt");
    std::fs::write(&path, [b'x'; 200]).expect("write file");

    assert!(matches!(read_header(&path), Err(DbError::NotASqliteFile)));
    let header = read_header_with(&path, HeaderPolicy::Lenient).expect("lenient");
    assert!(!header.has_valid_magic());
}

#[test]
fn test_library_info_is_cached() {
    let first = LibraryInfo::get();
    let second = LibraryInfo::get();
    assert!(std::ptr::eq(first, second));
    assert!(first.version.starts_with("3."));
    assert!(first.version_number >= 3_000_000);
    assert!(!first.source_id.is_empty());

    // Counters stay at zero when memory statistics are compiled out.
    let used = library::memory_used();
    assert!(used >= 0);
    assert!(library::memory_highwater(false) >= used);
}

#[test]
fn test_schema_and_table_info() {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch(
        "CREATE TABLE people (
             id INTEGER PRIMARY KEY,
             name TEXT NOT NULL DEFAULT 'anon',
             age INTEGER
         );
         CREATE INDEX people_name ON people (name, age);
         CREATE VIEW adults AS SELECT * FROM people WHERE age >= 18;",
    )
    .expect("schema");

    let schema = conn.schema().expect("schema rows");
    let kinds: Vec<_> = schema.iter().map(|r| r.object_type).collect();
    assert_eq!(kinds, [ObjectType::Table, ObjectType::Index, ObjectType::View]);
    assert_eq!(schema[1].tbl_name, "people");
    assert_eq!(schema[2].rootpage, 0);

    let cols = conn.table_info("people").expect("table info");
    assert_eq!(cols.len(), 3);
    assert_eq!(cols[0].primary_key, 1);
    assert!(cols[1].not_null);
    assert_eq!(cols[1].default_value.as_deref(), Some("'anon'"));
    assert_eq!(cols[1].to_string(), "1: name TEXT NOT NULL DEFAULT 'anon'");
    assert!(conn.table_info("missing").expect("no table").is_empty());

    let idx = conn.index_info("people_name").expect("index info");
    let names: Vec<_> = idx.iter().filter_map(|r| r.name.as_deref()).collect();
    assert_eq!(names, ["name", "age"]);
    assert_eq!(idx[1].cid, 2);
}

#[test]
fn test_explain() {
    let conn = pk_val_db();
    let program = conn.explain("SELECT val FROM t WHERE pk = 1").expect("explain");
    assert_eq!(program[0].addr, 0);
    assert_eq!(program[0].opcode, "Init");
    assert!(program.iter().any(|op| op.opcode == "ResultRow"));

    let plan = conn
        .explain_query_plan("SELECT val FROM t WHERE pk = 1")
        .expect("query plan");
    assert!(!plan.is_empty());
    assert!(plan[0].detail.contains('t'));
}

#[test]
fn test_interrupt_without_running_query() {
    let conn = pk_val_db();
    conn.interrupt();
    // No statement is running, so the interrupt is a no-op.
    let count = conn
        .query_row("SELECT count(*) FROM t", &[], |stmt| stmt.get_int64(0))
        .expect("count");
    assert_eq!(count, 3);
}

#[test]
fn test_is_interrupted_while_stepping() {
    let conn = pk_val_db();
    assert!(!conn.is_interrupted());

    let mut seen = 0;
    let err = conn
        .for_each_row("SELECT pk FROM t ORDER BY pk", &[], |_| {
            seen += 1;
            conn.interrupt();
            assert!(conn.is_interrupted());
            Ok(true)
        })
        .expect_err("interrupted query");
    assert_eq!(seen, 1);
    assert_eq!(err.code(), Some(DbErrorCode(9)));

    // The flag clears once the next statement starts with nothing running.
    let count = conn
        .query_row("SELECT count(*) FROM t", &[], |stmt| stmt.get_int64(0))
        .expect("count after interrupt");
    assert_eq!(count, 3);
    assert!(!conn.is_interrupted());
}

#[test]
fn test_changes64_counters() {
    let conn = pk_val_db();
    assert_eq!(conn.total_changes64(), 3);
    conn.execute("UPDATE t SET val = 0", &[]).expect("update");
    assert_eq!(conn.changes64(), 3);
    assert_eq!(conn.total_changes64(), 6);
    assert_eq!(i64::try_from(conn.changes()).expect("fits"), conn.changes64());
}

#[test]
fn test_execute_with_runs_every_statement() {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    let mut rows: Vec<(Vec<String>, Vec<Option<String>>)> = Vec::new();
    conn.execute_with(
        "CREATE TABLE u (a INTEGER, b TEXT);
         INSERT INTO u VALUES (1, NULL), (2, 'x');
         SELECT a, b FROM u ORDER BY a;
         SELECT count(*) AS n FROM u; -- trailing comment",
        |names, values| {
            rows.push((names.to_vec(), values.to_vec()));
            // Stop the first SELECT after one row; the next one still runs.
            values[0].as_deref() != Some("1")
        },
    )
    .expect("script");

    assert_eq!(
        rows,
        [
            (vec!["a".to_string(), "b".to_string()], vec![Some("1".to_string()), None]),
            (vec!["n".to_string()], vec![Some("2".to_string())]),
        ]
    );
}

#[test]
fn test_execute_with_stops_at_failing_statement() {
    let conn = pk_val_db();
    let err = conn
        .execute_with(
            "DELETE FROM t WHERE pk = 1; SELECT * FROM missing; DELETE FROM t",
            |_, _| true,
        )
        .expect_err("missing table");
    assert!(err.code().is_some());
    let count = conn
        .query_row("SELECT count(*) FROM t", &[], |stmt| stmt.get_int64(0))
        .expect("count");
    assert_eq!(count, 2);
}

#[test]
fn test_single_statement_apis_reject_trailing_sql() {
    let conn = pk_val_db();
    let err = conn
        .execute("INSERT INTO t VALUES (10, 1); INSERT INTO t VALUES (11, 2)", &[])
        .expect_err("two statements");
    assert!(matches!(err, DbError::InvalidArgument(_)));

    let err = conn
        .query_row("SELECT 1; SELECT 2", &[], |stmt| stmt.get_int(0))
        .expect_err("two queries");
    assert!(matches!(err, DbError::InvalidArgument(_)));
    assert!(conn.prepare("SELECT 1; DROP TABLE t").is_err());

    let count = conn
        .query_row("SELECT count(*) FROM t", &[], |stmt| stmt.get_int64(0))
        .expect("count");
    assert_eq!(count, 3);
}

#[test]
fn test_single_statement_apis_allow_trailing_comments() {
    let conn = pk_val_db();
    let changed = conn
        .execute("INSERT INTO t (val) VALUES (5); -- note\n   ", &[])
        .expect("insert with trailing comment");
    assert_eq!(changed, 1);
    let one = conn
        .query_row("SELECT 1;; /* done */ ;", &[], |stmt| stmt.get_int(0))
        .expect("empty trailing statements");
    assert_eq!(one, 1);
}

#[test]
fn test_column_count_follows_schema_change() {
    let conn = pk_val_db();
    let stmt = conn.prepare("SELECT * FROM t ORDER BY pk").expect("prepare");
    assert_eq!(stmt.column_count(), 2);

    conn.execute_batch("ALTER TABLE t ADD COLUMN extra INTEGER DEFAULT 9")
        .expect("alter");
    assert_eq!(stmt.step().expect("step"), StepResult::Row);
    assert_eq!(stmt.column_count(), 3);
    assert_eq!(stmt.get_int(2).expect("new column"), 9);
    assert_eq!(stmt.column_names(), ["pk", "val", "extra"]);
}

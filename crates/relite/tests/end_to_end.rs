//! End-to-end façade scenarios (§8 "Concrete end-to-end scenarios"),
//! mirroring the reference codebase's `crates/*/tests/` convention for
//! integration-style tests that exercise a crate's public API rather than
//! its internals.

use relite::{Db, DbOptions, TxOptions, Value};

#[test]
fn durability_survives_close_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.db");
    let path = path.to_str().unwrap();

    {
        let db = Db::open(path, DbOptions::default()).unwrap();
        db.exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)", &[]).unwrap();
        db.exec(
            "INSERT INTO users (name, age) VALUES ('Ersin', 30), ('Jane', 25), ('John', 35)",
            &[],
        )
        .unwrap();
        db.exec("UPDATE users SET age = 31 WHERE name = 'Ersin'", &[]).unwrap();
        db.exec("DELETE FROM users WHERE age > 30", &[]).unwrap();
        db.close().unwrap();
    }

    let reopened = Db::open(path, DbOptions::default()).unwrap();
    let row = reopened.query_row("SELECT COUNT(*) FROM users", &[]).unwrap();
    assert_eq!(row, vec![Value::Int(1)]);
}

#[test]
fn crud_round_trip_leaves_only_the_unmodified_row() {
    let db = Db::open(":memory:", DbOptions::default()).unwrap();
    db.exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)", &[]).unwrap();
    db.exec(
        "INSERT INTO users (name, age) VALUES ('Ersin', 30), ('Jane', 25), ('John', 35)",
        &[],
    )
    .unwrap();
    db.exec("UPDATE users SET age = 31 WHERE name = 'Ersin'", &[]).unwrap();
    db.exec("DELETE FROM users WHERE age > 30", &[]).unwrap();

    let mut rows = db.query("SELECT name, age FROM users", &[]).unwrap();
    let mut seen = Vec::new();
    while rows.next() {
        seen.push(rows.row().to_vec());
    }
    assert_eq!(seen, vec![vec![Value::Text("Jane".into()), Value::Int(25)]]);
}

#[test]
fn unique_violation_rejects_the_second_insert_and_keeps_the_first() {
    let db = Db::open(":memory:", DbOptions::default()).unwrap();
    db.exec("CREATE TABLE t (id INTEGER, email TEXT UNIQUE)", &[]).unwrap();
    db.exec("INSERT INTO t (id, email) VALUES (1, 'a@b')", &[]).unwrap();

    let err = db.exec("INSERT INTO t (id, email) VALUES (2, 'a@b')", &[]);
    assert!(err.is_err());

    let row = db.query_row("SELECT COUNT(*) FROM t", &[]).unwrap();
    assert_eq!(row, vec![Value::Int(1)]);
}

#[test]
fn aggregate_with_group_by_orders_by_sum_descending() {
    let db = Db::open(":memory:", DbOptions::default()).unwrap();
    db.exec("CREATE TABLE sales (cat TEXT, amt INTEGER)", &[]).unwrap();
    db.exec("INSERT INTO sales (cat, amt) VALUES ('A', 10), ('A', 20), ('B', 5)", &[]).unwrap();

    let mut rows = db.query("SELECT cat, SUM(amt) FROM sales GROUP BY cat ORDER BY SUM(amt) DESC", &[]).unwrap();
    let mut seen = Vec::new();
    while rows.next() {
        seen.push(rows.row().to_vec());
    }
    assert_eq!(
        seen,
        vec![
            vec![Value::Text("A".into()), Value::Int(30)],
            vec![Value::Text("B".into()), Value::Int(5)],
        ]
    );
}

#[test]
fn left_join_preserves_unmatched_left_rows() {
    let db = Db::open(":memory:", DbOptions::default()).unwrap();
    db.exec("CREATE TABLE u (id INTEGER, name TEXT)", &[]).unwrap();
    db.exec("CREATE TABLE o (uid INTEGER, item TEXT)", &[]).unwrap();
    db.exec("INSERT INTO u (id, name) VALUES (1, 'a'), (2, 'b')", &[]).unwrap();
    db.exec("INSERT INTO o (uid, item) VALUES (1, 'x')", &[]).unwrap();

    let mut rows = db.query("SELECT u.name, o.item FROM u LEFT JOIN o ON u.id = o.uid", &[]).unwrap();
    let mut seen = Vec::new();
    while rows.next() {
        seen.push(rows.row().to_vec());
    }
    assert_eq!(
        seen,
        vec![
            vec![Value::Text("a".into()), Value::Text("x".into())],
            vec![Value::Text("b".into()), Value::Null],
        ]
    );
}

#[test]
fn equality_on_an_indexed_column_still_finds_the_row() {
    let db = Db::open(":memory:", DbOptions::default()).unwrap();
    db.exec("CREATE TABLE t (id INTEGER, email TEXT)", &[]).unwrap();
    db.exec("CREATE INDEX t_email ON t (email)", &[]).unwrap();
    db.exec("INSERT INTO t (id, email) VALUES (1, 'a@b'), (2, 'c@d')", &[]).unwrap();

    let row = db.query_row("SELECT id FROM t WHERE email = 'c@d'", &[]).unwrap();
    assert_eq!(row, vec![Value::Int(2)]);

    let mut rows = db.query("SELECT id FROM t WHERE email = 'missing@x'", &[]).unwrap();
    assert!(!rows.next());
}

#[test]
fn distinct_dedupes_the_order_by_result_without_reordering_it() {
    let db = Db::open(":memory:", DbOptions::default()).unwrap();
    db.exec("CREATE TABLE t (n INTEGER)", &[]).unwrap();
    db.exec("INSERT INTO t (n) VALUES (3), (1), (2), (1), (3)", &[]).unwrap();

    let mut rows = db.query("SELECT DISTINCT n FROM t ORDER BY n ASC", &[]).unwrap();
    let mut seen = Vec::new();
    while rows.next() {
        seen.push(rows.row().to_vec());
    }
    assert_eq!(seen, vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]]);
}

#[test]
fn second_committer_sees_conflict_and_first_committers_write_wins() {
    let db = Db::open(":memory:", DbOptions::default()).unwrap();
    db.exec("CREATE TABLE counters (id INTEGER PRIMARY KEY, n INTEGER)", &[]).unwrap();
    db.exec("INSERT INTO counters (id, n) VALUES (1, 0)", &[]).unwrap();

    let mut tx_a = db.begin(TxOptions::default()).unwrap();
    let mut tx_b = db.begin(TxOptions::default()).unwrap();

    // Both transactions read the same row under their own snapshot before either writes.
    tx_a.query("SELECT n FROM counters WHERE id = 1", &[]).unwrap();
    tx_b.query("SELECT n FROM counters WHERE id = 1", &[]).unwrap();

    tx_a.exec("UPDATE counters SET n = 1 WHERE id = 1", &[]).unwrap();
    tx_b.exec("UPDATE counters SET n = 2 WHERE id = 1", &[]).unwrap();

    tx_a.commit().unwrap();
    let conflict = tx_b.commit();
    assert!(conflict.is_err());

    let row = db.query_row("SELECT n FROM counters WHERE id = 1", &[]).unwrap();
    assert_eq!(row, vec![Value::Int(1)]);
}

//! Utility functions for benchmarks.
#![allow(dead_code, unreachable_pub)]

use closeable_rows::{IterableTemplate, sqlite::SqliteSource};
use tempfile::{TempDir, tempdir};

/// Number of rows in the benchmark table.
pub const NUM_ROWS: usize = 10_000;

/// Generate a payload string for a row.
pub fn get_data(n: usize) -> String {
    format!("data{n:08}")
}

/// Create a database holding `NUM_ROWS` rows in table `items(id, data)`.
pub fn setup_items_db() -> (TempDir, IterableTemplate<SqliteSource>) {
    let dir = tempdir().unwrap();
    let source = SqliteSource::open(dir.path().join("bench.db"));

    let mut sql = String::from("create table items (id integer primary key, data text);\nbegin;\n");
    for i in 0..NUM_ROWS {
        sql.push_str(&format!("insert into items (id, data) values ({i}, '{}');\n", get_data(i)));
    }
    sql.push_str("commit;");
    source.execute_batch(&sql).unwrap();

    (dir, IterableTemplate::new(source))
}

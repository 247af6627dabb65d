//! Lazily mapped SQL result cursors that release their resources exactly
//! once.
//!
//! # Overview
//!
//! Collecting a large query result into a `Vec` holds every row in memory
//! at once. This crate instead hands the open cursor to an iterator that
//! maps one row at a time, on demand. The connection, statement, and cursor
//! that back the iterator stay open while it is being consumed, and are
//! released together:
//!
//! - automatically, as soon as the cursor is exhausted,
//! - when the caller closes the iterator early,
//! - or, as a last resort, when the iterator is dropped. This logs a warning.
//!
//! Release is idempotent and tolerant of failures: every handle is closed
//! even if closing an earlier one failed, and such failures are logged
//! instead of masking the error that triggered the release.
//!
//! # Quick Start
//!
//! ```no_run
//! use closeable_rows::{DataAccessResult, IterableTemplate, Value, sqlite::SqliteSource};
//!
//! fn main() -> DataAccessResult<()> {
//!     let source = SqliteSource::open("/tmp/rows.db");
//!     source
//!         .execute_batch("create table foo (val text); insert into foo values ('bar');")
//!         .expect("schema setup");
//!
//!     let template = IterableTemplate::new(source);
//!     let mut iter = template
//!         .query_for_iter_single::<String>("select val from foo where val like ?", &[
//!             Value::from("b%"),
//!         ])?;
//!     while iter.has_next()? {
//!         println!("{}", iter.next_value()?);
//!     }
//!     // Exhaustion released the connection.
//!     assert!(iter.is_closed());
//!     Ok(())
//! }
//! ```
//!
//! # Key Concepts
//!
//! - [`IterableTemplate`] - Entry points that run a query and return a
//!   [`RowIter`]. Configured via [`TemplateBuilder`].
//! - [`RowIter`] - The lazily mapping iterator. It implements
//!   [`CloseableIterator`] as well as [`Iterator`].
//! - [`RowMapper`] - Turns the current [`Row`] into a value. Closures,
//!   [`SingleColumn`], and [`ColumnMap`] implement it.
//! - [`ResourceSet`] - The connection, statement, and cursor of one query,
//!   released exactly once.
//! - [`ResourceTracker`] - Optional registry of open resource sets, for
//!   finding leaks in tests.
//! - [`driver`] - The traits a database backend implements. The [`sqlite`]
//!   module is the bundled backend.
//!
//! # Errors
//!
//! Backends and mappers fail with [`DriverError`]. The query API translates
//! those into [`DataAccessError`]:
//!
//! - [`DataAccessError::Acquisition`] if setting up the query failed. No
//!   iterator exists and nothing is left open.
//! - [`DataAccessError::ResultSetAccess`] if reading or mapping a row failed
//!   mid-stream. The iterator still holds its resources and must be closed.
//!
//! # Logging
//!
//! Events are emitted through [`tracing`] under the `closeable_rows` target.
//! Each resource set runs its release inside a `resource_set` span carrying
//! its id and SQL.

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub extern crate libsqlite3_sys as ffi;

pub mod driver;
pub use driver::{ConnectionSource, StatementSettings};

mod error;
pub use error::{DataAccessError, DataAccessResult, DriverError, DriverResult};

pub mod iter;
pub use iter::{CloseableIterable, CloseableIterator, RowIter};

pub mod mapper;
pub use mapper::{ColumnMap, ColumnValues, RowMapper, SingleColumn};

pub mod params;
pub use params::{ArgSetter, SqlStatementCreator};

pub mod resources;
pub use resources::{ResourceSet, ResourceTracker};

mod row;
pub use row::{FromValue, Row, Value};

pub mod sqlite;

mod template;
pub use template::{IterableTemplate, TemplateBuilder};

#[cfg(test)]
mod test {
    use super::*;
    use crate::sqlite::SqliteSource;
    use tempfile::tempdir;

    /// An iterator dropped mid-stream must still give its connection back.
    #[test]
    fn dropped_iterator_returns_connection() {
        let dir = tempdir().unwrap();
        let source = SqliteSource::open(dir.path().join("drop.db"));
        source
            .execute_batch("create table t (n integer); insert into t values (1), (2), (3);")
            .unwrap();

        let template = TemplateBuilder::new().set_track_resources(true).build(source);
        {
            let mut iter = template.query_for_iter_single::<i64>("select n from t", &[]).unwrap();
            assert_eq!(iter.next_value().unwrap(), 1);
            assert_eq!(template.source().open_connections(), 1);
            assert_eq!(template.tracker().unwrap().open_count(), 1);
        }
        assert_eq!(template.source().open_connections(), 0);
        assert_eq!(template.tracker().unwrap().open_count(), 0);
    }
}

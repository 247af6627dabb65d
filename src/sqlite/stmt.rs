use crate::{
    DriverError, DriverResult, Row, Value,
    driver::{BindTarget, RowCursor, Statement, StatementSettings},
    sqlite::raw::{RawDb, RawStmt, cstr_lossy},
};
use libsqlite3_sys as ffi;
use smallvec::SmallVec;
use std::{
    ffi::{c_char, c_int},
    slice,
    sync::Arc,
};
use tracing::trace;

fn len_to_c_int(len: usize) -> DriverResult<c_int> {
    c_int::try_from(len).map_err(|_| DriverError::other(format!("value of {len} bytes too large")))
}

/// A SQLite statement.
///
/// A prepared statement holds its compiled SQL from creation. A plain
/// statement compiles the SQL passed to
/// [`execute_query_sql`](Statement::execute_query_sql).
#[derive(Debug)]
pub struct SqliteStatement {
    db: Arc<RawDb>,
    stmt: Option<Arc<RawStmt>>,
    max_rows: Option<u64>,
    closed: bool,
}

impl SqliteStatement {
    pub(crate) const fn plain(db: Arc<RawDb>) -> Self {
        Self { db, stmt: None, max_rows: None, closed: false }
    }

    pub(crate) fn prepared(db: Arc<RawDb>, sql: &str) -> DriverResult<Self> {
        let stmt = RawStmt::prepare(&db, sql)?;
        Ok(Self { db, stmt: Some(Arc::new(stmt)), max_rows: None, closed: false })
    }

    fn raw(&self) -> DriverResult<&Arc<RawStmt>> {
        if self.closed {
            return Err(DriverError::Released("statement"));
        }
        self.stmt.as_ref().ok_or_else(|| DriverError::other("statement has no SQL to execute"))
    }

    fn open_cursor(&self) -> DriverResult<SqliteCursor> {
        SqliteCursor::open(Arc::clone(self.raw()?), self.max_rows)
    }
}

impl BindTarget for SqliteStatement {
    fn parameter_count(&self) -> usize {
        let Some(Ok(stmt)) = self.stmt.as_ref().map(|s| s.ptr()) else {
            return 0;
        };
        // SAFETY: stmt is live.
        let count = unsafe { ffi::sqlite3_bind_parameter_count(stmt) };
        usize::try_from(count).unwrap_or_default()
    }

    fn bind(&mut self, index: usize, value: &Value) -> DriverResult<()> {
        if index == 0 || index > self.parameter_count() {
            return Err(DriverError::ParameterOutOfRange(index));
        }
        let raw = self.raw()?;
        let stmt = raw.ptr()?;
        let col = len_to_c_int(index)?;
        // SAFETY: stmt is live and col is within its parameters. Text and
        // blob buffers are copied by SQLite because of SQLITE_TRANSIENT.
        let rc = unsafe {
            match value {
                Value::Null => ffi::sqlite3_bind_null(stmt, col),
                Value::Integer(v) => ffi::sqlite3_bind_int64(stmt, col, *v),
                Value::Real(v) => ffi::sqlite3_bind_double(stmt, col, *v),
                Value::Text(v) => ffi::sqlite3_bind_text(
                    stmt,
                    col,
                    v.as_ptr().cast::<c_char>(),
                    len_to_c_int(v.len())?,
                    ffi::SQLITE_TRANSIENT(),
                ),
                Value::Blob(v) => ffi::sqlite3_bind_blob(
                    stmt,
                    col,
                    v.as_ptr().cast(),
                    len_to_c_int(v.len())?,
                    ffi::SQLITE_TRANSIENT(),
                ),
            }
        };
        raw.check(rc)
    }
}

impl Statement for SqliteStatement {
    type Cursor = SqliteCursor;

    /// `max_rows` is enforced by the cursor and `query_timeout` becomes the
    /// connection's busy timeout. SQLite steps row by row, so `fetch_size`
    /// has no effect.
    fn apply_settings(&mut self, settings: &StatementSettings) -> DriverResult<()> {
        self.max_rows = settings.max_rows;
        if let Some(timeout) = settings.query_timeout {
            let ms = c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX);
            self.db.busy_timeout(ms)?;
        }
        if let Some(fetch_size) = settings.fetch_size {
            trace!(target: "closeable_rows", fetch_size, "fetch size ignored by sqlite");
        }
        Ok(())
    }

    fn execute_query(&mut self) -> DriverResult<SqliteCursor> {
        self.open_cursor()
    }

    fn execute_query_sql(&mut self, sql: &str) -> DriverResult<SqliteCursor> {
        if self.closed {
            return Err(DriverError::Released("statement"));
        }
        let stmt = RawStmt::prepare(&self.db, sql)?;
        if let Some(previous) = self.stmt.replace(Arc::new(stmt)) {
            previous.finalize()?;
        }
        self.open_cursor()
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        match self.stmt.take() {
            Some(stmt) => stmt.finalize(),
            None => Ok(()),
        }
    }
}

/// A forward-only cursor stepping a SQLite statement.
#[derive(Debug)]
pub struct SqliteCursor {
    stmt: Arc<RawStmt>,
    names: SmallVec<[Box<str>; 8]>,
    max_rows: Option<u64>,
    rows: u64,
    on_row: bool,
    done: bool,
    closed: bool,
}

impl SqliteCursor {
    fn open(stmt: Arc<RawStmt>, max_rows: Option<u64>) -> DriverResult<Self> {
        let ptr = stmt.ptr()?;
        // SAFETY: ptr is live.
        let count = unsafe { ffi::sqlite3_column_count(ptr) };
        let names = (0..count)
            // SAFETY: i is a valid column index. The name is copied out
            // before the statement is stepped.
            .map(|i| unsafe { cstr_lossy(ffi::sqlite3_column_name(ptr, i)) }.into_boxed_str())
            .collect();
        Ok(Self { stmt, names, max_rows, rows: 0, on_row: false, done: false, closed: false })
    }

    /// Number of rows stepped over so far.
    pub const fn rows(&self) -> u64 {
        self.rows
    }

    fn finish(&mut self) {
        self.on_row = false;
        self.done = true;
    }

    fn current(&self, index: usize) -> DriverResult<(*mut ffi::sqlite3_stmt, c_int)> {
        if self.closed {
            return Err(DriverError::Released("cursor"));
        }
        if !self.on_row {
            return Err(DriverError::NoCurrentRow);
        }
        if index >= self.names.len() {
            return Err(DriverError::ColumnOutOfRange { index, count: self.names.len() });
        }
        Ok((self.stmt.ptr()?, len_to_c_int(index)?))
    }
}

impl Row for SqliteCursor {
    fn column_count(&self) -> usize {
        self.names.len()
    }

    fn column_name(&self, index: usize) -> DriverResult<String> {
        self.names
            .get(index)
            .map(|name| name.to_string())
            .ok_or(DriverError::ColumnOutOfRange { index, count: self.names.len() })
    }

    fn value(&self, index: usize) -> DriverResult<Value> {
        let (stmt, col) = self.current(index)?;
        // SAFETY: the cursor is on a row and col is a valid column. The text
        // or blob pointer is read before its length, as SQLite requires, and
        // copied before the next step.
        let value = unsafe {
            match ffi::sqlite3_column_type(stmt, col) {
                ffi::SQLITE_INTEGER => Value::Integer(ffi::sqlite3_column_int64(stmt, col)),
                ffi::SQLITE_FLOAT => Value::Real(ffi::sqlite3_column_double(stmt, col)),
                ffi::SQLITE_TEXT => {
                    let text = ffi::sqlite3_column_text(stmt, col);
                    let len = usize::try_from(ffi::sqlite3_column_bytes(stmt, col))
                        .unwrap_or_default();
                    if text.is_null() || len == 0 {
                        Value::Text(String::new())
                    } else {
                        let bytes = slice::from_raw_parts(text, len).to_vec();
                        String::from_utf8(bytes)
                            .map(Value::Text)
                            .map_err(|_| DriverError::InvalidUtf8 { column: index })?
                    }
                }
                ffi::SQLITE_BLOB => {
                    let blob = ffi::sqlite3_column_blob(stmt, col);
                    let len = usize::try_from(ffi::sqlite3_column_bytes(stmt, col))
                        .unwrap_or_default();
                    if blob.is_null() || len == 0 {
                        Value::Blob(Vec::new())
                    } else {
                        Value::Blob(slice::from_raw_parts(blob.cast::<u8>(), len).to_vec())
                    }
                }
                _ => Value::Null,
            }
        };
        Ok(value)
    }
}

impl RowCursor for SqliteCursor {
    fn advance(&mut self) -> DriverResult<bool> {
        if self.closed {
            return Err(DriverError::Released("cursor"));
        }
        if self.done {
            return Ok(false);
        }
        if self.max_rows.is_some_and(|max| self.rows >= max) {
            self.finish();
            return Ok(false);
        }
        let stmt = self.stmt.ptr()?;
        // SAFETY: stmt is live and only stepped through this cursor.
        match unsafe { ffi::sqlite3_step(stmt) } {
            ffi::SQLITE_ROW => {
                self.on_row = true;
                self.rows += 1;
                Ok(true)
            }
            ffi::SQLITE_DONE => {
                self.finish();
                Ok(false)
            }
            rc => {
                self.on_row = false;
                Err(self.stmt.error(rc))
            }
        }
    }

    /// Resets the statement, dropping any read lock it holds. The statement
    /// itself is finalized when it is closed.
    fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.on_row = false;
        match self.stmt.ptr() {
            Ok(_) => self.stmt.reset(),
            Err(_) => Ok(()),
        }
    }
}

//! A SQLite backend for the driver traits.
//!
//! [`SqliteSource`] opens a fresh connection on every acquire and closes it
//! when it is released, so each query iterator owns its connection for as
//! long as it is open. [`SqliteSource::open_connections`] reports how many
//! are currently out, which makes leaks visible in tests.

mod raw;
mod stmt;
pub use stmt::{SqliteCursor, SqliteStatement};

use crate::{
    DriverError, DriverResult,
    driver::{Connection, ConnectionSource},
};
use libsqlite3_sys as ffi;
use raw::{RawDb, to_cstring};
use std::{
    ffi::c_int,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tracing::debug;

bitflags::bitflags! {
    /// Flags passed to `sqlite3_open_v2`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: c_int {
        /// Open for reading only.
        const READ_ONLY = ffi::SQLITE_OPEN_READONLY;
        /// Open for reading and writing.
        const READ_WRITE = ffi::SQLITE_OPEN_READWRITE;
        /// Create the database if it does not exist.
        const CREATE = ffi::SQLITE_OPEN_CREATE;
        /// Interpret the path as a URI.
        const URI = ffi::SQLITE_OPEN_URI;
        /// Serialize access to the connection.
        const FULL_MUTEX = ffi::SQLITE_OPEN_FULLMUTEX;
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::READ_WRITE | Self::CREATE | Self::URI
    }
}

/// Builder for [`SqliteSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSourceBuilder {
    flags: OpenFlags,
    busy_timeout: Option<Duration>,
}

impl SqliteSourceBuilder {
    /// Sets the open flags.
    pub const fn set_flags(&mut self, flags: OpenFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Sets how long a connection waits on a locked database before
    /// failing with `SQLITE_BUSY`.
    pub const fn set_busy_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Creates a source for the database at `path`. No connection is opened
    /// until the first acquire.
    pub fn open(&self, path: impl AsRef<Path>) -> SqliteSource {
        SqliteSource {
            path: path.as_ref().to_path_buf(),
            flags: self.flags,
            busy_timeout: self.busy_timeout,
            open: AtomicUsize::new(0),
            opened_total: AtomicU64::new(0),
        }
    }
}

/// Opens one SQLite connection per acquire.
#[derive(Debug)]
pub struct SqliteSource {
    path: PathBuf,
    flags: OpenFlags,
    busy_timeout: Option<Duration>,
    open: AtomicUsize,
    opened_total: AtomicU64,
}

impl SqliteSource {
    /// Creates a source for the database at `path` with default flags.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::builder().open(path)
    }

    /// Returns a builder for configuring a source.
    pub fn builder() -> SqliteSourceBuilder {
        SqliteSourceBuilder::default()
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The open flags.
    pub const fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Number of connections acquired and not yet released.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    /// Number of connections opened over the lifetime of this source.
    pub fn opened_total(&self) -> u64 {
        self.opened_total.load(Ordering::Relaxed)
    }

    /// Runs every statement in `sql` on a short-lived connection, discarding
    /// any rows. Intended for schema setup and fixtures.
    pub fn execute_batch(&self, sql: &str) -> DriverResult<()> {
        let conn = self.acquire()?;
        let res = conn.execute_batch(sql);
        self.release(conn)?;
        res
    }
}

impl ConnectionSource for SqliteSource {
    type Connection = SqliteConnection;

    fn acquire(&self) -> DriverResult<SqliteConnection> {
        let path = self
            .path
            .to_str()
            .ok_or_else(|| DriverError::other(format!("non UTF-8 path {}", self.path.display())))?;
        let db = RawDb::open(&to_cstring(path)?, self.flags.bits())?;
        if let Some(timeout) = self.busy_timeout {
            db.busy_timeout(c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX))?;
        }
        let open = self.open.fetch_add(1, Ordering::AcqRel) + 1;
        let id = self.opened_total.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            target: "closeable_rows",
            path = %self.path.display(),
            id,
            open,
            "opened sqlite connection"
        );
        Ok(SqliteConnection { db: Arc::new(db), id })
    }

    fn release(&self, conn: SqliteConnection) -> DriverResult<()> {
        let open = self.open.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        debug!(target: "closeable_rows", id = conn.id, open, "closing sqlite connection");
        conn.db.close()
    }
}

/// A connection opened by [`SqliteSource`].
#[derive(Debug)]
pub struct SqliteConnection {
    db: Arc<RawDb>,
    id: u64,
}

impl SqliteConnection {
    /// Id of this connection within its source, starting at 1.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Runs every statement in `sql`, discarding any rows.
    pub fn execute_batch(&self, sql: &str) -> DriverResult<()> {
        self.db.exec(sql)
    }
}

impl Connection for SqliteConnection {
    type Statement = SqliteStatement;

    fn create_statement(&mut self) -> DriverResult<SqliteStatement> {
        self.db.ptr()?;
        Ok(SqliteStatement::plain(Arc::clone(&self.db)))
    }

    fn prepare_statement(&mut self, sql: &str) -> DriverResult<SqliteStatement> {
        SqliteStatement::prepared(Arc::clone(&self.db), sql)
    }
}

//! Bundles of acquired database resources.
//!
//! A [`ResourceSet`] is created when a connection is acquired and grows as
//! the statement and cursor are opened. Whatever it holds is torn down by a
//! single idempotent [`ResourceSet::release`], in reverse acquisition order:
//!
//! 1. the cursor is closed,
//! 2. the setter's and creator's parameters are disposed of, if they expose
//!    a [`ParameterDisposer`],
//! 3. the statement is closed,
//! 4. the connection is returned to its source.
//!
//! Every step runs even if an earlier one failed. Failures are logged and
//! never propagated, so they cannot mask the error that triggered the
//! release.
//!
//! [`ParameterDisposer`]: crate::params::ParameterDisposer

mod tracker;
pub use tracker::{OpenResourceSet, ResourceTracker};

use crate::{
    DriverError, DriverResult,
    driver::{
        Connection, ConnectionSource, CursorOf, RowCursor, Statement, StatementOf,
        StatementSettings,
    },
    params::{StatementCreator, StatementSetter},
};
use core::fmt;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use tracing::{debug_span, trace, warn};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The connection, statement, and cursor acquired for one query, released
/// together exactly once.
pub struct ResourceSet<S: ConnectionSource> {
    id: u64,
    source: Arc<S>,
    conn: Option<S::Connection>,
    stmt: Option<StatementOf<S>>,
    cursor: Option<CursorOf<S>>,
    creator: Option<Box<dyn StatementCreator<S::Connection> + Send>>,
    setter: Option<Box<dyn StatementSetter + Send>>,
    released: AtomicBool,
    tracker: Option<ResourceTracker>,
    span: tracing::Span,
}

impl<S: ConnectionSource> fmt::Debug for ResourceSet<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSet")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("has_statement", &self.stmt.is_some())
            .field("has_cursor", &self.cursor.is_some())
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

impl<S: ConnectionSource> ResourceSet<S> {
    /// Acquires a connection from `source` and starts a new resource set
    /// around it.
    ///
    /// If a tracker is given, the set is registered with it until released.
    pub fn acquire(
        source: Arc<S>,
        sql: Option<&str>,
        tracker: Option<ResourceTracker>,
    ) -> DriverResult<Self> {
        let conn = source.acquire()?;
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let span = debug_span!(
            target: "closeable_rows",
            "resource_set",
            id,
            sql = sql.unwrap_or_default()
        );
        if let Some(tracker) = &tracker {
            tracker.register(id, sql);
        }
        Ok(Self {
            id,
            source,
            conn: Some(conn),
            stmt: None,
            cursor: None,
            creator: None,
            setter: None,
            released: AtomicBool::new(false),
            tracker,
            span,
        })
    }

    /// Process-unique id of this resource set.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The source the connection was acquired from.
    pub const fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Registers the creator used for the statement. Its parameters are
    /// disposed of on release.
    pub fn register_creator(
        &mut self,
        creator: impl StatementCreator<S::Connection> + Send + 'static,
    ) {
        self.creator = Some(Box::new(creator));
    }

    /// Registers the setter used to bind parameters. Its parameters are
    /// disposed of on release.
    pub fn register_setter(&mut self, setter: impl StatementSetter + Send + 'static) {
        self.setter = Some(Box::new(setter));
    }

    /// Creates a statement with the registered creator, applies `settings`,
    /// binds parameters with the registered setter, and executes it.
    ///
    /// Each handle is stored as soon as it is acquired, so a failure at any
    /// step leaves exactly the acquired subset for [`Self::release`].
    pub fn open_prepared(&mut self, settings: &StatementSettings) -> DriverResult<()> {
        let conn = self.conn.as_mut().ok_or(DriverError::Released("connection"))?;
        let creator = self
            .creator
            .as_mut()
            .ok_or_else(|| DriverError::other("no statement creator registered"))?;

        let stmt = self.stmt.insert(creator.create_statement(conn)?);
        stmt.apply_settings(settings)?;
        if let Some(setter) = self.setter.as_mut() {
            setter.set_values(stmt)?;
        }
        self.cursor = Some(stmt.execute_query()?);
        Ok(())
    }

    /// Creates a plain statement, applies `settings`, and executes `sql`.
    pub fn open_plain(&mut self, sql: &str, settings: &StatementSettings) -> DriverResult<()> {
        let conn = self.conn.as_mut().ok_or(DriverError::Released("connection"))?;

        let stmt = self.stmt.insert(conn.create_statement()?);
        stmt.apply_settings(settings)?;
        self.cursor = Some(stmt.execute_query_sql(sql)?);
        Ok(())
    }

    /// The open cursor, if the query was executed and the set is not yet
    /// released.
    pub(crate) fn cursor_mut(&mut self) -> Option<&mut CursorOf<S>> {
        self.cursor.as_mut()
    }

    /// Returns `true` once [`Self::release`] has run.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Releases every held resource in reverse acquisition order.
    ///
    /// Only the first call does any work. Failures are logged at `warn`
    /// level and swallowed.
    pub fn release(&mut self) {
        if self.released.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err()
        {
            return;
        }
        let _guard = self.span.enter();

        if let Some(mut cursor) = self.cursor.take() {
            if let Err(err) = cursor.close() {
                warn!(target: "closeable_rows", id = self.id, %err, "could not close cursor");
            }
        }
        if let Some(mut setter) = self.setter.take() {
            if let Some(disposer) = setter.parameter_disposer() {
                disposer.cleanup_parameters();
            }
        }
        if let Some(mut creator) = self.creator.take() {
            if let Some(disposer) = creator.parameter_disposer() {
                disposer.cleanup_parameters();
            }
        }
        if let Some(mut stmt) = self.stmt.take() {
            if let Err(err) = stmt.close() {
                warn!(target: "closeable_rows", id = self.id, %err, "could not close statement");
            }
        }
        if let Some(conn) = self.conn.take() {
            if let Err(err) = self.source.release(conn) {
                warn!(target: "closeable_rows", id = self.id, %err, "could not release connection");
            }
        }
        if let Some(tracker) = &self.tracker {
            tracker.deregister(self.id);
        }
        trace!(target: "closeable_rows", id = self.id, "released");
    }
}

impl<S: ConnectionSource> Drop for ResourceSet<S> {
    fn drop(&mut self) {
        if !self.is_released() {
            warn!(
                target: "closeable_rows",
                id = self.id,
                "resource set dropped without being closed, releasing it now"
            );
            self.release();
        }
    }
}

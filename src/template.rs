//! Query entry points returning lazily mapped iterators.

use crate::{
    DataAccessError, DataAccessResult, FromValue, Value,
    driver::{ConnectionSource, StatementSettings},
    iter::RowIter,
    mapper::{ColumnMap, ColumnValues, RowMapper, SingleColumn},
    params::{ArgSetter, SqlStatementCreator, StatementCreator, StatementSetter},
    resources::{ResourceSet, ResourceTracker},
};
use std::{sync::Arc, time::Duration};
use tracing::debug;

const PREPARED_TASK: &str = "PreparedStatementCallback";
const PLAIN_TASK: &str = "StatementCallback";

/// Builder for [`IterableTemplate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateBuilder {
    settings: StatementSettings,
    track_resources: bool,
}

impl TemplateBuilder {
    /// Creates a builder with default settings and tracking disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of rows the driver should fetch per round trip.
    pub const fn set_fetch_size(&mut self, fetch_size: u32) -> &mut Self {
        self.settings.fetch_size = Some(fetch_size);
        self
    }

    /// Caps the number of rows any query yields.
    pub const fn set_max_rows(&mut self, max_rows: u64) -> &mut Self {
        self.settings.max_rows = Some(max_rows);
        self
    }

    /// Sets how long a statement may wait on the database.
    pub const fn set_query_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.settings.query_timeout = Some(timeout);
        self
    }

    /// Registers every resource set with a [`ResourceTracker`], so that
    /// unreleased iterators can be listed.
    pub const fn set_track_resources(&mut self, track: bool) -> &mut Self {
        self.track_resources = track;
        self
    }

    /// Builds a template over `source`.
    pub fn build<S: ConnectionSource>(&self, source: S) -> IterableTemplate<S> {
        self.build_shared(Arc::new(source))
    }

    /// Builds a template over a shared `source`.
    pub fn build_shared<S: ConnectionSource>(&self, source: Arc<S>) -> IterableTemplate<S> {
        IterableTemplate {
            source,
            settings: self.settings,
            tracker: self.track_resources.then(ResourceTracker::new),
        }
    }
}

/// Runs queries and returns their rows as [`RowIter`]s instead of
/// collecting them.
///
/// Every entry point acquires a connection, creates and executes a
/// statement, and hands the open cursor to the returned iterator. If any of
/// these steps fails, whatever was acquired is released before the error
/// is returned, and no iterator is created.
#[derive(Debug)]
pub struct IterableTemplate<S: ConnectionSource> {
    source: Arc<S>,
    settings: StatementSettings,
    tracker: Option<ResourceTracker>,
}

impl<S: ConnectionSource> IterableTemplate<S> {
    /// Creates a template with default settings.
    pub fn new(source: S) -> Self {
        TemplateBuilder::default().build(source)
    }

    /// The connection source.
    pub const fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Settings applied to every statement.
    pub const fn settings(&self) -> &StatementSettings {
        &self.settings
    }

    /// The resource tracker, if tracking was enabled.
    pub const fn tracker(&self) -> Option<&ResourceTracker> {
        self.tracker.as_ref()
    }

    /// Executes the statement produced by `creator`, binding parameters
    /// with `setter` if given, and maps rows with `mapper`.
    pub fn query_for_iter_with<T, M, C, P>(
        &self,
        creator: C,
        setter: Option<P>,
        mapper: M,
    ) -> DataAccessResult<RowIter<S, T, M>>
    where
        M: RowMapper<T>,
        C: StatementCreator<S::Connection> + Send + 'static,
        P: StatementSetter + Send + 'static,
    {
        let sql = creator.sql().map(ToOwned::to_owned);
        debug!(
            target: "closeable_rows",
            sql = sql.as_deref().unwrap_or_default(),
            "executing prepared SQL statement"
        );

        let mut resources = self.acquire(PREPARED_TASK, sql.as_deref())?;
        resources.register_creator(creator);
        if let Some(setter) = setter {
            resources.register_setter(setter);
        }
        if let Err(source) = resources.open_prepared(&self.settings) {
            resources.release();
            return Err(DataAccessError::acquisition(PREPARED_TASK, sql.as_deref(), source));
        }
        Ok(RowIter::new(resources, mapper))
    }

    /// Executes the statement produced by `creator` without binding any
    /// parameters.
    pub fn query_for_iter_prepared<T, M, C>(
        &self,
        creator: C,
        mapper: M,
    ) -> DataAccessResult<RowIter<S, T, M>>
    where
        M: RowMapper<T>,
        C: StatementCreator<S::Connection> + Send + 'static,
    {
        self.query_for_iter_with(creator, None::<ArgSetter>, mapper)
    }

    /// Executes `sql` as a plain, unprepared statement.
    pub fn query_for_iter<T, M>(&self, sql: &str, mapper: M) -> DataAccessResult<RowIter<S, T, M>>
    where
        M: RowMapper<T>,
    {
        ensure_text(sql)?;
        debug!(target: "closeable_rows", sql, "executing SQL query");

        let mut resources = self.acquire(PLAIN_TASK, Some(sql))?;
        if let Err(source) = resources.open_plain(sql, &self.settings) {
            resources.release();
            return Err(DataAccessError::acquisition(PLAIN_TASK, Some(sql), source));
        }
        Ok(RowIter::new(resources, mapper))
    }

    /// Prepares `sql` and binds `args` to its positional parameters.
    pub fn query_for_iter_args<T, M>(
        &self,
        sql: &str,
        args: impl Into<Vec<Value>>,
        mapper: M,
    ) -> DataAccessResult<RowIter<S, T, M>>
    where
        M: RowMapper<T>,
    {
        ensure_text(sql)?;
        self.query_for_iter_with(SqlStatementCreator::new(sql), Some(ArgSetter::new(args)), mapper)
    }

    /// Runs a single-column query, converting each value into `T`.
    ///
    /// Without arguments the query runs as a plain statement.
    pub fn query_for_iter_single<T>(
        &self,
        sql: &str,
        args: &[Value],
    ) -> DataAccessResult<RowIter<S, T, SingleColumn<T>>>
    where
        T: FromValue,
    {
        if args.is_empty() {
            self.query_for_iter(sql, SingleColumn::new())
        } else {
            self.query_for_iter_args(sql, args.to_vec(), SingleColumn::new())
        }
    }

    /// Runs a query and maps each row into its column values, keyed by
    /// column name.
    ///
    /// Without arguments the query runs as a plain statement.
    pub fn query_for_iter_map(
        &self,
        sql: &str,
        args: &[Value],
    ) -> DataAccessResult<RowIter<S, ColumnValues, ColumnMap>> {
        if args.is_empty() {
            self.query_for_iter(sql, ColumnMap)
        } else {
            self.query_for_iter_args(sql, args.to_vec(), ColumnMap)
        }
    }

    fn acquire(&self, task: &'static str, sql: Option<&str>) -> DataAccessResult<ResourceSet<S>> {
        ResourceSet::acquire(Arc::clone(&self.source), sql, self.tracker.clone())
            .map_err(|source| DataAccessError::acquisition(task, sql, source))
    }
}

fn ensure_text(sql: &str) -> DataAccessResult<()> {
    if sql.trim().is_empty() {
        return Err(DataAccessError::BlankSql);
    }
    Ok(())
}

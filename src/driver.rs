//! Driver-facing collaborator traits.
//!
//! The iterator core never talks to a database directly. It drives a
//! [`ConnectionSource`], the [`Connection`]s it hands out, the
//! [`Statement`]s those create, and the [`RowCursor`]s statements open.
//! Handles are owned values; the [`ResourceSet`] that holds them is
//! responsible for closing them in reverse order.
//!
//! [`ResourceSet`]: crate::resources::ResourceSet

use crate::{DriverResult, Row, Value};
use core::fmt;
use std::time::Duration;

/// The statement type produced by connections of a source.
pub type StatementOf<S> = <<S as ConnectionSource>::Connection as Connection>::Statement;

/// The cursor type produced by statements of a source.
pub type CursorOf<S> = <StatementOf<S> as Statement>::Cursor;

/// Settings applied to every statement before it is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementSettings {
    /// Hint for the number of rows fetched per round trip.
    pub fetch_size: Option<u32>,
    /// Upper bound on the number of rows the cursor yields.
    pub max_rows: Option<u64>,
    /// How long the statement may wait on the database.
    pub query_timeout: Option<Duration>,
}

impl StatementSettings {
    /// Returns `true` if no setting deviates from the driver default.
    pub const fn is_default(&self) -> bool {
        self.fetch_size.is_none() && self.max_rows.is_none() && self.query_timeout.is_none()
    }
}

/// A source of connections, such as a pool or a data source opening a new
/// connection per request.
pub trait ConnectionSource: fmt::Debug {
    /// The connection type handed out by this source.
    type Connection: Connection;

    /// Acquires a connection.
    fn acquire(&self) -> DriverResult<Self::Connection>;

    /// Returns a connection to this source.
    fn release(&self, conn: Self::Connection) -> DriverResult<()>;
}

/// An open database connection.
pub trait Connection: fmt::Debug {
    /// The statement type created by this connection.
    type Statement: Statement;

    /// Creates a plain statement. Its SQL is supplied at execution time.
    fn create_statement(&mut self) -> DriverResult<Self::Statement>;

    /// Prepares a statement for the given SQL.
    fn prepare_statement(&mut self, sql: &str) -> DriverResult<Self::Statement>;
}

/// Parameter binding on a statement.
///
/// Split from [`Statement`] so that setters can bind through a trait
/// object. Parameter indices are one-based.
pub trait BindTarget {
    /// Number of parameters the statement expects.
    fn parameter_count(&self) -> usize;

    /// Binds `value` to the parameter at `index`.
    fn bind(&mut self, index: usize, value: &Value) -> DriverResult<()>;
}

/// A statement that can be executed to open a [`RowCursor`].
pub trait Statement: BindTarget + fmt::Debug {
    /// The cursor type opened by this statement.
    type Cursor: RowCursor;

    /// Applies fetch size, row limit and timeout settings.
    fn apply_settings(&mut self, settings: &StatementSettings) -> DriverResult<()>;

    /// Executes a prepared statement.
    fn execute_query(&mut self) -> DriverResult<Self::Cursor>;

    /// Executes a plain statement with the given SQL.
    fn execute_query_sql(&mut self, sql: &str) -> DriverResult<Self::Cursor>;

    /// Closes the statement.
    fn close(&mut self) -> DriverResult<()>;
}

/// A forward-only cursor over the rows of an executed query.
pub trait RowCursor: Row + fmt::Debug {
    /// Moves to the next row. Returns `false` once the rows are exhausted.
    fn advance(&mut self) -> DriverResult<bool>;

    /// Closes the cursor.
    fn close(&mut self) -> DriverResult<()>;
}

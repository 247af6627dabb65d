//! Statement creation and parameter binding collaborators.
//!
//! Both [`StatementCreator`] and [`StatementSetter`] may hold resources
//! tied to their parameters (large text or blob buffers, for example).
//! Such collaborators expose a [`ParameterDisposer`] through
//! `parameter_disposer`, and the owning resource set invokes it when it is
//! released.

use crate::{
    DriverResult, Value,
    driver::{BindTarget, Connection},
};
use core::fmt;

/// Capability of releasing resources held for statement parameters.
pub trait ParameterDisposer {
    /// Releases parameter resources. Must tolerate repeated calls.
    fn cleanup_parameters(&mut self);
}

/// Creates a statement on a connection.
pub trait StatementCreator<C: Connection>: fmt::Debug {
    /// Creates the statement.
    fn create_statement(&mut self, conn: &mut C) -> DriverResult<C::Statement>;

    /// SQL text of the statement, if known. Used for logging and errors.
    fn sql(&self) -> Option<&str> {
        None
    }

    /// Parameter disposal capability, if this creator has one.
    fn parameter_disposer(&mut self) -> Option<&mut dyn ParameterDisposer> {
        None
    }
}

/// Binds parameter values on a freshly created statement.
pub trait StatementSetter: fmt::Debug {
    /// Binds the values.
    fn set_values(&mut self, stmt: &mut dyn BindTarget) -> DriverResult<()>;

    /// Parameter disposal capability, if this setter has one.
    fn parameter_disposer(&mut self) -> Option<&mut dyn ParameterDisposer> {
        None
    }
}

/// Prepares a fixed SQL string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatementCreator {
    sql: String,
}

impl SqlStatementCreator {
    /// Creates a new creator for `sql`.
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

impl<C: Connection> StatementCreator<C> for SqlStatementCreator {
    fn create_statement(&mut self, conn: &mut C) -> DriverResult<C::Statement> {
        conn.prepare_statement(&self.sql)
    }

    fn sql(&self) -> Option<&str> {
        Some(&self.sql)
    }
}

/// Binds positional arguments in order, starting at parameter 1.
///
/// The arguments are dropped when parameters are cleaned up, so large
/// buffers do not outlive the statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgSetter {
    args: Vec<Value>,
}

impl ArgSetter {
    /// Creates a setter for the given arguments.
    pub fn new(args: impl Into<Vec<Value>>) -> Self {
        Self { args: args.into() }
    }

    /// The arguments still held by this setter.
    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

impl StatementSetter for ArgSetter {
    fn set_values(&mut self, stmt: &mut dyn BindTarget) -> DriverResult<()> {
        for (i, arg) in self.args.iter().enumerate() {
            stmt.bind(i + 1, arg)?;
        }
        Ok(())
    }

    fn parameter_disposer(&mut self) -> Option<&mut dyn ParameterDisposer> {
        Some(self)
    }
}

impl ParameterDisposer for ArgSetter {
    fn cleanup_parameters(&mut self) {
        self.args = Vec::new();
    }
}

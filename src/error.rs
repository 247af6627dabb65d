use std::ffi::c_int;

/// A result returned by driver-level operations.
pub type DriverResult<T, E = DriverError> = Result<T, E>;

/// A result returned by query entry points and row iterators.
pub type DataAccessResult<T, E = DataAccessError> = Result<T, E>;

/// Low-level failures raised by a driver, a row cursor, or a row mapper.
///
/// These are never handed to callers of the query API directly. They are
/// translated into a [`DataAccessError`] that records in which phase the
/// failure happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// SQLite returned an error result code.
    #[error("sqlite error {code}: {message}")]
    Sqlite {
        /// Extended result code.
        code: c_int,
        /// Message reported by `sqlite3_errmsg`.
        message: String,
    },
    /// Column index outside of the current row.
    #[error("column index {index} out of range for row of {count} columns")]
    ColumnOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of columns in the row.
        count: usize,
    },
    /// Column value could not be converted into the requested type.
    #[error("column {column}: cannot convert {found} into {expected}")]
    TypeMismatch {
        /// Column index.
        column: usize,
        /// Name of the requested type.
        expected: &'static str,
        /// Storage class of the value found.
        found: &'static str,
    },
    /// A single-column mapper was applied to a row with another width.
    #[error("incorrect column count: expected {expected}, actual {actual}")]
    IncorrectColumnCount {
        /// Expected number of columns.
        expected: usize,
        /// Actual number of columns.
        actual: usize,
    },
    /// SQL text contained an interior NUL byte.
    #[error("SQL text contains an interior NUL byte")]
    NulInSql,
    /// Parameter index outside of the statement's parameters.
    #[error("parameter index {0} out of range")]
    ParameterOutOfRange(usize),
    /// A text column holds bytes that are not valid UTF-8.
    #[error("column {column}: text is not valid UTF-8")]
    InvalidUtf8 {
        /// Column index.
        column: usize,
    },
    /// A column was read while the cursor was not positioned on a row.
    #[error("cursor is not positioned on a row")]
    NoCurrentRow,
    /// The handle was already released.
    #[error("{0} already released")]
    Released(&'static str),
    /// Any other failure, typically raised from a row mapper.
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Creates a free-form error, e.g. from inside a row mapper.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Returns the SQLite result code, if this is a SQLite error.
    pub const fn sqlite_code(&self) -> Option<c_int> {
        match self {
            Self::Sqlite { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors surfaced by query entry points and row iterators.
#[derive(Debug, thiserror::Error)]
pub enum DataAccessError {
    /// Connection, statement, or cursor setup failed. Every resource
    /// acquired before the failure has been released.
    #[error("{task} failed for SQL [{}]: {source}", .sql.as_deref().unwrap_or("<unknown>"))]
    Acquisition {
        /// Name of the failed phase.
        task: &'static str,
        /// SQL text, when the statement exposes it.
        sql: Option<String>,
        /// Underlying driver error.
        #[source]
        source: DriverError,
    },
    /// Reading the cursor or mapping a row failed mid-stream. The iterator
    /// must still be closed by the caller.
    #[error("invalid result set access: {0}")]
    ResultSetAccess(#[source] DriverError),
    /// The SQL text passed to an entry point was blank.
    #[error("provided SQL query is blank")]
    BlankSql,
    /// `next_value` was called on an exhausted iterator.
    #[error("no more elements: iterator is exhausted")]
    Exhausted,
    /// The operation is not supported by a read-only forward cursor.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl DataAccessError {
    pub(crate) fn acquisition(
        task: &'static str,
        sql: Option<&str>,
        source: DriverError,
    ) -> Self {
        Self::Acquisition { task, sql: sql.map(ToOwned::to_owned), source }
    }

    /// Returns the underlying driver error, if any.
    pub const fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::Acquisition { source, .. } | Self::ResultSetAccess(source) => Some(source),
            _ => None,
        }
    }

    /// Returns `true` if the error signals a contract violation by the
    /// caller rather than a database failure.
    pub const fn is_programming_error(&self) -> bool {
        matches!(self, Self::BlankSql | Self::Exhausted | Self::Unsupported(_))
    }
}

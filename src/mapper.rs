//! Row mappers.

use crate::{DriverError, DriverResult, FromValue, Row, Value};
use core::{fmt, marker::PhantomData};
use indexmap::IndexMap;

/// Column values of one row keyed by column name, in column order.
pub type ColumnValues = IndexMap<String, Value>;

/// Converts the current row, plus its zero-based index in the result, into
/// a value.
///
/// Implemented for any `FnMut(&dyn Row, usize) -> DriverResult<T>`. When
/// passing a closure directly, annotate its row argument as `&dyn Row`, or
/// wrap it in [`from_fn`] to let the signature be inferred.
pub trait RowMapper<T> {
    /// Maps one row.
    fn map_row(&mut self, row: &dyn Row, row_num: usize) -> DriverResult<T>;
}

impl<T, F> RowMapper<T> for F
where
    F: FnMut(&dyn Row, usize) -> DriverResult<T>,
{
    fn map_row(&mut self, row: &dyn Row, row_num: usize) -> DriverResult<T> {
        self(row, row_num)
    }
}

/// Pins the signature of a mapping closure.
pub fn from_fn<T, F>(f: F) -> F
where
    F: FnMut(&dyn Row, usize) -> DriverResult<T>,
{
    f
}

/// Maps rows of exactly one column into `T`.
pub struct SingleColumn<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SingleColumn<T> {
    /// Creates a new single-column mapper.
    pub const fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for SingleColumn<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SingleColumn<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Copy for SingleColumn<T> {}

impl<T> fmt::Debug for SingleColumn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleColumn").field("target", &core::any::type_name::<T>()).finish()
    }
}

impl<T: FromValue> RowMapper<T> for SingleColumn<T> {
    fn map_row(&mut self, row: &dyn Row, _row_num: usize) -> DriverResult<T> {
        let actual = row.column_count();
        if actual != 1 {
            return Err(DriverError::IncorrectColumnCount { expected: 1, actual });
        }
        row.get(0)
    }
}

/// Maps every column of a row into [`ColumnValues`].
///
/// When two columns share a name, the later value replaces the earlier one
/// at the earlier position.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnMap;

impl RowMapper<ColumnValues> for ColumnMap {
    fn map_row(&mut self, row: &dyn Row, _row_num: usize) -> DriverResult<ColumnValues> {
        let count = row.column_count();
        let mut values = IndexMap::with_capacity(count);
        for index in 0..count {
            values.insert(row.column_name(index)?, row.value(index)?);
        }
        Ok(values)
    }
}

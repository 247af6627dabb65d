//! Closeable iterators over query results.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`RowIter`] | Maps rows of one open cursor on demand |
//! | [`CloseableIterator`] | Object-safe interface of such iterators |
//! | [`CloseableIterable`] | Lazily opens iterators and closes them together |
//!
//! # Example
//!
//! ```no_run
//! # use closeable_rows::{IterableTemplate, sqlite::SqliteSource};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let template = IterableTemplate::new(SqliteSource::open("/tmp/rows.db"));
//! let mut iter = template.query_for_iter_single::<String>("select val from foo", &[])?;
//! while iter.has_next()? {
//!     println!("{}", iter.next_value()?);
//! }
//! assert!(iter.is_closed());
//! # Ok(())
//! # }
//! ```

mod group;
pub use group::CloseableIterable;

mod rows;
pub use rows::RowIter;

use crate::{DataAccessError, DataAccessResult};

/// An iterator holding database resources, which must be closed once the
/// caller is done with it.
///
/// Iterators close themselves when they are exhausted. Closing an
/// iterator that is already closed has no effect.
pub trait CloseableIterator<T>: Iterator<Item = DataAccessResult<T>> {
    /// Returns `true` if another value is available.
    fn has_next(&mut self) -> DataAccessResult<bool>;

    /// Returns the next value, or [`DataAccessError::Exhausted`].
    fn next_value(&mut self) -> DataAccessResult<T>;

    /// Releases the held resources.
    fn close(&mut self);

    /// Returns `true` once the resources were released.
    fn is_closed(&self) -> bool;

    /// Always fails: the iterators are read-only.
    fn remove(&mut self) -> DataAccessResult<()> {
        Err(DataAccessError::Unsupported("remove"))
    }
}

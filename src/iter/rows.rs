//! The lazily mapping row iterator.

use crate::{
    DataAccessError, DataAccessResult, DriverResult,
    driver::{ConnectionSource, RowCursor},
    iter::CloseableIterator,
    mapper::RowMapper,
    resources::ResourceSet,
};
use core::{fmt, marker::PhantomData};
use tracing::debug;

/// Position of a [`RowIter`] relative to its next value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    /// No value is cached. The next probe advances the cursor.
    NotReady,
    /// A mapped value is cached and has not been handed out.
    Ready,
    /// The rows are exhausted or the iterator was closed.
    Done,
    /// Set before computing a value. Only observable after that
    /// computation failed.
    Failed,
}

/// An iterator that maps rows of an open cursor on demand.
///
/// Each value is computed only when [`has_next`](Self::has_next) or
/// [`next_value`](Self::next_value) asks for it, so the result set is never
/// held in memory. The iterator owns the [`ResourceSet`] of its query and
/// releases it as soon as the cursor is exhausted, or when
/// [`close`](Self::close) is called.
///
/// If reading the cursor or mapping a row fails, the error is returned and
/// the resources stay open until the caller closes the iterator. Probing
/// such an iterator again without closing it is a contract violation and
/// panics. The [`Iterator`] impl instead ends after yielding such an
/// error, so adaptors that keep polling past an `Err` see `None`.
///
/// Not safe to drive from several threads at once.
pub struct RowIter<S, T, M>
where
    S: ConnectionSource,
{
    resources: ResourceSet<S>,
    mapper: M,
    state: State,
    next: Option<T>,
    row_num: usize,
    fused: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<S, T, M> fmt::Debug for RowIter<S, T, M>
where
    S: ConnectionSource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowIter")
            .field("resources", &self.resources)
            .field("state", &self.state)
            .field("row_num", &self.row_num)
            .finish_non_exhaustive()
    }
}

impl<S, T, M> RowIter<S, T, M>
where
    S: ConnectionSource,
    M: RowMapper<T>,
{
    /// Wraps an opened resource set.
    pub fn new(resources: ResourceSet<S>, mapper: M) -> Self {
        Self {
            resources,
            mapper,
            state: State::NotReady,
            next: None,
            row_num: 0,
            fused: false,
            _marker: PhantomData,
        }
    }

    /// Returns `true` if another value is available, computing it if
    /// necessary.
    ///
    /// # Panics
    ///
    /// Panics if a previous call failed and the iterator was not closed
    /// since.
    pub fn has_next(&mut self) -> DataAccessResult<bool> {
        match self.state {
            State::Failed => panic!("row iterator used after an unhandled iteration error"),
            State::Done => Ok(false),
            State::Ready => Ok(true),
            State::NotReady => self.try_compute_next(),
        }
    }

    /// Returns the next value.
    ///
    /// Fails with [`DataAccessError::Exhausted`] if there is none.
    pub fn next_value(&mut self) -> DataAccessResult<T> {
        if !self.has_next()? {
            return Err(DataAccessError::Exhausted);
        }
        self.state = State::NotReady;
        self.next.take().ok_or(DataAccessError::Exhausted)
    }

    /// Releases the resources. Any cached value is discarded and later
    /// probes report no further values.
    pub fn close(&mut self) {
        self.resources.release();
        self.state = State::Done;
        self.next = None;
    }

    /// Returns `true` once the resources were released.
    pub fn is_closed(&self) -> bool {
        self.resources.is_released()
    }

    /// Always fails: the iterator is a read-only forward cursor.
    pub fn remove(&mut self) -> DataAccessResult<()> {
        Err(DataAccessError::Unsupported("remove"))
    }

    /// Number of rows mapped so far.
    pub const fn row_num(&self) -> usize {
        self.row_num
    }

    /// The resource set backing this iterator.
    pub const fn resources(&self) -> &ResourceSet<S> {
        &self.resources
    }

    fn try_compute_next(&mut self) -> DataAccessResult<bool> {
        self.state = State::Failed;
        match self.compute_next().map_err(DataAccessError::ResultSetAccess)? {
            Some(value) => {
                self.next = Some(value);
                self.state = State::Ready;
                Ok(true)
            }
            None => {
                self.state = State::Done;
                Ok(false)
            }
        }
    }

    fn compute_next(&mut self) -> DriverResult<Option<T>> {
        if self.resources.is_released() {
            return Ok(None);
        }
        let Some(cursor) = self.resources.cursor_mut() else {
            return Ok(None);
        };
        if cursor.advance()? {
            let value = self.mapper.map_row(&*cursor, self.row_num)?;
            self.row_num += 1;
            return Ok(Some(value));
        }
        debug!(
            target: "closeable_rows",
            id = self.resources.id(),
            rows = self.row_num,
            "result set exhausted"
        );
        self.resources.release();
        Ok(None)
    }

    #[cfg(test)]
    pub(crate) const fn state(&self) -> State {
        self.state
    }
}

impl<S, T, M> Iterator for RowIter<S, T, M>
where
    S: ConnectionSource,
    M: RowMapper<T>,
{
    type Item = DataAccessResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        let item = match self.has_next() {
            Ok(true) => self.next_value(),
            Ok(false) => return None,
            Err(err) => Err(err),
        };
        self.fused = item.is_err();
        Some(item)
    }
}

impl<S, T, M> CloseableIterator<T> for RowIter<S, T, M>
where
    S: ConnectionSource,
    M: RowMapper<T>,
{
    fn has_next(&mut self) -> DataAccessResult<bool> {
        Self::has_next(self)
    }

    fn next_value(&mut self) -> DataAccessResult<T> {
        Self::next_value(self)
    }

    fn close(&mut self) {
        Self::close(self);
    }

    fn is_closed(&self) -> bool {
        Self::is_closed(self)
    }
}

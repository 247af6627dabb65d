use crate::{DataAccessResult, iter::CloseableIterator};
use core::fmt;

type Factory<'a, T> = Box<dyn FnMut() -> DataAccessResult<Box<dyn CloseableIterator<T> + 'a>> + 'a>;

/// A source of closeable iterators that keeps every iterator it hands out,
/// so they can all be closed at once.
///
/// No database resource is used until [`iterator`](Self::iterator) is
/// called. Dropping the group closes any iterator still open.
pub struct CloseableIterable<'a, T> {
    factory: Factory<'a, T>,
    iters: Vec<Box<dyn CloseableIterator<T> + 'a>>,
}

impl<T> fmt::Debug for CloseableIterable<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseableIterable")
            .field("iterators", &self.iters.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<'a, T> CloseableIterable<'a, T> {
    /// Creates a group whose iterators are produced by `factory`.
    pub fn new<F, I>(mut factory: F) -> Self
    where
        F: FnMut() -> DataAccessResult<I> + 'a,
        I: CloseableIterator<T> + 'a,
    {
        let factory: Factory<'a, T> = Box::new(move || {
            factory().map(|iter| Box::new(iter) as Box<dyn CloseableIterator<T> + 'a>)
        });
        Self { factory, iters: Vec::new() }
    }

    /// Opens a new iterator and retains it for [`close`](Self::close).
    pub fn iterator(&mut self) -> DataAccessResult<&mut (dyn CloseableIterator<T> + 'a)> {
        let iter = (self.factory)()?;
        self.iters.push(iter);
        let last = self.iters.len() - 1;
        Ok(self.iters[last].as_mut())
    }

    /// Number of iterators handed out so far.
    pub fn len(&self) -> usize {
        self.iters.len()
    }

    /// Returns `true` if no iterator was handed out yet.
    pub fn is_empty(&self) -> bool {
        self.iters.is_empty()
    }

    /// Closes every iterator handed out so far.
    pub fn close(&mut self) {
        for iter in &mut self.iters {
            iter.close();
        }
    }

    /// Returns `true` if every iterator handed out is closed.
    pub fn is_closed(&self) -> bool {
        self.iters.iter().all(|iter| iter.is_closed())
    }
}

impl<T> Drop for CloseableIterable<'_, T> {
    fn drop(&mut self) {
        self.close();
    }
}

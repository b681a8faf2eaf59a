//! The pipeline handle.
//!
//! An [`Iter`] owns one boxed [`Pull`] implementation: a source adapter or a
//! stage wrapping its upstream. Builder methods ([`map`](Iter::map),
//! [`filter`](Iter::filter), [`reduce`](Iter::reduce), ...) consume the handle
//! and return the stage on top of it, so stages always form a strict chain.
//! Nothing happens until a driver such as [`Iter::iterate`] starts pulling.
//!
//! ```rust
//! use defer_iter::Iter;
//!
//! Iter::new(vec![1, 2, 3, 4])
//!     .map(|x| Ok(x * 2))
//!     .filter(|x| Ok(*x > 4))
//!     .reduce(|acc, x| Ok(acc + x), 0)
//!     .to_array(|sum| assert_eq!(sum, vec![14]));
//! ```

use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    iteration::Iteration,
    source::{Exhaust, Pull, Source},
    trampoline,
};

/// A lazy, pull-driven sequence of deferred elements.
pub struct Iter<T> {
    inner: Rc<RefCell<Box<dyn Pull<T>>>>,
}

impl<T> fmt::Debug for Iter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").finish_non_exhaustive()
    }
}

impl<T: 'static> Iter<T> {
    /// Build a pipeline over any [`Source`] shape.
    pub fn new(source: impl Into<Source<T>>) -> Self {
        source.into().build()
    }

    /// A sequence that is done on the first pull.
    pub fn empty() -> Self {
        Iter::new(Source::Empty)
    }

    /// Build a pipeline over a custom [`Pull`] implementation.
    pub fn from_pull<P>(p: P) -> Self
    where
        P: Pull<T> + 'static,
    {
        Self {
            inner: Rc::new(RefCell::new(Box::new(p))),
        }
    }

    /// Lazily adapt a standard iterator; each item becomes a resolved element.
    ///
    /// Unlike [`Source::Indexed`] nothing is buffered, so unbounded iterators work.
    pub fn from_std<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Iter::from_pull(Exhaust(iter.into_iter()))
    }

    /// Request the next [`Iteration`]; `k` is invoked exactly once.
    ///
    /// For a purely synchronous pipeline `k` has run by the time the outermost
    /// `pull` returns. Nested pulls issued from inside `k` are queued and run
    /// one after another on the same stack frame.
    pub fn pull<K>(&self, k: K)
    where
        K: FnOnce(Iteration<T>) + 'static,
    {
        let inner = Rc::clone(&self.inner);
        trampoline::bounce(move || inner.borrow_mut().pull(Box::new(k)));
    }

    /// A second handle to the same pipeline, for continuations that pull again.
    pub(crate) fn share(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> From<Source<T>> for Iter<T>
where
    T: 'static,
{
    fn from(source: Source<T>) -> Self {
        source.build()
    }
}

impl<T: 'static> FromIterator<T> for Iter<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Iter::new(iter.into_iter().collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, AsyncDeferred, Reaction};
    use std::cell::Cell;

    #[test]
    fn test_lazy_until_pulled() {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let pipeline = Iter::new(vec![1, 2, 3]).map(move |x| {
            h.set(h.get() + 1);
            Ok(x)
        });
        assert_eq!(hits.get(), 0);
        pipeline.to_array(|_| {});
        assert_eq!(hits.get(), 3);
    }

    #[test]
    fn test_map_filter_reduce_composition() {
        let out = Iter::new(vec![1, 2, 3, 4])
            .map(|x| Ok(x * 2))
            .filter(|x| Ok(*x > 4))
            .reduce(|acc, x| Ok(acc + x), 0)
            .collect();
        assert_eq!(out.peek(), Some(Ok(vec![14])));
    }

    #[test]
    fn test_same_pipeline_with_async_elements() {
        let out = Iter::new(vec![1, 2, 3, 4])
            .map(|x| AsyncDeferred::resolved(x * 2))
            .filter(|x| Ok(*x > 4))
            .reduce(|acc, x| Ok(acc + x), 0)
            .collect();
        assert!(out.is_pending());
        assert_eq!(out.wait(), Ok(vec![14]));
    }

    #[test]
    fn test_error_transparency_and_interception() {
        let fails = |_: i32| Err::<i32, _>(Error::msg("bad"));

        let caught = Iter::new(vec![1, 2, 3]).map(fails).catch(|_| Ok(-1)).collect();
        assert_eq!(caught.peek(), Some(Ok(vec![-1, -1, -1])));

        let reached = Rc::new(Cell::new(false));
        let r = Rc::clone(&reached);
        let settled = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&settled);
        Iter::new(vec![1, 2, 3])
            .map(fails)
            .map(move |x| {
                r.set(true);
                Ok(x)
            })
            .iterate_settled(move |outcome| s.borrow_mut().push(outcome), || {});
        assert!(!reached.get());
        assert_eq!(*settled.borrow(), vec![Err(Error::msg("bad")); 3]);
    }

    #[test]
    fn test_flatten_then_sum() {
        use crate::Value;
        let nested = Value::list([
            Value::from(1),
            Value::list([Value::from(2), Value::from(3), Value::list::<[Value; 0]>([])]),
            Value::from(4),
            Value::list([Value::from(5), Value::list([Value::from(6)])]),
        ]);
        let sum = Iter::new(Source::try_from(nested).unwrap())
            .flatten()
            .reduce(|acc, v: Value| Ok(acc + v.as_int().unwrap_or(0)), 0)
            .collect();
        assert_eq!(sum.peek(), Some(Ok(vec![21])));
    }

    #[test]
    fn test_cycle_multiplies() {
        let once = Iter::new(vec![1, 2, 3]).cycle(3).reduce(|a, x| Ok(a + x), 0).collect();
        assert_eq!(once.peek(), Some(Ok(vec![18])));

        let twice = Iter::new(vec![1, 2, 3])
            .cycle(3)
            .cycle(3)
            .reduce(|a, x| Ok(a + x), 0)
            .collect();
        assert_eq!(twice.peek(), Some(Ok(vec![54])));
    }

    #[test]
    fn test_map_with_reject_handler() {
        let out = Iter::new(Source::generator(|| Err::<i32, _>(Error::msg("x"))))
            .map_with(Reaction::new(|x: i32| Ok(x), |_| Ok(0)))
            .collect();
        assert_eq!(out.peek(), Some(Ok(vec![0])));
    }

    #[test]
    fn test_long_sync_pipeline_keeps_stack_flat() {
        let out = Iter::from_std(0..100_000u64)
            .map(|x| Ok(x + 1))
            .filter(|x| Ok(x % 2 == 0))
            .reduce(|acc, x| Ok(acc + x), 0)
            .collect();
        assert_eq!(out.peek(), Some(Ok(vec![2_500_050_000])));
    }

    #[test]
    fn test_from_iterator() {
        let iter: Iter<char> = "abc".chars().collect();
        assert_eq!(iter.collect().peek(), Some(Ok(vec!['a', 'b', 'c'])));
    }
}

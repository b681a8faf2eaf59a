//! Sources: where a pipeline's elements come from.
//!
//! Anything a pipeline can start from is described by a [`Source`], a closed
//! set of shapes checked in a fixed priority order:
//!
//! 1. an existing [`Iter`], used as is;
//! 2. a custom [`Pull`] implementation, used directly;
//! 3. a one-shot generator, invoked on the first pull;
//! 4. an indexed sequence with optional bounds;
//! 5. a keyed collection, yielding its values in entry order.
//!
//! Missing input ([`Source::Empty`]) produces a sequence that is done at once.
//! Dynamic [`Value`](crate::Value)s are classified with `Source::try_from`,
//! which rejects scalars with [`Error::NotIterable`](crate::Error::NotIterable).

use std::collections::BTreeMap;

use either::Either;

use crate::{
    deferred::{IntoSettlement, Settlement},
    iter::Iter,
    iteration::Iteration,
};

/// Receives the single [`Iteration`] a pull produces.
pub type Continuation<T> = Box<dyn FnOnce(Iteration<T>)>;

/// The pull protocol every source and stage implements.
///
/// A pull must invoke `k` exactly once, either before returning or later from
/// an event-loop turn. After handing out [`Iteration::Done`] an implementation
/// keeps answering `Done`.
pub trait Pull<T> {
    /// Produce the next iteration by calling `k` exactly once.
    fn pull(&mut self, k: Continuation<T>);
}

/// A [`Pull`] backed by a closure. See [`from_fn`].
pub struct FromFn<F>(F);

impl<T, F> Pull<T> for FromFn<F>
where
    F: FnMut(Continuation<T>),
{
    fn pull(&mut self, k: Continuation<T>) {
        (self.0)(k)
    }
}

/// Build a custom source from a closure that answers each pull.
///
/// ```rust
/// use defer_iter::{Iter, Iteration, Continuation, source::from_fn};
///
/// let mut n = 0;
/// let counter = Iter::from_pull(from_fn(move |k: Continuation<u32>| {
///     n += 1;
///     k(if n <= 3 { Iteration::resolve(n) } else { Iteration::Done })
/// }));
/// counter.to_array(|values| assert_eq!(values, vec![1, 2, 3]));
/// ```
pub fn from_fn<T, F>(f: F) -> FromFn<F>
where
    F: FnMut(Continuation<T>),
{
    FromFn(f)
}

impl<T> Pull<T> for Box<dyn Pull<T>> {
    fn pull(&mut self, k: Continuation<T>) {
        (**self).pull(k)
    }
}

impl<T, P> Pull<T> for Option<P>
where
    P: Pull<T>,
{
    fn pull(&mut self, k: Continuation<T>) {
        match self {
            Some(p) => p.pull(k),
            None => k(Iteration::Done),
        }
    }
}

impl<T, L, R> Pull<T> for Either<L, R>
where
    L: Pull<T>,
    R: Pull<T>,
{
    fn pull(&mut self, k: Continuation<T>) {
        match self {
            Either::Left(l) => l.pull(k),
            Either::Right(r) => r.pull(k),
        }
    }
}

/// Adapts a standard iterator: every item becomes a resolved element.
pub(crate) struct Exhaust<I>(pub(crate) I);

impl<I> Pull<I::Item> for Exhaust<I>
where
    I: Iterator,
{
    fn pull(&mut self, k: Continuation<I::Item>) {
        match self.0.next() {
            Some(v) => k(Iteration::resolve(v)),
            None => k(Iteration::Done),
        }
    }
}

/// Invokes the generator on the first pull; every later pull is done.
struct Generator<T> {
    f: Option<Box<dyn FnOnce() -> Settlement<T>>>,
}

impl<T> Pull<T> for Generator<T> {
    fn pull(&mut self, k: Continuation<T>) {
        match self.f.take() {
            Some(f) => k(Iteration::from_settlement(f())),
            None => k(Iteration::Done),
        }
    }
}

/// Clamp `begin`/`end` into `[0, len]` with negative values counting from the end.
///
/// `begin` never exceeds `end`, so an inverted range is empty.
///
/// ```rust
/// use defer_iter::source::bounds;
///
/// assert_eq!(bounds(5, None, None), (0, 5));
/// assert_eq!(bounds(5, Some(-2), None), (3, 5));
/// assert_eq!(bounds(5, Some(1), Some(-1)), (1, 4));
/// assert_eq!(bounds(5, Some(4), Some(2)), (2, 2));
/// assert_eq!(bounds(5, Some(-9), Some(99)), (0, 5));
/// ```
pub fn bounds(len: usize, begin: Option<isize>, end: Option<isize>) -> (usize, usize) {
    let wrap = |i: isize| -> usize {
        if i < 0 {
            len.saturating_sub(i.unsigned_abs())
        } else {
            i.unsigned_abs().min(len)
        }
    };
    let end = end.map_or(len, wrap);
    let begin = begin.map_or(0, wrap).min(end);
    (begin, end)
}

/// Every shape a pipeline can be built from.
pub enum Source<T> {
    /// An existing pipeline, passed through unchanged.
    Iter(Iter<T>),
    /// A custom pull implementation.
    Pull(Box<dyn Pull<T>>),
    /// A callable invoked once, on the first pull. Its outcome is the only element.
    Generator(Box<dyn FnOnce() -> Settlement<T>>),
    /// A sequence visited from `begin` up to `end`; see [`bounds`].
    Indexed {
        items: Vec<T>,
        begin: Option<isize>,
        end: Option<isize>,
    },
    /// Entries visited in order, yielding their values.
    Keyed(Vec<(String, T)>),
    /// Nothing; done on the first pull.
    Empty,
}

impl<T: 'static> Source<T> {
    /// Wrap a one-shot callable.
    ///
    /// The callable may return a `Result`, an [`AsyncDeferred`](crate::AsyncDeferred)
    /// or a [`Settlement`]; an `Err` becomes a rejected element.
    pub fn generator<F, S>(f: F) -> Self
    where
        F: FnOnce() -> S + 'static,
        S: IntoSettlement<Value = T>,
    {
        Source::Generator(Box::new(move || f().into_settlement()))
    }

    /// Wrap a custom [`Pull`] implementation.
    pub fn pull<P>(p: P) -> Self
    where
        P: Pull<T> + 'static,
    {
        Source::Pull(Box::new(p))
    }

    /// A bounded view of `items`; see [`bounds`] for how the bounds are read.
    pub fn indexed(items: Vec<T>, begin: impl Into<Option<isize>>, end: impl Into<Option<isize>>) -> Self {
        Source::Indexed {
            items,
            begin: begin.into(),
            end: end.into(),
        }
    }

    /// Short name of the shape, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Source::Iter(_) => "iter",
            Source::Pull(_) => "pull",
            Source::Generator(_) => "generator",
            Source::Indexed { .. } => "indexed",
            Source::Keyed(_) => "keyed",
            Source::Empty => "empty",
        }
    }

    pub(crate) fn build(self) -> Iter<T> {
        tracing::trace!(kind = self.kind(), "building source");
        match self {
            Source::Iter(iter) => iter,
            Source::Pull(p) => Iter::from_pull(p),
            Source::Generator(f) => Iter::from_pull(Generator { f: Some(f) }),
            Source::Indexed { items, begin, end } => {
                let (begin, end) = bounds(items.len(), begin, end);
                Iter::from_std(items.into_iter().skip(begin).take(end - begin))
            }
            Source::Keyed(entries) => Iter::from_std(entries.into_iter().map(|(_, v)| v)),
            Source::Empty => Iter::from_pull(None::<Box<dyn Pull<T>>>),
        }
    }
}

impl<T> From<Iter<T>> for Source<T> {
    fn from(iter: Iter<T>) -> Self {
        Source::Iter(iter)
    }
}

impl<T> From<Vec<T>> for Source<T> {
    fn from(items: Vec<T>) -> Self {
        Source::Indexed {
            items,
            begin: None,
            end: None,
        }
    }
}

impl<T: Clone> From<&[T]> for Source<T> {
    fn from(items: &[T]) -> Self {
        Source::from(items.to_vec())
    }
}

impl<T, const N: usize> From<[T; N]> for Source<T> {
    fn from(items: [T; N]) -> Self {
        Source::from(Vec::from(items))
    }
}

impl<T> From<BTreeMap<String, T>> for Source<T> {
    fn from(map: BTreeMap<String, T>) -> Self {
        Source::Keyed(map.into_iter().collect())
    }
}

impl<T, S> From<Option<S>> for Source<T>
where
    S: Into<Source<T>>,
{
    fn from(source: Option<S>) -> Self {
        source.map_or(Source::Empty, Into::into)
    }
}

/// Element types that may themselves be sources, for [`Iter::flatten`].
///
/// `into_source` hands back either a source to descend into or the value
/// itself when it is a leaf.
pub trait Nested: Sized {
    fn into_source(self) -> Either<Source<Self>, Self>;
}

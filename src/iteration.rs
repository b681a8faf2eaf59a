//! One pull's worth of output: a deferred element, or the end of the sequence.

use crate::{
    deferred::{AsyncDeferred, IntoSettlement, Settlement, Status, SyncDeferred},
    error::{Error, Result},
};

/// The deferred value carried by an [`Iteration`].
///
/// Sources produce [`Element::Sync`] elements; an element only becomes
/// [`Element::Async`] once some handler hands back an [`AsyncDeferred`] or a
/// source yields one. Stages keep whichever variant they are given, so a
/// pipeline over plain values never waits for the event loop.
#[derive(Debug, Clone)]
pub enum Element<T> {
    /// Settled on the spot; reactions run immediately.
    Sync(SyncDeferred<T>),
    /// Reactions run on a later event-loop turn.
    Async(AsyncDeferred<T>),
}

impl<T> Element<T> {
    /// Element resolved with `value`.
    #[inline]
    pub const fn resolved(value: T) -> Self {
        Element::Sync(SyncDeferred::resolved(value))
    }

    /// Element rejected with `err`.
    #[inline]
    pub const fn rejected(err: Error) -> Self {
        Element::Sync(SyncDeferred::rejected(err))
    }

    /// Returns `true` if reactions on this element wait for the event loop.
    #[inline]
    pub const fn is_async(&self) -> bool {
        matches!(self, Element::Async(_))
    }

    pub fn status(&self) -> Status {
        match self {
            Element::Sync(d) => d.status(),
            Element::Async(d) => d.status(),
        }
    }

    /// Build an element from a handler's [`Settlement`].
    pub fn from_settlement(settlement: Settlement<T>) -> Self {
        match settlement {
            Settlement::Resolve(v) => Element::resolved(v),
            Settlement::Reject(e) => Element::rejected(e),
            Settlement::Adopt(d) => Element::Async(d),
        }
    }
}

impl<T: Clone + 'static> Element<T> {
    /// Snapshot of the outcome, or `None` while an async element is pending.
    pub fn peek(&self) -> Option<Result<T>> {
        match self {
            Element::Sync(d) => Some(d.clone().into_result()),
            Element::Async(d) => d.peek(),
        }
    }

    /// React to the outcome, producing the element that carries the reaction's result.
    ///
    /// A sync element stays sync unless a handler returns an [`AsyncDeferred`].
    ///
    /// ```rust
    /// use defer_iter::{Element, Error};
    ///
    /// let e = Element::resolved(2).attach(|v| Ok(v * 10), Err::<i32, Error>);
    /// assert!(!e.is_async());
    /// assert_eq!(e.peek(), Some(Ok(20)));
    /// ```
    pub fn attach<U, R, G, SR, SG>(self, on_resolve: R, on_reject: G) -> Element<U>
    where
        U: Clone + 'static,
        R: FnOnce(T) -> SR + 'static,
        G: FnOnce(Error) -> SG + 'static,
        SR: IntoSettlement<Value = U>,
        SG: IntoSettlement<Value = U>,
    {
        match self {
            Element::Sync(d) => {
                let settlement = match d.into_result() {
                    Ok(v) => on_resolve(v).into_settlement(),
                    Err(e) => on_reject(e).into_settlement(),
                };
                Element::from_settlement(settlement)
            }
            Element::Async(d) => Element::Async(d.attach(on_resolve, on_reject, |_| {})),
        }
    }

    /// Hand the outcome to `k`: right away for a sync element, on a later turn
    /// for an async one.
    pub fn observe<K>(self, k: K)
    where
        K: FnOnce(Result<T>) + 'static,
    {
        match self {
            Element::Sync(d) => k(d.into_result()),
            Element::Async(d) => d.subscribe(k),
        }
    }
}

impl<T> From<Result<T>> for Element<T> {
    fn from(result: Result<T>) -> Self {
        Element::Sync(SyncDeferred::from(result))
    }
}

impl<T> From<SyncDeferred<T>> for Element<T> {
    fn from(d: SyncDeferred<T>) -> Self {
        Element::Sync(d)
    }
}

impl<T> From<AsyncDeferred<T>> for Element<T> {
    fn from(d: AsyncDeferred<T>) -> Self {
        Element::Async(d)
    }
}

/// Result of pulling a source or stage.
///
/// `Done` is terminal: a well-behaved source keeps answering `Done` once it
/// produced it. Errors are not a separate case; a failed element is an
/// [`Element`] in the rejected state.
///
/// # Examples
///
/// ```rust
/// use defer_iter::Iteration;
///
/// let item = Iteration::resolve(3);
/// assert!(!item.is_done());
/// let doubled = item.map_element(|e| e.attach(|v| Ok(v * 2), Err));
/// assert_eq!(doubled.into_element().and_then(|e| e.peek()), Some(Ok(6)));
///
/// let done: Iteration<i32> = Iteration::Done;
/// assert!(done.into_element().is_none());
/// ```
#[derive(Debug, Clone)]
pub enum Iteration<T> {
    /// An element was produced.
    Item(Element<T>),
    /// The sequence is exhausted.
    Done,
}

impl<T> Iteration<T> {
    /// An item resolved with `value`.
    #[inline]
    pub const fn resolve(value: T) -> Self {
        Iteration::Item(Element::resolved(value))
    }

    /// An item rejected with `err`.
    #[inline]
    pub const fn reject(err: Error) -> Self {
        Iteration::Item(Element::rejected(err))
    }

    /// An item built from a handler's [`Settlement`].
    pub fn from_settlement(settlement: Settlement<T>) -> Self {
        Iteration::Item(Element::from_settlement(settlement))
    }

    /// Returns `true` for [`Iteration::Done`].
    #[inline]
    pub const fn is_done(&self) -> bool {
        matches!(self, Iteration::Done)
    }

    /// Converts into `Option<Element<T>>`, discarding `Done`.
    #[inline]
    pub fn into_element(self) -> Option<Element<T>> {
        match self {
            Iteration::Item(e) => Some(e),
            Iteration::Done => None,
        }
    }

    /// Maps the element of an item; `Done` passes through.
    #[inline]
    pub fn map_element<U, F>(self, f: F) -> Iteration<U>
    where
        F: FnOnce(Element<T>) -> Element<U>,
    {
        match self {
            Iteration::Item(e) => Iteration::Item(f(e)),
            Iteration::Done => Iteration::Done,
        }
    }
}

impl<T> From<Element<T>> for Iteration<T> {
    fn from(element: Element<T>) -> Self {
        Iteration::Item(element)
    }
}

impl<T> From<Result<T>> for Iteration<T> {
    fn from(result: Result<T>) -> Self {
        Iteration::Item(Element::from(result))
    }
}

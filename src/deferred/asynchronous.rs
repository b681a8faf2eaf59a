use std::{
    cell::RefCell,
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll, Waker},
};

use crate::{
    deferred::{IntoSettlement, Settlement, Status},
    error::{Error, Result},
    event_loop,
};

type Waiter<T> = Box<dyn FnOnce(Result<T>)>;

enum State<T> {
    Pending(Vec<Waiter<T>>),
    // Weak link to the adopted deferred, followed to detect adoption cycles.
    Adopting(Vec<Waiter<T>>, Weak<RefCell<State<T>>>),
    Resolved(T),
    Rejected(Error),
}

impl<T> State<T> {
    fn status(&self) -> Status {
        match self {
            State::Pending(_) | State::Adopting(..) => Status::Pending,
            State::Resolved(_) => Status::Resolved,
            State::Rejected(_) => Status::Rejected,
        }
    }
}

/// A deferred value whose continuations always run on a later event-loop turn.
///
/// `AsyncDeferred` is a shared handle: clones observe and settle the same
/// value. It moves through `Pending → (Adopting →) Resolved | Rejected` exactly
/// once. Continuations registered with [`attach`](AsyncDeferred::attach) (or
/// [`then`](AsyncDeferred::then), [`catch`](AsyncDeferred::catch),
/// [`finally`](AsyncDeferred::finally)) fire in registration order, each once,
/// after the value settles, and never inside the call that registered them,
/// even if the value had settled long before.
///
/// ```rust
/// use defer_iter::{AsyncDeferred, event_loop};
///
/// let d = AsyncDeferred::new();
/// let doubled = d.then(|v: i32| Ok(v * 2));
/// d.resolve(21);
/// assert!(doubled.is_pending());
/// event_loop::run();
/// assert_eq!(doubled.peek(), Some(Ok(42)));
/// ```
pub struct AsyncDeferred<T> {
    inner: Rc<RefCell<State<T>>>,
}

impl<T> Clone for AsyncDeferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncDeferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("AsyncDeferred");
        match &*self.inner.borrow() {
            State::Pending(w) => s.field("pending", &w.len()),
            State::Adopting(w, _) => s.field("adopting", &w.len()),
            State::Resolved(v) => s.field("resolved", v),
            State::Rejected(e) => s.field("rejected", e),
        };
        s.finish()
    }
}

impl<T> Default for AsyncDeferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AsyncDeferred<T> {
    /// Create a pending deferred.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(State::Pending(Vec::new()))),
        }
    }

    /// Create a deferred already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(State::Resolved(value))),
        }
    }

    /// Create a deferred already rejected with `err`.
    pub fn rejected(err: Error) -> Self {
        Self {
            inner: Rc::new(RefCell::new(State::Rejected(err))),
        }
    }

    pub fn status(&self) -> Status {
        self.inner.borrow().status()
    }

    /// `true` until settled, including while adopting another deferred.
    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    pub fn is_resolved(&self) -> bool {
        self.status() == Status::Resolved
    }

    pub fn is_rejected(&self) -> bool {
        self.status() == Status::Rejected
    }

    /// Returns `true` if both handles refer to the same deferred value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A producer-only view that can settle this deferred but not observe it.
    pub fn resolver(&self) -> Resolver<T> {
        Resolver {
            deferred: self.clone(),
        }
    }
}

impl<T: Clone + 'static> AsyncDeferred<T> {
    /// Resolve with `value`. Returns `false` if already settled or adopting.
    pub fn resolve(&self, value: T) -> bool {
        self.claim() && {
            self.complete(Ok(value));
            true
        }
    }

    /// Reject with `err`. Returns `false` if already settled or adopting.
    pub fn reject(&self, err: Error) -> bool {
        self.claim() && {
            self.complete(Err(err));
            true
        }
    }

    /// Settle with whatever `inner` eventually settles with.
    ///
    /// This deferred stays pending while `inner` is; later `resolve`/`reject`
    /// calls are ignored. Adopting oneself, directly or through a chain of
    /// adopting deferreds, rejects with [`Error::SelfAdoption`].
    pub fn adopt(&self, inner: AsyncDeferred<T>) -> bool {
        if !self.claim() {
            return false;
        }
        if inner.adopts(self) {
            return self.reject(Error::SelfAdoption);
        }
        {
            let mut state = self.inner.borrow_mut();
            let waiters = match &mut *state {
                State::Pending(waiters) => std::mem::take(waiters),
                _ => return false,
            };
            *state = State::Adopting(waiters, Rc::downgrade(&inner.inner));
        }
        tracing::trace!("deferred adopting another deferred");
        let this = self.clone();
        inner.subscribe(move |outcome| this.complete(outcome));
        true
    }

    /// Apply a handler's [`Settlement`].
    pub fn settle(&self, settlement: Settlement<T>) -> bool {
        match settlement {
            Settlement::Resolve(v) => self.resolve(v),
            Settlement::Reject(e) => self.reject(e),
            Settlement::Adopt(inner) => self.adopt(inner),
        }
    }

    pub(crate) fn settle_with(&self, outcome: Result<T>) -> bool {
        match outcome {
            Ok(v) => self.resolve(v),
            Err(e) => self.reject(e),
        }
    }

    /// Snapshot of the outcome, or `None` while pending.
    pub fn peek(&self) -> Option<Result<T>> {
        match &*self.inner.borrow() {
            State::Resolved(v) => Some(Ok(v.clone())),
            State::Rejected(e) => Some(Err(e.clone())),
            State::Pending(_) | State::Adopting(..) => None,
        }
    }

    /// Drive the event loop until this deferred settles.
    ///
    /// Fails with [`Error::Stalled`] if the loop goes idle first.
    pub fn wait(&self) -> Result<T> {
        loop {
            if let Some(outcome) = self.peek() {
                return outcome;
            }
            if event_loop::turn() == 0 {
                return Err(Error::Stalled);
            }
        }
    }

    /// React to the outcome on a later turn.
    ///
    /// The handler's return value decides the returned deferred: an `Ok`
    /// resolves it, an `Err` rejects it and an `AsyncDeferred` is adopted.
    /// `on_settle` runs after the branch with the resolved value or `None`.
    pub fn attach<U, R, G, H, SR, SG>(&self, on_resolve: R, on_reject: G, on_settle: H) -> AsyncDeferred<U>
    where
        U: Clone + 'static,
        R: FnOnce(T) -> SR + 'static,
        G: FnOnce(Error) -> SG + 'static,
        H: FnOnce(Option<&T>) + 'static,
        SR: IntoSettlement<Value = U>,
        SG: IntoSettlement<Value = U>,
    {
        self.react(on_resolve, on_reject, Some(on_settle))
    }

    /// Transform the resolved value; rejections pass through.
    pub fn then<F, S>(&self, on_resolve: F) -> AsyncDeferred<S::Value>
    where
        F: FnOnce(T) -> S + 'static,
        S: IntoSettlement,
        S::Value: Clone + 'static,
    {
        self.react(on_resolve, Settlement::Reject, None::<fn(Option<&T>)>)
    }

    /// Recover from a rejection; resolved values pass through.
    pub fn catch<G, S>(&self, on_reject: G) -> AsyncDeferred<T>
    where
        G: FnOnce(Error) -> S + 'static,
        S: IntoSettlement<Value = T>,
    {
        self.react(Settlement::Resolve, on_reject, None::<fn(Option<&T>)>)
    }

    /// Observe the outcome; the returned deferred settles the same way.
    pub fn finally<H>(&self, on_settle: H) -> AsyncDeferred<T>
    where
        H: FnOnce(Option<&T>) + 'static,
    {
        self.react(Settlement::Resolve, Settlement::Reject, Some(on_settle))
    }

    fn react<U, R, G, H, SR, SG>(&self, on_resolve: R, on_reject: G, on_settle: Option<H>) -> AsyncDeferred<U>
    where
        U: Clone + 'static,
        R: FnOnce(T) -> SR + 'static,
        G: FnOnce(Error) -> SG + 'static,
        H: FnOnce(Option<&T>) + 'static,
        SR: IntoSettlement<Value = U>,
        SG: IntoSettlement<Value = U>,
    {
        let downstream = AsyncDeferred::new();
        let d = downstream.clone();
        self.subscribe(move |outcome| {
            let kept = match (&on_settle, &outcome) {
                (Some(_), Ok(v)) => Some(v.clone()),
                _ => None,
            };
            let settlement = match outcome {
                Ok(v) => on_resolve(v).into_settlement(),
                Err(e) => on_reject(e).into_settlement(),
            };
            d.settle(settlement);
            if let Some(on_settle) = on_settle {
                on_settle(kept.as_ref());
            }
        });
        downstream
    }

    /// Register a raw waiter. It runs on a later turn with a clone of the outcome.
    pub(crate) fn subscribe<F>(&self, waiter: F)
    where
        F: FnOnce(Result<T>) + 'static,
    {
        let mut state = self.inner.borrow_mut();
        match &mut *state {
            State::Pending(waiters) | State::Adopting(waiters, _) => waiters.push(Box::new(waiter)),
            State::Resolved(v) => {
                let outcome = Ok(v.clone());
                event_loop::schedule(move || waiter(outcome));
            }
            State::Rejected(e) => {
                let outcome = Err(e.clone());
                event_loop::schedule(move || waiter(outcome));
            }
        }
    }

    // Whether following the adoption chain from `self` reaches `target`.
    fn adopts(&self, target: &AsyncDeferred<T>) -> bool {
        let mut cursor = Rc::clone(&self.inner);
        loop {
            if Rc::ptr_eq(&cursor, &target.inner) {
                return true;
            }
            let next = match &*cursor.borrow() {
                State::Adopting(_, next) => next.upgrade(),
                _ => None,
            };
            match next {
                Some(next) => cursor = next,
                None => return false,
            }
        }
    }

    fn claim(&self) -> bool {
        matches!(&*self.inner.borrow(), State::Pending(_))
    }

    fn complete(&self, outcome: Result<T>) {
        let waiters = {
            let mut state = self.inner.borrow_mut();
            let waiters = match &mut *state {
                State::Pending(waiters) | State::Adopting(waiters, _) => std::mem::take(waiters),
                _ => return,
            };
            *state = match &outcome {
                Ok(v) => State::Resolved(v.clone()),
                Err(e) => State::Rejected(e.clone()),
            };
            waiters
        };
        tracing::trace!(
            resolved = outcome.is_ok(),
            waiters = waiters.len(),
            "deferred settled"
        );
        for waiter in waiters {
            let outcome = outcome.clone();
            event_loop::schedule(move || waiter(outcome));
        }
    }
}

/// Producer-only view of an [`AsyncDeferred`].
///
/// Hand this to whoever computes the value; it can settle the deferred but
/// cannot attach continuations to it.
pub struct Resolver<T> {
    deferred: AsyncDeferred<T>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            deferred: self.deferred.clone(),
        }
    }
}

impl<T: Clone + 'static> Resolver<T> {
    pub fn resolve(&self, value: T) -> bool {
        self.deferred.resolve(value)
    }

    pub fn reject(&self, err: Error) -> bool {
        self.deferred.reject(err)
    }

    pub fn adopt(&self, inner: AsyncDeferred<T>) -> bool {
        self.deferred.adopt(inner)
    }

    pub fn settle(&self, settlement: Settlement<T>) -> bool {
        self.deferred.settle(settlement)
    }

    /// `true` while the deferred can still be settled through this view.
    pub fn is_pending(&self) -> bool {
        self.deferred.claim()
    }
}

/// Future returned by [`AsyncDeferred::into_future`].
///
/// Resolves once the deferred settles and the event loop delivered the
/// outcome, so it must be driven with [`event_loop::block_on`] or by running
/// the loop between polls.
pub struct DeferredFuture<T> {
    deferred: AsyncDeferred<T>,
    slot: Option<Rc<RefCell<Delivery<T>>>>,
}

struct Delivery<T> {
    outcome: Option<Result<T>>,
    waker: Option<Waker>,
}

impl<T: Clone + 'static> IntoFuture for AsyncDeferred<T> {
    type Output = Result<T>;
    type IntoFuture = DeferredFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        DeferredFuture {
            deferred: self,
            slot: None,
        }
    }
}

impl<T: Clone + 'static> Future for DeferredFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let slot = this.slot.get_or_insert_with(|| {
            let slot = Rc::new(RefCell::new(Delivery {
                outcome: None,
                waker: None,
            }));
            let s = Rc::clone(&slot);
            this.deferred.subscribe(move |outcome| {
                let waker = {
                    let mut delivery = s.borrow_mut();
                    delivery.outcome = Some(outcome);
                    delivery.waker.take()
                };
                if let Some(waker) = waker {
                    waker.wake();
                }
            });
            slot
        });
        let mut delivery = slot.borrow_mut();
        match delivery.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                delivery.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::{block_on, run, set_timeout};
    use std::cell::Cell;

    fn spy<T: 'static>() -> (Rc<RefCell<Vec<T>>>, impl Fn(T) + Clone + 'static) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let c = Rc::clone(&calls);
        (calls, move |v| c.borrow_mut().push(v))
    }

    #[test]
    fn test_can_resolve_a_value() {
        let d = AsyncDeferred::new();
        let (calls, record) = spy();
        d.then(move |v: i32| {
            record(v);
            Ok(())
        });
        d.resolve(42);
        run();
        assert_eq!(*calls.borrow(), vec![42]);
    }

    #[test]
    fn test_can_reject_a_value() {
        let d = AsyncDeferred::<i32>::new();
        let (calls, record) = spy();
        d.catch(move |e| {
            record(e);
            Ok(0)
        });
        d.reject(Error::msg("err"));
        run();
        assert_eq!(*calls.borrow(), vec![Error::msg("err")]);
    }

    #[test]
    fn test_does_not_invoke_listeners_synchronously() {
        let d = AsyncDeferred::resolved(1);
        let hit = Rc::new(Cell::new(false));
        let h = Rc::clone(&hit);
        d.then(move |_| {
            h.set(true);
            Ok(())
        });
        assert!(!hit.get());
        run();
        assert!(hit.get());
    }

    #[test]
    fn test_settling_does_not_invoke_listeners_synchronously() {
        let d = AsyncDeferred::new();
        let hit = Rc::new(Cell::new(false));
        let h = Rc::clone(&hit);
        d.then(move |_: i32| {
            h.set(true);
            Ok(())
        });
        d.resolve(1);
        assert!(!hit.get());
        run();
        assert!(hit.get());
    }

    #[test]
    fn test_resolved_at_most_once() {
        let d = AsyncDeferred::new();
        assert!(d.resolve(1));
        assert!(!d.resolve(2));
        assert!(!d.reject(Error::msg("late")));
        let out = d.then(|v: i32| Ok(v));
        assert_eq!(out.wait(), Ok(1));
    }

    #[test]
    fn test_multiple_callbacks_fire_once_in_order() {
        let d = AsyncDeferred::new();
        let (calls, record) = spy();
        for tag in ["a", "b", "c"] {
            let record = record.clone();
            d.then(move |v: i32| {
                record(format!("{tag}{v}"));
                Ok(())
            });
        }
        d.resolve(1);
        d.resolve(2);
        run();
        let late = record.clone();
        d.then(move |v| {
            late(format!("d{v}"));
            Ok(())
        });
        run();
        assert_eq!(*calls.borrow(), vec!["a1", "b1", "c1", "d1"]);
    }

    #[test]
    fn test_chain_leaves_source_unchanged() {
        let d = AsyncDeferred::new();
        let doubled = d.then(|v: i32| Ok(v * 2));
        let tripled = d.then(|v: i32| Ok(v * 3));
        d.resolve(5);
        run();
        assert_eq!(d.peek(), Some(Ok(5)));
        assert_eq!(doubled.peek(), Some(Ok(10)));
        assert_eq!(tripled.peek(), Some(Ok(15)));
    }

    #[test]
    fn test_rejection_propagates_through_chain() {
        let d = AsyncDeferred::<i32>::new();
        let hit = Rc::new(Cell::new(false));
        let h = Rc::clone(&hit);
        let tail = d
            .then(move |v| {
                h.set(true);
                Ok(v + 1)
            })
            .then(|v| Ok(v + 1));
        d.reject(Error::msg("nope"));
        assert_eq!(tail.wait(), Err(Error::msg("nope")));
        assert!(!hit.get());
    }

    #[test]
    fn test_reject_handler_value_becomes_resolution() {
        let d = AsyncDeferred::<i32>::rejected(Error::msg("x"));
        assert_eq!(d.catch(|_| Ok(9)).wait(), Ok(9));
    }

    #[test]
    fn test_handler_error_rejects_downstream_not_source() {
        let d = AsyncDeferred::resolved(1);
        let out: AsyncDeferred<i32> = d.then(|_| Err(Error::msg("thrown")));
        assert_eq!(out.wait(), Err(Error::msg("thrown")));
        assert_eq!(d.peek(), Some(Ok(1)));
    }

    #[test]
    fn test_adopts_value_of_returned_deferred() {
        let d = AsyncDeferred::resolved(2);
        let inner = AsyncDeferred::new();
        let i = inner.clone();
        let out = d.then(move |_| i);
        set_timeout(50, move || {
            inner.resolve("later".to_string());
        });
        assert_eq!(out.wait(), Ok("later".to_string()));
    }

    #[test]
    fn test_adopts_error_of_returned_deferred() {
        let d = AsyncDeferred::resolved(2);
        let out = d.then(|_| AsyncDeferred::<i32>::rejected(Error::msg("inner")));
        assert_eq!(out.wait(), Err(Error::msg("inner")));
    }

    #[test]
    fn test_adopting_ignores_later_settlement() {
        let d = AsyncDeferred::new();
        let inner = AsyncDeferred::new();
        assert!(d.adopt(inner.clone()));
        assert!(d.is_pending());
        assert!(!d.resolve(1));
        inner.resolve(2);
        assert_eq!(d.wait(), Ok(2));
    }

    #[test]
    fn test_self_adoption_rejects() {
        let d = AsyncDeferred::<i32>::new();
        d.adopt(d.clone());
        assert_eq!(d.peek(), Some(Err(Error::SelfAdoption)));
    }

    #[test]
    fn test_adoption_cycle_rejects() {
        let a = AsyncDeferred::<i32>::new();
        let b = AsyncDeferred::<i32>::new();
        let c = AsyncDeferred::<i32>::new();
        assert!(a.adopt(b.clone()));
        assert!(b.adopt(c.clone()));
        c.adopt(a.clone());
        assert_eq!(c.peek(), Some(Err(Error::SelfAdoption)));
        assert_eq!(a.wait(), Err(Error::SelfAdoption));
        assert_eq!(b.peek(), Some(Err(Error::SelfAdoption)));
    }

    #[test]
    fn test_adopting_a_settled_chain_is_not_a_cycle() {
        let a = AsyncDeferred::new();
        let b = AsyncDeferred::resolved(3);
        assert!(a.adopt(b.clone()));
        let c = AsyncDeferred::new();
        assert!(c.adopt(a.clone()));
        assert_eq!(c.wait(), Ok(3));
    }

    #[test]
    fn test_finally_sees_value_or_none() {
        let (calls, record) = spy();
        let r = record.clone();
        let ok = AsyncDeferred::resolved(3).finally(move |v| r(v.copied()));
        let bad = AsyncDeferred::<i32>::rejected(Error::msg("x")).finally(move |v| record(v.copied()));
        run();
        assert_eq!(*calls.borrow(), vec![Some(3), None]);
        assert_eq!(ok.peek(), Some(Ok(3)));
        assert_eq!(bad.peek(), Some(Err(Error::msg("x"))));
    }

    #[test]
    fn test_attach_runs_settle_after_branch() {
        let (calls, record) = spy();
        let r = record.clone();
        let out = AsyncDeferred::resolved(4).attach(
            move |v| {
                r(format!("resolve {v}"));
                Ok(v + 1)
            },
            |_| Ok(0),
            move |v| record(format!("settle {v:?}")),
        );
        assert_eq!(out.wait(), Ok(5));
        assert_eq!(*calls.borrow(), vec!["resolve 4", "settle Some(4)"]);
    }

    #[test]
    fn test_resolver_settles_shared_state() {
        let d = AsyncDeferred::new();
        let resolver = d.resolver();
        assert!(resolver.is_pending());
        resolver.resolve('x');
        assert!(!resolver.is_pending());
        assert_eq!(d.peek(), Some(Ok('x')));
    }

    #[test]
    fn test_await_deferred() {
        let d = AsyncDeferred::new();
        let r = d.resolver();
        set_timeout(10, move || {
            r.resolve(11);
        });
        let out = block_on(async move { d.await.map(|v| v + 1) });
        assert_eq!(out, Ok(Ok(12)));
    }

    #[test]
    fn test_wait_reports_stall() {
        let d = AsyncDeferred::<()>::new();
        assert_eq!(d.wait(), Err(Error::Stalled));
    }
}

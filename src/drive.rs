//! Driving a pipeline to completion.
//!
//! Stages are lazy; the functions here are the only consumers. Each pulls the
//! next element only after the previous one settled, so async elements
//! suspend the drive between pulls while sync elements are consumed in a
//! single call.

use std::{cell::RefCell, rc::Rc};

use crate::{deferred::AsyncDeferred, error::Result, iter::Iter, iteration::Iteration, trampoline};

type Visitor<T> = Rc<RefCell<dyn FnMut(Result<T>)>>;

fn drive<T>(iter: Iter<T>, visitor: Visitor<T>, on_complete: Box<dyn FnOnce()>)
where
    T: Clone + 'static,
{
    let next = iter.share();
    iter.pull(move |iteration| match iteration {
        Iteration::Done => {
            tracing::trace!("pipeline exhausted");
            on_complete();
        }
        Iteration::Item(element) => element.observe(move |outcome| {
            (*visitor.borrow_mut())(outcome);
            drive(next, visitor, on_complete);
        }),
    });
}

impl<T: Clone + 'static> Iter<T> {
    /// Visit every resolved element in order, then call `on_complete`.
    ///
    /// Rejected elements are skipped; use [`iterate_settled`](Iter::iterate_settled)
    /// to see them.
    ///
    /// ```rust
    /// use defer_iter::Iter;
    /// use std::{cell::RefCell, rc::Rc};
    ///
    /// let seen = Rc::new(RefCell::new(Vec::new()));
    /// let s = Rc::clone(&seen);
    /// Iter::new(vec![1, 2, 3]).iterate(move |v| s.borrow_mut().push(v), || {});
    /// assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    /// ```
    pub fn iterate<V, C>(self, mut visitor: V, on_complete: C)
    where
        V: FnMut(T) + 'static,
        C: FnOnce() + 'static,
    {
        self.iterate_settled(
            move |outcome| {
                if let Ok(value) = outcome {
                    visitor(value);
                }
            },
            on_complete,
        );
    }

    /// Visit the outcome of every element in order, then call `on_complete`.
    ///
    /// Synchronous elements are consumed before this returns, also when called
    /// from inside another pipeline's handler.
    pub fn iterate_settled<V, C>(self, visitor: V, on_complete: C)
    where
        V: FnMut(Result<T>) + 'static,
        C: FnOnce() + 'static,
    {
        let visitor: Visitor<T> = Rc::new(RefCell::new(visitor));
        let on_complete: Box<dyn FnOnce()> = Box::new(on_complete);
        trampoline::frame(move || drive(self, visitor, on_complete));
    }

    /// Gather the resolved values in order and hand them to `on_complete`.
    pub fn to_array<C>(self, on_complete: C)
    where
        C: FnOnce(Vec<T>) + 'static,
    {
        let values = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&values);
        self.iterate(
            move |value| sink.borrow_mut().push(value),
            move || on_complete(values.take()),
        );
    }

    /// Like [`to_array`](Iter::to_array), with the values delivered through an
    /// [`AsyncDeferred`].
    ///
    /// For a purely synchronous pipeline the deferred is already resolved on return.
    pub fn collect(self) -> AsyncDeferred<Vec<T>> {
        let out = AsyncDeferred::new();
        let resolver = out.resolver();
        self.to_array(move |values| {
            resolver.resolve(values);
        });
        out
    }
}

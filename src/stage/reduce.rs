use std::{cell::RefCell, rc::Rc};

use crate::{
    error::Result,
    iter::Iter,
    iteration::Iteration,
    source::{Continuation, Pull},
};

type Step<A, T> = Rc<dyn Fn(A, T) -> Result<A>>;

struct Fold<A> {
    acc: Option<A>,
    done: bool,
}

/// Drains the upstream into one accumulated element, then reports `Done`.
struct Reduce<T, A> {
    upstream: Iter<T>,
    step: Option<Step<A, T>>,
    fold: Rc<RefCell<Fold<A>>>,
}

impl<T, A> Pull<A> for Reduce<T, A>
where
    T: Clone + 'static,
    A: Clone + 'static,
{
    fn pull(&mut self, k: Continuation<A>) {
        if self.fold.borrow().done {
            return k(Iteration::Done);
        }
        accumulate(self.upstream.share(), self.step.clone(), Rc::clone(&self.fold), k);
    }
}

fn accumulate<T, A>(upstream: Iter<T>, step: Option<Step<A, T>>, fold: Rc<RefCell<Fold<A>>>, k: Continuation<A>)
where
    T: Clone + 'static,
    A: Clone + 'static,
{
    let next = upstream.share();
    upstream.pull(move |iteration| {
        let element = match iteration {
            Iteration::Done => {
                let acc = {
                    let mut fold = fold.borrow_mut();
                    fold.done = true;
                    fold.acc.take()
                };
                return k(acc.map_or(Iteration::Done, Iteration::resolve));
            }
            Iteration::Item(element) => element,
        };
        let Some(f) = step else {
            return accumulate(next, None, fold, k);
        };
        element.observe(move |outcome| {
            let value = match outcome {
                Ok(value) => value,
                Err(err) => {
                    tracing::debug!(%err, "reduce stopped by rejected element");
                    fold.borrow_mut().done = true;
                    return k(Iteration::reject(err));
                }
            };
            let acc = fold.borrow_mut().acc.take();
            let folded = match acc {
                Some(acc) => f(acc, value),
                None => return k(Iteration::Done),
            };
            match folded {
                Ok(acc) => {
                    fold.borrow_mut().acc = Some(acc);
                    accumulate(next, Some(f), fold, k);
                }
                Err(err) => {
                    tracing::debug!(%err, "reduce stopped by accumulator error");
                    fold.borrow_mut().done = true;
                    k(Iteration::reject(err));
                }
            }
        });
    });
}

impl<T: Clone + 'static> Iter<T> {
    /// Fold every element into one value, yielded as a single element.
    ///
    /// A rejected element, or an `Err` from `f`, rejects the result and stops
    /// the fold.
    ///
    /// ```rust
    /// use defer_iter::Iter;
    ///
    /// let total = Iter::new(vec![1, 2, 3]).reduce(|acc, x| Ok(acc + x), 10).collect();
    /// assert_eq!(total.peek(), Some(Ok(vec![16])));
    /// ```
    pub fn reduce<A, F>(self, f: F, init: A) -> Iter<A>
    where
        A: Clone + 'static,
        F: Fn(A, T) -> Result<A> + 'static,
    {
        let step: Step<A, T> = Rc::new(f);
        self.fold_with(Some(step), init)
    }

    /// Pull the upstream to exhaustion and yield `init` unchanged.
    pub fn drain<A>(self, init: A) -> Iter<A>
    where
        A: Clone + 'static,
    {
        self.fold_with(None, init)
    }

    fn fold_with<A>(self, step: Option<Step<A, T>>, init: A) -> Iter<A>
    where
        A: Clone + 'static,
    {
        Iter::from_pull(Reduce {
            upstream: self,
            step,
            fold: Rc::new(RefCell::new(Fold {
                acc: Some(init),
                done: false,
            })),
        })
    }
}

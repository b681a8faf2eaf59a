//! Folding several async deferred values into one.
//!
//! Each combinator subscribes to every input and keeps its bookkeeping in a
//! shared [`Join`]: one slot per input plus a count of inputs that settled.

use std::{cell::RefCell, rc::Rc};

use crate::{deferred::AsyncDeferred, error::Error};

struct Join<T> {
    slots: Vec<Option<T>>,
    complete: usize,
}

impl<T> Join<T> {
    fn new(len: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(len).collect(),
            complete: 0,
        }
    }

    /// Fill `index` and return every slot once all of them are filled.
    fn fill(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.replace(value).is_none() {
                self.complete += 1;
            }
        }
        if self.slots.is_empty() || self.complete < self.slots.len() {
            return None;
        }
        Some(std::mem::take(&mut self.slots).into_iter().flatten().collect())
    }
}

/// Resolve with every input's value, in input order.
///
/// The first rejection rejects the result straight away; values that arrive
/// afterwards are discarded. An empty input resolves to an empty list.
///
/// ```rust
/// use defer_iter::{AsyncDeferred, all};
///
/// let a = AsyncDeferred::new();
/// let b = AsyncDeferred::resolved(2);
/// let both = all([a.clone(), b]);
/// a.resolve(1);
/// assert_eq!(both.wait(), Ok(vec![1, 2]));
/// ```
pub fn all<T, I>(inputs: I) -> AsyncDeferred<Vec<T>>
where
    T: Clone + 'static,
    I: IntoIterator<Item = AsyncDeferred<T>>,
{
    let inputs: Vec<_> = inputs.into_iter().collect();
    let result = AsyncDeferred::new();
    if inputs.is_empty() {
        result.resolve(Vec::new());
        return result;
    }

    let join = Rc::new(RefCell::new(Join::new(inputs.len())));
    for (index, input) in inputs.into_iter().enumerate() {
        let join = Rc::clone(&join);
        let result = result.clone();
        input.subscribe(move |outcome| match outcome {
            Ok(value) => {
                let filled = join.borrow_mut().fill(index, value);
                if let Some(values) = filled {
                    result.resolve(values);
                }
            }
            Err(err) => {
                if result.reject(err) {
                    tracing::trace!(index, "all rejected early");
                    join.borrow_mut().slots.clear();
                }
            }
        });
    }
    result
}

/// Wait for every input and resolve with their values, in input order.
///
/// Inputs that reject contribute `fallback` instead, so the result never
/// rejects. An empty input resolves to an empty list.
pub fn any<T, I>(inputs: I, fallback: T) -> AsyncDeferred<Vec<T>>
where
    T: Clone + 'static,
    I: IntoIterator<Item = AsyncDeferred<T>>,
{
    let inputs: Vec<_> = inputs.into_iter().collect();
    let result = AsyncDeferred::new();
    if inputs.is_empty() {
        result.resolve(Vec::new());
        return result;
    }

    let join = Rc::new(RefCell::new(Join::new(inputs.len())));
    for (index, input) in inputs.into_iter().enumerate() {
        let join = Rc::clone(&join);
        let result = result.clone();
        let fallback = fallback.clone();
        input.subscribe(move |outcome| {
            let value = outcome.unwrap_or_else(|err: Error| {
                tracing::trace!(index, %err, "any substituting fallback");
                fallback
            });
            let filled = join.borrow_mut().fill(index, value);
            if let Some(values) = filled {
                result.resolve(values);
            }
        });
    }
    result
}

/// Settle the same way as whichever input settles first.
///
/// Later settlements are ignored. An empty input never settles.
pub fn race<T, I>(inputs: I) -> AsyncDeferred<T>
where
    T: Clone + 'static,
    I: IntoIterator<Item = AsyncDeferred<T>>,
{
    let result = AsyncDeferred::new();
    for input in inputs {
        let result = result.clone();
        input.subscribe(move |outcome| {
            result.settle_with(outcome);
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::{now_ms, run, set_timeout};

    fn after<T: Clone + 'static>(delay_ms: u64, outcome: Result<T, Error>) -> AsyncDeferred<T> {
        let d = AsyncDeferred::new();
        let r = d.resolver();
        set_timeout(delay_ms, move || match outcome {
            Ok(v) => {
                r.resolve(v);
            }
            Err(e) => {
                r.reject(e);
            }
        });
        d
    }

    #[test]
    fn test_all_keeps_input_order() {
        let out = all([after(30, Ok(1)), after(10, Ok(2)), after(20, Ok(3))]);
        assert_eq!(out.wait(), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_all_rejects_on_first_error() {
        let out = all([after(30, Ok(1)), after(10, Err(Error::msg("boom"))), after(20, Ok(3))]);
        assert_eq!(out.wait(), Err(Error::msg("boom")));
        assert_eq!(now_ms(), 10);
        run();
        assert_eq!(out.peek(), Some(Err(Error::msg("boom"))));
    }

    #[test]
    fn test_all_empty_resolves_empty() {
        let out = all(Vec::<AsyncDeferred<u8>>::new());
        assert_eq!(out.peek(), Some(Ok(vec![])));
    }

    #[test]
    fn test_any_substitutes_fallback() {
        let out = any(
            [after(5, Ok(1)), after(1, Err(Error::msg("x"))), AsyncDeferred::resolved(3)],
            0,
        );
        assert_eq!(out.wait(), Ok(vec![1, 0, 3]));
    }

    #[test]
    fn test_any_waits_for_every_input() {
        let slow = AsyncDeferred::new();
        let out = any([AsyncDeferred::rejected(Error::msg("x")), slow.clone()], -1);
        run();
        assert!(out.is_pending());
        slow.resolve(7);
        assert_eq!(out.wait(), Ok(vec![-1, 7]));
    }

    #[test]
    fn test_race_takes_earliest() {
        let out = race([after(300, Ok(1)), after(100, Ok(2)), after(200, Ok(3))]);
        assert_eq!(out.wait(), Ok(2));
        run();
        assert_eq!(out.peek(), Some(Ok(2)));
    }

    #[test]
    fn test_race_propagates_rejection() {
        let out = race([after(20, Ok(1)), after(10, Err(Error::msg("first")))]);
        assert_eq!(out.wait(), Err(Error::msg("first")));
    }

    #[test]
    fn test_race_empty_never_settles() {
        let out = race(Vec::<AsyncDeferred<u8>>::new());
        run();
        assert!(out.is_pending());
    }
}

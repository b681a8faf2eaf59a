use std::{cell::RefCell, rc::Rc};

use crate::{
    iter::Iter,
    iteration::{Element, Iteration},
    source::{Continuation, Pull},
};

struct Replay<T> {
    // `None` once every pass finished.
    buffer: Option<Vec<Element<T>>>,
    upstream_done: bool,
    index: usize,
    remaining: usize,
}

/// Records the first pass over the upstream and replays it.
struct Cycle<T> {
    upstream: Iter<T>,
    replay: Rc<RefCell<Replay<T>>>,
}

impl<T: Clone + 'static> Pull<T> for Cycle<T> {
    fn pull(&mut self, k: Continuation<T>) {
        if self.replay.borrow().upstream_done {
            return replay(&self.replay, k);
        }
        let state = Rc::clone(&self.replay);
        self.upstream.pull(move |iteration| match iteration {
            Iteration::Item(element) => {
                if let Some(buffer) = state.borrow_mut().buffer.as_mut() {
                    buffer.push(element.clone());
                }
                k(Iteration::Item(element));
            }
            Iteration::Done => {
                {
                    let mut state = state.borrow_mut();
                    state.upstream_done = true;
                    state.index = state.buffer.as_ref().map_or(0, Vec::len);
                }
                replay(&state, k);
            }
        });
    }
}

fn replay<T: Clone>(state: &RefCell<Replay<T>>, k: Continuation<T>) {
    let next = {
        let mut state = state.borrow_mut();
        loop {
            let Replay {
                buffer,
                index,
                remaining,
                ..
            } = &mut *state;
            let Some(items) = buffer.as_ref() else {
                break None;
            };
            if let Some(element) = items.get(*index) {
                *index += 1;
                break Some(element.clone());
            }
            if *remaining == 0 {
                tracing::trace!(len = items.len(), "cycle finished, releasing buffer");
                *buffer = None;
                break None;
            }
            tracing::trace!(remaining = *remaining, "cycle replaying");
            *remaining -= 1;
            *index = 0;
        }
    };
    k(next.map_or(Iteration::Done, Iteration::Item));
}

impl<T: Clone + 'static> Iter<T> {
    /// Yield the upstream sequence `passes` times in total.
    ///
    /// The first pass is forwarded as it is pulled and buffered; once upstream
    /// is done the buffer is replayed until `passes` is reached. A value below
    /// `1` counts as `1`.
    ///
    /// ```rust
    /// use defer_iter::Iter;
    ///
    /// let out = Iter::new(vec!['a', 'b']).cycle(2).collect();
    /// assert_eq!(out.peek(), Some(Ok(vec!['a', 'b', 'a', 'b'])));
    /// ```
    pub fn cycle(self, passes: usize) -> Iter<T> {
        Iter::from_pull(Cycle {
            upstream: self,
            replay: Rc::new(RefCell::new(Replay {
                buffer: Some(Vec::new()),
                upstream_done: false,
                index: 0,
                remaining: passes.max(1) - 1,
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{error::Error, Iter, Iteration};
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn test_cycle_counts_total_passes() {
        for (passes, expected) in [(0, 1), (1, 1), (2, 2), (4, 4)] {
            let out = Iter::new(vec![1, 2]).cycle(passes).collect();
            let len = out.peek().map(|r| r.map(|v| v.len()));
            assert_eq!(len, Some(Ok(expected * 2)), "passes = {passes}");
        }
    }

    #[test]
    fn test_cycle_replays_rejections() {
        let settled = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&settled);
        Iter::new(vec![1, 2])
            .map(|x| if x == 2 { Err(Error::msg("two")) } else { Ok(x) })
            .cycle(2)
            .iterate_settled(move |r| s.borrow_mut().push(r), || {});
        let two = Err(Error::msg("two"));
        assert_eq!(*settled.borrow(), vec![Ok(1), two.clone(), Ok(1), two]);
    }

    #[test]
    fn test_cycle_of_empty_is_done() {
        let out = Iter::<u8>::empty().cycle(5).collect();
        assert_eq!(out.peek(), Some(Ok(vec![])));
    }

    #[test]
    fn test_done_after_final_pass() {
        let iter = Iter::new(vec![7]).cycle(2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..4 {
            let s = Rc::clone(&seen);
            iter.pull(move |it: Iteration<i32>| s.borrow_mut().push(it.is_done()));
        }
        assert_eq!(*seen.borrow(), vec![false, false, true, true]);
    }
}

//! Stack-flat dispatch for synchronous pulls.
//!
//! A synchronous pipeline answers a pull by calling the continuation in place,
//! and the continuation usually pulls again. Done naively that recursion grows
//! the stack by a few frames per element, and it re-enters a stage while the
//! stage is still borrowed. [`bounce`] breaks the cycle: the outermost call runs
//! its work item and then drains every item queued by nested calls, one after
//! another, on the same stack frame. No event-loop turn is introduced.
//!
//! A driver started from inside running work opens its own [`frame`], so it
//! finishes its pipeline before returning instead of queueing behind the
//! caller's.

use std::{cell::RefCell, collections::VecDeque};

type Work = Box<dyn FnOnce()>;

#[derive(Default)]
struct Trampoline {
    active: bool,
    queue: VecDeque<Work>,
}

thread_local! {
    static TRAMPOLINE: RefCell<Trampoline> = RefCell::new(Trampoline::default());
}

// Resets the trampoline even if a work item panics.
struct Landing;

impl Drop for Landing {
    fn drop(&mut self) {
        TRAMPOLINE.with(|t| {
            let mut t = t.borrow_mut();
            t.active = false;
            t.queue.clear();
        });
    }
}

/// Run `work` now, or after the work currently on the trampoline if called
/// from inside it.
pub(crate) fn bounce<F>(work: F)
where
    F: FnOnce() + 'static,
{
    let mut work = Some(work);
    let enter = TRAMPOLINE.with(|t| {
        let mut t = t.borrow_mut();
        if t.active {
            if let Some(work) = work.take() {
                t.queue.push_back(Box::new(work));
            }
            false
        } else {
            t.active = true;
            true
        }
    });
    if !enter {
        return;
    }

    let _landing = Landing;
    if let Some(work) = work.take() {
        work();
    }
    while let Some(next) = TRAMPOLINE.with(|t| t.borrow_mut().queue.pop_front()) {
        next();
    }
}

// Puts the enclosing frame's state back when a nested frame ends.
struct Resume(Option<Trampoline>);

impl Drop for Resume {
    fn drop(&mut self) {
        if let Some(outer) = self.0.take() {
            TRAMPOLINE.with(|t| *t.borrow_mut() = outer);
        }
    }
}

/// Run `work` on a fresh trampoline and drain everything it queues before
/// returning, even when called from inside other trampoline work.
pub(crate) fn frame<F>(work: F)
where
    F: FnOnce() + 'static,
{
    let outer = TRAMPOLINE.with(|t| std::mem::take(&mut *t.borrow_mut()));
    let _resume = Resume(Some(outer));
    bounce(work);
}

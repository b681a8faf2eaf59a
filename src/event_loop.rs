//! Thread-local event loop that gives async deferred values their "later turn".
//!
//! Every continuation attached to an [`AsyncDeferred`](crate::AsyncDeferred) is
//! queued here rather than invoked in place. Nothing runs until the loop is
//! driven with [`turn`], [`run`] or [`block_on`], which makes async behaviour
//! fully deterministic: the same program always interleaves the same way.
//!
//! Besides the FIFO task queue the loop owns a virtual clock. Timers registered
//! with [`set_timeout`] fire in order of due time (then registration order) and
//! only once the task queue is empty, at which point the clock jumps forward to
//! the earliest timer. No wall-clock time ever passes.
//!
//! ```rust
//! use defer_iter::event_loop;
//! use std::{cell::Cell, rc::Rc};
//!
//! let hits = Rc::new(Cell::new(0));
//! let h = Rc::clone(&hits);
//! event_loop::schedule(move || h.set(h.get() + 1));
//! assert_eq!(hits.get(), 0);
//! event_loop::run();
//! assert_eq!(hits.get(), 1);
//! ```

use std::{
    cell::RefCell,
    collections::VecDeque,
    future::Future,
    pin::pin,
    task::{Context, Poll},
};

use futures::task::noop_waker_ref;

use crate::error::{Error, Result};

type Task = Box<dyn FnOnce()>;

/// Tuning knobs for the thread's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EventLoopConfig {
    /// Upper bound on tasks executed by a single [`run`] call.
    ///
    /// Pipelines that reschedule themselves forever (an endless source feeding
    /// `iterate`, say) would otherwise never return control to the caller.
    pub max_tasks_per_run: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_run: 1_000_000,
        }
    }
}

/// Handle to a registered timer, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

struct Timer {
    due_ms: u64,
    id: TimerId,
    task: Task,
}

#[derive(Default)]
struct EventLoop {
    tasks: VecDeque<Task>,
    timers: Vec<Timer>,
    now_ms: u64,
    next_timer: u64,
    config: EventLoopConfig,
}

impl EventLoop {
    fn take_due_timer(&mut self) -> Option<Timer> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.due_ms.cmp(&b.due_ms).then(a.id.cmp(&b.id)))
            .map(|(i, _)| i)?;
        let timer = self.timers.swap_remove(index);
        if timer.due_ms > self.now_ms {
            tracing::trace!(from = self.now_ms, to = timer.due_ms, "advancing virtual clock");
            self.now_ms = timer.due_ms;
        }
        Some(timer)
    }
}

thread_local! {
    static EVENT_LOOP: RefCell<EventLoop> = RefCell::new(EventLoop::default());
}

/// Install `config` for the current thread's event loop.
pub fn configure(config: EventLoopConfig) {
    EVENT_LOOP.with(|el| el.borrow_mut().config = config);
}

/// The configuration currently in effect on this thread.
pub fn config() -> EventLoopConfig {
    EVENT_LOOP.with(|el| el.borrow().config)
}

/// Queue `task` to run on a later turn.
pub fn schedule<F>(task: F)
where
    F: FnOnce() + 'static,
{
    EVENT_LOOP.with(|el| {
        let mut el = el.borrow_mut();
        el.tasks.push_back(Box::new(task));
        tracing::trace!(queued = el.tasks.len(), "task scheduled");
    });
}

/// Run `task` once the virtual clock has advanced by `delay_ms`.
pub fn set_timeout<F>(delay_ms: u64, task: F) -> TimerId
where
    F: FnOnce() + 'static,
{
    EVENT_LOOP.with(|el| {
        let mut el = el.borrow_mut();
        let id = TimerId(el.next_timer);
        el.next_timer += 1;
        let due_ms = el.now_ms.saturating_add(delay_ms);
        el.timers.push(Timer {
            due_ms,
            id,
            task: Box::new(task),
        });
        tracing::trace!(timer = id.0, due_ms, "timer registered");
        id
    })
}

/// Current reading of the virtual clock, in milliseconds.
pub fn now_ms() -> u64 {
    EVENT_LOOP.with(|el| el.borrow().now_ms)
}

/// Returns `true` when no task or timer is waiting.
pub fn is_idle() -> bool {
    EVENT_LOOP.with(|el| {
        let el = el.borrow();
        el.tasks.is_empty() && el.timers.is_empty()
    })
}

fn pop_task() -> Option<Task> {
    EVENT_LOOP.with(|el| el.borrow_mut().tasks.pop_front())
}

/// Execute one turn and return the number of tasks it ran.
///
/// A turn runs every task that was queued when it started; tasks queued while
/// it runs wait for the next turn. When the queue is empty the earliest timer
/// fires instead. Returns `0` when the loop is idle.
pub fn turn() -> usize {
    let queued = EVENT_LOOP.with(|el| el.borrow().tasks.len());
    if queued == 0 {
        let timer = EVENT_LOOP.with(|el| el.borrow_mut().take_due_timer());
        return match timer {
            Some(timer) => {
                tracing::trace!(timer = timer.id.0, "timer fired");
                (timer.task)();
                1
            }
            None => 0,
        };
    }

    let mut ran = 0;
    while ran < queued {
        // Never hold the loop borrowed while a task runs: tasks schedule more tasks.
        let Some(task) = pop_task() else { break };
        task();
        ran += 1;
    }
    ran
}

/// Drive the loop until it is idle or the configured task budget is spent.
///
/// Returns the number of tasks executed.
pub fn run() -> usize {
    let limit = config().max_tasks_per_run;
    let mut total = 0;
    while total < limit {
        let ran = turn();
        if ran == 0 {
            break;
        }
        total += ran;
    }
    tracing::debug!(tasks = total, "event loop run finished");
    total
}

/// Poll `future` to completion, running one event-loop turn between polls.
///
/// Fails with [`Error::Stalled`] if the loop goes idle while the future is
/// still pending.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let mut future = pin!(future);
    let mut cx = Context::from_waker(noop_waker_ref());
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return Ok(output);
        }
        if turn() == 0 {
            return Err(Error::Stalled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<u32>>>, impl Fn(u32) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let push = move |n: u32| {
            let l = Rc::clone(&l);
            Box::new(move || l.borrow_mut().push(n)) as Box<dyn FnOnce()>
        };
        (log, push)
    }

    #[test]
    fn test_tasks_run_in_fifo_order() {
        let (log, push) = recorder();
        schedule(push(1));
        schedule(push(2));
        schedule(push(3));
        assert!(log.borrow().is_empty());
        assert_eq!(run(), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert!(is_idle());
    }

    #[test]
    fn test_tasks_scheduled_during_a_turn_wait_for_the_next() {
        let (log, push) = recorder();
        let later = push(2);
        let first = push(1);
        schedule(move || {
            first();
            schedule(later);
        });
        assert_eq!(turn(), 1);
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(turn(), 1);
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert_eq!(turn(), 0);
    }

    #[test]
    fn test_timers_fire_by_due_time_then_registration() {
        let (log, push) = recorder();
        set_timeout(300, push(1));
        set_timeout(100, push(2));
        set_timeout(200, push(3));
        set_timeout(100, push(4));
        run();
        assert_eq!(*log.borrow(), vec![2, 4, 3, 1]);
        assert_eq!(now_ms(), 300);
    }

    #[test]
    fn test_tasks_drain_before_timers() {
        let (log, push) = recorder();
        set_timeout(0, push(1));
        schedule(push(2));
        run();
        assert_eq!(*log.borrow(), vec![2, 1]);
    }

    #[test]
    fn test_run_respects_task_budget() {
        fn forever() {
            schedule(forever);
        }
        configure(EventLoopConfig {
            max_tasks_per_run: 10,
        });
        schedule(forever);
        assert_eq!(run(), 10);
        assert!(!is_idle());
    }

    #[test]
    fn test_block_on_ready_future() {
        assert_eq!(block_on(async { 7 }), Ok(7));
    }

    #[test]
    fn test_block_on_reports_stall() {
        let result = block_on(std::future::pending::<()>());
        assert_eq!(result, Err(Error::Stalled));
    }
}

//! Single-assignment deferred values.
//!
//! Two variants share one vocabulary:
//!
//! - [`SyncDeferred`] settles and reacts immediately. Consuming it before it
//!   settled is a usage error that surfaces as an [`Error::Unsettled`] rejection.
//! - [`AsyncDeferred`] queues every continuation on the
//!   [event loop](crate::event_loop), so a handler never runs inside the call
//!   that attached it or the call that settled the source. Handlers may return
//!   another `AsyncDeferred`, whose outcome is then adopted.
//!
//! Both settle at most once: the first `resolve` or `reject` wins and every
//! later call is a no-op.
//!
//! The combinators [`all`], [`any`] and [`race`] fold a list of async deferred
//! values into one.

mod asynchronous;
mod combinators;
mod sync;

pub use asynchronous::{AsyncDeferred, DeferredFuture, Resolver};
pub use combinators::{all, any, race};
pub use sync::SyncDeferred;

use crate::error::{Error, Result};

/// Lifecycle of a deferred value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Not settled yet; an async deferred that is adopting another one is
    /// still pending.
    Pending,
    /// Settled with a value.
    Resolved,
    /// Settled with an error.
    Rejected,
}

/// What a handler wants the downstream deferred to become.
#[derive(Debug)]
pub enum Settlement<T> {
    /// Resolve with a value.
    Resolve(T),
    /// Reject with an error.
    Reject(Error),
    /// Follow another async deferred and settle the same way it does.
    Adopt(AsyncDeferred<T>),
}

impl<T> Settlement<T> {
    /// Returns `true` for [`Settlement::Adopt`].
    pub fn is_adopt(&self) -> bool {
        matches!(self, Settlement::Adopt(_))
    }
}

impl<T> From<Result<T>> for Settlement<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Settlement::Resolve(value),
            Err(err) => Settlement::Reject(err),
        }
    }
}

/// Anything a resolve or reject handler may return.
///
/// Implemented for [`Result`] (resolve or reject), [`AsyncDeferred`] (adopt)
/// and [`Settlement`] itself.
pub trait IntoSettlement {
    /// Type of the value the downstream deferred resolves with.
    type Value;

    fn into_settlement(self) -> Settlement<Self::Value>;
}

impl<T> IntoSettlement for Result<T> {
    type Value = T;

    fn into_settlement(self) -> Settlement<T> {
        Settlement::from(self)
    }
}

impl<T> IntoSettlement for AsyncDeferred<T> {
    type Value = T;

    fn into_settlement(self) -> Settlement<T> {
        Settlement::Adopt(self)
    }
}

impl<T> IntoSettlement for Settlement<T> {
    type Value = T;

    fn into_settlement(self) -> Settlement<T> {
        self
    }
}

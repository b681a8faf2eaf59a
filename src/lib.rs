//! # Defer-iter: Deferred Values and Lazy Pull Pipelines
//!
//! Single-assignment deferred values, and lazy iterator pipelines whose
//! elements are deferred values.
//!
//! ## Core Types
//!
//! - **[`SyncDeferred`]**: settles and reacts immediately
//! - **[`AsyncDeferred`]**: reacts on a later turn of the thread's [`event_loop`],
//!   adopting deferred values returned by its handlers
//! - **[`Iter`]**: a lazy sequence of [`Element`]s built from any [`Source`]
//!
//! ## Key Features
//!
//! - **Resolve-once**: the first `resolve` or `reject` wins, later calls are no-ops
//! - **Composable**: chain `.map()`, `.filter()`, `.reduce()`, `.flatten()`, `.cycle()`, `.catch()`
//! - **Error transparent**: rejected elements flow through stages without handlers
//! - **Deterministic**: async work runs on a single-threaded loop with a virtual clock
//!
//! ## Example
//!
//! ```
//! use defer_iter::*;
//!
//! // Double, keep the large ones, then sum
//! let sum = Iter::new(vec![1, 2, 3, 4])
//!     .map(|x| Ok(x * 2))
//!     .filter(|x| Ok(*x > 4))
//!     .reduce(|acc, x| Ok(acc + x), 0)
//!     .collect();
//! assert_eq!(sum.peek(), Some(Ok(vec![14])));
//!
//! // Handlers may hand back async work; the pipeline waits for it
//! let later = Iter::new(vec![1, 2])
//!     .map(|x| AsyncDeferred::resolved(x + 1))
//!     .collect();
//! assert_eq!(later.wait(), Ok(vec![2, 3]));
//! ```
//!
//! ## Common Functions
//!
//! **Deferred values:**
//! - [`AsyncDeferred::then`], [`AsyncDeferred::catch`], [`AsyncDeferred::finally`]
//! - [`all`], [`any`], [`race`] - combine several async deferred values
//!
//! **Execution:**
//! - [`Iter::iterate`] - visit every element, then complete
//! - [`Iter::to_array`] / [`Iter::collect`] - gather the resolved values
//! - [`event_loop::run`] - drain pending continuations

mod deferred;
mod drive;
mod error;
pub mod event_loop;
mod iter;
mod iteration;
pub mod prelude;
pub mod source;
mod stage;
mod trampoline;
mod value;

pub use deferred::*;
pub use error::*;
pub use iter::*;
pub use iteration::*;
pub use source::{Continuation, Nested, Pull, Source};
pub use stage::Reaction;
pub use value::*;

//! Commonly used imports
//!
//! Use `use defer_iter::prelude::*;` for quick access to the most common types and functions.

// Deferred values
pub use crate::{AsyncDeferred, Settlement, SyncDeferred};

// Combinators
pub use crate::{all, any, race};

// Pipelines
pub use crate::{Element, Iter, Iteration, Reaction, Source};

// Dynamic values
pub use crate::{Nested, Value};

// Errors
pub use crate::{Error, Result};

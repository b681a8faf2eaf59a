//! Error type shared by deferred values, sources and pipeline stages.

use std::{fmt, sync::Arc};

/// Reason a deferred value was rejected or a pipeline could not be built.
///
/// Errors are cheap to clone: a rejection is delivered to every continuation
/// attached to a deferred value, and `cycle` replays rejected elements.
#[derive(Clone, thiserror::Error)]
pub enum Error {
    /// A sync deferred was consumed before it was resolved or rejected.
    #[error("deferred is not resolved or rejected")]
    Unsettled,
    /// A dynamic value matched none of the recognised source shapes.
    #[error("cannot iterate over a value of kind `{kind}`")]
    NotIterable { kind: &'static str },
    /// An async deferred was asked to adopt its own outcome.
    #[error("a deferred cannot adopt itself")]
    SelfAdoption,
    /// The event loop ran out of work while the awaited value was still pending.
    #[error("event loop is idle but the deferred value is still pending")]
    Stalled,
    /// A caller supplied reason.
    #[error("{0}")]
    Message(String),
    /// A foreign error carried through the pipeline.
    #[error(transparent)]
    Custom(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Build a rejection reason from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Message(message.into())
    }

    /// Wrap a foreign error.
    pub fn custom<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Custom(Arc::new(err))
    }

    /// Returns the message of a [`Error::Message`] rejection.
    pub fn as_message(&self) -> Option<&str> {
        match self {
            Error::Message(m) => Some(m.as_str()),
            _ => None,
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unsettled => f.write_str("Unsettled"),
            Error::NotIterable { kind } => f.debug_struct("NotIterable").field("kind", kind).finish(),
            Error::SelfAdoption => f.write_str("SelfAdoption"),
            Error::Stalled => f.write_str("Stalled"),
            Error::Message(m) => f.debug_tuple("Message").field(m).finish(),
            Error::Custom(e) => f.debug_tuple("Custom").field(e).finish(),
        }
    }
}

// Custom errors compare by identity; the wrapped type need not be `PartialEq`.
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Unsettled, Error::Unsettled) => true,
            (Error::Stalled, Error::Stalled) => true,
            (Error::SelfAdoption, Error::SelfAdoption) => true,
            (Error::NotIterable { kind: a }, Error::NotIterable { kind: b }) => a == b,
            (Error::Message(a), Error::Message(b)) => a == b,
            (Error::Custom(a), Error::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Message(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Message(message.to_owned())
    }
}

/// Result type used by handlers and fallible constructors.
pub type Result<T, E = Error> = std::result::Result<T, E>;

use crate::{
    deferred::Status,
    error::{Error, Result},
};

/// A deferred value that settles and reacts immediately.
///
/// Handlers attached with [`attach`](SyncDeferred::attach) and its shorthands
/// run before the call returns. Attaching to a pending value is a usage error:
/// the value rejects itself with [`Error::Unsettled`] first, so the mistake
/// flows down the ordinary reject path instead of panicking.
///
/// ```rust
/// use defer_iter::SyncDeferred;
///
/// let mut d = SyncDeferred::new();
/// d.resolve(20);
/// let doubled = d.then(|v| Ok(v * 2));
/// assert_eq!(doubled.value(), Some(&40));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SyncDeferred<T> {
    state: State<T>,
}

#[derive(Debug, Clone, PartialEq)]
enum State<T> {
    Pending,
    Resolved(T),
    Rejected(Error),
}

impl<T> Default for SyncDeferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncDeferred<T> {
    /// Create a pending deferred.
    pub const fn new() -> Self {
        Self {
            state: State::Pending,
        }
    }

    /// Create a deferred already resolved with `value`.
    pub const fn resolved(value: T) -> Self {
        Self {
            state: State::Resolved(value),
        }
    }

    /// Create a deferred already rejected with `err`.
    pub const fn rejected(err: Error) -> Self {
        Self {
            state: State::Rejected(err),
        }
    }

    /// Resolve with `value`. Returns `false` if already settled.
    pub fn resolve(&mut self, value: T) -> bool {
        match self.state {
            State::Pending => {
                self.state = State::Resolved(value);
                true
            }
            _ => false,
        }
    }

    /// Reject with `err`. Returns `false` if already settled.
    pub fn reject(&mut self, err: Error) -> bool {
        match self.state {
            State::Pending => {
                self.state = State::Rejected(err);
                true
            }
            _ => false,
        }
    }

    pub fn status(&self) -> Status {
        match self.state {
            State::Pending => Status::Pending,
            State::Resolved(_) => Status::Resolved,
            State::Rejected(_) => Status::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, State::Pending)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, State::Resolved(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.state, State::Rejected(_))
    }

    /// The resolved value, if any.
    pub fn value(&self) -> Option<&T> {
        match &self.state {
            State::Resolved(v) => Some(v),
            _ => None,
        }
    }

    /// The rejection reason, if any.
    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            State::Rejected(e) => Some(e),
            _ => None,
        }
    }

    /// Convert into a `Result`; a pending value yields [`Error::Unsettled`].
    pub fn into_result(self) -> Result<T> {
        match self.state {
            State::Pending => Err(Error::Unsettled),
            State::Resolved(v) => Ok(v),
            State::Rejected(e) => Err(e),
        }
    }
}

impl<T: Clone> SyncDeferred<T> {
    /// React to the settled outcome and return a deferred carrying the result.
    ///
    /// `on_resolve` or `on_reject` runs depending on the outcome; an `Err` it
    /// returns rejects the downstream value. `on_settle` runs afterwards with
    /// the resolved value, or `None` on rejection.
    pub fn attach<U, R, G, H>(&mut self, on_resolve: R, on_reject: G, on_settle: H) -> SyncDeferred<U>
    where
        R: FnOnce(T) -> Result<U>,
        G: FnOnce(Error) -> Result<U>,
        H: FnOnce(Option<&T>),
    {
        let downstream = self.react(on_resolve, on_reject);
        on_settle(self.value());
        downstream
    }

    /// Transform a resolved value; rejections pass through.
    pub fn then<U, F>(&mut self, on_resolve: F) -> SyncDeferred<U>
    where
        F: FnOnce(T) -> Result<U>,
    {
        self.react(on_resolve, Err)
    }

    /// Recover from a rejection; resolved values pass through.
    pub fn catch<G>(&mut self, on_reject: G) -> SyncDeferred<T>
    where
        G: FnOnce(Error) -> Result<T>,
    {
        self.react(Ok, on_reject)
    }

    /// Observe the outcome without changing it.
    pub fn finally<H>(&mut self, on_settle: H) -> SyncDeferred<T>
    where
        H: FnOnce(Option<&T>),
    {
        self.attach(Ok, Err, on_settle)
    }

    fn react<U, R, G>(&mut self, on_resolve: R, on_reject: G) -> SyncDeferred<U>
    where
        R: FnOnce(T) -> Result<U>,
        G: FnOnce(Error) -> Result<U>,
    {
        if self.is_pending() {
            tracing::debug!("sync deferred consumed before it settled");
            self.reject(Error::Unsettled);
        }
        let outcome = match &self.state {
            State::Resolved(v) => on_resolve(v.clone()),
            State::Rejected(e) => on_reject(e.clone()),
            State::Pending => Err(Error::Unsettled),
        };
        SyncDeferred::from(outcome)
    }
}

impl<T> From<Result<T>> for SyncDeferred<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => SyncDeferred::resolved(v),
            Err(e) => SyncDeferred::rejected(e),
        }
    }
}

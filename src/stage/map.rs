use crate::{
    deferred::IntoSettlement,
    iter::Iter,
    source::{Continuation, Pull},
    stage::Reaction,
};

/// Rewraps each upstream element through a [`Reaction`].
struct Map<T, U> {
    upstream: Iter<T>,
    reaction: Reaction<T, U>,
}

impl<T, U> Pull<U> for Map<T, U>
where
    T: Clone + 'static,
    U: Clone + 'static,
{
    fn pull(&mut self, k: Continuation<U>) {
        let reaction = self.reaction.clone();
        self.upstream
            .pull(move |iteration| k(iteration.map_element(|e| reaction.apply(e))));
    }
}

impl<T: Clone + 'static> Iter<T> {
    /// Transform each resolved element; rejected elements pass through.
    ///
    /// `f` may return a `Result` or an [`AsyncDeferred`](crate::AsyncDeferred);
    /// an `Err` rejects that element only.
    pub fn map<U, F, S>(self, f: F) -> Iter<U>
    where
        U: Clone + 'static,
        F: Fn(T) -> S + 'static,
        S: IntoSettlement<Value = U>,
    {
        self.map_with(Reaction::resolve(f))
    }

    /// Transform each element with a full [`Reaction`].
    pub fn map_with<U>(self, reaction: Reaction<T, U>) -> Iter<U>
    where
        U: Clone + 'static,
    {
        Iter::from_pull(Map {
            upstream: self,
            reaction,
        })
    }
}

use crate::{
    deferred::IntoSettlement,
    iter::Iter,
    iteration::Iteration,
    source::{Continuation, Pull},
    stage::Reaction,
};

/// Forwards the upstream elements whose predicate resolves to `true`.
struct Filter<T> {
    upstream: Iter<T>,
    predicate: Reaction<T, bool>,
}

impl<T: Clone + 'static> Pull<T> for Filter<T> {
    fn pull(&mut self, k: Continuation<T>) {
        seek(self.upstream.share(), self.predicate.clone(), k);
    }
}

// Pulls until an element is accepted. A rejected verdict counts as `false`.
fn seek<T: Clone + 'static>(upstream: Iter<T>, predicate: Reaction<T, bool>, k: Continuation<T>) {
    let next = upstream.share();
    upstream.pull(move |iteration| match iteration {
        Iteration::Done => k(Iteration::Done),
        Iteration::Item(element) => {
            predicate
                .apply(element.clone())
                .observe(move |verdict| match verdict {
                    Ok(true) => k(Iteration::Item(element)),
                    _ => seek(next, predicate, k),
                });
        }
    });
}

impl<T: Clone + 'static> Iter<T> {
    /// Keep resolved elements for which `pred` returns `Ok(true)`.
    ///
    /// Rejected elements, and elements whose predicate fails, are dropped.
    pub fn filter<F, S>(self, pred: F) -> Iter<T>
    where
        F: Fn(&T) -> S + 'static,
        S: IntoSettlement<Value = bool>,
    {
        self.filter_with(Reaction::resolve(move |v: T| pred(&v)))
    }

    /// Keep elements whose [`Reaction`] resolves to `true`.
    ///
    /// With a reject handler, rejected elements can be kept as well; they are
    /// forwarded still rejected.
    pub fn filter_with(self, predicate: Reaction<T, bool>) -> Iter<T> {
        Iter::from_pull(Filter {
            upstream: self,
            predicate,
        })
    }
}

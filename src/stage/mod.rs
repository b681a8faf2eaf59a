//! Pipeline stages.
//!
//! Every stage is a [`Pull`](crate::Pull) implementation wrapping exactly one
//! upstream [`Iter`](crate::Iter) (or, for `flatten`, a stack of them). The
//! builder methods live next to each stage: [`Iter::map`](crate::Iter::map),
//! [`Iter::filter`](crate::Iter::filter), [`Iter::reduce`](crate::Iter::reduce),
//! [`Iter::flatten`](crate::Iter::flatten), [`Iter::cycle`](crate::Iter::cycle)
//! and [`Iter::catch`](crate::Iter::catch).
//!
//! Stages react to elements the way [`attach`](crate::AsyncDeferred::attach)
//! reacts to a deferred value: a rejected element passes through untouched
//! unless the stage was given a reject handler.

mod catch;
mod cycle;
mod filter;
mod flatten;
mod map;
mod reduce;

use std::rc::Rc;

use crate::{
    deferred::{IntoSettlement, Settlement},
    error::Error,
    iteration::Element,
};

type OnResolve<T, U> = Rc<dyn Fn(T) -> Settlement<U>>;
type OnReject<U> = Rc<dyn Fn(Error) -> Settlement<U>>;

/// A resolve handler and an optional reject handler, applied per element.
///
/// Handlers may return a `Result`, an [`AsyncDeferred`](crate::AsyncDeferred)
/// (adopted) or a [`Settlement`]. A missing reject handler forwards the
/// rejection; [`Reaction::reject`] forwards resolved values unchanged.
///
/// ```rust
/// use defer_iter::{Error, Iter, Reaction, Source};
///
/// let recovered = Iter::new(Source::generator(|| Err::<i32, _>(Error::msg("lost"))))
///     .map_with(Reaction::new(|x: i32| Ok(x * 2), |_| Ok(-1)))
///     .collect();
/// assert_eq!(recovered.peek(), Some(Ok(vec![-1])));
/// ```
pub struct Reaction<T, U> {
    on_resolve: OnResolve<T, U>,
    on_reject: Option<OnReject<U>>,
}

impl<T, U> Clone for Reaction<T, U> {
    fn clone(&self) -> Self {
        Self {
            on_resolve: Rc::clone(&self.on_resolve),
            on_reject: self.on_reject.clone(),
        }
    }
}

impl<T, U> Reaction<T, U> {
    /// React to resolved elements only.
    pub fn resolve<F, S>(f: F) -> Self
    where
        F: Fn(T) -> S + 'static,
        S: IntoSettlement<Value = U>,
    {
        Self {
            on_resolve: Rc::new(move |v| f(v).into_settlement()),
            on_reject: None,
        }
    }

    /// React to both outcomes.
    pub fn new<F, G, SF, SG>(f: F, g: G) -> Self
    where
        F: Fn(T) -> SF + 'static,
        G: Fn(Error) -> SG + 'static,
        SF: IntoSettlement<Value = U>,
        SG: IntoSettlement<Value = U>,
    {
        Self {
            on_resolve: Rc::new(move |v| f(v).into_settlement()),
            on_reject: Some(Rc::new(move |e| g(e).into_settlement())),
        }
    }
}

impl<T> Reaction<T, T> {
    /// React to rejected elements only.
    pub fn reject<G, S>(g: G) -> Self
    where
        T: 'static,
        G: Fn(Error) -> S + 'static,
        S: IntoSettlement<Value = T>,
    {
        Self {
            on_resolve: Rc::new(Settlement::Resolve),
            on_reject: Some(Rc::new(move |e| g(e).into_settlement())),
        }
    }
}

impl<T, U> Reaction<T, U>
where
    T: Clone + 'static,
    U: Clone + 'static,
{
    pub(crate) fn apply(&self, element: Element<T>) -> Element<U> {
        let on_resolve = Rc::clone(&self.on_resolve);
        let on_reject = self.on_reject.clone();
        element.attach(
            move |v| on_resolve(v),
            move |e| match on_reject {
                Some(g) => g(e),
                None => Settlement::Reject(e),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AsyncDeferred;

    #[test]
    fn test_missing_reject_handler_forwards() {
        let r = Reaction::resolve(|x: i32| Ok(x + 1));
        assert_eq!(r.apply(Element::rejected(Error::msg("e"))).peek(), Some(Err(Error::msg("e"))));
        assert_eq!(r.apply(Element::resolved(1)).peek(), Some(Ok(2)));
    }

    #[test]
    fn test_reject_only_forwards_values() {
        let r = Reaction::reject(|_| Ok(0));
        assert_eq!(r.apply(Element::resolved(5)).peek(), Some(Ok(5)));
        assert_eq!(r.apply(Element::rejected(Error::msg("e"))).peek(), Some(Ok(0)));
    }

    #[test]
    fn test_reject_handler_may_fail_again() {
        let r: Reaction<i32, i32> = Reaction::new(Ok, |e: Error| Err(Error::msg(format!("{e}!"))));
        assert_eq!(r.apply(Element::rejected(Error::msg("e"))).peek(), Some(Err(Error::msg("e!"))));
    }

    #[test]
    fn test_adopting_handler_makes_element_async() {
        let r = Reaction::resolve(|x: i32| AsyncDeferred::resolved(x));
        assert!(r.apply(Element::resolved(1)).is_async());
    }
}

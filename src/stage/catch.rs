use crate::{deferred::IntoSettlement, error::Error, iter::Iter, stage::Reaction};

impl<T: Clone + 'static> Iter<T> {
    /// Replace each rejected element with the outcome of `handler`.
    ///
    /// Resolved elements and `Done` pass through unchanged.
    pub fn catch<G, S>(self, handler: G) -> Iter<T>
    where
        G: Fn(Error) -> S + 'static,
        S: IntoSettlement<Value = T>,
    {
        self.map_with(Reaction::reject(handler))
    }

    /// Replace each rejected element with `T::default()`.
    pub fn catch_all(self) -> Iter<T>
    where
        T: Default,
    {
        self.catch(|err| {
            tracing::trace!(%err, "rejected element replaced by default");
            Ok(T::default())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{error::Error, AsyncDeferred, Iter, Source};

    fn failing() -> Iter<i32> {
        Iter::new(vec![1, 2, 3]).map(|x| if x == 2 { Err(Error::msg("two")) } else { Ok(x) })
    }

    #[test]
    fn test_catch_recovers_rejected_elements() {
        let out = failing().catch(|e| Ok(e.as_message().map_or(0, |m| m.len() as i32))).collect();
        assert_eq!(out.peek(), Some(Ok(vec![1, 3, 3])));
    }

    #[test]
    fn test_catch_all_uses_default() {
        assert_eq!(failing().catch_all().collect().peek(), Some(Ok(vec![1, 0, 3])));
    }

    #[test]
    fn test_catch_handler_may_adopt() {
        let out = Iter::new(Source::generator(|| Err::<i32, _>(Error::msg("x"))))
            .catch(|_| AsyncDeferred::resolved(8))
            .collect();
        assert_eq!(out.wait(), Ok(vec![8]));
    }
}

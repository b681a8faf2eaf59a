use std::{cell::RefCell, rc::Rc};

use either::Either;

use crate::{
    iter::Iter,
    iteration::Iteration,
    source::{Continuation, Nested, Pull},
};

/// Depth-first walk over nested sources, innermost iterator on top.
struct Flatten<T> {
    stack: Rc<RefCell<Vec<Iter<T>>>>,
}

impl<T> Pull<T> for Flatten<T>
where
    T: Nested + Clone + 'static,
{
    fn pull(&mut self, k: Continuation<T>) {
        descend(Rc::clone(&self.stack), k);
    }
}

fn descend<T>(stack: Rc<RefCell<Vec<Iter<T>>>>, k: Continuation<T>)
where
    T: Nested + Clone + 'static,
{
    let top = stack.borrow().last().map(Iter::share);
    let Some(top) = top else {
        return k(Iteration::Done);
    };
    top.pull(move |iteration| match iteration {
        Iteration::Done => {
            stack.borrow_mut().pop();
            descend(stack, k);
        }
        Iteration::Item(element) => element.observe(move |outcome| match outcome {
            Ok(value) => match value.into_source() {
                Either::Left(source) => {
                    tracing::trace!(kind = source.kind(), depth = stack.borrow().len(), "descending");
                    stack.borrow_mut().push(Iter::new(source));
                    descend(stack, k);
                }
                Either::Right(leaf) => k(Iteration::resolve(leaf)),
            },
            Err(err) => k(Iteration::reject(err)),
        }),
    });
}

impl<T> Iter<T>
where
    T: Nested + Clone + 'static,
{
    /// Replace every element that is itself a source with that source's
    /// elements, recursively.
    ///
    /// Rejected elements are forwarded as they are.
    pub fn flatten(self) -> Iter<T> {
        Iter::from_pull(Flatten {
            stack: Rc::new(RefCell::new(vec![self])),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{error::Error, AsyncDeferred, Iter, Source, Value};

    fn ints(values: Vec<Value>) -> Vec<i64> {
        values.iter().filter_map(Value::as_int).collect()
    }

    #[test]
    fn test_flatten_preserves_order() {
        let nested = vec![
            Value::from(1),
            Value::list([Value::from(2), Value::list([Value::from(3), Value::from(4)])]),
            Value::list::<[Value; 0]>([]),
            Value::from(5),
        ];
        let out = Iter::new(nested).flatten().collect();
        assert_eq!(out.peek().map(|r| r.map(ints)), Some(Ok(vec![1, 2, 3, 4, 5])));
    }

    #[test]
    fn test_flatten_descends_into_maps() {
        let nested = vec![Value::map([("a", Value::from(1)), ("b", Value::list([Value::from(2)]))])];
        let out = Iter::new(nested).flatten().collect();
        assert_eq!(out.peek().map(|r| r.map(ints)), Some(Ok(vec![1, 2])));
    }

    #[test]
    fn test_strings_and_null_are_leaves() {
        let nested = vec![Value::from("ab"), Value::Null];
        let out = Iter::new(nested.clone()).flatten().collect();
        assert_eq!(out.peek(), Some(Ok(nested)));
    }

    #[test]
    fn test_rejected_elements_forwarded() {
        let settled = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let s = std::rc::Rc::clone(&settled);
        Iter::new(Source::generator(|| Err::<Value, _>(Error::msg("inner"))))
            .flatten()
            .iterate_settled(move |r| s.borrow_mut().push(r), || {});
        assert_eq!(*settled.borrow(), vec![Err(Error::msg("inner"))]);
    }

    #[test]
    fn test_flatten_async_elements() {
        let out = Iter::new(vec![1, 2])
            .map(|x: i64| AsyncDeferred::resolved(Value::list([Value::from(x), Value::from(x * 10)])))
            .flatten()
            .collect();
        assert_eq!(out.wait().map(ints), Ok(vec![1, 10, 2, 20]));
    }
}

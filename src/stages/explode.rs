//! Flat-map stage: one item expands into zero or more items.

use std::sync::Arc;

use crate::stages::Operator;

/// Replaces every item with the elements of `transform(item)`, preserving their
/// order. An empty expansion drops the item entirely.
pub(crate) struct ExplodeOperator<F> {
    transform: Arc<F>,
}

impl<F> ExplodeOperator<F> {
    pub(crate) fn new(transform: Arc<F>) -> Self {
        Self { transform }
    }
}

impl<I, O, It, F> Operator<I> for ExplodeOperator<F>
where
    I: Send + 'static,
    O: Send + 'static,
    It: IntoIterator<Item = O>,
    F: Fn(I) -> It + Send + Sync + 'static,
{
    type Output = O;

    fn apply(&mut self, item: I, out: &mut Vec<O>) {
        out.extend((self.transform)(item));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_preserves_element_order() {
        let mut operator = ExplodeOperator::new(Arc::new(|x: i32| vec![x, x * 10]));
        let mut out = Vec::new();

        operator.apply(1, &mut out);
        operator.apply(2, &mut out);
        assert_eq!(out, vec![1, 10, 2, 20]);
    }

    #[test]
    fn empty_expansion_drops_the_item() {
        let mut operator = ExplodeOperator::new(Arc::new(|x: i32| {
            if x % 2 == 0 { vec![x] } else { vec![] }
        }));
        let mut out = Vec::new();

        operator.apply(1, &mut out);
        operator.apply(2, &mut out);
        operator.apply(3, &mut out);
        assert_eq!(out, vec![2]);
    }
}

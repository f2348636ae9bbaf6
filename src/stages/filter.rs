//! Predicate stage: items are forwarded unchanged or dropped.

use std::sync::Arc;

use crate::stages::Operator;

/// Forwards an item unchanged exactly when `predicate(&item)` holds.
pub(crate) struct FilterOperator<F> {
    predicate: Arc<F>,
}

impl<F> FilterOperator<F> {
    pub(crate) fn new(predicate: Arc<F>) -> Self {
        Self { predicate }
    }
}

impl<I, F> Operator<I> for FilterOperator<F>
where
    I: Send + 'static,
    F: Fn(&I) -> bool + Send + Sync + 'static,
{
    type Output = I;

    fn apply(&mut self, item: I, out: &mut Vec<I>) {
        if (self.predicate)(&item) {
            out.push(item);
        }
    }
}

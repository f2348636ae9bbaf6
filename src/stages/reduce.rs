//! Folding stage: the whole input collapses into one accumulator.

use std::sync::Arc;

use crate::stages::Operator;

/// Folds every item into an accumulator seeded at construction and emits the final
/// accumulator exactly once, at flush. An empty input yields the seed itself.
pub(crate) struct ReduceOperator<A, F> {
    accumulator: Option<A>,
    reducer: Arc<F>,
}

impl<A, F> ReduceOperator<A, F> {
    pub(crate) fn new(seed: A, reducer: Arc<F>) -> Self {
        Self {
            accumulator: Some(seed),
            reducer,
        }
    }
}

impl<I, A, F> Operator<I> for ReduceOperator<A, F>
where
    I: Send + 'static,
    A: Send + 'static,
    F: Fn(I, A) -> A + Send + Sync + 'static,
{
    type Output = A;

    fn apply(&mut self, item: I, _out: &mut Vec<A>) {
        if let Some(accumulator) = self.accumulator.take() {
            self.accumulator = Some((self.reducer)(item, accumulator));
        }
    }

    fn flush(&mut self, out: &mut Vec<A>) {
        if let Some(accumulator) = self.accumulator.take() {
            out.push(accumulator);
        }
    }
}

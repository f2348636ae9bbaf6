//! One-to-one mapping stages, stateless and stateful.

use std::sync::Arc;

use crate::stages::{Operator, Processor};

/// Stateless mapping: every item is replaced by `transform(item)`.
///
/// The transform is shared by all siblings of the stage, so it must be callable
/// concurrently.
pub(crate) struct MapOperator<F> {
    transform: Arc<F>,
}

impl<F> MapOperator<F> {
    pub(crate) fn new(transform: Arc<F>) -> Self {
        Self { transform }
    }
}

impl<I, O, F> Operator<I> for MapOperator<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> O + Send + Sync + 'static,
{
    type Output = O;

    fn apply(&mut self, item: I, out: &mut Vec<O>) {
        out.push((self.transform)(item));
    }
}

/// Stateful mapping: items are run through a per-worker [`Processor`] value.
///
/// The processor is constructed on the worker itself and never shared; its
/// [`close`](Processor::close) hook fires at flush time, before the worker joins the
/// fan-in countdown.
pub(crate) struct StatefulMapOperator<P> {
    processor: P,
}

impl<P> StatefulMapOperator<P> {
    pub(crate) fn new(processor: P) -> Self {
        Self { processor }
    }
}

impl<I, P> Operator<I> for StatefulMapOperator<P>
where
    I: Send + 'static,
    P: Processor<I>,
{
    type Output = P::Output;

    fn apply(&mut self, item: I, out: &mut Vec<P::Output>) {
        out.push(self.processor.process(item));
    }

    fn flush(&mut self, _out: &mut Vec<P::Output>) {
        self.processor.close();
    }
}

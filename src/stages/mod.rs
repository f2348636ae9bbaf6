//! Transformation stages and the worker loop they all share.
//!
//! A stage sits between two queues and is run by one or more sibling workers. Every
//! variant follows the same uniform flat-map contract, expressed by [`Operator`]:
//! applying the transform to one item produces zero, one, or many downstream items
//! (map produces exactly one, filter zero-or-one, explode zero-or-more, batching
//! zero-or-one per closed window, reduce nothing until flush).
//!
//! The worker loop itself lives in [`StageWorker`]: drain the upstream queue with
//! timeout-bounded `get`s, forward whatever the operator produces with
//! retry-until-accepted `put`s, and exit once the upstream is finished. The final
//! arrive-and-shutdown step is owned by [`StageCompletion`], a drop guard, so the
//! countdown completes even when a user-supplied transform panics — the downstream
//! queue is still shut down and the pipeline keeps draining instead of hanging.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::concurrency::fan_in::FanInCounter;
use crate::concurrency::queue::{GetError, SignalQueue, put_until_accepted};

pub(crate) mod batch;
pub(crate) mod explode;
pub(crate) mod filter;
pub(crate) mod map;
pub(crate) mod reduce;

/// Per-worker transformation state of a stateful mapping stage.
///
/// One value is built per worker, at worker start, by the factory handed to
/// [`stateful_map`](crate::pipeline::Pipeline::stateful_map). The value is exclusively
/// owned by its worker for the worker's whole lifetime, so `process` can mutate freely
/// without synchronization. When the worker has drained its upstream, [`close`] is
/// invoked once, before the worker takes part in the fan-in countdown.
///
/// [`close`]: Processor::close
pub trait Processor<I>: Send + 'static {
    /// The item type this processor emits.
    type Output: Send + 'static;

    /// Transforms one item.
    fn process(&mut self, item: I) -> Self::Output;

    /// Teardown hook, called once when the owning worker observes upstream finished.
    fn close(&mut self) {}
}

/// Uniform flat-map contract implemented by every stage variant.
pub(crate) trait Operator<I>: Send + 'static {
    /// The item type this operator emits downstream.
    type Output: Send + 'static;

    /// Applies the transform to one item, pushing produced items into `out`.
    fn apply(&mut self, item: I, out: &mut Vec<Self::Output>);

    /// Timer hook, called once per worker loop iteration regardless of item arrival.
    fn tick(&mut self, _out: &mut Vec<Self::Output>) {}

    /// Final emission, called once when the upstream queue is finished.
    fn flush(&mut self, _out: &mut Vec<Self::Output>) {}
}

/// Drop guard performing a worker's arrive-and-shutdown step.
///
/// Runs during unwind as well, so a panicking worker still participates in the
/// countdown and the downstream queue cannot be left open by a failed sibling.
pub(crate) struct StageCompletion<T: Send> {
    counter: FanInCounter,
    downstream: Arc<SignalQueue<T>>,
}

impl<T: Send> StageCompletion<T> {
    pub(crate) fn new(counter: FanInCounter, downstream: Arc<SignalQueue<T>>) -> Self {
        Self {
            counter,
            downstream,
        }
    }
}

impl<T: Send> Drop for StageCompletion<T> {
    fn drop(&mut self) {
        if self.counter.arrive() {
            self.downstream.shutdown();
        }
    }
}

/// One worker of one stage: the generic loop shared by every variant.
pub(crate) struct StageWorker<I, P>
where
    I: Send + 'static,
    P: Operator<I>,
{
    operator: P,
    upstream: Arc<SignalQueue<I>>,
    downstream: Arc<SignalQueue<P::Output>>,
    completion: StageCompletion<P::Output>,
    poll_interval: Duration,
}

impl<I, P> StageWorker<I, P>
where
    I: Send + 'static,
    P: Operator<I>,
{
    pub(crate) fn new(
        operator: P,
        upstream: Arc<SignalQueue<I>>,
        downstream: Arc<SignalQueue<P::Output>>,
        completion: StageCompletion<P::Output>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            operator,
            upstream,
            downstream,
            completion,
            poll_interval,
        }
    }

    /// Runs the worker until the upstream queue is finished, then flushes.
    pub(crate) async fn run(mut self) {
        debug!("stage worker started");

        let mut produced = Vec::new();

        loop {
            match self.upstream.get(self.poll_interval).await {
                Ok(item) => {
                    self.operator.apply(item, &mut produced);
                    self.forward(&mut produced).await;
                }
                Err(GetError::Empty) => {
                    if self.upstream.is_finished() {
                        break;
                    }
                    trace!("upstream idle, retrying");
                }
                Err(GetError::Finished) => break,
            }

            self.operator.tick(&mut produced);
            self.forward(&mut produced).await;
        }

        self.operator.flush(&mut produced);
        self.forward(&mut produced).await;

        debug!("stage worker finished");
        // The completion guard drops here, decrementing the fan-in counter; the last
        // sibling to arrive shuts down the downstream queue.
        drop(self.completion);
    }

    async fn forward(&mut self, produced: &mut Vec<P::Output>) {
        for item in produced.drain(..) {
            put_until_accepted(&self.downstream, item, self.poll_interval).await;
        }
    }
}

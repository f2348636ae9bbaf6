//! Terminal polling: draining one or more finished pipelines.

use tracing::debug;

use crate::concurrency::queue::GetError;
use crate::error::FlowResult;
use crate::pipeline::{RunningPipeline, reap_workers};

/// Polls a set of terminal pipeline handles until every one is fully drained.
///
/// The collector keeps one slot per tracked handle and round-robins a short
/// timeout-bounded `get` over the still-active ones, appending to that slot's ordered
/// result list when collecting and ignoring timeouts. A slot goes inactive once its
/// queue reports finished; the wait returns when no active slot remains, after the
/// worker tasks of every tracked pipeline have been reaped.
///
/// Draining is not optional: terminal workers block on a full terminal queue, so
/// even a completion-only wait consumes items (and discards them).
pub struct Collector<T: Send + 'static> {
    slots: Vec<CollectorSlot<T>>,
}

struct CollectorSlot<T: Send + 'static> {
    pipeline: RunningPipeline<T>,
    items: Vec<T>,
    active: bool,
}

impl<T: Send + 'static> Collector<T> {
    /// Creates a collector tracking no pipelines yet.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Registers a started pipeline to be drained by the next wait call.
    pub fn track(&mut self, pipeline: RunningPipeline<T>) {
        self.slots.push(CollectorSlot {
            pipeline,
            items: Vec::new(),
            active: true,
        });
    }

    /// Drains every tracked pipeline to completion, discarding emitted items.
    pub async fn wait_for_completion(self) -> FlowResult<()> {
        self.drain(false).await?;
        Ok(())
    }

    /// Drains every tracked pipeline to completion, returning one ordered item list
    /// per tracked handle, in tracking order.
    pub async fn wait_for_results(self) -> FlowResult<Vec<Vec<T>>> {
        self.drain(true).await
    }

    async fn drain(mut self, collect: bool) -> FlowResult<Vec<Vec<T>>> {
        let mut active = self.slots.len();
        debug!(pipelines = active, "draining terminal queues");

        while active > 0 {
            for slot in self.slots.iter_mut().filter(|slot| slot.active) {
                match slot.pipeline.queue.get(slot.pipeline.poll_interval).await {
                    Ok(item) => {
                        if collect {
                            slot.items.push(item);
                        }
                    }
                    Err(GetError::Empty) => {}
                    Err(GetError::Finished) => {
                        slot.active = false;
                        active -= 1;
                    }
                }
            }
        }

        debug!("terminal queues drained, reaping workers");

        let mut errors = Vec::new();
        let mut results = Vec::with_capacity(self.slots.len());

        for slot in self.slots {
            if let Err(err) = reap_workers(slot.pipeline.workers).await {
                errors.push(err);
            }
            results.push(slot.items);
        }

        if errors.is_empty() {
            Ok(results)
        } else {
            Err(errors.into())
        }
    }
}

impl<T: Send + 'static> Default for Collector<T> {
    fn default() -> Self {
        Self::new()
    }
}

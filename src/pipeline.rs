//! Pipeline composition: chaining stages as data, then spawning the graph.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{Instrument, debug, info_span};

use crate::bail;
use crate::collector::Collector;
use crate::concurrency::fan_in::FanInCounter;
use crate::concurrency::queue::{SignalQueue, put_until_accepted};
use crate::config::PipelineConfig;
use crate::error::{ErrorKind, FlowResult};
use crate::flow_error;
use crate::stages::batch::{CountBatchOperator, TimeBatchOperator};
use crate::stages::explode::ExplodeOperator;
use crate::stages::filter::FilterOperator;
use crate::stages::map::{MapOperator, StatefulMapOperator};
use crate::stages::reduce::ReduceOperator;
use crate::stages::{Operator, Processor, StageCompletion, StageWorker};

/// Deferred build step of one pipeline: invoked by [`Pipeline::start`], it spawns the
/// upstream chain into the given task set and returns the chain's terminal queue.
type BuildStage<T> = Box<dyn FnOnce(&mut JoinSet<()>) -> Arc<SignalQueue<T>> + Send>;

/// Fluent composition root for a linear pipeline graph.
///
/// A [`Pipeline<T>`] describes a chain of stages whose terminal edge carries items of
/// type `T`. Chaining calls are pure: they validate their arguments, compose the
/// stage graph as data, and return a new handle. Nothing runs until
/// [`start`](Pipeline::start) spawns every feeder and worker task, which makes
/// construction side-effect free and bootstrap failures observable at a single point.
///
/// Items flow source → queue → stage pool → queue → … → terminal queue. Every edge is
/// a bounded [`SignalQueue`], so a slow stage throttles everything upstream of it, and
/// "no more items" cascades from the source to the terminal edge one
/// drain-and-shutdown step at a time.
pub struct Pipeline<T: Send + 'static> {
    config: Arc<PipelineConfig>,
    build: BuildStage<T>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Creates a pipeline fed by a finite sequence.
    ///
    /// On [`start`](Pipeline::start), a feeder task puts every element with the
    /// retry-until-accepted discipline, waits for its queue to drain after the source
    /// is exhausted, and then shuts the queue down, which begins the end-to-end
    /// shutdown cascade.
    pub fn from_iter<I>(source: I, config: PipelineConfig) -> FlowResult<Self>
    where
        I: IntoIterator<Item = T> + Send + 'static,
        I::IntoIter: Send + 'static,
    {
        let config = validated(config)?;
        let cfg = Arc::clone(&config);

        let build: BuildStage<T> = Box::new(move |workers| {
            let queue = Arc::new(SignalQueue::new(cfg.queue_capacity));
            let feeder_queue = Arc::clone(&queue);
            let poll_interval = cfg.poll_interval();

            workers.spawn(
                feed_source(source, feeder_queue, poll_interval).instrument(info_span!("feeder")),
            );

            queue
        });

        Ok(Self { config, build })
    }

    /// Creates a pipeline fed by an externally owned queue.
    ///
    /// The external producer keeps the other reference to `queue`: it enqueues items
    /// at its own pace and must call [`SignalQueue::shutdown`] once it is done, since
    /// no feeder task exists to do so.
    pub fn from_queue(queue: Arc<SignalQueue<T>>, config: PipelineConfig) -> FlowResult<Self> {
        let config = validated(config)?;
        let build: BuildStage<T> = Box::new(move |_workers| queue);

        Ok(Self { config, build })
    }

    /// Appends a mapping stage running `transform` on `parallelism` workers.
    ///
    /// With one worker the stage preserves input order; with more, items are
    /// load-balanced across siblings and ordering is not preserved.
    pub fn map<O, F>(self, transform: F, parallelism: usize) -> FlowResult<Pipeline<O>>
    where
        O: Send + 'static,
        F: Fn(T) -> O + Send + Sync + 'static,
    {
        ensure_parallelism(parallelism)?;

        let transform = Arc::new(transform);
        Ok(self.stage("map", parallelism, move || {
            MapOperator::new(Arc::clone(&transform))
        }))
    }

    /// Appends a stateful mapping stage running `parallelism` workers.
    ///
    /// Each worker builds its own [`Processor`] by calling `factory` at worker start
    /// and owns it exclusively until the processor's close hook fires at flush time.
    pub fn stateful_map<P, M>(self, factory: M, parallelism: usize) -> FlowResult<Pipeline<P::Output>>
    where
        P: Processor<T>,
        M: Fn() -> P + Send + Sync + 'static,
    {
        ensure_parallelism(parallelism)?;

        Ok(self.stage("stateful_map", parallelism, move || {
            StatefulMapOperator::new(factory())
        }))
    }

    /// Appends a flat-map stage: every item expands into the elements of
    /// `transform(item)`, in order, possibly none.
    pub fn explode<O, It, F>(self, transform: F) -> FlowResult<Pipeline<O>>
    where
        O: Send + 'static,
        It: IntoIterator<Item = O>,
        F: Fn(T) -> It + Send + Sync + 'static,
    {
        Ok(self.stage_single("explode", ExplodeOperator::new(Arc::new(transform))))
    }

    /// Appends a filtering stage: items are forwarded unchanged exactly when
    /// `predicate` holds.
    pub fn filter<F>(self, predicate: F) -> FlowResult<Pipeline<T>>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Ok(self.stage_single("filter", FilterOperator::new(Arc::new(predicate))))
    }

    /// Appends a counting window stage: items are grouped into lists of `size` in
    /// arrival order. A final partial window is kept only when `keep_incomplete` is
    /// set.
    pub fn batch(self, size: usize, keep_incomplete: bool) -> FlowResult<Pipeline<Vec<T>>> {
        if size == 0 {
            bail!(
                ErrorKind::ConfigError,
                "Invalid batch size",
                "batch size must be at least 1"
            );
        }

        Ok(self.stage("batch", 1, move || {
            CountBatchOperator::new(size, keep_incomplete)
        }))
    }

    /// Appends a timed window stage: the buffer is emitted as one list every time
    /// `interval` elapses with items buffered, and unconditionally at flush.
    ///
    /// The timer's effective resolution is bounded by the pipeline's poll interval.
    pub fn time_batch(self, interval: Duration) -> FlowResult<Pipeline<Vec<T>>> {
        if interval.is_zero() {
            bail!(
                ErrorKind::ConfigError,
                "Invalid time batch interval",
                "interval must be non-zero"
            );
        }

        Ok(self.stage("time_batch", 1, move || TimeBatchOperator::new(interval)))
    }

    /// Appends a folding stage: every item is folded into the accumulator via
    /// `reducer(item, accumulator)`, and the final accumulator is emitted exactly
    /// once when the input is exhausted. An empty input yields `seed`.
    pub fn reduce<A, F>(self, seed: A, reducer: F) -> FlowResult<Pipeline<A>>
    where
        A: Send + 'static,
        F: Fn(T, A) -> A + Send + Sync + 'static,
    {
        Ok(self.stage_single("reduce", ReduceOperator::new(seed, Arc::new(reducer))))
    }

    /// Spawns every feeder and worker task of the graph.
    ///
    /// Must be called from within a Tokio runtime. Returns the handle used to drain
    /// the terminal queue and reap the workers.
    pub fn start(self) -> RunningPipeline<T> {
        let mut workers = JoinSet::new();
        let queue = (self.build)(&mut workers);

        debug!(workers = workers.len(), "pipeline started");

        RunningPipeline {
            queue,
            workers,
            poll_interval: self.config.poll_interval(),
        }
    }

    /// Starts the pipeline and drains it to completion, discarding emitted items.
    pub async fn wait_for_completion(self) -> FlowResult<()> {
        self.start().wait_for_completion().await
    }

    /// Starts the pipeline and drains it to completion, returning the ordered list of
    /// items emitted by the terminal stage.
    pub async fn wait_for_result(self) -> FlowResult<Vec<T>> {
        self.start().wait_for_result().await
    }

    /// Appends a folding stage and waits for its single emitted value.
    pub async fn wait_and_reduce<A, F>(self, seed: A, reducer: F) -> FlowResult<A>
    where
        A: Send + 'static,
        F: Fn(T, A) -> A + Send + Sync + 'static,
    {
        let mut values = self.reduce(seed, reducer)?.wait_for_result().await?;

        let Some(value) = values.pop() else {
            bail!(ErrorKind::InvalidState, "Reduce stage emitted no value");
        };
        if !values.is_empty() {
            bail!(
                ErrorKind::InvalidState,
                "Reduce stage emitted more than one value",
                format!("got {} values", values.len() + 1)
            );
        }

        Ok(value)
    }

    /// Appends a multi-worker stage whose operators are built per worker by `make`.
    fn stage<O, P, M>(self, name: &'static str, parallelism: usize, make: M) -> Pipeline<O>
    where
        O: Send + 'static,
        P: Operator<T, Output = O>,
        M: Fn() -> P + Send + Sync + 'static,
    {
        let config = Arc::clone(&self.config);
        let cfg = Arc::clone(&config);
        let build_upstream = self.build;
        let make = Arc::new(make);

        let build: BuildStage<O> = Box::new(move |workers| {
            let upstream = build_upstream(workers);
            let downstream = Arc::new(SignalQueue::new(cfg.queue_capacity));
            let counter = FanInCounter::new(parallelism);

            for worker_id in 0..parallelism {
                let make = Arc::clone(&make);
                let upstream = Arc::clone(&upstream);
                let worker_downstream = Arc::clone(&downstream);
                let completion = StageCompletion::new(counter.clone(), Arc::clone(&downstream));
                let poll_interval = cfg.poll_interval();
                let span = info_span!("stage_worker", stage = name, worker_id);

                workers.spawn(
                    async move {
                        // The operator is built on the worker itself, so per-worker
                        // state never crosses task boundaries.
                        StageWorker::new(
                            make(),
                            upstream,
                            worker_downstream,
                            completion,
                            poll_interval,
                        )
                        .run()
                        .await;
                    }
                    .instrument(span),
                );
            }

            downstream
        });

        Pipeline { config, build }
    }

    /// Appends a single-worker stage around an already-built operator.
    fn stage_single<O, P>(self, name: &'static str, operator: P) -> Pipeline<O>
    where
        O: Send + 'static,
        P: Operator<T, Output = O>,
    {
        let config = Arc::clone(&self.config);
        let cfg = Arc::clone(&config);
        let build_upstream = self.build;

        let build: BuildStage<O> = Box::new(move |workers| {
            let upstream = build_upstream(workers);
            let downstream = Arc::new(SignalQueue::new(cfg.queue_capacity));
            let completion =
                StageCompletion::new(FanInCounter::new(1), Arc::clone(&downstream));
            let worker_downstream = Arc::clone(&downstream);
            let poll_interval = cfg.poll_interval();
            let span = info_span!("stage_worker", stage = name, worker_id = 0);

            workers.spawn(
                async move {
                    StageWorker::new(operator, upstream, worker_downstream, completion, poll_interval)
                        .run()
                        .await;
                }
                .instrument(span),
            );

            downstream
        });

        Pipeline { config, build }
    }
}

impl<T: Send + 'static> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A started pipeline: the terminal queue plus the tasks that feed it.
pub struct RunningPipeline<T: Send + 'static> {
    pub(crate) queue: Arc<SignalQueue<T>>,
    pub(crate) workers: JoinSet<()>,
    pub(crate) poll_interval: Duration,
}

impl<T: Send + 'static> RunningPipeline<T> {
    /// Drains the pipeline to completion, discarding emitted items.
    pub async fn wait_for_completion(self) -> FlowResult<()> {
        let mut collector = Collector::new();
        collector.track(self);
        collector.wait_for_completion().await
    }

    /// Drains the pipeline to completion, returning the ordered list of items emitted
    /// by the terminal stage.
    pub async fn wait_for_result(self) -> FlowResult<Vec<T>> {
        let mut collector = Collector::new();
        collector.track(self);
        let mut lists = collector.wait_for_results().await?;
        Ok(lists.pop().unwrap_or_default())
    }
}

impl<T: Send + 'static> fmt::Debug for RunningPipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningPipeline")
            .field("queue", &self.queue)
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

/// Feeds a finite source into the bootstrap queue of a pipeline.
async fn feed_source<T, I>(source: I, queue: Arc<SignalQueue<T>>, poll_interval: Duration)
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
{
    // The guard signals shutdown when this future ends, unwinding included, so a
    // panicking source iterator cannot leave the graph waiting forever.
    let _completion = StageCompletion::new(FanInCounter::new(1), Arc::clone(&queue));

    let mut fed = 0usize;
    for item in source {
        put_until_accepted(&queue, item, poll_interval).await;
        fed += 1;
    }

    debug!(items = fed, "source exhausted, waiting for the queue to drain");

    while !queue.is_empty() {
        sleep(poll_interval).await;
    }
}

/// Reaps every task of a drained pipeline, converting panics into errors.
///
/// Any task still running once the terminal queue has drained is a stuck producer of
/// a failed graph; it is aborted so reaping cannot hang. Cancellations are expected
/// during that cleanup and are not reported as failures.
pub(crate) async fn reap_workers(mut workers: JoinSet<()>) -> FlowResult<()> {
    workers.abort_all();

    let mut errors = Vec::new();
    while let Some(result) = workers.join_next().await {
        match result {
            Ok(()) => {}
            Err(join_err) if join_err.is_cancelled() => {
                debug!("pipeline worker task was cancelled");
            }
            Err(join_err) => {
                errors.push(flow_error!(
                    ErrorKind::WorkerPanic,
                    "Pipeline worker panicked",
                    join_err
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}

fn validated(config: PipelineConfig) -> FlowResult<Arc<PipelineConfig>> {
    config.validate().map_err(|err| {
        flow_error!(
            ErrorKind::ConfigError,
            "Invalid pipeline configuration",
            source: err
        )
    })?;

    Ok(Arc::new(config))
}

fn ensure_parallelism(parallelism: usize) -> FlowResult<()> {
    if parallelism == 0 {
        bail!(
            ErrorKind::ConfigError,
            "Invalid stage parallelism",
            "parallelism must be at least 1"
        );
    }

    Ok(())
}

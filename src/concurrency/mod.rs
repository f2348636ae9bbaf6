//! Concurrency primitives connecting the stages of a pipeline.
//!
//! This module provides the two shared-state building blocks of the engine: the
//! bounded, shutdown-aware queues that form the edges of a pipeline graph, and the
//! atomic countdown that lets the sibling workers of one parallel stage agree on who
//! performs the final shutdown step.
//!
//! # Coordination Patterns
//!
//! ## Cascading Shutdown
//!
//! Every queue carries an explicit, idempotent shutdown flag next to its buffer.
//! A producer that is done signals shutdown on its downstream queue; consumers keep
//! draining until the queue is both shut down and empty, then perform their own final
//! emission and signal their downstream in turn. "Finished" therefore travels through
//! the graph one drain-and-signal step at a time, without any central coordinator.
//!
//! ## Timeout-Bounded Blocking
//!
//! `put` and `get` block at most for a caller-supplied timeout and are always wrapped
//! in caller retry loops. A worker never parks indefinitely: every timeout expiry is
//! an opportunity to re-check the shutdown condition, which is the sole mechanism by
//! which shutdown propagates. The internal wakeup notifications are best-effort
//! accelerators on top of that discipline, not a correctness requirement.
//!
//! ## Backpressure
//!
//! Queues are capacity-bounded. A producer whose `put` keeps timing out on a full
//! queue simply retries, which throttles every upstream stage to the pace of the
//! slowest consumer.

pub mod fan_in;
pub mod queue;

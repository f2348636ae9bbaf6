//! Atomic countdown shared by the sibling workers of one parallel stage.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Countdown that lets the siblings of one stage agree on who finished last.
///
/// The counter starts at the sibling count and is only ever decremented, one
/// [`arrive`](FanInCounter::arrive) call per sibling. The sibling that observes the
/// count reach zero is the one responsible for shutting down the stage's downstream
/// queue. A single atomic decrement decides the winner, so two siblings finishing
/// simultaneously cannot both (or neither) claim the final step.
#[derive(Clone, Debug)]
pub struct FanInCounter {
    remaining: Arc<AtomicUsize>,
}

impl FanInCounter {
    /// Creates a countdown for a stage with `siblings` workers.
    pub fn new(siblings: usize) -> Self {
        Self {
            remaining: Arc::new(AtomicUsize::new(siblings)),
        }
    }

    /// Records that one sibling has finished.
    ///
    /// Returns `true` exactly once, for the last sibling to arrive. Each sibling must
    /// call this exactly once.
    pub fn arrive(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Returns the number of siblings that have not arrived yet.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}

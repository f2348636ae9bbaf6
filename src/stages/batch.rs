//! Windowing stages: group items into lists by count or by time.

use std::mem;
use std::time::Duration;

use tokio::time::Instant;

use crate::stages::Operator;

/// Buffers items in arrival order and emits the buffer as one list every time it
/// reaches `size`. At flush, a remaining partial window is emitted only when
/// `keep_incomplete` is set.
pub(crate) struct CountBatchOperator<T> {
    size: usize,
    keep_incomplete: bool,
    buffer: Vec<T>,
}

impl<T> CountBatchOperator<T> {
    pub(crate) fn new(size: usize, keep_incomplete: bool) -> Self {
        Self {
            size,
            keep_incomplete,
            buffer: Vec::new(),
        }
    }
}

impl<T: Send + 'static> Operator<T> for CountBatchOperator<T> {
    type Output = Vec<T>;

    fn apply(&mut self, item: T, out: &mut Vec<Vec<T>>) {
        if self.buffer.is_empty() {
            self.buffer.reserve_exact(self.size);
        }

        self.buffer.push(item);

        if self.buffer.len() >= self.size {
            out.push(mem::take(&mut self.buffer));
        }
    }

    fn flush(&mut self, out: &mut Vec<Vec<T>>) {
        if !self.buffer.is_empty() && self.keep_incomplete {
            out.push(mem::take(&mut self.buffer));
        }
    }
}

/// Buffers items in arrival order and emits the buffer as one list whenever the
/// interval timer fires with a non-empty buffer. At flush, the remainder is emitted
/// unconditionally.
///
/// The timer is observed through the worker loop's [`tick`](Operator::tick) hook, so
/// its effective resolution is bounded by the pipeline's poll interval.
pub(crate) struct TimeBatchOperator<T> {
    interval: Duration,
    buffer: Vec<T>,
    next_emission: Instant,
}

impl<T> TimeBatchOperator<T> {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            buffer: Vec::new(),
            next_emission: Instant::now() + interval,
        }
    }
}

impl<T: Send + 'static> Operator<T> for TimeBatchOperator<T> {
    type Output = Vec<T>;

    fn apply(&mut self, item: T, _out: &mut Vec<Vec<T>>) {
        self.buffer.push(item);
    }

    fn tick(&mut self, out: &mut Vec<Vec<T>>) {
        if Instant::now() < self.next_emission {
            return;
        }

        if !self.buffer.is_empty() {
            out.push(mem::take(&mut self.buffer));
        }

        self.next_emission = Instant::now() + self.interval;
    }

    fn flush(&mut self, out: &mut Vec<Vec<T>>) {
        if !self.buffer.is_empty() {
            out.push(mem::take(&mut self.buffer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_windows_are_emitted_and_reset() {
        let mut operator = CountBatchOperator::new(3, true);
        let mut out = Vec::new();

        for item in 1..=7 {
            operator.apply(item, &mut out);
        }
        assert_eq!(out, vec![vec![1, 2, 3], vec![4, 5, 6]]);

        operator.flush(&mut out);
        assert_eq!(out, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
    }

    #[test]
    fn incomplete_window_is_discarded_when_not_kept() {
        let mut operator = CountBatchOperator::new(3, false);
        let mut out = Vec::new();

        for item in 1..=7 {
            operator.apply(item, &mut out);
        }
        operator.flush(&mut out);
        assert_eq!(out, vec![vec![1, 2, 3], vec![4, 5, 6]]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_emits_only_non_empty_buffers() {
        let mut operator = TimeBatchOperator::new(Duration::from_millis(100));
        let mut out = Vec::new();

        // Timer fires with nothing buffered: no window.
        tokio::time::advance(Duration::from_millis(150)).await;
        operator.tick(&mut out);
        assert!(out.is_empty());

        operator.apply(1, &mut out);
        operator.apply(2, &mut out);
        operator.tick(&mut out);
        assert!(out.is_empty());

        tokio::time::advance(Duration::from_millis(150)).await;
        operator.tick(&mut out);
        assert_eq!(out, vec![vec![1, 2]]);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_emits_the_remainder_unconditionally() {
        let mut operator = TimeBatchOperator::new(Duration::from_secs(3600));
        let mut out = Vec::new();

        operator.apply(9, &mut out);
        operator.flush(&mut out);
        assert_eq!(out, vec![vec![9]]);
    }
}

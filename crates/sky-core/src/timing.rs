//! Wall-clock bookkeeping for named tasks.
//!
//! A [`TimeLord`] is shared by reference between trials (including trials running on
//! different threads) and accumulates the total time and call count per task name.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Accumulated timing of one task.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaskSummary {
    /// Number of timed executions.
    pub count: usize,
    /// Total wall time over all executions.
    pub total: Duration,
}

impl TaskSummary {
    /// Mean wall time per execution.
    pub fn mean(&self) -> Duration {
        if self.count == 0 { Duration::ZERO } else { self.total.div_f64(self.count as f64) }
    }
}

/// Thread-safe collection of task timings.
#[derive(Debug, Default)]
pub struct TimeLord {
    tasks: Mutex<BTreeMap<String, TaskSummary>>,
}

impl TimeLord {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one execution of `name` that took `elapsed`.
    pub fn add(&self, name: &str, elapsed: Duration) {
        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = tasks.entry(name.to_string()).or_default();
        entry.count += 1;
        entry.total += elapsed;
    }

    /// Summary of one task.
    pub fn summary(&self, name: &str) -> Option<TaskSummary> {
        self.snapshot().get(name).copied()
    }

    /// Copy of all summaries, ordered by task name.
    pub fn snapshot(&self) -> BTreeMap<String, TaskSummary> {
        match self.tasks.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Run `f`, recording its duration under `name` when a [`TimeLord`] is given.
pub fn timed<T>(tl: Option<&TimeLord>, name: &str, f: impl FnOnce() -> T) -> T {
    match tl {
        Some(tl) => {
            let t0 = Instant::now();
            let out = f();
            tl.add(name, t0.elapsed());
            out
        }
        None => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_accumulates() {
        let tl = TimeLord::new();
        let a = timed(Some(&tl), "step", || 1 + 1);
        let b = timed(Some(&tl), "step", || 2 + 2);
        assert_eq!((a, b), (2, 4));
        let s = tl.summary("step").unwrap();
        assert_eq!(s.count, 2);
        assert!(s.mean() <= s.total);
    }

    #[test]
    fn test_mean_beyond_u32_count() {
        let count = u32::MAX as usize + 1;
        let s = TaskSummary { count, total: Duration::from_secs(2 * count as u64) };
        assert_eq!(s.mean(), Duration::from_secs(2));
        assert_eq!(TaskSummary::default().mean(), Duration::ZERO);
    }

    #[test]
    fn test_timed_without_lord() {
        assert_eq!(timed(None, "noop", || 5), 5);
    }
}

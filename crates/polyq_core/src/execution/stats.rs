use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Timing of a single materialized CTE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CteTiming {
    pub name: String,
    pub level: usize,
    pub rows: usize,
    pub elapsed: Duration,
}

/// Counters collected while executing a single query.
///
/// Updated concurrently by CTE tasks of the same level.
#[derive(Debug, Default)]
pub struct ExecutionStats {
    hash_tables_built: AtomicUsize,
    nested_loop_joins: AtomicUsize,
    cte_levels_executed: AtomicUsize,
    cte_timings: Mutex<Vec<CteTiming>>,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inc_hash_tables_built(&self) {
        self.hash_tables_built.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_nested_loop_joins(&self) {
        self.nested_loop_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_cte_levels_executed(&self) {
        self.cte_levels_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cte(&self, timing: CteTiming) {
        self.cte_timings.lock().push(timing);
    }

    pub fn hash_tables_built(&self) -> usize {
        self.hash_tables_built.load(Ordering::Relaxed)
    }

    /// Nested loop joins run, including cross products.
    pub fn nested_loop_joins(&self) -> usize {
        self.nested_loop_joins.load(Ordering::Relaxed)
    }

    pub fn cte_levels_executed(&self) -> usize {
        self.cte_levels_executed.load(Ordering::Relaxed)
    }

    /// Timings of every materialized CTE, ordered by level then name.
    pub fn cte_timings(&self) -> Vec<CteTiming> {
        let mut timings = self.cte_timings.lock().clone();
        timings.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
        timings
    }
}

use std::fmt;
use std::sync::Arc;

use polyq_error::{Result, ResultExt};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::runtime::cancel::CancellationToken;

/// Fork/join scheduler for CTE levels.
///
/// Members of a level are submitted to a worker pool and awaited together
/// before the next level may start.
#[derive(Clone)]
pub struct CteScheduler {
    pool: Arc<ThreadPool>,
}

impl fmt::Debug for CteScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CteScheduler")
            .field("num_threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl CteScheduler {
    pub fn try_new(num_threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .thread_name(|idx| format!("polyq-cte-{idx}"))
            .num_threads(num_threads)
            .build()
            .context_fn(|| format!("Failed to build CTE thread pool with {num_threads} threads"))?;

        info!(num_threads = pool.current_num_threads(), "created CTE scheduler");

        Ok(CteScheduler {
            pool: Arc::new(pool),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run every member of a level, returning once all have finished.
    ///
    /// No new level starts if cancellation has been requested. A single
    /// member runs inline on the calling thread. Results are returned in
    /// member order. If any member fails, one of the errors is returned.
    pub fn run_level<T, R, F>(
        &self,
        level: usize,
        members: &[T],
        cancel: &CancellationToken,
        func: F,
    ) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync + Send,
    {
        if let Err(e) = cancel.check() {
            debug!(level, "cancelled before starting CTE level");
            return Err(e);
        }

        debug!(level, members = members.len(), "running CTE level");

        if members.len() <= 1 {
            return members.iter().map(&func).collect();
        }

        // Each member is its own task.
        self.pool.install(|| {
            members
                .par_iter()
                .with_max_len(1)
                .map(&func)
                .collect::<Result<Vec<_>>>()
        })
    }
}

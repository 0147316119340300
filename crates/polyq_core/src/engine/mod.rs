pub mod query_result;

use std::collections::HashMap;
use std::sync::Arc;

use polyq_error::Result;
use query_result::QueryResult;
use tracing::{debug, info};

use crate::arrays::scalar::ScalarValue;
use crate::config::session::SessionConfig;
use crate::execution::executor::QueryExecutor;
use crate::execution::scheduler::CteScheduler;
use crate::execution::stats::ExecutionStats;
use crate::explain::node::ExplainNode;
use crate::logical::query::QueryNode;
use crate::planner::{PlanConfig, QueryPlan, QueryPlanner};
use crate::runtime::cancel::CancellationToken;
use crate::storage::SourceCatalog;

/// Plans and executes queries against a catalog of data sources.
#[derive(Debug)]
pub struct Engine {
    catalog: Arc<dyn SourceCatalog>,
    config: SessionConfig,
    /// Handed to every data source through the retrieval context.
    env: Arc<HashMap<String, String>>,
    scheduler: CteScheduler,
}

impl Engine {
    pub fn try_new(catalog: Arc<dyn SourceCatalog>) -> Result<Self> {
        Self::with_config(catalog, SessionConfig::default())
    }

    pub fn with_config(catalog: Arc<dyn SourceCatalog>, config: SessionConfig) -> Result<Self> {
        let scheduler = CteScheduler::try_new(config.cte_worker_threads as usize)?;
        Ok(Engine {
            catalog,
            config,
            env: Arc::new(HashMap::new()),
            scheduler,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Set a session setting by name.
    ///
    /// Changing the worker thread count replaces the CTE worker pool.
    pub fn set_setting(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let prev_threads = self.config.cte_worker_threads;
        self.config.set_from_scalar(name, value)?;
        self.on_config_changed(prev_threads)
    }

    pub fn reset_setting(&mut self, name: &str) -> Result<()> {
        let prev_threads = self.config.cte_worker_threads;
        self.config.reset(name)?;
        self.on_config_changed(prev_threads)
    }

    fn on_config_changed(&mut self, prev_threads: u64) -> Result<()> {
        if self.config.cte_worker_threads != prev_threads {
            self.scheduler = CteScheduler::try_new(self.config.cte_worker_threads as usize)?;
        }
        Ok(())
    }

    pub fn set_env_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        Arc::make_mut(&mut self.env).insert(key.into(), value.into());
    }

    pub fn plan(&self, query: &QueryNode) -> Result<QueryPlan> {
        QueryPlanner::new(self.catalog.as_ref(), PlanConfig::from(&self.config)).plan(query)
    }

    /// Plan and execute a query, materializing its full output.
    ///
    /// Every structural or type error is raised before any source is
    /// scanned.
    pub fn execute(&self, query: &QueryNode, cancel: &CancellationToken) -> Result<QueryResult> {
        let plan = self.plan(query)?;
        self.execute_plan(&plan, cancel)
    }

    pub fn execute_plan(
        &self,
        plan: &QueryPlan,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let stats = ExecutionStats::new();
        let executor = QueryExecutor {
            scheduler: &self.scheduler,
            env: self.env.clone(),
            cancel: cancel.clone(),
            stats: &stats,
        };

        let output = match executor.execute(plan) {
            Ok(output) => output,
            Err(e) => {
                if e.is_cancelled() {
                    info!("query cancelled");
                }
                return Err(e);
            }
        };

        debug!(
            rows = output.num_rows(),
            hash_tables = stats.hash_tables_built(),
            cte_levels = stats.cte_levels_executed(),
            "executed query"
        );

        Ok(QueryResult { output, stats })
    }

    pub fn explain(&self, query: &QueryNode) -> Result<ExplainNode> {
        let plan = self.plan(query)?;
        Ok(ExplainNode::new_from_plan(&plan))
    }
}

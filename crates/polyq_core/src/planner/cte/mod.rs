pub mod graph;
pub mod plan;

use graph::CteDependencyGraph;
use hashbrown::HashMap;
use plan::CteExecutionPlan;
use polyq_error::{DbError, Result};
use tracing::debug;

use crate::logical::query::WithBlock;

/// Computes which CTEs of a WITH block can be materialized concurrently.
///
/// Planning is a pure function of the block's static shape. There is no cost
/// model, a level with more than one member is always considered
/// parallelizable.
#[derive(Debug, Clone, Copy, Default)]
pub struct CteDependencyAnalyzer {
    pub allow_duplicate_names: bool,
}

impl CteDependencyAnalyzer {
    pub fn new(allow_duplicate_names: bool) -> Self {
        CteDependencyAnalyzer {
            allow_duplicate_names,
        }
    }

    pub fn create_plan(&self, block: &WithBlock) -> Result<CteExecutionPlan> {
        let graph = self.build_graph(block)?;
        Self::plan_for_graph(&graph)
    }

    pub fn build_graph(&self, block: &WithBlock) -> Result<CteDependencyGraph> {
        CteDependencyGraph::try_new(block, self.allow_duplicate_names)
    }

    /// Level a validated graph.
    ///
    /// Each pass places every CTE whose dependencies were all placed in
    /// earlier passes. A pass that places nothing while CTEs remain means
    /// the remaining CTEs are part of, or depend on, a cycle.
    pub fn plan_for_graph(graph: &CteDependencyGraph) -> Result<CteExecutionPlan> {
        let mut placed: HashMap<&str, usize> = HashMap::with_capacity(graph.len());
        let mut levels: Vec<Vec<String>> = Vec::new();

        while placed.len() < graph.len() {
            let level = levels.len();
            let ready: Vec<&str> = graph
                .names()
                .filter(|name| !placed.contains_key(name))
                .filter(|name| {
                    graph
                        .dependencies(name)
                        .unwrap_or_default()
                        .iter()
                        .all(|dep| placed.get(dep.as_str()).is_some_and(|&l| l < level))
                })
                .collect();

            if ready.is_empty() {
                return Err(cycle_error(graph, &placed));
            }

            for &name in &ready {
                placed.insert(name, level);
            }
            levels.push(ready.into_iter().map(|s| s.to_string()).collect());
        }

        let plan = CteExecutionPlan::from_levels(levels);
        debug!(
            total = plan.total_cte_count(),
            levels = plan.level_count(),
            max_parallelism = plan.max_parallelism(),
            "created CTE execution plan"
        );

        Ok(plan)
    }
}

/// Build an error naming the CTEs forming a cycle.
///
/// Every unplaced CTE has at least one unplaced dependency, so walking
/// unplaced dependencies from any unplaced CTE must eventually revisit a
/// CTE.
fn cycle_error(graph: &CteDependencyGraph, placed: &HashMap<&str, usize>) -> DbError {
    let unresolved: Vec<&str> = graph
        .names()
        .filter(|name| !placed.contains_key(name))
        .collect();

    let mut path: Vec<&str> = Vec::new();
    let mut current = unresolved.first().copied();
    while let Some(name) = current {
        if let Some(start) = path.iter().position(|&p| p == name) {
            let mut cycle = path.split_off(start);
            cycle.push(name);
            return DbError::structural(format!(
                "Cyclic dependency between CTEs: {}",
                cycle.join(" -> ")
            ))
            .with_field("cycle", cycle.join(" -> "))
            .with_field("unresolved", unresolved.join(", "));
        }
        path.push(name);
        current = graph
            .dependencies(name)
            .unwrap_or_default()
            .iter()
            .map(|dep| dep.as_str())
            .find(|dep| !placed.contains_key(dep));
    }

    DbError::structural(format!("Unable to order CTEs: {}", unresolved.join(", ")))
        .with_field("unresolved", unresolved.join(", "))
}

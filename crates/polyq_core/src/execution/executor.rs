use std::cmp::Ordering;
use std::collections::HashMap as StdHashMap;
use std::sync::Arc;
use std::time::Instant;

use ahash::RandomState;
use hashbrown::{HashMap, HashSet};
use indexmap::IndexSet;
use polyq_error::{DbError, OptionExt, Result};
use tracing::{debug, trace};

use super::operators::hash_join::HashJoinOperator;
use super::operators::nested_loop_join::NestedLoopJoinOperator;
use super::operators::set_operation::SetOperationOperator;
use super::scheduler::CteScheduler;
use super::stats::{CteTiming, ExecutionStats};
use crate::arrays::collection::RowCollection;
use crate::arrays::row::Row;
use crate::planner::join::JoinStrategy;
use crate::planner::{
    PlannedBody,
    PlannedFrom,
    PlannedJoin,
    PlannedQuery,
    PlannedScan,
    PlannedSelect,
    PlannedSetOp,
    QueryPlan,
};
use crate::runtime::cancel::{CancellableRows, CancellationToken};
use crate::storage::retrieval::{QueryHints, RetrievalContext};

/// Materialized CTE results, written once per level and read concurrently by
/// later levels.
type CteResults = HashMap<String, Arc<RowCollection>, RandomState>;

/// Runs a query plan to completion.
#[derive(Debug)]
pub struct QueryExecutor<'a> {
    pub scheduler: &'a CteScheduler,
    pub env: Arc<StdHashMap<String, String>>,
    pub cancel: CancellationToken,
    pub stats: &'a ExecutionStats,
}

impl QueryExecutor<'_> {
    pub fn execute(&self, plan: &QueryPlan) -> Result<RowCollection> {
        let mut results = CteResults::default();

        if let Some(ctes) = &plan.ctes {
            for level in ctes.plan.levels() {
                let members = level
                    .ctes
                    .iter()
                    .map(|name| {
                        let body = ctes.bodies.get(name).required("planned CTE body")?;
                        Ok((name.as_str(), body))
                    })
                    .collect::<Result<Vec<_>>>()?;

                let outputs = self.scheduler.run_level(
                    level.level,
                    &members,
                    &self.cancel,
                    |(name, body)| {
                        let start = Instant::now();
                        let rows = self.execute_query(body, &results)?;
                        self.stats.record_cte(CteTiming {
                            name: name.to_string(),
                            level: level.level,
                            rows: rows.num_rows(),
                            elapsed: start.elapsed(),
                        });
                        Ok((name.to_string(), rows))
                    },
                )?;

                for (name, rows) in outputs {
                    results.insert(name, Arc::new(rows));
                }
                self.stats.inc_cte_levels_executed();
                debug!(level = level.level, "materialized CTE level");
            }
        }

        self.execute_query(&plan.root, &results)
    }

    fn execute_query(&self, query: &PlannedQuery, ctes: &CteResults) -> Result<RowCollection> {
        let (mut rows, applied) = match &query.body {
            PlannedBody::Select(select) => self.execute_select(select, ctes)?,
            PlannedBody::SetOp(setop) => (self.execute_set_op(setop, ctes)?, QueryHints::NONE),
        };

        if !query.order_by.is_empty() {
            let mut keyed = rows
                .into_iter()
                .map(|row| {
                    let keys = query
                        .order_by
                        .iter()
                        .map(|order| order.expr.eval(&row))
                        .collect::<Result<Vec<_>>>()?;
                    Ok((keys, row))
                })
                .collect::<Result<Vec<_>>>()?;

            keyed.sort_by(|(a, _), (b, _)| {
                for ((a, b), order) in a.iter().zip(b).zip(&query.order_by) {
                    let ord = a.total_cmp(b);
                    let ord = if order.desc { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });

            rows = keyed.into_iter().map(|(_, row)| row).collect();
        }

        let (skip, take) = remaining_limits(query, applied)?;
        if let Some(skip) = skip {
            rows.drain(..usize::try_from(skip).unwrap_or(usize::MAX).min(rows.len()));
        }
        if let Some(take) = take {
            rows.truncate(usize::try_from(take).unwrap_or(usize::MAX));
        }

        Ok(RowCollection::new(query.output.clone(), rows))
    }

    /// Execute a select, returning its rows and the hints its source applied.
    fn execute_select(
        &self,
        select: &PlannedSelect,
        ctes: &CteResults,
    ) -> Result<(Vec<Row>, QueryHints)> {
        let (mut rows, applied) = self.execute_from(&select.from, ctes)?;

        // Re-applied even if the source already filtered, filtering is
        // idempotent.
        if let Some(filter) = &select.filter {
            rows = filter_rows(rows, |row| filter.eval_predicate(row), &self.cancel)?;
        }

        if !select.group_by.is_empty() {
            let mut groups: IndexSet<Row, RandomState> = IndexSet::default();
            for row in &rows {
                self.cancel.check()?;
                let key = select
                    .group_by
                    .iter()
                    .map(|expr| expr.eval(row))
                    .collect::<Result<Row>>()?;
                groups.insert(key);
            }
            rows = groups.into_iter().collect();

            if let Some(having) = &select.having {
                rows = filter_rows(rows, |row| having.eval_predicate(row), &self.cancel)?;
            }
        }

        let mut projected = Vec::with_capacity(rows.len());
        for row in &rows {
            self.cancel.check()?;
            projected.push(
                select
                    .projections
                    .iter()
                    .map(|expr| expr.eval(row))
                    .collect::<Result<Row>>()?,
            );
        }

        if select.distinct {
            let mut seen: HashSet<Row, RandomState> = HashSet::default();
            projected.retain(|row| seen.insert(row.clone()));
        }

        Ok((projected, applied))
    }

    fn execute_set_op(&self, setop: &PlannedSetOp, ctes: &CteResults) -> Result<Vec<Row>> {
        let (mut rows, _) = self.execute_select(&setop.first, ctes)?;

        for (step, branch) in setop.plan.steps.iter().zip(&setop.branches) {
            self.cancel.check()?;
            let (right, _) = self.execute_select(branch, ctes)?;
            rows = SetOperationOperator { step }.execute(rows, right, &self.cancel)?;
            trace!(kind = %step.kind, rows = rows.len(), "executed set operation step");
        }

        Ok(rows)
    }

    fn execute_from(
        &self,
        from: &PlannedFrom,
        ctes: &CteResults,
    ) -> Result<(Vec<Row>, QueryHints)> {
        match from {
            PlannedFrom::Scan(scan) => self.execute_scan(scan),
            PlannedFrom::CteScan(cte) => {
                let result = ctes.get(&cte.name).ok_or_else(|| {
                    DbError::new(format!("CTE '{}' has not been materialized", cte.name))
                        .with_field("cte", &cte.name)
                })?;
                Ok((result.rows.clone(), QueryHints::NONE))
            }
            PlannedFrom::Join(join) => Ok((self.execute_join(join, ctes)?, QueryHints::NONE)),
        }
    }

    fn execute_scan(&self, scan: &PlannedScan) -> Result<(Vec<Row>, QueryHints)> {
        let ctx = RetrievalContext::new(scan.table.clone(), self.cancel.clone())
            .with_hints(scan.hints)
            .with_env(self.env.clone())
            .with_predicate(scan.predicate.clone());

        let result = scan.source.scan(&ctx)?;
        let rows = CancellableRows::new(result.rows, self.cancel.clone())
            .collect::<Result<Vec<_>>>()?;

        trace!(table = %scan.table, rows = rows.len(), applied = %result.applied, "scanned source");

        Ok((rows, result.applied))
    }

    fn execute_join(&self, join: &PlannedJoin, ctes: &CteResults) -> Result<Vec<Row>> {
        let (left, _) = self.execute_from(&join.left, ctes)?;
        let (right, _) = self.execute_from(&join.right, ctes)?;

        // No new join stage once cancelled.
        self.cancel.check()?;

        let compiled = &join.join;
        match &compiled.strategy {
            JoinStrategy::Hash(plan) => {
                self.stats.inc_hash_tables_built();
                HashJoinOperator {
                    plan,
                    kind: compiled.kind,
                    left_width: compiled.left_width,
                    right_width: compiled.right_width,
                }
                .execute(left, right, &self.cancel)
            }
            JoinStrategy::NestedLoop(plan) => {
                self.stats.inc_nested_loop_joins();
                NestedLoopJoinOperator {
                    predicate: Some(&plan.predicate),
                    kind: compiled.kind,
                    left_width: compiled.left_width,
                    right_width: compiled.right_width,
                }
                .execute(left, right, &self.cancel)
            }
            JoinStrategy::Cross => {
                self.stats.inc_nested_loop_joins();
                NestedLoopJoinOperator {
                    predicate: None,
                    kind: compiled.kind,
                    left_width: compiled.left_width,
                    right_width: compiled.right_width,
                }
                .execute(left, right, &self.cancel)
            }
        }
    }
}

fn filter_rows<F>(rows: Vec<Row>, mut pred: F, cancel: &CancellationToken) -> Result<Vec<Row>>
where
    F: FnMut(&Row) -> Result<bool>,
{
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        cancel.check()?;
        if pred(&row)? {
            out.push(row);
        }
    }
    Ok(out)
}

/// SKIP and TAKE still to be applied after the source applied `applied`.
fn remaining_limits(
    query: &PlannedQuery,
    applied: QueryHints,
) -> Result<(Option<u64>, Option<u64>)> {
    if applied.take.is_some() && applied.skip.is_none() && query.skip.is_some() {
        return Err(DbError::new("Data source applied TAKE without applying SKIP")
            .with_field("applied", applied));
    }

    let skip = if applied.skip.is_some() { None } else { query.skip };
    let take = if applied.take.is_some() { None } else { query.take };
    Ok((skip, take))
}

use ahash::RandomState;
use hashbrown::HashMap;
use polyq_error::Result;
use tracing::debug;

use crate::arrays::row::Row;
use crate::arrays::scalar::ScalarValue;
use crate::expr::physical::PhysicalScalarExpression;
use crate::logical::query::JoinKind;
use crate::planner::join::{BuildSide, HashJoinPlan};
use crate::runtime::cancel::CancellationToken;

/// Hash table over the fully consumed build input of a join.
///
/// Each key maps to the indices of every build row with that key, so
/// duplicate keys fan out into one output row per match. Written once during
/// build, read-only afterwards.
#[derive(Debug)]
pub struct JoinHashTable {
    rows: Vec<Row>,
    buckets: HashMap<Vec<ScalarValue>, Vec<usize>, RandomState>,
}

impl JoinHashTable {
    /// Build a table from `rows`.
    ///
    /// Rows with a NULL in any key component can never match under SQL
    /// equality and are not inserted. They are still kept so an outer join
    /// preserving the build side can emit them.
    pub fn build(
        rows: Vec<Row>,
        keys: &[PhysicalScalarExpression],
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let mut buckets: HashMap<Vec<ScalarValue>, Vec<usize>, RandomState> = HashMap::default();

        for (idx, row) in rows.iter().enumerate() {
            cancel.check()?;
            if let Some(key) = extract_key(row, keys)? {
                buckets.entry(key).or_default().push(idx);
            }
        }

        Ok(JoinHashTable { rows, buckets })
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Indices of build rows matching `key`.
    pub fn probe(&self, key: &[ScalarValue]) -> &[usize] {
        self.buckets.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Evaluate key expressions for a row.
///
/// Returns None if any component is NULL or NaN, neither of which is equal to
/// anything under `=`.
fn extract_key(row: &Row, keys: &[PhysicalScalarExpression]) -> Result<Option<Vec<ScalarValue>>> {
    let mut key = Vec::with_capacity(keys.len());
    for expr in keys {
        let value = expr.eval(row)?;
        if value.is_null() || value.is_nan() {
            return Ok(None);
        }
        key.push(value.into_join_key());
    }
    Ok(Some(key))
}

/// Executes a hash join.
///
/// The build input is consumed completely before probing starts. Output rows
/// are always left columns followed by right columns, whichever side was
/// built.
#[derive(Debug)]
pub struct HashJoinOperator<'a> {
    pub plan: &'a HashJoinPlan,
    pub kind: JoinKind,
    pub left_width: usize,
    pub right_width: usize,
}

impl HashJoinOperator<'_> {
    pub fn execute(
        &self,
        left: Vec<Row>,
        right: Vec<Row>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>> {
        let (build, probe) = match self.plan.build_side {
            BuildSide::Left => (left, right),
            BuildSide::Right => (right, left),
        };
        let (preserve_probe, preserve_build) = match self.plan.build_side {
            BuildSide::Left => (self.kind.preserves_right(), self.kind.preserves_left()),
            BuildSide::Right => (self.kind.preserves_left(), self.kind.preserves_right()),
        };

        let table = JoinHashTable::build(build, self.plan.build_keys(), cancel)?;
        debug!(
            build_side = %self.plan.build_side,
            rows = table.num_rows(),
            buckets = table.num_buckets(),
            "built join hash table"
        );

        let mut visited = if preserve_build {
            vec![false; table.num_rows()]
        } else {
            Vec::new()
        };

        let mut output = Vec::new();
        for probe_row in &probe {
            cancel.check()?;

            let matches = match extract_key(probe_row, self.plan.probe_keys())? {
                Some(key) => table.probe(&key),
                None => &[],
            };

            if matches.is_empty() {
                if preserve_probe {
                    output.push(self.null_filled_probe(probe_row));
                }
                continue;
            }

            for &build_idx in matches {
                if preserve_build {
                    visited[build_idx] = true;
                }
                output.push(self.combine(&table.rows()[build_idx], probe_row));
            }
        }

        if preserve_build {
            for (build_row, _) in table
                .rows()
                .iter()
                .zip(&visited)
                .filter(|(_, visited)| !**visited)
            {
                output.push(self.null_filled_build(build_row));
            }
        }

        Ok(output)
    }

    fn combine(&self, build: &Row, probe: &Row) -> Row {
        match self.plan.build_side {
            BuildSide::Left => Row::concat(build, probe),
            BuildSide::Right => Row::concat(probe, build),
        }
    }

    fn null_filled_probe(&self, probe: &Row) -> Row {
        match self.plan.build_side {
            BuildSide::Left => Row::concat(&Row::nulls(self.left_width), probe),
            BuildSide::Right => Row::concat(probe, &Row::nulls(self.right_width)),
        }
    }

    fn null_filled_build(&self, build: &Row) -> Row {
        match self.plan.build_side {
            BuildSide::Left => Row::concat(build, &Row::nulls(self.right_width)),
            BuildSide::Right => Row::concat(&Row::nulls(self.left_width), build),
        }
    }
}

use ahash::RandomState;
use hashbrown::HashSet;
use polyq_error::Result;

use crate::arrays::row::Row;
use crate::arrays::scalar::ScalarValue;
use crate::logical::query::SetOpKind;
use crate::planner::setop::SetOpStep;
use crate::runtime::cancel::CancellationToken;

type KeySet = HashSet<Vec<ScalarValue>, RandomState>;

/// Executes a single step of a set operation chain.
///
/// Keys are compared with grouping semantics, `NULL` equals `NULL` for every
/// component, so all-null keys are ordinary values here. Non-key columns
/// pass through from whichever row is kept.
#[derive(Debug)]
pub struct SetOperationOperator<'a> {
    pub step: &'a SetOpStep,
}

impl SetOperationOperator<'_> {
    pub fn execute(
        &self,
        left: Vec<Row>,
        right: Vec<Row>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>> {
        let step = self.step;
        match step.kind {
            SetOpKind::UnionAll => {
                let mut output = left;
                output.extend(right);
                Ok(output)
            }
            SetOpKind::Union => {
                let mut seen = KeySet::default();
                let mut output = Vec::with_capacity(left.len());
                let sides = left
                    .into_iter()
                    .map(|row| (row, &step.left_keys))
                    .chain(right.into_iter().map(|row| (row, &step.right_keys)));
                for (row, keys) in sides {
                    cancel.check()?;
                    if seen.insert(row.project(keys)) {
                        output.push(row);
                    }
                }
                Ok(output)
            }
            SetOpKind::Except | SetOpKind::Intersect => {
                let keep_present = step.kind == SetOpKind::Intersect;
                let mut right_keys = KeySet::default();
                for row in &right {
                    cancel.check()?;
                    right_keys.insert(row.project(&step.right_keys));
                }

                let mut output = Vec::new();
                for row in left {
                    cancel.check()?;
                    let present = right_keys.contains(&row.project(&step.left_keys));
                    if present == keep_present {
                        output.push(row);
                    }
                }
                Ok(output)
            }
        }
    }
}

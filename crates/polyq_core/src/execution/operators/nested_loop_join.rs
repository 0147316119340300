use polyq_error::Result;

use crate::arrays::row::Row;
use crate::expr::physical::PhysicalScalarExpression;
use crate::logical::query::JoinKind;
use crate::runtime::cancel::CancellationToken;

/// Evaluates a join predicate for every (left, right) pair.
///
/// With no predicate this produces the cartesian product.
#[derive(Debug)]
pub struct NestedLoopJoinOperator<'a> {
    /// Predicate bound against the concatenated row.
    pub predicate: Option<&'a PhysicalScalarExpression>,
    pub kind: JoinKind,
    pub left_width: usize,
    pub right_width: usize,
}

impl NestedLoopJoinOperator<'_> {
    pub fn execute(
        &self,
        left: Vec<Row>,
        right: Vec<Row>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>> {
        let mut right_visited = vec![false; right.len()];
        let mut output = Vec::new();

        for left_row in &left {
            cancel.check()?;

            let mut matched = false;
            for (right_idx, right_row) in right.iter().enumerate() {
                let joined = Row::concat(left_row, right_row);
                let keep = match self.predicate {
                    Some(predicate) => predicate.eval_predicate(&joined)?,
                    None => true,
                };
                if keep {
                    matched = true;
                    right_visited[right_idx] = true;
                    output.push(joined);
                }
            }

            if !matched && self.kind.preserves_left() {
                output.push(Row::concat(left_row, &Row::nulls(self.right_width)));
            }
        }

        if self.kind.preserves_right() {
            let nulls = Row::nulls(self.left_width);
            for (right_row, _) in right
                .iter()
                .zip(&right_visited)
                .filter(|(_, visited)| !**visited)
            {
                output.push(Row::concat(&nulls, right_row));
            }
        }

        Ok(output)
    }
}

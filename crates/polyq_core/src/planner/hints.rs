use tracing::trace;

use crate::logical::query::{FromNode, QueryBody, QueryNode, TableReference};
use crate::storage::retrieval::QueryHints;

/// Decides whether SKIP/TAKE may be pushed into a data source.
///
/// Hints are only pushed when the query reads from exactly one base table and
/// nothing between retrieval and SKIP/TAKE could change which rows survive:
/// no ORDER BY, no GROUP BY (or HAVING), and no DISTINCT. Anything else gets
/// the neutral value, never a partial subset.
#[derive(Debug, Clone, Copy)]
pub struct HintPushdownAnalyzer {
    pub enabled: bool,
}

impl Default for HintPushdownAnalyzer {
    fn default() -> Self {
        HintPushdownAnalyzer { enabled: true }
    }
}

impl HintPushdownAnalyzer {
    pub fn compute(&self, query: &QueryNode, source: &TableReference) -> QueryHints {
        if !self.enabled {
            return QueryHints::NONE;
        }

        // SKIP/TAKE on a set operation chain apply to the combined output.
        let select = match &query.body {
            QueryBody::Select(select) => select,
            QueryBody::SetOp(_) => return QueryHints::NONE,
        };

        let single_table = match &select.from {
            FromNode::Table(table) => table == source,
            _ => false,
        };

        if !single_table
            || !query.modifiers.order_by.is_empty()
            || !select.group_by.is_empty()
            || select.having.is_some()
            || select.distinct
        {
            trace!(table = %source, "hints not pushable");
            return QueryHints::NONE;
        }

        QueryHints {
            skip: query.modifiers.skip,
            take: query.modifiers.take,
            is_distinct: false,
        }
    }
}

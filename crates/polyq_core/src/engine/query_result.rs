use crate::arrays::collection::RowCollection;
use crate::arrays::field::ColumnSchema;
use crate::execution::stats::ExecutionStats;

/// Fully materialized output of a query.
#[derive(Debug)]
pub struct QueryResult {
    pub output: RowCollection,
    pub stats: ExecutionStats,
}

impl QueryResult {
    pub fn output_schema(&self) -> &ColumnSchema {
        &self.output.schema
    }

    pub fn num_rows(&self) -> usize {
        self.output.num_rows()
    }
}

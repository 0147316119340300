use super::field::ColumnSchema;
use super::row::Row;

/// A fully materialized set of rows.
///
/// Used for CTE results and build-side inputs. Never mutated once built, so
/// it can be shared across threads behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowCollection {
    pub schema: ColumnSchema,
    pub rows: Vec<Row>,
}

impl RowCollection {
    pub fn new(schema: ColumnSchema, rows: Vec<Row>) -> Self {
        RowCollection { schema, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub mod memory;
pub mod retrieval;

use std::fmt::Debug;
use std::sync::Arc;

use polyq_error::Result;
use retrieval::{QueryHints, RetrievalContext};

use crate::arrays::field::ColumnSchema;
use crate::arrays::row::Row;
use crate::logical::query::TableReference;

/// Lazy sequence of rows produced by a data source.
pub type RowStream = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// Output of a data source scan.
pub struct SourceScan {
    pub rows: RowStream,
    /// The hints the source actually applied.
    ///
    /// A source is free to ignore hints, in which case this is
    /// `QueryHints::NONE` and the executor applies SKIP/TAKE itself.
    pub applied: QueryHints,
}

impl Debug for SourceScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceScan")
            .field("applied", &self.applied)
            .finish_non_exhaustive()
    }
}

/// An enumerable data source.
///
/// Sources must return the full, unfiltered, unlimited set of rows when the
/// retrieval context carries no optimization hints. When a source applies
/// hints it must apply the pushed-down predicate (if any) before SKIP and
/// TAKE.
pub trait DataSource: Debug + Sync + Send {
    /// Output schema of the source for a given call.
    fn schema(&self, table: &TableReference) -> Result<ColumnSchema>;

    /// Begin retrieving rows.
    fn scan(&self, ctx: &RetrievalContext) -> Result<SourceScan>;
}

/// Resolves table references to data sources.
pub trait SourceCatalog: Debug + Sync + Send {
    fn resolve(&self, table: &TableReference) -> Result<Arc<dyn DataSource>>;
}

use std::sync::Arc;

use ahash::RandomState;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use polyq_error::{DbError, Result};
use tracing::trace;

use super::retrieval::{QueryHints, RetrievalContext};
use super::{DataSource, RowStream, SourceCatalog, SourceScan};
use crate::arrays::field::ColumnSchema;
use crate::arrays::row::Row;
use crate::logical::query::TableReference;
use crate::planner::expr_binder::ExpressionBinder;
use crate::planner::row_shape::RowShape;

/// A data source backed by rows held in memory.
#[derive(Debug)]
pub struct MemorySource {
    schema: ColumnSchema,
    rows: Arc<Vec<Row>>,
    /// If this source applies hints it receives. When false, hints are
    /// ignored and the full set is always returned.
    apply_hints: bool,
    /// Every retrieval context's hints, in order received.
    received: Mutex<Vec<QueryHints>>,
}

impl MemorySource {
    pub fn new(schema: ColumnSchema, rows: impl IntoIterator<Item = Row>) -> Self {
        MemorySource {
            schema,
            rows: Arc::new(rows.into_iter().collect()),
            apply_hints: true,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn with_hint_support(mut self, apply_hints: bool) -> Self {
        self.apply_hints = apply_hints;
        self
    }

    /// Hints received by every scan so far.
    pub fn received_hints(&self) -> Vec<QueryHints> {
        self.received.lock().clone()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

impl DataSource for MemorySource {
    fn schema(&self, _table: &TableReference) -> Result<ColumnSchema> {
        Ok(self.schema.clone())
    }

    fn scan(&self, ctx: &RetrievalContext) -> Result<SourceScan> {
        self.received.lock().push(ctx.hints);

        let rows = self.rows.clone();
        let all = (0..rows.len()).map(move |idx| rows[idx].clone());

        if !self.apply_hints || !ctx.hints.has_optimization_hints() {
            return Ok(SourceScan {
                rows: Box::new(all.map(Ok)),
                applied: QueryHints::NONE,
            });
        }

        trace!(table = %ctx.table, hints = %ctx.hints, "applying hints in memory source");

        // Predicate first, then DISTINCT, then SKIP/TAKE.
        let mut stream: RowStream = match &ctx.predicate {
            Some(predicate) => {
                let shape = RowShape::for_source(&ctx.table.alias, &self.schema);
                let predicate = ExpressionBinder::new(&shape).bind_predicate(predicate)?;
                Box::new(all.filter_map(move |row| match predicate.eval_predicate(&row) {
                    Ok(true) => Some(Ok(row)),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                }))
            }
            None => Box::new(all.map(Ok)),
        };

        if ctx.hints.is_distinct {
            let mut seen: HashSet<Row, RandomState> = HashSet::default();
            stream = Box::new(stream.filter(move |row| match row {
                Ok(row) => seen.insert(row.clone()),
                Err(_) => true,
            }));
        }
        if let Some(skip) = ctx.hints.skip {
            stream = Box::new(stream.skip(usize::try_from(skip).unwrap_or(usize::MAX)));
        }
        if let Some(take) = ctx.hints.take {
            stream = Box::new(stream.take(usize::try_from(take).unwrap_or(usize::MAX)));
        }

        Ok(SourceScan {
            rows: stream,
            applied: ctx.hints,
        })
    }
}

/// Catalog of sources keyed by `schema.method`.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    sources: HashMap<String, Arc<dyn DataSource>, RandomState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        schema: &str,
        method: &str,
        source: Arc<dyn DataSource>,
    ) -> Option<Arc<dyn DataSource>> {
        self.sources.insert(format!("{schema}.{method}"), source)
    }
}

impl SourceCatalog for MemoryCatalog {
    fn resolve(&self, table: &TableReference) -> Result<Arc<dyn DataSource>> {
        self.sources
            .get(&format!("{}.{}", table.schema, table.method))
            .cloned()
            .ok_or_else(|| {
                DbError::structural(format!(
                    "Unknown data source '#{}.{}'",
                    table.schema, table.method
                ))
                .with_field("alias", &table.alias)
            })
    }
}

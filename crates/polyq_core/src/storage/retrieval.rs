use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::expr::Expression;
use crate::logical::query::TableReference;
use crate::runtime::cancel::CancellationToken;

/// SKIP/TAKE/DISTINCT hints a data source may apply while retrieving rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryHints {
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub is_distinct: bool,
}

impl QueryHints {
    /// Neutral hints, the source must return everything.
    pub const NONE: QueryHints = QueryHints {
        skip: None,
        take: None,
        is_distinct: false,
    };

    pub const fn has_optimization_hints(&self) -> bool {
        self.skip.is_some() || self.take.is_some() || self.is_distinct
    }
}

impl fmt::Display for QueryHints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_optimization_hints() {
            return write!(f, "none");
        }
        let mut parts = Vec::new();
        if let Some(skip) = self.skip {
            parts.push(format!("skip={skip}"));
        }
        if let Some(take) = self.take {
            parts.push(format!("take={take}"));
        }
        if self.is_distinct {
            parts.push("distinct".to_string());
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Everything a data source receives for a single retrieval.
///
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct RetrievalContext {
    pub table: TableReference,
    pub hints: QueryHints,
    pub env: Arc<HashMap<String, String>>,
    pub cancel: CancellationToken,
    /// WHERE predicate of a single-table query, expressed against the
    /// table's alias.
    pub predicate: Option<Expression>,
}

impl RetrievalContext {
    pub fn new(table: TableReference, cancel: CancellationToken) -> Self {
        RetrievalContext {
            table,
            hints: QueryHints::NONE,
            env: Arc::new(HashMap::new()),
            cancel,
            predicate: None,
        }
    }

    pub fn with_hints(mut self, hints: QueryHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_env(mut self, env: Arc<HashMap<String, String>>) -> Self {
        self.env = env;
        self
    }

    pub fn with_predicate(mut self, predicate: Option<Expression>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(|s| s.as_str())
    }
}

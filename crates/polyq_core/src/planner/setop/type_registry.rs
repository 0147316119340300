use polyq_error::{DbError, ErrorKind, Result};

use crate::arrays::datatype::DataType;
use crate::arrays::field::{ColumnSchema, Field};

/// Per-position resolved types of a set operation chain.
///
/// A position typed `Null` is pending resolution: every branch seen so far
/// projected a bare NULL there. Merging never mutates, it returns a new
/// registry so the value can be threaded through each step of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnTypeRegistry {
    /// Output names, taken from the first branch.
    names: Vec<String>,
    types: Vec<DataType>,
}

impl ColumnTypeRegistry {
    /// Create a registry from the first branch of a chain.
    pub fn from_schema(schema: &ColumnSchema) -> Self {
        ColumnTypeRegistry {
            names: schema.names().map(|s| s.to_string()).collect(),
            types: schema.datatypes().collect(),
        }
    }

    /// Merge the types of another branch.
    ///
    /// The first concrete type seen at a position fixes it. Errors if the
    /// branch has a different number of columns, or asserts a concrete type
    /// different from an already resolved one.
    pub fn merge_branch(&self, branch: usize, schema: &ColumnSchema) -> Result<Self> {
        if schema.num_columns() != self.types.len() {
            return Err(DbError::structural(format!(
                "Set operation branch {branch} has {} columns, expected {}",
                schema.num_columns(),
                self.types.len()
            ))
            .with_field("branch", branch));
        }

        let mut types = Vec::with_capacity(self.types.len());
        for (position, (&resolved, incoming)) in
            self.types.iter().zip(schema.datatypes()).enumerate()
        {
            let datatype = match (resolved, incoming) {
                (DataType::Null, other) => other,
                (resolved, DataType::Null) => resolved,
                (resolved, incoming) if resolved == incoming => resolved,
                (resolved, incoming) => {
                    return Err(DbError::new(format!(
                        "Set operation type mismatch for column '{}' at position {position}: {resolved} vs {incoming}",
                        self.names[position],
                    ))
                    .with_kind(ErrorKind::SetOperatorType)
                    .with_field("position", position)
                    .with_field("column", &self.names[position])
                    .with_field("left_type", resolved)
                    .with_field("right_type", incoming)
                    .with_field("branch", branch));
                }
            };
            types.push(datatype);
        }

        Ok(ColumnTypeRegistry {
            names: self.names.clone(),
            types,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    /// Resolved type at a position, None if still pending.
    pub fn resolved_type(&self, position: usize) -> Option<DataType> {
        self.types
            .get(position)
            .copied()
            .filter(|datatype| !datatype.is_null())
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.types.iter().all(|t| !t.is_null())
    }

    pub fn to_schema(&self) -> ColumnSchema {
        ColumnSchema::new(
            self.names
                .iter()
                .zip(&self.types)
                .map(|(name, &datatype)| Field::new(name.clone(), datatype)),
        )
    }
}

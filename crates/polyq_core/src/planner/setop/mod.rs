pub mod type_registry;

use polyq_error::{DbError, ErrorKind, Result};
use tracing::debug;
use type_registry::ColumnTypeRegistry;

use crate::arrays::datatype::DataType;
use crate::arrays::field::ColumnSchema;
use crate::explain::explainable::{ColumnIndexes, ExplainEntry, Explainable};
use crate::logical::query::SetOpKind;

/// Schema and key list of a branch being combined into a chain.
#[derive(Debug, Clone, Copy)]
pub struct SetOpBranchInput<'a> {
    pub kind: SetOpKind,
    /// Key column names. Empty means all columns.
    pub keys: &'a [String],
    pub schema: &'a ColumnSchema,
}

/// One step of a chain: `accumulated <kind> branch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOpStep {
    pub kind: SetOpKind,
    /// Key positions in the accumulated output.
    pub left_keys: Vec<usize>,
    /// Key positions in the branch being combined.
    pub right_keys: Vec<usize>,
    /// Types resolved after this step.
    pub resolved_types: Vec<DataType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOperationPlan {
    pub steps: Vec<SetOpStep>,
    pub registry: ColumnTypeRegistry,
}

impl SetOperationPlan {
    /// Output schema of the full chain, with resolved types.
    pub fn output_schema(&self) -> ColumnSchema {
        self.registry.to_schema()
    }
}

impl Explainable for SetOpStep {
    fn explain_entry(&self) -> ExplainEntry {
        ExplainEntry::new(self.kind.to_string())
            .with_value("left_keys", ColumnIndexes(&self.left_keys))
            .with_value("right_keys", ColumnIndexes(&self.right_keys))
            .with_values("types", &self.resolved_types)
    }
}

/// Plans multi-branch set operation chains.
///
/// Chains associate left to right. Types are resolved by threading a
/// `ColumnTypeRegistry` through the steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOperationEngine;

impl SetOperationEngine {
    pub fn plan<'a>(
        &self,
        first: &ColumnSchema,
        branches: impl IntoIterator<Item = SetOpBranchInput<'a>>,
    ) -> Result<SetOperationPlan> {
        let mut registry = ColumnTypeRegistry::from_schema(first);
        let mut steps = Vec::new();

        for (idx, branch) in branches.into_iter().enumerate() {
            // Branch 0 is the first select.
            let branch_idx = idx + 1;
            registry = registry.merge_branch(branch_idx, branch.schema)?;

            let (left_keys, right_keys) = if branch.keys.is_empty() {
                let all: Vec<usize> = (0..branch.schema.num_columns()).collect();
                (all.clone(), all)
            } else {
                let mut left_keys = Vec::with_capacity(branch.keys.len());
                let mut right_keys = Vec::with_capacity(branch.keys.len());
                for key in branch.keys {
                    left_keys.push(resolve_key(key, registry.names().iter(), 0, branch.kind)?);
                    right_keys.push(resolve_key(
                        key,
                        branch.schema.fields.iter().map(|f| &f.name),
                        branch_idx,
                        branch.kind,
                    )?);
                }
                (left_keys, right_keys)
            };

            steps.push(SetOpStep {
                kind: branch.kind,
                left_keys,
                right_keys,
                resolved_types: registry.types().to_vec(),
            });
        }

        debug!(
            steps = steps.len(),
            types = ?registry.types(),
            fully_resolved = registry.is_fully_resolved(),
            "planned set operation chain"
        );

        Ok(SetOperationPlan { steps, registry })
    }
}

fn resolve_key<'a>(
    key: &str,
    mut names: impl Iterator<Item = &'a String>,
    branch: usize,
    kind: SetOpKind,
) -> Result<usize> {
    names.position(|name| name == key).ok_or_else(|| {
        DbError::new(format!(
            "Key column '{key}' for {kind} not found in branch {branch}"
        ))
        .with_kind(ErrorKind::SetOperatorKey)
        .with_field("key", key)
        .with_field("branch", branch)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::field::Field;

    fn schema(fields: &[(&str, DataType)]) -> ColumnSchema {
        ColumnSchema::new(fields.iter().map(|(n, t)| Field::new(*n, *t)))
    }

    #[test]
    fn three_way_null_inference() {
        let b1 = schema(&[("City", DataType::Null)]);
        let b2 = schema(&[("City", DataType::Utf8)]);
        let b3 = schema(&[("City", DataType::Null)]);

        let plan = SetOperationEngine
            .plan(
                &b1,
                [
                    SetOpBranchInput {
                        kind: SetOpKind::Union,
                        keys: &[],
                        schema: &b2,
                    },
                    SetOpBranchInput {
                        kind: SetOpKind::UnionAll,
                        keys: &[],
                        schema: &b3,
                    },
                ],
            )
            .unwrap();

        assert_eq!(vec![DataType::Utf8], plan.steps[0].resolved_types);
        assert_eq!(vec![DataType::Utf8], plan.steps[1].resolved_types);
        assert_eq!(
            Some(DataType::Utf8),
            plan.output_schema().datatypes().next()
        );
    }

    #[test]
    fn concrete_mismatch() {
        let b1 = schema(&[("x", DataType::Utf8)]);
        let b2 = schema(&[("x", DataType::Int64)]);
        let err = SetOperationEngine
            .plan(
                &b1,
                [SetOpBranchInput {
                    kind: SetOpKind::Intersect,
                    keys: &[],
                    schema: &b2,
                }],
            )
            .unwrap_err();
        assert_eq!(ErrorKind::SetOperatorType, err.kind());
    }

    #[test]
    fn keys_resolved_by_name_on_each_side() {
        let b1 = schema(&[("id", DataType::Int64), ("name", DataType::Utf8)]);
        let b2 = schema(&[("ident", DataType::Int64), ("name", DataType::Utf8)]);
        let keys = vec!["name".to_string()];
        let plan = SetOperationEngine
            .plan(
                &b1,
                [SetOpBranchInput {
                    kind: SetOpKind::Except,
                    keys: &keys,
                    schema: &b2,
                }],
            )
            .unwrap();
        assert_eq!(vec![1], plan.steps[0].left_keys);
        assert_eq!(vec![1], plan.steps[0].right_keys);
        assert_eq!(vec!["id", "name"], plan.output_schema().names().collect::<Vec<_>>());
    }

    #[test]
    fn missing_key() {
        let b1 = schema(&[("id", DataType::Int64)]);
        let b2 = schema(&[("other", DataType::Int64)]);
        let keys = vec!["id".to_string()];
        let err = SetOperationEngine
            .plan(
                &b1,
                [SetOpBranchInput {
                    kind: SetOpKind::Union,
                    keys: &keys,
                    schema: &b2,
                }],
            )
            .unwrap_err();
        assert_eq!(ErrorKind::SetOperatorKey, err.kind());
        assert_eq!(Some("id"), err.get_field("key"));
        assert_eq!(Some("1"), err.get_field("branch"));
    }
}

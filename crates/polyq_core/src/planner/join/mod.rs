use std::fmt;

use polyq_error::{DbError, Result};
use tracing::debug;

use super::expr_binder::ExpressionBinder;
use super::row_shape::RowShape;
use crate::arrays::scalar::ScalarValue;
use crate::explain::explainable::{ExplainEntry, Explainable};
use crate::expr::Expression;
use crate::expr::comparison_expr::{ComparisonExpr, ComparisonOperator};
use crate::expr::physical::PhysicalScalarExpression;
use crate::expr::split::split_conjunction;
use crate::logical::query::JoinKind;

/// Which input the hash table is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildSide {
    Left,
    Right,
}

impl fmt::Display for BuildSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashJoinPlan {
    pub build_side: BuildSide,
    /// Key expressions bound against the left input's shape.
    pub left_keys: Vec<PhysicalScalarExpression>,
    /// Key expressions bound against the right input's shape, paired
    /// positionally with `left_keys`.
    pub right_keys: Vec<PhysicalScalarExpression>,
}

impl HashJoinPlan {
    /// Keys for the build input.
    pub fn build_keys(&self) -> &[PhysicalScalarExpression] {
        match self.build_side {
            BuildSide::Left => &self.left_keys,
            BuildSide::Right => &self.right_keys,
        }
    }

    /// Keys for the probe input.
    pub fn probe_keys(&self) -> &[PhysicalScalarExpression] {
        match self.build_side {
            BuildSide::Left => &self.right_keys,
            BuildSide::Right => &self.left_keys,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedLoopPlan {
    /// Predicate bound against the joined (left then right) shape.
    pub predicate: PhysicalScalarExpression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinStrategy {
    Hash(HashJoinPlan),
    NestedLoop(NestedLoopPlan),
    /// Cartesian product without a predicate.
    Cross,
}

impl JoinStrategy {
    pub fn is_hash(&self) -> bool {
        matches!(self, JoinStrategy::Hash(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hash(_) => "HashJoin",
            Self::NestedLoop(_) => "NestedLoopJoin",
            Self::Cross => "CrossProduct",
        }
    }
}

/// A join with its physical strategy decided.
#[derive(Debug, Clone)]
pub struct CompiledJoin {
    pub kind: JoinKind,
    pub strategy: JoinStrategy,
    pub left_width: usize,
    pub right_width: usize,
    /// Shape of the output rows, all left columns followed by all right
    /// columns, regardless of build side.
    pub output_shape: RowShape,
}

impl Explainable for CompiledJoin {
    fn explain_entry(&self) -> ExplainEntry {
        let ent = ExplainEntry::new(self.strategy.name()).with_value("join_type", self.kind);
        match &self.strategy {
            JoinStrategy::Hash(plan) => ent
                .with_value("build_side", plan.build_side)
                .with_values("left_keys", &plan.left_keys)
                .with_values("right_keys", &plan.right_keys),
            JoinStrategy::NestedLoop(plan) => ent.with_value("predicate", &plan.predicate),
            JoinStrategy::Cross => ent,
        }
    }
}

/// Decides hash join vs. nested loop for each join in a FROM graph.
#[derive(Debug, Clone, Copy)]
pub struct JoinStrategyCompiler {
    pub enable_hash_joins: bool,
}

impl Default for JoinStrategyCompiler {
    fn default() -> Self {
        JoinStrategyCompiler {
            enable_hash_joins: true,
        }
    }
}

impl JoinStrategyCompiler {
    /// Compile a single join.
    ///
    /// `left` is the shape of the left input, which for a chained join is the
    /// output shape of the previous join. Keys are resolved through it, so
    /// the n-th join of a chain is treated the same as the first.
    pub fn compile(
        &self,
        kind: JoinKind,
        condition: Option<&Expression>,
        left: &RowShape,
        right: &RowShape,
    ) -> Result<CompiledJoin> {
        let output_shape = RowShape::join(left, right)?;

        let strategy = match (kind, condition) {
            (JoinKind::Cross, Some(condition)) => {
                return Err(DbError::structural("CROSS join cannot have an ON condition")
                    .with_field("condition", condition));
            }
            (JoinKind::Cross, None) | (JoinKind::Inner, None) => JoinStrategy::Cross,
            (_, None) => JoinStrategy::NestedLoop(NestedLoopPlan {
                predicate: PhysicalScalarExpression::Literal(ScalarValue::Boolean(true)),
            }),
            (_, Some(condition)) => {
                let hash = if self.enable_hash_joins {
                    self.try_hash_plan(kind, condition, left, right)?
                } else {
                    None
                };
                match hash {
                    Some(plan) => JoinStrategy::Hash(plan),
                    None => {
                        let predicate =
                            ExpressionBinder::new(&output_shape).bind_predicate(condition)?;
                        JoinStrategy::NestedLoop(NestedLoopPlan { predicate })
                    }
                }
            }
        };

        debug!(
            %kind,
            strategy = strategy.name(),
            condition = ?condition.map(|c| c.to_string()),
            "compiled join"
        );

        Ok(CompiledJoin {
            kind,
            strategy,
            left_width: left.len(),
            right_width: right.len(),
            output_shape,
        })
    }

    /// Try to produce a hash join plan.
    ///
    /// Every conjunct must be an equality whose operands each reference
    /// exactly one input, with the two operands on different inputs. Returns
    /// None if the condition doesn't fit.
    fn try_hash_plan(
        &self,
        kind: JoinKind,
        condition: &Expression,
        left: &RowShape,
        right: &RowShape,
    ) -> Result<Option<HashJoinPlan>> {
        let mut conjuncts = Vec::new();
        split_conjunction(condition, &mut conjuncts);

        let left_binder = ExpressionBinder::new(left);
        let right_binder = ExpressionBinder::new(right);

        let mut left_keys = Vec::with_capacity(conjuncts.len());
        let mut right_keys = Vec::with_capacity(conjuncts.len());

        for conjunct in conjuncts {
            let mut cmp = match conjunct {
                Expression::Comparison(
                    cmp @ ComparisonExpr {
                        op: ComparisonOperator::Eq,
                        ..
                    },
                ) => cmp,
                _ => return Ok(None),
            };

            match (
                input_side(&cmp.left, left, right)?,
                input_side(&cmp.right, left, right)?,
            ) {
                (Some(InputSide::Left), Some(InputSide::Right)) => (),
                (Some(InputSide::Right), Some(InputSide::Left)) => cmp.flip_sides(),
                _ => return Ok(None),
            }

            left_keys.push(left_binder.bind(&cmp.left)?);
            right_keys.push(right_binder.bind(&cmp.right)?);
        }

        let build_side = match kind {
            JoinKind::Right => BuildSide::Left,
            _ => BuildSide::Right,
        };

        Ok(Some(HashJoinPlan {
            build_side,
            left_keys,
            right_keys,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputSide {
    Left,
    Right,
}

/// Determine which single input an expression reads from.
///
/// Returns None if the expression references no columns, or columns from
/// both inputs.
fn input_side(expr: &Expression, left: &RowShape, right: &RowShape) -> Result<Option<InputSide>> {
    let mut side = None;
    for col in expr.column_refs() {
        let alias = col.alias.as_deref();
        let in_left = left.try_resolve(alias, &col.name)?.is_some();
        let in_right = right.try_resolve(alias, &col.name)?.is_some();

        let col_side = match (in_left, in_right) {
            (true, false) => InputSide::Left,
            (false, true) => InputSide::Right,
            (true, true) => {
                return Err(DbError::structural(format!(
                    "Column reference '{col}' is ambiguous between join inputs"
                )));
            }
            (false, false) => {
                return Err(DbError::structural(format!("Missing column '{col}'"))
                    .with_field("left", left)
                    .with_field("right", right));
            }
        };

        match side {
            None => side = Some(col_side),
            Some(existing) if existing != col_side => return Ok(None),
            Some(_) => (),
        }
    }
    Ok(side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::datatype::DataType;
    use crate::arrays::field::{ColumnSchema, Field};
    use crate::expr::arith_expr::ArithOperator;
    use crate::expr::{and, arith, column, compare, eq, lit, or};

    fn cities(alias: &str) -> RowShape {
        let schema = ColumnSchema::new([
            Field::new("City", DataType::Utf8),
            Field::new("Population", DataType::Int64),
        ]);
        RowShape::for_source(alias, &schema)
    }

    fn positions(keys: &[PhysicalScalarExpression]) -> Vec<usize> {
        keys.iter().map(|k| k.as_column_idx().unwrap()).collect()
    }

    #[test]
    fn single_equality_is_hash() {
        let compiled = JoinStrategyCompiler::default()
            .compile(
                JoinKind::Inner,
                Some(&eq(column("a", "City"), column("b", "City"))),
                &cities("a"),
                &cities("b"),
            )
            .unwrap();

        let JoinStrategy::Hash(plan) = compiled.strategy else {
            panic!("expected hash join");
        };
        assert_eq!(BuildSide::Right, plan.build_side);
        assert_eq!(vec![0], positions(&plan.left_keys));
        assert_eq!(vec![0], positions(&plan.right_keys));
        assert_eq!(4, compiled.output_shape.len());
    }

    #[test]
    fn reversed_operands_flipped() {
        let compiled = JoinStrategyCompiler::default()
            .compile(
                JoinKind::Left,
                Some(&eq(column("b", "Population"), column("a", "City"))),
                &cities("a"),
                &cities("b"),
            )
            .unwrap();

        let JoinStrategy::Hash(plan) = compiled.strategy else {
            panic!("expected hash join");
        };
        assert_eq!(vec![0], positions(&plan.left_keys));
        assert_eq!(vec![1], positions(&plan.right_keys));
    }

    #[test]
    fn chained_join_keys_resolve_through_shape() {
        let compiler = JoinStrategyCompiler::default();
        let first = compiler
            .compile(
                JoinKind::Inner,
                Some(&eq(column("a", "City"), column("b", "City"))),
                &cities("a"),
                &cities("b"),
            )
            .unwrap();

        let second = compiler
            .compile(
                JoinKind::Inner,
                Some(&and([
                    eq(column("b", "Population"), column("c", "Population")),
                    eq(column("c", "City"), column("a", "City")),
                ])),
                &first.output_shape,
                &cities("c"),
            )
            .unwrap();

        let JoinStrategy::Hash(plan) = second.strategy else {
            panic!("expected hash join");
        };
        assert_eq!(vec![3, 0], positions(&plan.left_keys));
        assert_eq!(vec![1, 0], positions(&plan.right_keys));
        assert_eq!(6, second.output_shape.len());
    }

    #[test]
    fn right_join_builds_left() {
        let compiled = JoinStrategyCompiler::default()
            .compile(
                JoinKind::Right,
                Some(&eq(column("a", "City"), column("b", "City"))),
                &cities("a"),
                &cities("b"),
            )
            .unwrap();
        let JoinStrategy::Hash(plan) = compiled.strategy else {
            panic!("expected hash join");
        };
        assert_eq!(BuildSide::Left, plan.build_side);
        assert_eq!(vec![0], positions(plan.build_keys()));
    }

    #[test]
    fn non_decomposable_falls_back() {
        let conditions = [
            // Non-equality.
            compare(
                ComparisonOperator::Lt,
                column("a", "Population"),
                column("b", "Population"),
            ),
            // OR mixing both sides.
            or([
                eq(column("a", "City"), column("b", "City")),
                eq(column("a", "Population"), column("b", "Population")),
            ]),
            // Operand mixing both inputs.
            eq(
                arith(
                    ArithOperator::Add,
                    column("a", "Population"),
                    column("b", "Population"),
                ),
                lit(10_i64),
            ),
            // Equality with one side only.
            eq(column("a", "City"), column("a", "City")),
            // Equality plus a filter-like term.
            and([
                eq(column("a", "City"), column("b", "City")),
                compare(ComparisonOperator::Gt, column("b", "Population"), lit(0_i64)),
            ]),
        ];

        for condition in conditions {
            let compiled = JoinStrategyCompiler::default()
                .compile(JoinKind::Inner, Some(&condition), &cities("a"), &cities("b"))
                .unwrap();
            assert!(
                matches!(compiled.strategy, JoinStrategy::NestedLoop(_)),
                "condition: {condition}"
            );
        }
    }

    #[test]
    fn hash_joins_disabled() {
        let compiled = JoinStrategyCompiler {
            enable_hash_joins: false,
        }
        .compile(
            JoinKind::Inner,
            Some(&eq(column("a", "City"), column("b", "City"))),
            &cities("a"),
            &cities("b"),
        )
        .unwrap();
        assert!(matches!(compiled.strategy, JoinStrategy::NestedLoop(_)));
    }

    #[test]
    fn missing_condition() {
        let compiler = JoinStrategyCompiler::default();
        let cross = compiler
            .compile(JoinKind::Cross, None, &cities("a"), &cities("b"))
            .unwrap();
        assert_eq!(JoinStrategy::Cross, cross.strategy);

        let left = compiler
            .compile(JoinKind::Left, None, &cities("a"), &cities("b"))
            .unwrap();
        assert!(matches!(left.strategy, JoinStrategy::NestedLoop(_)));
    }

    #[test]
    fn missing_key_column() {
        let err = JoinStrategyCompiler::default()
            .compile(
                JoinKind::Inner,
                Some(&eq(column("a", "Country"), column("b", "City"))),
                &cities("a"),
                &cities("b"),
            )
            .unwrap_err();
        assert_eq!(polyq_error::ErrorKind::Structural, err.kind());
    }
}

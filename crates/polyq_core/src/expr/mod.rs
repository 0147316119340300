pub mod arith_expr;
pub mod column_expr;
pub mod comparison_expr;
pub mod conjunction_expr;
pub mod literal_expr;
pub mod negate_expr;
pub mod physical;
pub mod split;

use std::fmt;

use arith_expr::{ArithExpr, ArithOperator};
use column_expr::ColumnExpr;
use comparison_expr::{ComparisonExpr, ComparisonOperator};
use conjunction_expr::{ConjunctionExpr, ConjunctionOperator};
use literal_expr::LiteralExpr;
use negate_expr::{IsNullExpr, NotExpr};
use serde::{Deserialize, Serialize};

use crate::arrays::scalar::ScalarValue;

/// A logical expression as handed over by the binder.
///
/// Column references are by (optional alias, name) and are resolved to
/// positions when bound against a row shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    Column(ColumnExpr),
    Literal(LiteralExpr),
    Comparison(ComparisonExpr),
    Conjunction(ConjunctionExpr),
    Arith(ArithExpr),
    Not(NotExpr),
    IsNull(IsNullExpr),
}

impl Expression {
    /// Collect all column references in this expression.
    pub fn column_refs(&self) -> Vec<&ColumnExpr> {
        fn inner<'a>(expr: &'a Expression, out: &mut Vec<&'a ColumnExpr>) {
            match expr {
                Expression::Column(col) => out.push(col),
                Expression::Literal(_) => (),
                Expression::Comparison(expr) => {
                    inner(&expr.left, out);
                    inner(&expr.right, out);
                }
                Expression::Conjunction(expr) => {
                    for child in &expr.expressions {
                        inner(child, out);
                    }
                }
                Expression::Arith(expr) => {
                    inner(&expr.left, out);
                    inner(&expr.right, out);
                }
                Expression::Not(expr) => inner(&expr.expr, out),
                Expression::IsNull(expr) => inner(&expr.expr, out),
            }
        }

        let mut out = Vec::new();
        inner(self, &mut out);
        out
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(
            self,
            Expression::Literal(LiteralExpr {
                literal: ScalarValue::Null
            })
        )
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(expr) => write!(f, "{expr}"),
            Self::Literal(expr) => write!(f, "{expr}"),
            Self::Comparison(expr) => write!(f, "{expr}"),
            Self::Conjunction(expr) => write!(f, "{expr}"),
            Self::Arith(expr) => write!(f, "{expr}"),
            Self::Not(expr) => write!(f, "{expr}"),
            Self::IsNull(expr) => write!(f, "{expr}"),
        }
    }
}

/// Column reference qualified by a source alias, e.g. `a.Population`.
pub fn column(alias: impl Into<String>, name: impl Into<String>) -> Expression {
    Expression::Column(ColumnExpr {
        alias: Some(alias.into()),
        name: name.into(),
    })
}

/// Column reference without an alias.
pub fn unqualified(name: impl Into<String>) -> Expression {
    Expression::Column(ColumnExpr {
        alias: None,
        name: name.into(),
    })
}

pub fn lit(literal: impl Into<ScalarValue>) -> Expression {
    Expression::Literal(LiteralExpr {
        literal: literal.into(),
    })
}

pub fn null() -> Expression {
    lit(ScalarValue::Null)
}

pub fn compare(op: ComparisonOperator, left: Expression, right: Expression) -> Expression {
    Expression::Comparison(ComparisonExpr {
        left: Box::new(left),
        right: Box::new(right),
        op,
    })
}

pub fn eq(left: Expression, right: Expression) -> Expression {
    compare(ComparisonOperator::Eq, left, right)
}

pub fn and(expressions: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::Conjunction(ConjunctionExpr {
        op: ConjunctionOperator::And,
        expressions: expressions.into_iter().collect(),
    })
}

pub fn or(expressions: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::Conjunction(ConjunctionExpr {
        op: ConjunctionOperator::Or,
        expressions: expressions.into_iter().collect(),
    })
}

pub fn arith(op: ArithOperator, left: Expression, right: Expression) -> Expression {
    Expression::Arith(ArithExpr {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn not(expr: Expression) -> Expression {
    Expression::Not(NotExpr {
        expr: Box::new(expr),
    })
}

pub fn is_null(expr: Expression) -> Expression {
    Expression::IsNull(IsNullExpr {
        expr: Box::new(expr),
        negated: false,
    })
}

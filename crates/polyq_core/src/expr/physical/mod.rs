use std::fmt;

use polyq_error::{DbError, Result};

use crate::arrays::datatype::DataType;
use crate::arrays::row::Row;
use crate::arrays::scalar::ScalarValue;
use crate::expr::arith_expr::ArithOperator;
use crate::expr::comparison_expr::ComparisonOperator;
use crate::expr::conjunction_expr::ConjunctionOperator;

/// An expression bound to positions in a row.
///
/// Column references have already been resolved through a row shape, so
/// evaluation never looks at names.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalScalarExpression {
    Column(PhysicalColumnExpr),
    Literal(ScalarValue),
    Comparison {
        left: Box<PhysicalScalarExpression>,
        right: Box<PhysicalScalarExpression>,
        op: ComparisonOperator,
    },
    Conjunction {
        op: ConjunctionOperator,
        expressions: Vec<PhysicalScalarExpression>,
    },
    Arith {
        op: ArithOperator,
        left: Box<PhysicalScalarExpression>,
        right: Box<PhysicalScalarExpression>,
        datatype: DataType,
    },
    Not(Box<PhysicalScalarExpression>),
    IsNull {
        expr: Box<PhysicalScalarExpression>,
        negated: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalColumnExpr {
    pub idx: usize,
    pub datatype: DataType,
}

impl PhysicalScalarExpression {
    pub fn column(idx: usize, datatype: DataType) -> Self {
        PhysicalScalarExpression::Column(PhysicalColumnExpr { idx, datatype })
    }

    pub fn datatype(&self) -> DataType {
        match self {
            Self::Column(col) => col.datatype,
            Self::Literal(lit) => lit.datatype(),
            Self::Comparison { .. } | Self::Conjunction { .. } | Self::Not(_) => DataType::Boolean,
            Self::IsNull { .. } => DataType::Boolean,
            Self::Arith { datatype, .. } => *datatype,
        }
    }

    /// Returns the column index if this is a plain column reference.
    pub fn as_column_idx(&self) -> Option<usize> {
        match self {
            Self::Column(col) => Some(col.idx),
            _ => None,
        }
    }

    pub fn eval(&self, row: &Row) -> Result<ScalarValue> {
        match self {
            Self::Column(col) => row.get(col.idx).cloned().ok_or_else(|| {
                DbError::new("Column index out of range for row")
                    .with_field("index", col.idx)
                    .with_field("row_width", row.len())
            }),
            Self::Literal(lit) => Ok(lit.clone()),
            Self::Comparison { left, right, op } => {
                let left = left.eval(row)?;
                let right = right.eval(row)?;
                Ok(match left.sql_compare(&right) {
                    Some(ord) => ScalarValue::Boolean(op.is_satisfied_by(ord)),
                    None => ScalarValue::Null,
                })
            }
            Self::Conjunction { op, expressions } => eval_conjunction(*op, expressions, row),
            Self::Arith {
                op, left, right, ..
            } => eval_arith(*op, left.eval(row)?, right.eval(row)?),
            Self::Not(expr) => Ok(match expr.eval(row)?.try_as_bool()? {
                Some(b) => ScalarValue::Boolean(!b),
                None => ScalarValue::Null,
            }),
            Self::IsNull { expr, negated } => {
                let is_null = expr.eval(row)?.is_null();
                Ok(ScalarValue::Boolean(is_null != *negated))
            }
        }
    }

    /// Evaluate as a filter predicate. NULL is treated as false.
    pub fn eval_predicate(&self, row: &Row) -> Result<bool> {
        Ok(self.eval(row)?.try_as_bool()?.unwrap_or(false))
    }
}

fn eval_conjunction(
    op: ConjunctionOperator,
    expressions: &[PhysicalScalarExpression],
    row: &Row,
) -> Result<ScalarValue> {
    // Three-valued logic. The short circuit value is `false` for AND and
    // `true` for OR.
    let short_circuit = matches!(op, ConjunctionOperator::Or);
    let mut saw_null = false;

    for expr in expressions {
        match expr.eval(row)?.try_as_bool()? {
            Some(b) if b == short_circuit => return Ok(ScalarValue::Boolean(short_circuit)),
            Some(_) => (),
            None => saw_null = true,
        }
    }

    if saw_null {
        Ok(ScalarValue::Null)
    } else {
        Ok(ScalarValue::Boolean(!short_circuit))
    }
}

fn eval_arith(op: ArithOperator, left: ScalarValue, right: ScalarValue) -> Result<ScalarValue> {
    match (left, right) {
        (ScalarValue::Null, _) | (_, ScalarValue::Null) => Ok(ScalarValue::Null),
        (ScalarValue::Int64(a), ScalarValue::Int64(b)) => {
            let out = match op {
                ArithOperator::Add => a.checked_add(b),
                ArithOperator::Sub => a.checked_sub(b),
                ArithOperator::Mul => a.checked_mul(b),
                ArithOperator::Div => {
                    if b == 0 {
                        return Err(DbError::new("Division by zero"));
                    }
                    a.checked_div(b)
                }
            };
            out.map(ScalarValue::Int64).ok_or_else(|| {
                DbError::new("Integer overflow")
                    .with_field("left", a)
                    .with_field("op", op)
                    .with_field("right", b)
            })
        }
        (ScalarValue::Utf8(a), ScalarValue::Utf8(b)) if op == ArithOperator::Add => {
            Ok(ScalarValue::Utf8(a + &b))
        }
        (left, right) => {
            let (a, b) = match (as_f64(&left), as_f64(&right)) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(DbError::new(format!(
                        "Cannot apply '{op}' to {left} and {right}"
                    )));
                }
            };
            Ok(ScalarValue::Float64(match op {
                ArithOperator::Add => a + b,
                ArithOperator::Sub => a - b,
                ArithOperator::Mul => a * b,
                ArithOperator::Div => a / b,
            }))
        }
    }
}

fn as_f64(value: &ScalarValue) -> Option<f64> {
    match value {
        ScalarValue::Int64(v) => Some(*v as f64),
        ScalarValue::Float64(v) => Some(*v),
        _ => None,
    }
}

/// Output type of an arithmetic expression given its input types.
pub fn arith_output_type(op: ArithOperator, left: DataType, right: DataType) -> Result<DataType> {
    match (left, right) {
        (DataType::Null, other) | (other, DataType::Null) => Ok(other),
        (DataType::Int64, DataType::Int64) => Ok(DataType::Int64),
        (a, b) if a.is_numeric() && b.is_numeric() => Ok(DataType::Float64),
        (DataType::Utf8, DataType::Utf8) if op == ArithOperator::Add => Ok(DataType::Utf8),
        (a, b) => Err(DbError::new(format!("Cannot apply '{op}' to {a} and {b}"))),
    }
}

impl fmt::Display for PhysicalScalarExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(col) => write!(f, "#{}", col.idx),
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Comparison { left, right, op } => write!(f, "{left} {op} {right}"),
            Self::Conjunction { op, expressions } => {
                write!(f, "(")?;
                for (idx, expr) in expressions.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " {op} ")?;
                    }
                    write!(f, "{expr}")?;
                }
                write!(f, ")")
            }
            Self::Arith {
                op, left, right, ..
            } => write!(f, "{left} {op} {right}"),
            Self::Not(expr) => write!(f, "NOT {expr}"),
            Self::IsNull { expr, negated } => {
                if *negated {
                    write!(f, "{expr} IS NOT NULL")
                } else {
                    write!(f, "{expr} IS NULL")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn col(idx: usize) -> Box<PhysicalScalarExpression> {
        Box::new(PhysicalScalarExpression::column(idx, DataType::Int64))
    }

    #[test]
    fn comparison_with_null_is_null() {
        let expr = PhysicalScalarExpression::Comparison {
            left: col(0),
            right: col(1),
            op: ComparisonOperator::Eq,
        };

        assert_eq!(ScalarValue::Null, expr.eval(&row![1_i64, None::<i64>]).unwrap());
        assert_eq!(ScalarValue::Boolean(true), expr.eval(&row![2_i64, 2_i64]).unwrap());
        assert!(!expr.eval_predicate(&row![None::<i64>, None::<i64>]).unwrap());
    }

    #[test]
    fn three_valued_and_or() {
        let null_cmp = PhysicalScalarExpression::Comparison {
            left: col(0),
            right: col(1),
            op: ComparisonOperator::Eq,
        };
        let row = row![None::<i64>, 1_i64];

        let and = PhysicalScalarExpression::Conjunction {
            op: ConjunctionOperator::And,
            expressions: vec![null_cmp.clone(), PhysicalScalarExpression::Literal(false.into())],
        };
        assert_eq!(ScalarValue::Boolean(false), and.eval(&row).unwrap());

        let or = PhysicalScalarExpression::Conjunction {
            op: ConjunctionOperator::Or,
            expressions: vec![null_cmp, PhysicalScalarExpression::Literal(false.into())],
        };
        assert_eq!(ScalarValue::Null, or.eval(&row).unwrap());
    }

    #[test]
    fn arith_overflow_and_division() {
        let add = PhysicalScalarExpression::Arith {
            op: ArithOperator::Add,
            left: col(0),
            right: col(1),
            datatype: DataType::Int64,
        };
        assert!(add.eval(&row![i64::MAX, 1_i64]).is_err());

        let div = PhysicalScalarExpression::Arith {
            op: ArithOperator::Div,
            left: col(0),
            right: col(1),
            datatype: DataType::Int64,
        };
        assert!(div.eval(&row![4_i64, 0_i64]).is_err());
        assert_eq!(ScalarValue::Int64(2), div.eval(&row![4_i64, 2_i64]).unwrap());
    }

    #[test]
    fn arith_types() {
        assert_eq!(
            DataType::Float64,
            arith_output_type(ArithOperator::Mul, DataType::Int64, DataType::Float64).unwrap()
        );
        assert_eq!(
            DataType::Utf8,
            arith_output_type(ArithOperator::Add, DataType::Null, DataType::Utf8).unwrap()
        );
        assert!(arith_output_type(ArithOperator::Sub, DataType::Utf8, DataType::Utf8).is_err());
    }
}

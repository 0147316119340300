use polyq_error::{DbError, Result};

use super::row_shape::RowShape;
use crate::arrays::datatype::DataType;
use crate::expr::Expression;
use crate::expr::physical::{PhysicalScalarExpression, arith_output_type};

/// Binds logical expressions to positional physical expressions using a row
/// shape.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionBinder<'a> {
    shape: &'a RowShape,
}

impl<'a> ExpressionBinder<'a> {
    pub fn new(shape: &'a RowShape) -> Self {
        ExpressionBinder { shape }
    }

    pub fn bind(&self, expr: &Expression) -> Result<PhysicalScalarExpression> {
        Ok(match expr {
            Expression::Column(col) => {
                let idx = self.shape.resolve(col.alias.as_deref(), &col.name)?;
                let datatype = self
                    .shape
                    .column(idx)
                    .map(|c| c.datatype)
                    .unwrap_or(DataType::Null);
                PhysicalScalarExpression::column(idx, datatype)
            }
            Expression::Literal(lit) => PhysicalScalarExpression::Literal(lit.literal.clone()),
            Expression::Comparison(cmp) => PhysicalScalarExpression::Comparison {
                left: Box::new(self.bind(&cmp.left)?),
                right: Box::new(self.bind(&cmp.right)?),
                op: cmp.op,
            },
            Expression::Conjunction(conj) => PhysicalScalarExpression::Conjunction {
                op: conj.op,
                expressions: conj
                    .expressions
                    .iter()
                    .map(|e| self.bind(e))
                    .collect::<Result<Vec<_>>>()?,
            },
            Expression::Arith(arith) => {
                let left = self.bind(&arith.left)?;
                let right = self.bind(&arith.right)?;
                let datatype = arith_output_type(arith.op, left.datatype(), right.datatype())
                    .map_err(|e| {
                        DbError::new(e.get_msg().to_string()).with_field("expression", expr)
                    })?;
                PhysicalScalarExpression::Arith {
                    op: arith.op,
                    left: Box::new(left),
                    right: Box::new(right),
                    datatype,
                }
            }
            Expression::Not(not) => PhysicalScalarExpression::Not(Box::new(self.bind(&not.expr)?)),
            Expression::IsNull(is_null) => PhysicalScalarExpression::IsNull {
                expr: Box::new(self.bind(&is_null.expr)?),
                negated: is_null.negated,
            },
        })
    }

    /// Bind a predicate, checking that it produces a boolean.
    pub fn bind_predicate(&self, expr: &Expression) -> Result<PhysicalScalarExpression> {
        let bound = self.bind(expr)?;
        match bound.datatype() {
            DataType::Boolean | DataType::Null => Ok(bound),
            other => Err(DbError::new(format!(
                "Predicate must evaluate to a boolean, got {other}"
            ))
            .with_field("predicate", expr)),
        }
    }
}

use super::Expression;
use super::conjunction_expr::{ConjunctionExpr, ConjunctionOperator};

/// Recursively split an expression on AND, putting the split expressions in
/// `out`.
pub fn split_conjunction(expr: &Expression, out: &mut Vec<Expression>) {
    match expr {
        Expression::Conjunction(ConjunctionExpr {
            expressions,
            op: ConjunctionOperator::And,
        }) => {
            for expr in expressions {
                split_conjunction(expr, out);
            }
        }
        other => out.push(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{and, column, eq, lit, or};

    #[test]
    fn split_conjunction_none() {
        let expr = lit(4_i64);

        let mut out = Vec::new();
        split_conjunction(&expr, &mut out);

        assert_eq!(vec![expr], out);
    }

    #[test]
    fn split_conjunction_nested_and() {
        let expr = and([
            eq(column("a", "x"), column("b", "x")),
            and([
                eq(column("a", "y"), column("b", "y")),
                eq(column("a", "z"), column("b", "z")),
            ]),
        ]);

        let mut out = Vec::new();
        split_conjunction(&expr, &mut out);

        let expected = vec![
            eq(column("a", "x"), column("b", "x")),
            eq(column("a", "y"), column("b", "y")),
            eq(column("a", "z"), column("b", "z")),
        ];
        assert_eq!(expected, out);
    }

    #[test]
    fn split_conjunction_keeps_or() {
        let expr = or([lit(true), lit(false)]);

        let mut out = Vec::new();
        split_conjunction(&expr, &mut out);

        assert_eq!(vec![expr], out);
    }
}

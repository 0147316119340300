//! The validated query tree handed over by the binder.
//!
//! Everything here is plain data. Names have been parsed and literal values
//! resolved, but column references are still (alias, name) pairs that get
//! resolved during planning.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::arrays::scalar::ScalarValue;
use crate::expr::Expression;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryNode {
    /// Optional WITH block.
    #[serde(default)]
    pub ctes: Option<WithBlock>,
    pub body: QueryBody,
    #[serde(default)]
    pub modifiers: QueryModifiers,
}

impl QueryNode {
    /// Create a query with just a body and no modifiers.
    pub fn new(body: QueryBody) -> Self {
        QueryNode {
            ctes: None,
            body,
            modifiers: QueryModifiers::default(),
        }
    }

    pub fn select(select: SelectNode) -> Self {
        Self::new(QueryBody::Select(select))
    }

    pub fn with_ctes(mut self, ctes: impl IntoIterator<Item = CteDefinition>) -> Self {
        self.ctes = Some(WithBlock {
            ctes: ctes.into_iter().collect(),
        });
        self
    }

    pub fn with_modifiers(mut self, modifiers: QueryModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// ORDER BY, SKIP and TAKE applying to the output of a query body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryModifiers {
    #[serde(default)]
    pub order_by: Vec<OrderByExpr>,
    #[serde(default)]
    pub skip: Option<u64>,
    #[serde(default)]
    pub take: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByExpr {
    pub expr: Expression,
    #[serde(default)]
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithBlock {
    pub ctes: Vec<CteDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CteDefinition {
    pub name: String,
    pub body: QueryNode,
}

impl CteDefinition {
    pub fn new(name: impl Into<String>, body: QueryNode) -> Self {
        CteDefinition {
            name: name.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryBody {
    Select(SelectNode),
    SetOp(SetOpChain),
}

/// A chain of set operations, associating left to right.
///
/// `first UNION (k) second EXCEPT (k) third` is represented as `first` with
/// two steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetOpChain {
    pub first: SelectNode,
    pub steps: Vec<SetOpBranch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetOpBranch {
    pub kind: SetOpKind,
    /// Output column names participating in the key comparison.
    ///
    /// Empty means all columns.
    #[serde(default)]
    pub keys: Vec<String>,
    pub select: SelectNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetOpKind {
    UnionAll,
    Union,
    Except,
    Intersect,
}

impl fmt::Display for SetOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnionAll => write!(f, "UNION ALL"),
            Self::Union => write!(f, "UNION"),
            Self::Except => write!(f, "EXCEPT"),
            Self::Intersect => write!(f, "INTERSECT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectNode {
    pub from: FromNode,
    pub projections: Vec<SelectExpr>,
    #[serde(default)]
    pub where_expr: Option<Expression>,
    #[serde(default)]
    pub group_by: Vec<Expression>,
    #[serde(default)]
    pub having: Option<Expression>,
    #[serde(default)]
    pub distinct: bool,
}

impl SelectNode {
    pub fn new(from: FromNode, projections: impl IntoIterator<Item = SelectExpr>) -> Self {
        SelectNode {
            from,
            projections: projections.into_iter().collect(),
            where_expr: None,
            group_by: Vec::new(),
            having: None,
            distinct: false,
        }
    }

    pub fn with_where(mut self, expr: Expression) -> Self {
        self.where_expr = Some(expr);
        self
    }

    pub fn with_group_by(mut self, exprs: impl IntoIterator<Item = Expression>) -> Self {
        self.group_by = exprs.into_iter().collect();
        self
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectExpr {
    pub expr: Expression,
    #[serde(default)]
    pub alias: Option<String>,
}

impl SelectExpr {
    pub fn new(expr: Expression) -> Self {
        SelectExpr { expr, alias: None }
    }

    pub fn aliased(expr: Expression, alias: impl Into<String>) -> Self {
        SelectExpr {
            expr,
            alias: Some(alias.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FromNode {
    /// A call into a data source, e.g. `#schema.method(args) alias`.
    Table(TableReference),
    /// A reference to a CTE defined in an enclosing WITH block.
    Cte(CteReference),
    Join(Box<JoinNode>),
}

impl FromNode {
    pub fn table(schema: &str, method: &str, alias: &str) -> Self {
        FromNode::Table(TableReference {
            schema: schema.to_string(),
            method: method.to_string(),
            args: Vec::new(),
            alias: alias.to_string(),
        })
    }

    pub fn cte(name: &str, alias: &str) -> Self {
        FromNode::Cte(CteReference {
            name: name.to_string(),
            alias: alias.to_string(),
        })
    }

    pub fn join(
        left: FromNode,
        right: FromNode,
        kind: JoinKind,
        condition: Option<Expression>,
    ) -> Self {
        FromNode::Join(Box::new(JoinNode {
            left,
            right,
            kind,
            condition,
        }))
    }

    /// Visit every table and CTE reference in this FROM graph, left to right.
    pub fn for_each_reference<'a, F>(&'a self, func: &mut F)
    where
        F: FnMut(SourceReference<'a>),
    {
        match self {
            Self::Table(table) => func(SourceReference::Table(table)),
            Self::Cte(cte) => func(SourceReference::Cte(cte)),
            Self::Join(join) => {
                join.left.for_each_reference(func);
                join.right.for_each_reference(func);
            }
        }
    }

    /// Number of base table references.
    pub fn num_base_tables(&self) -> usize {
        let mut count = 0;
        self.for_each_reference(&mut |r| {
            if matches!(r, SourceReference::Table(_)) {
                count += 1;
            }
        });
        count
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SourceReference<'a> {
    Table(&'a TableReference),
    Cte(&'a CteReference),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReference {
    pub schema: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<ScalarValue>,
    pub alias: String,
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}(", self.schema, self.method)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ") {}", self.alias)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CteReference {
    pub name: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinNode {
    pub left: FromNode,
    pub right: FromNode,
    pub kind: JoinKind,
    /// ON predicate. None for CROSS joins.
    #[serde(default)]
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    /// CROSS JOIN or CROSS APPLY.
    Cross,
}

impl JoinKind {
    /// If unmatched left rows are emitted (null-filled on the right).
    pub const fn preserves_left(&self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Full)
    }

    /// If unmatched right rows are emitted (null-filled on the left).
    pub const fn preserves_right(&self) -> bool {
        matches!(self, JoinKind::Right | JoinKind::Full)
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "INNER"),
            Self::Left => write!(f, "LEFT"),
            Self::Right => write!(f, "RIGHT"),
            Self::Full => write!(f, "FULL"),
            Self::Cross => write!(f, "CROSS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{column, eq};

    #[test]
    fn count_base_tables_through_joins() {
        let from = FromNode::join(
            FromNode::join(
                FromNode::table("os", "files", "a"),
                FromNode::cte("recent", "b"),
                JoinKind::Inner,
                Some(eq(column("a", "id"), column("b", "id"))),
            ),
            FromNode::table("git", "commits", "c"),
            JoinKind::Left,
            Some(eq(column("b", "id"), column("c", "id"))),
        );

        assert_eq!(2, from.num_base_tables());
    }

    #[test]
    fn query_tree_json_roundtrip() {
        let query = QueryNode::select(SelectNode::new(
            FromNode::table("os", "files", "f"),
            [SelectExpr::new(column("f", "name"))],
        ))
        .with_modifiers(QueryModifiers {
            order_by: Vec::new(),
            skip: Some(10),
            take: Some(5),
        });

        let json = serde_json::to_string(&query).unwrap();
        let parsed: QueryNode = serde_json::from_str(&json).unwrap();
        assert_eq!(query, parsed);
    }
}

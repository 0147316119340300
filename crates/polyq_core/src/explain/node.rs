use std::fmt;

use polyq_error::{Result, ResultExt};
use serde::{Deserialize, Serialize};

use super::explainable::{ExplainEntry, Explainable};
use crate::planner::{
    PlannedBody,
    PlannedCtes,
    PlannedFrom,
    PlannedQuery,
    PlannedSelect,
    PlannedSetOp,
    QueryPlan,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExplainNode {
    pub entry: ExplainEntry,
    pub children: Vec<ExplainNode>,
}

impl ExplainNode {
    /// Build an explain tree for a planned query.
    ///
    /// When the query has CTEs, the root is a `Query` node whose first child
    /// is the CTE materialization and whose second child is the query body.
    pub fn new_from_plan(plan: &QueryPlan) -> Self {
        let root = Self::walk_query(&plan.root);
        match &plan.ctes {
            Some(ctes) => ExplainNode {
                entry: ExplainEntry::new("Query"),
                children: vec![Self::walk_ctes(ctes), root],
            },
            None => root,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize explain output")
    }

    fn walk_ctes(ctes: &PlannedCtes) -> Self {
        let children = ctes
            .plan
            .levels()
            .iter()
            .map(|level| ExplainNode {
                entry: level.explain_entry(),
                children: level
                    .ctes
                    .iter()
                    .filter_map(|name| {
                        let body = ctes.bodies.get(name)?;
                        Some(ExplainNode {
                            entry: ExplainEntry::new("Cte").with_value("name", name),
                            children: vec![Self::walk_query(body)],
                        })
                    })
                    .collect(),
            })
            .collect();

        ExplainNode {
            entry: ctes.plan.explain_entry(),
            children,
        }
    }

    fn walk_query(query: &PlannedQuery) -> Self {
        let mut node = match &query.body {
            PlannedBody::Select(select) => Self::walk_select(select),
            PlannedBody::SetOp(setop) => Self::walk_set_op(setop),
        };

        if !query.order_by.is_empty() {
            let exprs = query.order_by.iter().map(|order| {
                if order.desc {
                    format!("{} DESC", order.expr)
                } else {
                    format!("{} ASC", order.expr)
                }
            });
            node = node.wrap(ExplainEntry::new("Order").with_values("expressions", exprs));
        }

        if query.skip.is_some() || query.take.is_some() {
            node = node.wrap(
                ExplainEntry::new("Limit")
                    .with_optional_value("skip", query.skip)
                    .with_optional_value("take", query.take),
            );
        }

        node
    }

    fn walk_set_op(setop: &PlannedSetOp) -> Self {
        let mut node = Self::walk_select(&setop.first);
        for (step, branch) in setop.plan.steps.iter().zip(&setop.branches) {
            node = ExplainNode {
                entry: ExplainEntry::new("SetOperation").with_value("step", step.explain_entry()),
                children: vec![node, Self::walk_select(branch)],
            };
        }
        node
    }

    fn walk_select(select: &PlannedSelect) -> Self {
        let mut node = Self::walk_from(&select.from);

        if let Some(filter) = &select.filter {
            node = node.wrap(ExplainEntry::new("Filter").with_value("predicate", filter));
        }
        if !select.group_by.is_empty() {
            node = node.wrap(ExplainEntry::new("Group").with_values("keys", &select.group_by));
        }
        if let Some(having) = &select.having {
            node = node.wrap(ExplainEntry::new("Filter").with_value("predicate", having));
        }

        node = node.wrap(
            ExplainEntry::new("Project").with_values("projections", &select.projections),
        );

        if select.distinct {
            node = node.wrap(ExplainEntry::new("Distinct"));
        }

        node
    }

    fn walk_from(from: &PlannedFrom) -> Self {
        match from {
            PlannedFrom::Scan(scan) => ExplainNode {
                entry: ExplainEntry::new("Scan")
                    .with_value("source", &scan.table)
                    .with_value("hints", scan.hints)
                    .with_optional_value("pushed_predicate", scan.predicate.as_ref()),
                children: Vec::new(),
            },
            PlannedFrom::CteScan(cte) => ExplainNode {
                entry: ExplainEntry::new("CteScan")
                    .with_value("cte", &cte.name)
                    .with_value("alias", &cte.alias),
                children: Vec::new(),
            },
            PlannedFrom::Join(join) => ExplainNode {
                entry: join.join.explain_entry(),
                children: vec![Self::walk_from(&join.left), Self::walk_from(&join.right)],
            },
        }
    }

    fn wrap(self, entry: ExplainEntry) -> Self {
        ExplainNode {
            entry,
            children: vec![self],
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.entry, indent = depth * 2)?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for ExplainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::arrays::datatype::DataType;
    use crate::arrays::field::{ColumnSchema, Field};
    use crate::expr::{column, eq};
    use crate::logical::query::{
        CteDefinition,
        FromNode,
        JoinKind,
        QueryModifiers,
        QueryNode,
        SelectExpr,
        SelectNode,
    };
    use crate::planner::{PlanConfig, QueryPlanner};
    use crate::row;
    use crate::storage::memory::{MemoryCatalog, MemorySource};

    fn catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        catalog.register(
            "test",
            "cities",
            Arc::new(MemorySource::new(
                ColumnSchema::new([
                    Field::new("City", DataType::Utf8),
                    Field::new("Population", DataType::Int64),
                ]),
                [row!["Warsaw", 1_800_000_i64]],
            )),
        );
        catalog
    }

    #[test]
    fn explain_single_table_take() {
        let query = QueryNode::select(SelectNode::new(
            FromNode::table("test", "cities", "c"),
            [SelectExpr::new(column("c", "City"))],
        ))
        .with_modifiers(QueryModifiers {
            order_by: Vec::new(),
            skip: None,
            take: Some(5),
        });
        let plan = QueryPlanner::new(&catalog(), PlanConfig::default())
            .plan(&query)
            .unwrap();

        let node = ExplainNode::new_from_plan(&plan);
        assert_eq!("Limit", node.entry.name);
        assert_eq!("Project", node.children[0].entry.name);

        let scan = &node.children[0].children[0].entry;
        assert_eq!("Scan", scan.name);
        assert_eq!("take=5", scan.items["hints"].to_string());
    }

    #[test]
    fn explain_ctes_and_join() {
        let query = QueryNode::select(SelectNode::new(
            FromNode::join(
                FromNode::cte("a", "a"),
                FromNode::table("test", "cities", "c"),
                JoinKind::Inner,
                Some(eq(column("a", "City"), column("c", "City"))),
            ),
            [SelectExpr::new(column("c", "Population"))],
        ))
        .with_ctes([CteDefinition::new(
            "a",
            QueryNode::select(SelectNode::new(
                FromNode::table("test", "cities", "x"),
                [SelectExpr::new(column("x", "City"))],
            )),
        )]);
        let plan = QueryPlanner::new(&catalog(), PlanConfig::default())
            .plan(&query)
            .unwrap();

        let node = ExplainNode::new_from_plan(&plan);
        assert_eq!("Query", node.entry.name);
        assert_eq!("CteMaterialization", node.children[0].entry.name);
        assert_eq!("CteLevel", node.children[0].children[0].entry.name);

        let text = node.to_string();
        assert!(text.contains("HashJoin"), "{text}");
        assert!(text.contains("CteScan (alias = a, cte = a)"), "{text}");

        let json = node.to_json().unwrap();
        let back: ExplainNode = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }
}

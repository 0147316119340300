//! Turns a validated query tree into an execution plan.
//!
//! Planning happens entirely before any row flows: CTE leveling, join
//! strategy selection, set operation type resolution and hint pushdown all
//! raise their errors here.

pub mod cte;
pub mod expr_binder;
pub mod hints;
pub mod join;
pub mod row_shape;
pub mod setop;

use std::sync::Arc;

use ahash::RandomState;
use cte::CteDependencyAnalyzer;
use cte::plan::CteExecutionPlan;
use expr_binder::ExpressionBinder;
use hashbrown::HashMap;
use hints::HintPushdownAnalyzer;
use indexmap::IndexMap;
use join::{CompiledJoin, JoinStrategyCompiler};
use polyq_error::{DbError, OptionExt, Result, not_implemented};
use row_shape::{RowShape, ShapeColumn};
use setop::{SetOpBranchInput, SetOperationEngine, SetOperationPlan};
use tracing::debug;

use crate::arrays::field::{ColumnSchema, Field};
use crate::config::session::SessionConfig;
use crate::expr::Expression;
use crate::expr::physical::PhysicalScalarExpression;
use crate::logical::query::{
    CteDefinition,
    FromNode,
    QueryBody,
    QueryNode,
    SelectNode,
    TableReference,
};
use crate::storage::retrieval::QueryHints;
use crate::storage::{DataSource, SourceCatalog};

/// Planner-facing subset of the session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanConfig {
    pub enable_hash_joins: bool,
    pub enable_hint_pushdown: bool,
    pub allow_duplicate_cte_names: bool,
}

impl Default for PlanConfig {
    fn default() -> Self {
        PlanConfig::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for PlanConfig {
    fn from(conf: &SessionConfig) -> Self {
        PlanConfig {
            enable_hash_joins: conf.enable_hash_joins,
            enable_hint_pushdown: conf.enable_hint_pushdown,
            allow_duplicate_cte_names: conf.allow_duplicate_cte_names,
        }
    }
}

#[derive(Debug)]
pub struct QueryPlan {
    pub ctes: Option<PlannedCtes>,
    pub root: PlannedQuery,
}

impl QueryPlan {
    pub fn output_schema(&self) -> &ColumnSchema {
        &self.root.output
    }

    pub fn cte_plan(&self) -> Option<&CteExecutionPlan> {
        self.ctes.as_ref().map(|ctes| &ctes.plan)
    }

    /// Number of joins planned as hash joins, including joins inside CTEs.
    pub fn hash_join_count(&self) -> usize {
        let mut count = 0;
        self.for_each_from(&mut |from| {
            if let PlannedFrom::Join(join) = from {
                if join.join.strategy.is_hash() {
                    count += 1;
                }
            }
        });
        count
    }

    /// All base table scans with the hints they'll receive.
    pub fn scans(&self) -> Vec<&PlannedScan> {
        let mut scans = Vec::new();
        self.for_each_from(&mut |from| {
            if let PlannedFrom::Scan(scan) = from {
                scans.push(scan);
            }
        });
        scans
    }

    fn for_each_from<'a, F>(&'a self, func: &mut F)
    where
        F: FnMut(&'a PlannedFrom),
    {
        if let Some(ctes) = &self.ctes {
            for body in ctes.bodies.values() {
                body.for_each_from(func);
            }
        }
        self.root.for_each_from(func);
    }
}

#[derive(Debug)]
pub struct PlannedCtes {
    pub plan: CteExecutionPlan,
    /// Planned CTE bodies in execution order.
    pub bodies: IndexMap<String, PlannedQuery>,
}

#[derive(Debug)]
pub struct PlannedQuery {
    pub body: PlannedBody,
    pub order_by: Vec<PlannedOrderBy>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub output: ColumnSchema,
}

impl PlannedQuery {
    pub fn for_each_from<'a, F>(&'a self, func: &mut F)
    where
        F: FnMut(&'a PlannedFrom),
    {
        match &self.body {
            PlannedBody::Select(select) => select.from.walk(func),
            PlannedBody::SetOp(setop) => {
                setop.first.from.walk(func);
                for branch in &setop.branches {
                    branch.from.walk(func);
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct PlannedOrderBy {
    /// Bound against the query's output.
    pub expr: PhysicalScalarExpression,
    pub desc: bool,
}

#[derive(Debug)]
pub enum PlannedBody {
    Select(Box<PlannedSelect>),
    SetOp(Box<PlannedSetOp>),
}

#[derive(Debug)]
pub struct PlannedSetOp {
    pub first: PlannedSelect,
    pub branches: Vec<PlannedSelect>,
    pub plan: SetOperationPlan,
}

#[derive(Debug)]
pub struct PlannedSelect {
    pub from: PlannedFrom,
    /// WHERE, bound against the FROM shape.
    pub filter: Option<PhysicalScalarExpression>,
    /// Group keys, bound against the FROM shape. When non-empty the select
    /// produces one row of key values per distinct group.
    pub group_by: Vec<PhysicalScalarExpression>,
    /// HAVING, bound against the group key row.
    pub having: Option<PhysicalScalarExpression>,
    pub projections: Vec<PhysicalScalarExpression>,
    pub distinct: bool,
    pub output: ColumnSchema,
    pub output_shape: RowShape,
}

#[derive(Debug)]
pub enum PlannedFrom {
    Scan(PlannedScan),
    CteScan(PlannedCteScan),
    Join(Box<PlannedJoin>),
}

impl PlannedFrom {
    /// Visit this node and all its children, parents first.
    pub fn walk<'a, F>(&'a self, func: &mut F)
    where
        F: FnMut(&'a PlannedFrom),
    {
        func(self);
        if let PlannedFrom::Join(join) = self {
            join.left.walk(func);
            join.right.walk(func);
        }
    }
}

#[derive(Debug)]
pub struct PlannedScan {
    pub table: TableReference,
    pub source: Arc<dyn DataSource>,
    pub hints: QueryHints,
    /// WHERE of a single table query, handed to the source alongside the
    /// hints.
    pub predicate: Option<Expression>,
}

#[derive(Debug)]
pub struct PlannedCteScan {
    pub name: String,
    pub alias: String,
}

#[derive(Debug)]
pub struct PlannedJoin {
    pub left: PlannedFrom,
    pub right: PlannedFrom,
    pub join: CompiledJoin,
}

/// Output schemas of CTEs already planned, visible to later ones.
type CteScope = HashMap<String, ColumnSchema, RandomState>;

#[derive(Debug)]
pub struct QueryPlanner<'a> {
    catalog: &'a dyn SourceCatalog,
    config: PlanConfig,
    joins: JoinStrategyCompiler,
    hints: HintPushdownAnalyzer,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(catalog: &'a dyn SourceCatalog, config: PlanConfig) -> Self {
        QueryPlanner {
            catalog,
            config,
            joins: JoinStrategyCompiler {
                enable_hash_joins: config.enable_hash_joins,
            },
            hints: HintPushdownAnalyzer {
                enabled: config.enable_hint_pushdown,
            },
        }
    }

    pub fn plan(&self, query: &QueryNode) -> Result<QueryPlan> {
        let mut scope = CteScope::default();

        let ctes = match &query.ctes {
            Some(block) => {
                let analyzer = CteDependencyAnalyzer::new(self.config.allow_duplicate_cte_names);
                let graph = analyzer.build_graph(block)?;
                let plan = CteDependencyAnalyzer::plan_for_graph(&graph)?;

                // Later definitions replace earlier ones when duplicates are
                // allowed.
                let definitions: HashMap<&str, &CteDefinition> = block
                    .ctes
                    .iter()
                    .map(|cte| (cte.name.as_str(), cte))
                    .collect();

                let mut bodies = IndexMap::with_capacity(plan.total_cte_count());
                for name in plan.execution_order() {
                    let definition = definitions.get(name).copied().required("CTE definition")?;
                    let planned = self.plan_query(&definition.body, &scope)?;
                    scope.insert(name.to_string(), planned.output.clone());
                    bodies.insert(name.to_string(), planned);
                }

                Some(PlannedCtes { plan, bodies })
            }
            None => None,
        };

        let root = self.plan_query(query, &scope)?;
        let plan = QueryPlan { ctes, root };

        debug!(
            ctes = plan.cte_plan().map(|p| p.total_cte_count()).unwrap_or(0),
            hash_joins = plan.hash_join_count(),
            "planned query"
        );

        Ok(plan)
    }

    fn plan_query(&self, query: &QueryNode, scope: &CteScope) -> Result<PlannedQuery> {
        let (body, output, order_shape) = match &query.body {
            QueryBody::Select(select) => {
                let planned = self.plan_select(select, query, scope)?;
                let output = planned.output.clone();
                let shape = planned.output_shape.clone();
                (PlannedBody::Select(Box::new(planned)), output, shape)
            }
            QueryBody::SetOp(chain) => {
                let first = self.plan_select(&chain.first, query, scope)?;
                let branches = chain
                    .steps
                    .iter()
                    .map(|step| self.plan_select(&step.select, query, scope))
                    .collect::<Result<Vec<_>>>()?;

                let plan = SetOperationEngine.plan(
                    &first.output,
                    chain
                        .steps
                        .iter()
                        .zip(&branches)
                        .map(|(step, branch)| SetOpBranchInput {
                            kind: step.kind,
                            keys: &step.keys,
                            schema: &branch.output,
                        }),
                )?;

                let output = plan.output_schema();
                let shape = RowShape::for_source("", &output);
                (
                    PlannedBody::SetOp(Box::new(PlannedSetOp {
                        first,
                        branches,
                        plan,
                    })),
                    output,
                    shape,
                )
            }
        };

        let binder = ExpressionBinder::new(&order_shape);
        let order_by = query
            .modifiers
            .order_by
            .iter()
            .map(|order| {
                Ok(PlannedOrderBy {
                    expr: binder.bind(&order.expr)?,
                    desc: order.desc,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PlannedQuery {
            body,
            order_by,
            skip: query.modifiers.skip,
            take: query.modifiers.take,
            output,
        })
    }

    fn plan_select(
        &self,
        select: &SelectNode,
        query: &QueryNode,
        scope: &CteScope,
    ) -> Result<PlannedSelect> {
        // Only a single table query hands its WHERE to the source.
        let pushed_predicate = match &select.from {
            FromNode::Table(_) => select.where_expr.as_ref(),
            _ => None,
        };

        let (from, shape) = self.plan_from(&select.from, query, pushed_predicate, scope)?;
        let binder = ExpressionBinder::new(&shape);

        let filter = select
            .where_expr
            .as_ref()
            .map(|expr| binder.bind_predicate(expr))
            .transpose()?;

        let (group_by, having, projection_shape) = if select.group_by.is_empty() {
            if select.having.is_some() {
                not_implemented!("HAVING without GROUP BY");
            }
            (Vec::new(), None, shape.clone())
        } else {
            let group_by = select
                .group_by
                .iter()
                .map(|expr| binder.bind(expr))
                .collect::<Result<Vec<_>>>()?;
            let group_shape = RowShape::new(
                select
                    .group_by
                    .iter()
                    .zip(&group_by)
                    .map(|(expr, bound)| shape_column(expr, bound, &shape, None)),
            );
            let having = select
                .having
                .as_ref()
                .map(|expr| ExpressionBinder::new(&group_shape).bind_predicate(expr))
                .transpose()?;
            (group_by, having, group_shape)
        };

        let projection_binder = ExpressionBinder::new(&projection_shape);
        let projections = select
            .projections
            .iter()
            .map(|proj| projection_binder.bind(&proj.expr))
            .collect::<Result<Vec<_>>>()?;

        let output_shape = RowShape::new(select.projections.iter().zip(&projections).map(
            |(proj, bound)| {
                shape_column(&proj.expr, bound, &projection_shape, proj.alias.as_deref())
            },
        ));
        let output = ColumnSchema::new(
            output_shape
                .columns()
                .iter()
                .map(|col| Field::new(col.name.clone(), col.datatype)),
        );

        Ok(PlannedSelect {
            from,
            filter,
            group_by,
            having,
            projections,
            distinct: select.distinct,
            output,
            output_shape,
        })
    }

    fn plan_from(
        &self,
        from: &FromNode,
        query: &QueryNode,
        pushed_predicate: Option<&Expression>,
        scope: &CteScope,
    ) -> Result<(PlannedFrom, RowShape)> {
        match from {
            FromNode::Table(table) => {
                let source = self.catalog.resolve(table)?;
                let schema = source.schema(table)?;
                let shape = RowShape::for_source(&table.alias, &schema);
                let hints = self.hints.compute(query, table);

                debug!(%table, %hints, "planned scan");

                Ok((
                    PlannedFrom::Scan(PlannedScan {
                        table: table.clone(),
                        source,
                        hints,
                        predicate: pushed_predicate.cloned(),
                    }),
                    shape,
                ))
            }
            FromNode::Cte(reference) => {
                let schema = scope.get(&reference.name).ok_or_else(|| {
                    DbError::structural(format!(
                        "Reference to undefined CTE '{}'",
                        reference.name
                    ))
                    .with_field("cte", &reference.name)
                })?;
                let shape = RowShape::for_source(&reference.alias, schema);
                Ok((
                    PlannedFrom::CteScan(PlannedCteScan {
                        name: reference.name.clone(),
                        alias: reference.alias.clone(),
                    }),
                    shape,
                ))
            }
            FromNode::Join(join) => {
                let (left, left_shape) = self.plan_from(&join.left, query, None, scope)?;
                let (right, right_shape) = self.plan_from(&join.right, query, None, scope)?;
                let compiled = self.joins.compile(
                    join.kind,
                    join.condition.as_ref(),
                    &left_shape,
                    &right_shape,
                )?;
                let shape = compiled.output_shape.clone();
                Ok((
                    PlannedFrom::Join(Box::new(PlannedJoin {
                        left,
                        right,
                        join: compiled,
                    })),
                    shape,
                ))
            }
        }
    }
}

/// Describe an output column of a projection or group key.
///
/// Plain column references keep their source alias so later references like
/// `a.City` still resolve. Anything else is named by its alias, or by the
/// expression text, and is only reachable unqualified.
fn shape_column(
    expr: &Expression,
    bound: &PhysicalScalarExpression,
    input: &RowShape,
    alias: Option<&str>,
) -> ShapeColumn {
    let datatype = bound.datatype();
    match (alias, bound.as_column_idx().and_then(|idx| input.column(idx))) {
        (None, Some(col)) if matches!(expr, Expression::Column(_)) => ShapeColumn {
            alias: col.alias.clone(),
            name: col.name.clone(),
            datatype,
        },
        (Some(alias), _) => ShapeColumn {
            alias: String::new(),
            name: alias.to_string(),
            datatype,
        },
        _ => ShapeColumn {
            alias: String::new(),
            name: expr.to_string(),
            datatype,
        },
    }
}

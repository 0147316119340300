use indexmap::IndexMap;
use polyq_error::{DbError, Result, not_implemented};
use tracing::warn;

use crate::logical::query::{
    CteDefinition,
    CteReference,
    QueryBody,
    QueryNode,
    SelectNode,
    SourceReference,
    WithBlock,
};

/// Dependency graph between the CTEs of a single WITH block.
///
/// Nodes are kept in declaration order. Edges point from a CTE to the CTEs it
/// reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CteDependencyGraph {
    nodes: IndexMap<String, Vec<String>>,
}

impl CteDependencyGraph {
    /// Build and validate the graph.
    ///
    /// Rejects recursive (self-referencing) CTEs, references to names not
    /// defined in the block, and, unless `allow_duplicate_names` is set,
    /// duplicate names. With duplicates allowed the last definition wins.
    ///
    /// Cycles spanning multiple CTEs are not detected here, they surface when
    /// leveling the graph.
    pub fn try_new(block: &WithBlock, allow_duplicate_names: bool) -> Result<Self> {
        let mut definitions: IndexMap<&str, &CteDefinition> =
            IndexMap::with_capacity(block.ctes.len());

        for cte in &block.ctes {
            if let Some(prev) = definitions.insert(cte.name.as_str(), cte) {
                if !allow_duplicate_names {
                    return Err(DbError::structural(format!(
                        "Duplicate CTE name '{}' in WITH block",
                        cte.name
                    ))
                    .with_field("cte", &cte.name));
                }
                warn!(cte = %prev.name, "duplicate CTE name, later definition wins");
            }
        }

        let mut nodes = IndexMap::with_capacity(definitions.len());
        for (name, cte) in &definitions {
            if cte.body.ctes.is_some() {
                not_implemented!("nested WITH block in CTE '{name}'");
            }

            let mut deps: Vec<String> = Vec::new();
            for reference in collect_cte_references(&cte.body) {
                if reference.name == *name {
                    return Err(DbError::structural(format!(
                        "CTE '{name}' references itself, recursive CTEs are not supported"
                    ))
                    .with_field("cte", name));
                }
                if !definitions.contains_key(reference.name.as_str()) {
                    return Err(DbError::structural(format!(
                        "CTE '{name}' references undefined CTE '{}'",
                        reference.name
                    ))
                    .with_field("cte", name)
                    .with_field("missing", &reference.name));
                }
                if !deps.contains(&reference.name) {
                    deps.push(reference.name.clone());
                }
            }

            nodes.insert(name.to_string(), deps);
        }

        Ok(CteDependencyGraph { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Names of the CTEs `name` reads from.
    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.nodes.get(name).map(|deps| deps.as_slice())
    }
}

/// Collect every CTE reference in a query's FROM graphs, including all
/// set-operation branches.
pub fn collect_cte_references(query: &QueryNode) -> Vec<&CteReference> {
    let mut refs = Vec::new();
    for select in selects(query) {
        select.from.for_each_reference(&mut |r| {
            if let SourceReference::Cte(cte) = r {
                refs.push(cte);
            }
        });
    }
    refs
}

fn selects(query: &QueryNode) -> Vec<&SelectNode> {
    match &query.body {
        QueryBody::Select(select) => vec![select],
        QueryBody::SetOp(chain) => std::iter::once(&chain.first)
            .chain(chain.steps.iter().map(|s| &s.select))
            .collect(),
    }
}

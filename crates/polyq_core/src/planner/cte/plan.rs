use serde::{Deserialize, Serialize};

use crate::explain::explainable::{ExplainEntry, Explainable};

/// A set of CTEs whose dependencies are all in earlier levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CteLevel {
    pub level: usize,
    /// Members in declaration order.
    pub ctes: Vec<String>,
}

/// Leveled execution plan for the CTEs of a WITH block.
///
/// Members of the same level are independent of each other and may be
/// materialized concurrently. Level `i + 1` may only start once every member
/// of level `i` has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CteExecutionPlan {
    total_cte_count: usize,
    level_count: usize,
    max_parallelism: usize,
    can_parallelize: bool,
    levels: Vec<CteLevel>,
}

impl CteExecutionPlan {
    pub fn from_levels(levels: Vec<Vec<String>>) -> Self {
        let total_cte_count = levels.iter().map(|l| l.len()).sum();
        let max_parallelism = levels.iter().map(|l| l.len()).max().unwrap_or(0);
        let levels: Vec<_> = levels
            .into_iter()
            .enumerate()
            .map(|(level, ctes)| CteLevel { level, ctes })
            .collect();

        CteExecutionPlan {
            total_cte_count,
            level_count: levels.len(),
            max_parallelism,
            can_parallelize: max_parallelism > 1,
            levels,
        }
    }

    pub fn empty() -> Self {
        Self::from_levels(Vec::new())
    }

    pub fn total_cte_count(&self) -> usize {
        self.total_cte_count
    }

    pub fn level_count(&self) -> usize {
        self.level_count
    }

    /// Size of the largest level.
    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    pub fn can_parallelize(&self) -> bool {
        self.can_parallelize
    }

    pub fn levels(&self) -> &[CteLevel] {
        &self.levels
    }

    pub fn level_of(&self, name: &str) -> Option<usize> {
        self.levels
            .iter()
            .find(|l| l.ctes.iter().any(|c| c == name))
            .map(|l| l.level)
    }

    /// All CTE names in execution order.
    pub fn execution_order(&self) -> impl Iterator<Item = &str> {
        self.levels
            .iter()
            .flat_map(|l| l.ctes.iter().map(|s| s.as_str()))
    }
}

impl Explainable for CteExecutionPlan {
    fn explain_entry(&self) -> ExplainEntry {
        ExplainEntry::new("CteMaterialization")
            .with_value("ctes", self.total_cte_count)
            .with_value("levels", self.level_count)
            .with_value("max_parallelism", self.max_parallelism)
    }
}

impl Explainable for CteLevel {
    fn explain_entry(&self) -> ExplainEntry {
        ExplainEntry::new("CteLevel")
            .with_value("level", self.level)
            .with_values("ctes", &self.ctes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_plan() {
        let plan = CteExecutionPlan::empty();
        assert_eq!(0, plan.total_cte_count());
        assert_eq!(0, plan.level_count());
        assert_eq!(0, plan.max_parallelism());
        assert!(!plan.can_parallelize());
    }

    #[test]
    fn plan_serializes_counts() {
        let plan = CteExecutionPlan::from_levels(vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()],
        ]);
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(3, json["total_cte_count"]);
        assert_eq!(2, json["level_count"]);
        assert_eq!(2, json["max_parallelism"]);
        assert_eq!(true, json["can_parallelize"]);
        assert_eq!(Some(1), plan.level_of("c"));
        assert_eq!(vec!["a", "b", "c"], plan.execution_order().collect::<Vec<_>>());
    }
}

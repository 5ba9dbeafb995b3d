use std::collections::{BTreeMap, HashMap};
use serde::Serialize;
use crate::core::types::Value;
use crate::index::data_index::DataIndex;
use crate::query::ast::{Logic, Operator, Query, SortOption};
use crate::query::types::{CostModel, StoreStatistics};

/// Logical execution plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LogicalPlan {
    FullScan,
    IndexSeek { index: String, key: String, matched: usize },
    Filter { conditions: usize, input: Box<LogicalPlan> },
    Sort { by: Vec<SortOption>, input: Box<LogicalPlan> },
    Offset { n: usize, input: Box<LogicalPlan> },
    Limit { n: usize, input: Box<LogicalPlan> },
    Project { fields: Vec<String>, input: Box<LogicalPlan> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStrategy {
    IndexScan,
    FullScan,
}

/// Result of `explain`. Advisory only: execution always scans and filters
/// every record, whatever the plan says.
#[derive(Debug, Clone, Serialize)]
pub struct QueryPlan {
    pub strategy: ScanStrategy,
    pub index: Option<String>,
    pub estimated_cost: f32,
    pub estimated_rows: usize,
    pub plan: LogicalPlan,
}

/// Query planner creates execution plans
pub struct QueryPlanner {
    pub statistics: StoreStatistics,
    pub cost_model: CostModel,
}

impl QueryPlanner {
    pub fn new(statistics: StoreStatistics) -> Self {
        QueryPlanner {
            statistics,
            cost_model: CostModel::default(),
        }
    }

    pub fn explain(&self, query: &Query, indexes: &BTreeMap<String, DataIndex>) -> QueryPlan {
        let source = self.choose_source(query, indexes);
        let index = match &source {
            LogicalPlan::IndexSeek { index, .. } => Some(index.clone()),
            _ => None,
        };
        let strategy = if index.is_some() { ScanStrategy::IndexScan } else { ScanStrategy::FullScan };

        let mut plan = source;
        if !query.conditions.is_empty() {
            plan = LogicalPlan::Filter { conditions: query.conditions.len(), input: Box::new(plan) };
        }
        if !query.sort.is_empty() {
            plan = LogicalPlan::Sort { by: query.sort.clone(), input: Box::new(plan) };
        }
        if query.offset > 0 {
            plan = LogicalPlan::Offset { n: query.offset, input: Box::new(plan) };
        }
        if let Some(n) = query.limit {
            plan = LogicalPlan::Limit { n, input: Box::new(plan) };
        }
        if !query.fields.is_empty() {
            plan = LogicalPlan::Project { fields: query.fields.clone(), input: Box::new(plan) };
        }

        QueryPlan {
            strategy,
            index,
            estimated_cost: self.cost_model.estimate_cost(&plan, &self.statistics),
            estimated_rows: CostModel::estimate_rows(&plan, &self.statistics),
            plan,
        }
    }

    /// An index is usable when every one of its fields is pinned by an `=`
    /// condition that sits in a pure AND chain.
    fn choose_source(&self, query: &Query, indexes: &BTreeMap<String, DataIndex>) -> LogicalPlan {
        let pure_and = query
            .conditions
            .iter()
            .rev()
            .skip(1)
            .all(|c| c.logic() == Logic::And);
        if !pure_and {
            return LogicalPlan::FullScan;
        }

        let equalities: HashMap<&str, &Value> = query
            .conditions
            .iter()
            .filter(|c| c.operator == Operator::Eq)
            .map(|c| (c.field.as_str(), &c.value))
            .collect();
        if equalities.is_empty() {
            return LogicalPlan::FullScan;
        }

        let mut best: Option<LogicalPlan> = None;
        for index in indexes.values() {
            let probe: Option<Vec<Value>> = index
                .fields
                .iter()
                .map(|f| equalities.get(f.as_str()).map(|v| (*v).clone()))
                .collect();
            let Some(values) = probe else {
                continue;
            };

            let probe = if values.len() == 1 {
                values.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Array(values)
            };
            let Some(key) = index.probe_key(&probe) else {
                continue;
            };

            let matched = index.bucket_len(&key);
            let better = match &best {
                Some(LogicalPlan::IndexSeek { matched: current, .. }) => matched < *current,
                _ => true,
            };
            if better {
                best = Some(LogicalPlan::IndexSeek { index: index.name.clone(), key, matched });
            }
        }

        best.unwrap_or(LogicalPlan::FullScan)
    }
}

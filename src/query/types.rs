use serde::Serialize;
use crate::query::planner::LogicalPlan;

/// Store-level statistics used for plan costing
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStatistics {
    pub total_records: usize,
    pub index_count: usize,
}

/// Cost model for query planning
#[derive(Debug, Clone)]
pub struct CostModel {
    pub scan_cost_per_record: f32,
    pub seek_cost: f32,
    pub filter_cost_per_record: f32,
    pub sort_cost_multiplier: f32,
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel {
            scan_cost_per_record: 1.0,
            seek_cost: 0.1,
            filter_cost_per_record: 0.5,
            sort_cost_multiplier: 2.0,
        }
    }
}

impl CostModel {
    /// Estimate cost of a logical plan
    pub fn estimate_cost(&self, plan: &LogicalPlan, stats: &StoreStatistics) -> f32 {
        match plan {
            LogicalPlan::FullScan => {
                self.scan_cost_per_record * stats.total_records as f32
            }
            LogicalPlan::IndexSeek { matched, .. } => {
                self.seek_cost + self.scan_cost_per_record * *matched as f32
            }
            LogicalPlan::Filter { input, .. } => {
                let rows = Self::estimate_rows(input, stats);
                self.estimate_cost(input, stats) + self.filter_cost_per_record * rows as f32
            }
            LogicalPlan::Sort { input, .. } => {
                self.estimate_cost(input, stats) * self.sort_cost_multiplier
            }
            LogicalPlan::Offset { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Project { input, .. } => self.estimate_cost(input, stats),
        }
    }

    /// Upper bound on rows produced by a plan node
    pub fn estimate_rows(plan: &LogicalPlan, stats: &StoreStatistics) -> usize {
        match plan {
            LogicalPlan::FullScan => stats.total_records,
            LogicalPlan::IndexSeek { matched, .. } => *matched,
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Project { input, .. } => Self::estimate_rows(input, stats),
            LogicalPlan::Offset { n, input } => Self::estimate_rows(input, stats).saturating_sub(*n),
            LogicalPlan::Limit { n, input } => Self::estimate_rows(input, stats).min(*n),
        }
    }
}

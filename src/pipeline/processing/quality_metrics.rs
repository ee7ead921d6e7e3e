use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::RuleId;
use crate::error::{PipelineError, Result};

/// Per-rule rejection counts for one run.
///
/// Counts only grow. Each rule is recorded at most once per run; runs are
/// combined with `merge`, which is a plain per-rule sum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QualityMetrics {
    counts: BTreeMap<RuleId, u64>,
}

impl QualityMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, rule: RuleId, count: u64) -> Result<()> {
        if self.counts.contains_key(&rule) {
            return Err(PipelineError::DuplicateMetric(rule));
        }
        self.counts.insert(rule, count);
        Ok(())
    }

    pub fn snapshot(&self) -> BTreeMap<RuleId, u64> {
        self.counts.clone()
    }

    pub fn get(&self, rule: RuleId) -> Option<u64> {
        self.counts.get(&rule).copied()
    }

    pub fn total_rejected(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn merge(&mut self, other: &QualityMetrics) {
        for (rule, count) in &other.counts {
            *self.counts.entry(*rule).or_insert(0) += count;
        }
    }

    /// Wire-name keyed view for reports
    pub fn by_name(&self) -> BTreeMap<String, u64> {
        self.counts
            .iter()
            .map(|(rule, count)| (rule.as_str().to_string(), *count))
            .collect()
    }
}

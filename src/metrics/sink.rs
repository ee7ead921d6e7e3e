use crate::domain::RuleId;
use crate::metrics::QualityPhaseMetrics;
use crate::pipeline::{PipelineState, RunSummary};

/// Where a run reports its counters.
///
/// Injected through `RunContext` so tests and embedders can observe or
/// silence metrics without a global recorder.
pub trait MetricsSink: Send + Sync {
    fn rule_evaluated(&self, _rule: RuleId, _evaluated: usize, _rejected: usize) {}

    fn rule_skipped(&self, _rule: RuleId) {}

    fn quarantine_written(&self, _records: usize) {}

    fn quarantine_failed(&self) {}

    fn run_completed(&self, _summary: &RunSummary) {}

    fn run_aborted(&self, _state: &PipelineState) {}
}

/// Discards everything
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {}

/// Forwards to the `metrics` facade, and from there to Prometheus
pub struct PrometheusMetricsSink;

impl MetricsSink for PrometheusMetricsSink {
    fn rule_evaluated(&self, rule: RuleId, evaluated: usize, rejected: usize) {
        QualityPhaseMetrics::record_rule_evaluated(rule, evaluated, rejected);
    }

    fn rule_skipped(&self, rule: RuleId) {
        QualityPhaseMetrics::record_rule_skipped(rule);
    }

    fn quarantine_written(&self, records: usize) {
        QualityPhaseMetrics::record_quarantine_written(records);
    }

    fn quarantine_failed(&self) {
        QualityPhaseMetrics::record_quarantine_failed();
    }

    fn run_completed(&self, summary: &RunSummary) {
        QualityPhaseMetrics::record_run_completed(summary.processed, summary.passed);
    }

    fn run_aborted(&self, state: &PipelineState) {
        QualityPhaseMetrics::record_run_aborted(state.to_string());
    }
}

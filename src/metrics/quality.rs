//! Quality Phase Metrics
//!
//! Counters for rule evaluation, rejections, and quarantine writes.

use once_cell::sync::Lazy;

use crate::domain::RuleId;
use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

const RECORDS_EVALUATED: &str = phase_metric!(counter, "quality", "records_evaluated");
const RECORDS_REJECTED: &str = phase_metric!(counter, "quality", "records_rejected");
const RULES_SKIPPED: &str = phase_metric!(counter, "quality", "rules_skipped");
const QUARANTINE_WRITES: &str = phase_metric!(counter, "quality", "quarantine_writes");
const QUARANTINE_WRITE_ERRORS: &str = phase_metric!(counter, "quality", "quarantine_write_errors");
const QUARANTINED_RECORDS: &str = phase_metric!(counter, "quality", "quarantined_records");
const RUNS_COMPLETED: &str = phase_metric!(counter, "quality", "runs_completed");
const RUNS_ABORTED: &str = phase_metric!(counter, "quality", "runs_aborted");
const BATCH_SIZE: &str = phase_metric!(histogram, "quality", "batch_size");
const PASS_RATIO: &str = phase_metric!(gauge, "quality", "pass_ratio");

static DOCS: Lazy<Vec<MetricDoc>> = Lazy::new(|| {
    vec![
        MetricDoc {
            name: RECORDS_EVALUATED,
            metric_type: MetricType::Counter,
            help: "Records that reached a rule",
            labels: vec!["rule"],
        },
        MetricDoc {
            name: RECORDS_REJECTED,
            metric_type: MetricType::Counter,
            help: "Records rejected, attributed to the first rule they failed",
            labels: vec!["rule"],
        },
        MetricDoc {
            name: RULES_SKIPPED,
            metric_type: MetricType::Counter,
            help: "Rules skipped because the batch schema lacks their columns",
            labels: vec!["rule"],
        },
        MetricDoc {
            name: QUARANTINE_WRITES,
            metric_type: MetricType::Counter,
            help: "Quarantine partitions written",
            labels: vec![],
        },
        MetricDoc {
            name: QUARANTINE_WRITE_ERRORS,
            metric_type: MetricType::Counter,
            help: "Quarantine writes that failed; rejected-record provenance lost for the run",
            labels: vec![],
        },
        MetricDoc {
            name: QUARANTINED_RECORDS,
            metric_type: MetricType::Counter,
            help: "Records persisted to quarantine",
            labels: vec![],
        },
        MetricDoc {
            name: RUNS_COMPLETED,
            metric_type: MetricType::Counter,
            help: "Runs that reached Done",
            labels: vec![],
        },
        MetricDoc {
            name: RUNS_ABORTED,
            metric_type: MetricType::Counter,
            help: "Runs aborted by a fatal error",
            labels: vec!["state"],
        },
        MetricDoc {
            name: BATCH_SIZE,
            metric_type: MetricType::Histogram,
            help: "Records per processed batch",
            labels: vec![],
        },
        MetricDoc {
            name: PASS_RATIO,
            metric_type: MetricType::Gauge,
            help: "Share of the last batch that was accepted",
            labels: vec![],
        },
    ]
});

/// Metrics collection for the Quality phase
pub struct QualityPhaseMetrics;

impl QualityPhaseMetrics {
    pub fn record_rule_evaluated(rule: RuleId, evaluated: usize, rejected: usize) {
        ::metrics::counter!(RECORDS_EVALUATED, "rule" => rule.as_str()).increment(evaluated as u64);
        ::metrics::counter!(RECORDS_REJECTED, "rule" => rule.as_str()).increment(rejected as u64);
    }

    pub fn record_rule_skipped(rule: RuleId) {
        ::metrics::counter!(RULES_SKIPPED, "rule" => rule.as_str()).increment(1);
    }

    pub fn record_quarantine_written(records: usize) {
        ::metrics::counter!(QUARANTINE_WRITES).increment(1);
        ::metrics::counter!(QUARANTINED_RECORDS).increment(records as u64);
    }

    pub fn record_quarantine_failed() {
        ::metrics::counter!(QUARANTINE_WRITE_ERRORS).increment(1);
    }

    pub fn record_run_completed(processed: usize, passed: usize) {
        ::metrics::counter!(RUNS_COMPLETED).increment(1);
        ::metrics::histogram!(BATCH_SIZE).record(processed as f64);
        if processed > 0 {
            ::metrics::gauge!(PASS_RATIO).set(passed as f64 / processed as f64);
        }
    }

    pub fn record_run_aborted(state: String) {
        ::metrics::counter!(RUNS_ABORTED, "state" => state).increment(1);
    }
}

impl PhaseMetrics for QualityPhaseMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        for rule in RuleId::ORDERED {
            let _ = counter!(RECORDS_EVALUATED, "rule" => rule.as_str());
            let _ = counter!(RECORDS_REJECTED, "rule" => rule.as_str());
        }
        let _ = counter!(QUARANTINE_WRITES);
        let _ = counter!(QUARANTINE_WRITE_ERRORS);
        let _ = counter!(QUARANTINED_RECORDS);
        let _ = counter!(RUNS_COMPLETED);
        let _ = histogram!(BATCH_SIZE);
        let _ = gauge!(PASS_RATIO);
    }

    fn phase_name() -> &'static str {
        "quality"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        DOCS.clone()
    }
}

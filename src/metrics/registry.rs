//! Metrics registry for coordinating phase-specific metrics
//!
//! Registers every phase's metrics at startup and detects naming conflicts early.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Register all metrics from all phases
pub fn register_all_metrics() -> usize {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::quality::QualityPhaseMetrics>(&mut all_metrics);

    info!(
        "Registered {} total metrics across all phases",
        all_metrics.len()
    );

    if std::env::var("TRIP_QUARANTINE_METRICS_DEBUG").is_ok() {
        for doc in all_metrics.values() {
            debug!("{} ({:?}): {}", doc.name, doc.metric_type, doc.help);
        }
    }

    all_metrics.len()
}

/// Register metrics for a specific phase and detect conflicts
fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<String, MetricDoc>) {
    T::register_metrics();
    let phase_docs = T::metrics_documentation();
    let phase_name = T::phase_name();

    info!(
        "Registering {} metrics for phase '{}'",
        phase_docs.len(),
        phase_name
    );

    for doc in phase_docs {
        if let Some(existing) = all_metrics.get(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' is already registered ({})",
                doc.name, existing.help
            );
        } else {
            all_metrics.insert(doc.name.to_string(), doc);
        }
    }
}

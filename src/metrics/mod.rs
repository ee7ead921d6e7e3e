//! Metrics infrastructure for the validation pipeline
//!
//! Counters go through the `metrics` facade so any installed recorder sees
//! them. The pipeline itself never calls the facade directly; it reports to
//! the `MetricsSink` carried by its `RunContext`.

pub mod quality;
pub mod registry;
pub mod sink;

pub use quality::QualityPhaseMetrics;
pub use sink::{MetricsSink, NoopMetricsSink, PrometheusMetricsSink};

use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing::{info, warn};

pub const METRICS_ADDR_ENV_VAR: &str = "TRIP_QUARANTINE_METRICS_ADDR";

static INSTALLED: OnceLock<bool> = OnceLock::new();
static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Returns whether one is active.
///
/// Idempotent: later calls report the first call's outcome. With an address
/// the exporter also serves `/metrics` over HTTP (needs a running tokio
/// runtime); without one the recorder is kept in-process so `render()` can
/// dump a snapshot at the end of a batch job. Metric descriptions are only
/// registered once a recorder is in place.
pub fn init_metrics(addr: Option<SocketAddr>) -> bool {
    *INSTALLED.get_or_init(|| {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

        match addr {
            Some(addr) => match builder.with_http_listener(addr).install() {
                Ok(()) => info!("Prometheus HTTP exporter started at http://{}/metrics", addr),
                Err(e) => {
                    warn!("Failed to start Prometheus exporter on {}: {}", addr, e);
                    return false;
                }
            },
            None => match builder.install_recorder() {
                Ok(handle) => {
                    if HANDLE.set(handle).is_err() {
                        warn!("Prometheus handle was already stored");
                    }
                    info!("Prometheus recorder installed (in-process render only)");
                }
                Err(e) => {
                    warn!("Failed to install Prometheus recorder: {}", e);
                    return false;
                }
            },
        }

        registry::register_all_metrics();
        true
    })
}

/// Prometheus text snapshot, when the in-process recorder is installed
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

/// Trait for phase-specific metrics collections
///
/// Each pipeline phase implements this trait to provide:
/// - Metric registration at startup
/// - Consistent naming conventions
/// - Documentation of what each metric measures
pub trait PhaseMetrics {
    /// Register all metrics for this phase
    fn register_metrics();

    /// Get the phase name for prefixing metrics
    fn phase_name() -> &'static str;

    /// Get documentation for all metrics in this phase
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Macro to create phase-specific metric names with consistent naming
///
/// This ensures all metrics follow the naming convention:
/// tq_{phase}_{metric_name}_{type}
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("tq_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("tq_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("tq_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

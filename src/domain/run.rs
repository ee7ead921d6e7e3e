use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::{MetricsSink, NoopMetricsSink};

/// Identifier of one pipeline invocation.
///
/// The timestamp prefix sorts runs by creation time; the random suffix keeps
/// two runs started within the same second apart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a run needs that is not data: who it is, when it is, and
/// where its counters go.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub now: DateTime<Utc>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl RunContext {
    pub fn new(run_id: RunId, now: DateTime<Utc>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            run_id,
            now,
            metrics,
        }
    }

    /// Fresh run id stamped with the current wall clock
    pub fn start(metrics: Arc<dyn MetricsSink>) -> Self {
        let now = Utc::now();
        Self::new(RunId::generate(now), now, metrics)
    }

    pub fn without_metrics(run_id: RunId, now: DateTime<Utc>) -> Self {
        Self::new(run_id, now, Arc::new(NoopMetricsSink))
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("now", &self.now)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_ids_sort_by_creation_time() {
        let earlier = RunId::generate(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
        let later = RunId::generate(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 1).unwrap());
        assert!(earlier < later);
        assert!(earlier.as_str().starts_with("20240301_080000_"));
    }

    #[test]
    fn test_run_ids_in_the_same_second_differ() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert_ne!(RunId::generate(now), RunId::generate(now));
    }
}

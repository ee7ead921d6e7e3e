use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::EnrichedRecord;
use crate::pipeline::PipelineState;

/// Label for records whose pickup time is unknown
pub const UNKNOWN_MONTH: &str = "unknown";

/// What happened to the rejected side of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuarantineStatus {
    NotRequired,
    Written { location: String, records: usize },
    Failed { error: String },
}

/// Aggregates over the accepted stream. Averages skip absent values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcceptedStats {
    pub avg_trip_distance: Option<f64>,
    pub avg_fare_amount: Option<f64>,
    pub avg_trip_duration_minutes: Option<f64>,
    pub avg_tip_percentage: Option<f64>,
    pub records_by_month: BTreeMap<String, usize>,
}

impl AcceptedStats {
    pub fn from_records(records: &[EnrichedRecord]) -> Self {
        let mut records_by_month = BTreeMap::new();
        for record in records {
            let key = match record.trip.pickup_datetime {
                Some(pickup) => format!("{:04}-{:02}", pickup.year(), pickup.month()),
                None => UNKNOWN_MONTH.to_string(),
            };
            *records_by_month.entry(key).or_insert(0) += 1;
        }

        Self {
            avg_trip_distance: mean(records.iter().filter_map(|r| r.trip.trip_distance)),
            avg_fare_amount: mean(records.iter().filter_map(|r| r.trip.fare_amount)),
            avg_trip_duration_minutes: mean(
                records.iter().filter_map(|r| r.derived.trip_duration_minutes),
            ),
            avg_tip_percentage: mean(records.iter().filter_map(|r| r.derived.tip_percentage)),
            records_by_month,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Min and max pickup time over the given records
pub fn event_time_range(records: &[EnrichedRecord]) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
    let pickups = || records.iter().filter_map(|r| r.trip.pickup_datetime);
    (pickups().min(), pickups().max())
}

/// Report emitted once per completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub source: String,
    pub state: PipelineState,
    pub processed: usize,
    pub passed: usize,
    pub rejected: usize,
    pub rejected_by_rule: BTreeMap<String, u64>,
    pub skipped_rules: Vec<String>,
    pub min_event_time: Option<NaiveDateTime>,
    pub max_event_time: Option<NaiveDateTime>,
    pub quarantine: QuarantineStatus,
    pub accepted_location: String,
    pub stats: AcceptedStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// True when rejected-record provenance was lost for this run
    pub fn quarantine_failed(&self) -> bool {
        matches!(self.quarantine, QuarantineStatus::Failed { .. })
    }

    pub fn pass_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.passed as f64 / self.processed as f64 * 100.0
        }
    }
}

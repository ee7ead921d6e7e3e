use serde::{Serialize, Serializer};
use std::fmt;
use tracing::debug;

use crate::domain::{RuleId, RunId};

/// Stages a run moves through, in order. Every record passes every stage;
/// the only data-dependent behavior is the accept/reject split inside a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    ComputeDerived,
    Rule(RuleId),
    AggregateMetrics,
    WriteQuarantine,
    WriteAccepted,
    Summarize,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Start => f.write_str("start"),
            PipelineState::ComputeDerived => f.write_str("compute_derived"),
            PipelineState::Rule(rule) => write!(f, "rule:{}", rule),
            PipelineState::AggregateMetrics => f.write_str("aggregate_metrics"),
            PipelineState::WriteQuarantine => f.write_str("write_quarantine"),
            PipelineState::WriteAccepted => f.write_str("write_accepted"),
            PipelineState::Summarize => f.write_str("summarize"),
            PipelineState::Done => f.write_str("done"),
        }
    }
}

impl Serialize for PipelineState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Remembers where a run is so a fatal error can say where it happened
#[derive(Debug)]
pub(crate) struct StateTracker {
    run_id: RunId,
    current: PipelineState,
    visited: Vec<PipelineState>,
}

impl StateTracker {
    pub(crate) fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            current: PipelineState::Start,
            visited: vec![PipelineState::Start],
        }
    }

    pub(crate) fn enter(&mut self, next: PipelineState) {
        debug!(run_id = %self.run_id, from = %self.current, to = %next, "state transition");
        self.current = next;
        self.visited.push(next);
    }

    pub(crate) fn current(&self) -> PipelineState {
        self.current
    }

    pub(crate) fn into_visited(self) -> Vec<PipelineState> {
        self.visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_names() {
        assert_eq!(
            PipelineState::Rule(RuleId::InvalidTripDuration).to_string(),
            "rule:invalid_trip_duration"
        );
        assert_eq!(
            serde_json::to_string(&PipelineState::WriteQuarantine).unwrap(),
            "\"write_quarantine\""
        );
    }

    #[test]
    fn test_tracker_records_every_transition() {
        let mut tracker = StateTracker::new(RunId::from("r1"));
        tracker.enter(PipelineState::ComputeDerived);
        tracker.enter(PipelineState::Rule(RuleId::NullInRequiredField));
        assert_eq!(
            tracker.current(),
            PipelineState::Rule(RuleId::NullInRequiredField)
        );
        assert_eq!(tracker.into_visited().len(), 3);
    }
}

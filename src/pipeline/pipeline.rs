use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::app::ports::AcceptedSinkPort;
use crate::domain::{RawBatch, RunContext};
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::derived::DerivedColumnComputer;
use crate::pipeline::processing::quality_metrics::QualityMetrics;
use crate::pipeline::processing::rules::{RuleEngine, RuleStatus};
use crate::pipeline::quarantine::{QuarantineWriteOutcome, QuarantineWriter};
use crate::pipeline::state::{PipelineState, StateTracker};
use crate::pipeline::summary::{event_time_range, AcceptedStats, QuarantineStatus, RunSummary};

/// Result of a run that reached `Done`
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub metrics: QualityMetrics,
    pub states: Vec<PipelineState>,
}

/// Drives one batch through derivation, the rule catalog, quarantine and
/// the accepted sink.
pub struct Pipeline {
    derived: DerivedColumnComputer,
    engine: RuleEngine,
    quarantine: QuarantineWriter,
    accepted_sink: Arc<dyn AcceptedSinkPort>,
}

impl Pipeline {
    pub fn new(engine: RuleEngine, quarantine: QuarantineWriter, accepted_sink: Arc<dyn AcceptedSinkPort>) -> Self {
        Self {
            derived: DerivedColumnComputer::new(),
            engine,
            quarantine,
            accepted_sink,
        }
    }

    /// Run one batch to `Done`.
    ///
    /// Fatal errors come back as `PipelineError::Aborted` naming the state
    /// the run was in. A failed quarantine write is not fatal; it is
    /// reported in the summary instead.
    pub async fn run(&self, batch: RawBatch, ctx: &RunContext) -> Result<RunOutcome> {
        let mut tracker = StateTracker::new(ctx.run_id.clone());
        match self.run_states(batch, ctx, &mut tracker).await {
            Ok((summary, metrics)) => {
                ctx.metrics.run_completed(&summary);
                Ok(RunOutcome {
                    summary,
                    metrics,
                    states: tracker.into_visited(),
                })
            }
            Err(e) => {
                let state = tracker.current();
                error!(run_id = %ctx.run_id, state = %state, "Run aborted: {}", e);
                ctx.metrics.run_aborted(&state);
                Err(e.aborted_in(state))
            }
        }
    }

    async fn run_states(
        &self,
        batch: RawBatch,
        ctx: &RunContext,
        tracker: &mut StateTracker,
    ) -> Result<(RunSummary, QualityMetrics)> {
        let source = batch.source.clone();
        let processed = batch.len();
        info!(run_id = %ctx.run_id, source = %source, processed, "Starting validation run");

        tracker.enter(PipelineState::ComputeDerived);
        let mut current = self.derived.compute(&batch);
        drop(batch);

        let mut metrics = QualityMetrics::new();
        let mut invalid_batches = Vec::new();
        let mut skipped_rules = Vec::new();

        for rule in self.engine.rules() {
            let id = rule.id();
            tracker.enter(PipelineState::Rule(id));

            let evaluated = current.len();
            let result = self.engine.evaluate(current, rule, Utc::now())?;

            match &result.status {
                RuleStatus::Evaluated => {
                    let rejected = result.invalid.len();
                    metrics.record(id, rejected as u64)?;
                    ctx.metrics.rule_evaluated(id, evaluated, rejected);
                    if rejected > 0 {
                        info!(run_id = %ctx.run_id, rule = %id, rejected, "Rule rejected {} of {} records", rejected, evaluated);
                    }
                }
                RuleStatus::Skipped { reason } => {
                    warn!(run_id = %ctx.run_id, rule = %id, "Rule skipped: {}", reason);
                    ctx.metrics.rule_skipped(id);
                    skipped_rules.push(id.as_str().to_string());
                }
            }

            if !result.invalid.is_empty() {
                invalid_batches.push(result.invalid);
            }
            current = result.valid;
        }

        tracker.enter(PipelineState::AggregateMetrics);
        let passed = current.len();
        let rejected = processed - passed;
        debug_assert_eq!(metrics.total_rejected(), rejected as u64);
        info!(
            run_id = %ctx.run_id,
            processed,
            passed,
            rejected,
            "Rejections by rule: {:?}",
            metrics.by_name()
        );

        tracker.enter(PipelineState::WriteQuarantine);
        let quarantine = match self.quarantine.write(invalid_batches, &ctx.run_id, ctx.now).await {
            Ok(QuarantineWriteOutcome::NotRequired) => QuarantineStatus::NotRequired,
            Ok(QuarantineWriteOutcome::Written { location, records }) => {
                ctx.metrics.quarantine_written(records);
                QuarantineStatus::Written { location, records }
            }
            Err(e) => {
                error!(run_id = %ctx.run_id, "Rejected-record provenance lost for this run: {}", e);
                ctx.metrics.quarantine_failed();
                QuarantineStatus::Failed {
                    error: e.to_string(),
                }
            }
        };

        tracker.enter(PipelineState::WriteAccepted);
        let accepted_location = self
            .accepted_sink
            .write_accepted(&current, &ctx.run_id)
            .await
            .map_err(|e| PipelineError::AcceptedWrite(format!("{:#}", e)))?;

        tracker.enter(PipelineState::Summarize);
        let (min_event_time, max_event_time) = event_time_range(&current.records);
        let summary = RunSummary {
            run_id: ctx.run_id.to_string(),
            source,
            state: PipelineState::Done,
            processed,
            passed,
            rejected,
            rejected_by_rule: metrics.by_name(),
            skipped_rules,
            min_event_time,
            max_event_time,
            quarantine,
            accepted_location,
            stats: AcceptedStats::from_records(&current.records),
            started_at: ctx.now,
            finished_at: Utc::now(),
        };

        tracker.enter(PipelineState::Done);
        info!(
            run_id = %summary.run_id,
            processed,
            passed,
            rejected,
            "Run complete ({:.1}% passed)",
            summary.pass_rate()
        );

        Ok((summary, metrics))
    }
}

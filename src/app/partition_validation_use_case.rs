use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::app::ports::BatchSourcePort;
use crate::domain::RunContext;
use crate::error::{PipelineError, Result};
use crate::metrics::MetricsSink;
use crate::pipeline::{Pipeline, PipelineState, QualityMetrics, RunOutcome};

/// Outcome of one partition in a multi-partition job
#[derive(Debug)]
pub struct PartitionRun {
    pub path: String,
    pub result: Result<RunOutcome>,
}

#[derive(Debug, Default)]
pub struct PartitionReport {
    /// Same order as the input paths
    pub runs: Vec<PartitionRun>,
    /// Summed over the runs that reached `Done`
    pub metrics: QualityMetrics,
}

impl PartitionReport {
    pub fn succeeded(&self) -> usize {
        self.runs.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.runs.len() - self.succeeded()
    }
}

/// Use case for validating storage partitions, one independent run each
pub struct PartitionValidationUseCase {
    source: Arc<dyn BatchSourcePort>,
    pipeline: Arc<Pipeline>,
    metrics: Arc<dyn MetricsSink>,
    max_parallel: usize,
}

impl PartitionValidationUseCase {
    pub fn new(
        source: Arc<dyn BatchSourcePort>,
        pipeline: Arc<Pipeline>,
        metrics: Arc<dyn MetricsSink>,
        max_parallel: usize,
    ) -> Self {
        Self {
            source,
            pipeline,
            metrics,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Read and validate one partition under a fresh run id
    pub async fn run_partition(&self, path: &str) -> Result<RunOutcome> {
        let ctx = RunContext::start(self.metrics.clone());
        validate(self.source.as_ref(), &self.pipeline, path, &ctx).await
    }

    /// Same as `run_partition`, with a caller-supplied context
    pub async fn run_partition_with(&self, path: &str, ctx: &RunContext) -> Result<RunOutcome> {
        validate(self.source.as_ref(), &self.pipeline, path, ctx).await
    }

    /// Validate partitions concurrently, at most `max_parallel` at a time.
    ///
    /// A failing partition does not stop the others.
    pub async fn run_partitions(&self, paths: &[String]) -> PartitionReport {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        info!(
            "Validating {} partitions (max {} in parallel)",
            paths.len(),
            self.max_parallel
        );

        let handles: Vec<_> = paths
            .iter()
            .map(|path| {
                let semaphore = semaphore.clone();
                let source = self.source.clone();
                let pipeline = self.pipeline.clone();
                let metrics = self.metrics.clone();
                let path = path.clone();

                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| PipelineError::Source(format!("partition scheduler closed: {}", e)))?;
                    let ctx = RunContext::start(metrics);
                    validate(source.as_ref(), &pipeline, &path, &ctx).await
                })
            })
            .collect();

        let mut report = PartitionReport::default();
        for (path, handle) in paths.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(PipelineError::Source(format!("validation task for {} failed: {}", path, e))),
            };

            match &result {
                Ok(outcome) => report.metrics.merge(&outcome.metrics),
                Err(e) => error!(partition = %path, "Partition failed: {}", e),
            }
            report.runs.push(PartitionRun {
                path: path.clone(),
                result,
            });
        }

        info!(
            "Partitions finished: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }
}

async fn validate(
    source: &dyn BatchSourcePort,
    pipeline: &Pipeline,
    path: &str,
    ctx: &RunContext,
) -> Result<RunOutcome> {
    let batch = match source.read_partition(path).await {
        Ok(batch) => batch,
        Err(e) => {
            ctx.metrics.run_aborted(&PipelineState::Start);
            return Err(PipelineError::Source(format!("{}: {:#}", path, e)).aborted_in(PipelineState::Start));
        }
    };
    pipeline.run(batch, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuleConfig, WriteMode};
    use crate::domain::{Batch, Field, RuleId, TripRecord};
    use crate::infra::in_memory::{InMemoryAcceptedSink, InMemoryBatchSource, InMemoryQuarantineSink};
    use crate::metrics::NoopMetricsSink;
    use crate::pipeline::{QuarantineWriter, RuleEngine};
    use chrono::NaiveDate;

    fn trip(passengers: i64) -> TripRecord {
        let pickup = NaiveDate::from_ymd_opt(2023, 2, 14)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        TripRecord {
            pickup_datetime: Some(pickup),
            dropoff_datetime: Some(pickup + chrono::Duration::minutes(25)),
            passenger_count: Some(passengers),
            trip_distance: Some(5.0),
            fare_amount: Some(22.0),
            tip_amount: Some(4.0),
            total_amount: Some(27.5),
            ..Default::default()
        }
    }

    fn use_case(source: InMemoryBatchSource, quarantine: Arc<InMemoryQuarantineSink>) -> PartitionValidationUseCase {
        let pipeline = Pipeline::new(
            RuleEngine::from_config(&RuleConfig::default()).unwrap(),
            QuarantineWriter::new(quarantine, WriteMode::ErrorIfExists),
            Arc::new(InMemoryAcceptedSink::new()),
        );
        PartitionValidationUseCase::new(Arc::new(source), Arc::new(pipeline), Arc::new(NoopMetricsSink), 2)
    }

    fn columns() -> std::collections::BTreeSet<Field> {
        Field::SOURCE.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_partitions_run_independently_and_merge_metrics() {
        let source = InMemoryBatchSource::new()
            .with_partition(Batch::new("a", columns(), vec![trip(1), trip(0)]))
            .with_partition(Batch::new("b", columns(), vec![trip(9), trip(0), trip(2)]))
            .with_partition(Batch::new("c", columns(), vec![trip(3)]));
        let quarantine = Arc::new(InMemoryQuarantineSink::new());
        let paths: Vec<String> = ["a", "missing", "b", "c"].iter().map(|s| s.to_string()).collect();

        let report = use_case(source, quarantine.clone()).run_partitions(&paths).await;

        let order: Vec<&str> = report.runs.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(order, vec!["a", "missing", "b", "c"]);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.metrics.get(RuleId::NumericRangeViolation), Some(3));
        assert_eq!(report.metrics.get(RuleId::NullInRequiredField), Some(0));

        let err = report.runs[1].result.as_ref().unwrap_err();
        assert_eq!(err.aborted_state(), Some(&PipelineState::Start));

        // two partitions had rejects, each under its own run id
        let writes = quarantine.writes();
        assert_eq!(writes.len(), 2);
        assert_ne!(writes[0].0.run_id, writes[1].0.run_id);
    }

    #[tokio::test]
    async fn test_single_partition_uses_fresh_run_id() {
        let source = InMemoryBatchSource::new().with_partition(Batch::new("a", columns(), vec![trip(1)]));
        let use_case = use_case(source, Arc::new(InMemoryQuarantineSink::new()));

        let first = use_case.run_partition("a").await.unwrap();
        let second = use_case.run_partition("a").await.unwrap();
        assert_ne!(first.summary.run_id, second.summary.run_id);
        assert_eq!(first.summary.passed, 1);
    }
}

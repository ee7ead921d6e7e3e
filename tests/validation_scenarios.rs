use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::sync::Arc;

use trip_quarantine::app::ports::QuarantineSinkPort;
use trip_quarantine::config::{RuleConfig, WriteMode};
use trip_quarantine::domain::{Batch, Field, RawBatch, RuleId, RunContext, RunId, TripRecord};
use trip_quarantine::infra::in_memory::{InMemoryAcceptedSink, InMemoryQuarantineSink};
use trip_quarantine::pipeline::{
    DerivedColumnComputer, Pipeline, PipelineState, QuarantineBatch, QuarantinePartition, QuarantineStatus,
    QuarantineWriter, RuleEngine, RunOutcome,
};

/// Quarantine storage that is never reachable
struct UnreachableQuarantine;

#[async_trait]
impl QuarantineSinkPort for UnreachableQuarantine {
    async fn write_quarantine(
        &self,
        partition: &QuarantinePartition,
        _batch: &QuarantineBatch,
        _mode: WriteMode,
    ) -> anyhow::Result<String> {
        anyhow::bail!("quarantine bucket unreachable for {}", partition)
    }
}

fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn valid_trip(day: u32) -> TripRecord {
    TripRecord {
        vendor_id: Some(1),
        pickup_datetime: Some(at(day, 10, 0)),
        dropoff_datetime: Some(at(day, 10, 18)),
        passenger_count: Some(1),
        trip_distance: Some(3.4),
        fare_amount: Some(16.3),
        extra: Some(1.0),
        mta_tax: Some(0.5),
        tip_amount: Some(3.0),
        tolls_amount: Some(0.0),
        improvement_surcharge: Some(0.3),
        total_amount: Some(21.1),
        payment_type: Some(1),
        pickup_location_id: Some(161),
        dropoff_location_id: Some(237),
    }
}

fn batch(trips: Vec<TripRecord>) -> RawBatch {
    Batch::new("yellow/2023-01", Field::SOURCE.iter().copied().collect(), trips)
}

fn ctx() -> RunContext {
    RunContext::without_metrics(
        RunId::from("20230201_030000_0a1b2c3d"),
        Utc.with_ymd_and_hms(2023, 2, 1, 3, 0, 0).unwrap(),
    )
}

struct Harness {
    accepted: Arc<InMemoryAcceptedSink>,
    quarantine: Arc<InMemoryQuarantineSink>,
    pipeline: Pipeline,
}

fn harness() -> Harness {
    let accepted = Arc::new(InMemoryAcceptedSink::new());
    let quarantine = Arc::new(InMemoryQuarantineSink::new());
    let pipeline = Pipeline::new(
        RuleEngine::from_config(&RuleConfig::default()).unwrap(),
        QuarantineWriter::new(quarantine.clone(), WriteMode::ErrorIfExists),
        accepted.clone(),
    );
    Harness {
        accepted,
        quarantine,
        pipeline,
    }
}

fn assert_metric_sum(outcome: &RunOutcome) {
    let total: u64 = outcome.metrics.snapshot().values().sum();
    assert_eq!(
        total,
        (outcome.summary.processed - outcome.summary.passed) as u64
    );
}

#[tokio::test]
async fn test_zero_passengers_rejected_by_numeric_range() {
    let h = harness();
    let mut trip = valid_trip(5);
    trip.passenger_count = Some(0);

    let outcome = h.pipeline.run(batch(vec![trip]), &ctx()).await.unwrap();

    assert_eq!(outcome.metrics.get(RuleId::NumericRangeViolation), Some(1));
    assert_eq!(outcome.summary.passed, 0);
    let accepted = h.accepted.batches();
    assert_eq!(accepted.len(), 1);
    assert!(accepted[0].1.is_empty());

    let writes = h.quarantine.writes();
    assert_eq!(writes[0].1.records[0].rejected.failure_reason, RuleId::NumericRangeViolation);
    assert_metric_sum(&outcome);
}

#[tokio::test]
async fn test_reversed_times_attributed_to_ordering_only() {
    let h = harness();
    let mut trip = valid_trip(5);
    trip.dropoff_datetime = Some(at(5, 9, 0));

    let outcome = h.pipeline.run(batch(vec![trip]), &ctx()).await.unwrap();

    assert_eq!(outcome.metrics.get(RuleId::InvalidDatetimeSequence), Some(1));
    assert_eq!(outcome.metrics.get(RuleId::InvalidTripDuration), Some(0));
    assert_eq!(outcome.summary.rejected, 1);
    assert_metric_sum(&outcome);
}

#[tokio::test]
async fn test_mixed_batch_splits_three_and_two() {
    let h = harness();
    let mut missing_fare = valid_trip(2);
    missing_fare.fare_amount = None;
    let mut too_far = valid_trip(3);
    too_far.trip_distance = Some(150.0);
    let trips = vec![valid_trip(1), missing_fare, valid_trip(4), too_far, valid_trip(6)];

    let outcome = h.pipeline.run(batch(trips), &ctx()).await.unwrap();

    assert_eq!(outcome.summary.processed, 5);
    assert_eq!(outcome.summary.passed, 3);
    assert_eq!(outcome.summary.rejected, 2);

    let accepted = h.accepted.batches();
    let rows: Vec<usize> = accepted[0].1.records.iter().map(|r| r.row).collect();
    assert_eq!(rows, vec![0, 2, 4]);

    let writes = h.quarantine.writes();
    assert_eq!(writes.len(), 1);
    let reasons: Vec<RuleId> = writes[0]
        .1
        .records
        .iter()
        .map(|e| e.rejected.failure_reason)
        .collect();
    assert_eq!(
        reasons,
        vec![RuleId::NullInRequiredField, RuleId::NumericRangeViolation]
    );
    assert!(writes[0].1.records.iter().all(|e| e.run_id == "20230201_030000_0a1b2c3d"));
    assert_eq!(writes[0].0.year, 2023);
    assert_eq!(writes[0].0.month, 2);
    assert_metric_sum(&outcome);
}

#[tokio::test]
async fn test_long_trip_and_big_tip_carry_their_own_reasons() {
    let h = harness();
    let mut marathon = valid_trip(2);
    marathon.dropoff_datetime = Some(at(2, 15, 1));
    let mut generous = valid_trip(3);
    generous.tip_amount = Some(20.0);
    let mut longest_allowed = valid_trip(4);
    longest_allowed.dropoff_datetime = Some(at(4, 15, 0));
    let mut full_tip = valid_trip(5);
    full_tip.tip_amount = full_tip.fare_amount;

    let trips = vec![marathon, generous, longest_allowed, full_tip];
    let outcome = h.pipeline.run(batch(trips), &ctx()).await.unwrap();

    assert_eq!(outcome.summary.passed, 2);
    assert_eq!(outcome.summary.rejected_by_rule["invalid_trip_duration"], 1);
    assert_eq!(outcome.summary.rejected_by_rule["invalid_tip_percentage"], 1);

    let writes = h.quarantine.writes();
    let reasons: Vec<(usize, RuleId)> = writes[0]
        .1
        .records
        .iter()
        .map(|e| (e.rejected.record.row, e.rejected.failure_reason))
        .collect();
    assert_eq!(
        reasons,
        vec![(0, RuleId::InvalidTripDuration), (1, RuleId::InvalidTipPercentage)]
    );

    let rows: Vec<usize> = h.accepted.batches()[0].1.records.iter().map(|r| r.row).collect();
    assert_eq!(rows, vec![2, 3]);
    assert_metric_sum(&outcome);
}

#[tokio::test]
async fn test_all_valid_means_no_quarantine_write() {
    let h = harness();
    let trips = (1..=5).map(valid_trip).collect();

    let outcome = h.pipeline.run(batch(trips), &ctx()).await.unwrap();

    assert_eq!(h.quarantine.write_calls(), 0);
    assert_eq!(outcome.summary.rejected, 0);
    assert_eq!(outcome.summary.quarantine, QuarantineStatus::NotRequired);
    assert!(outcome.summary.rejected_by_rule.values().all(|c| *c == 0));
    assert_eq!(outcome.summary.min_event_time, Some(at(1, 10, 0)));
    assert_eq!(outcome.summary.max_event_time, Some(at(5, 10, 0)));
    assert_eq!(outcome.summary.stats.records_by_month["2023-01"], 5);
}

#[tokio::test]
async fn test_quarantine_failure_is_flagged_not_fatal() {
    let accepted = Arc::new(InMemoryAcceptedSink::new());
    let failing: Arc<dyn QuarantineSinkPort> = Arc::new(UnreachableQuarantine);
    let pipeline = Pipeline::new(
        RuleEngine::from_config(&RuleConfig::default()).unwrap(),
        QuarantineWriter::new(failing, WriteMode::ErrorIfExists),
        accepted.clone(),
    );
    let mut bad = valid_trip(2);
    bad.passenger_count = Some(12);

    let outcome = pipeline
        .run(batch(vec![valid_trip(1), bad]), &ctx())
        .await
        .unwrap();

    assert_eq!(outcome.summary.state, PipelineState::Done);
    assert!(outcome.summary.quarantine_failed());
    assert_eq!(accepted.write_calls(), 1);
    assert_eq!(accepted.batches()[0].1.len(), 1);
}

#[tokio::test]
async fn test_record_failing_every_rule_counted_once() {
    let h = harness();
    // null passenger count, negative fare, reversed times, huge tip
    let mut awful = valid_trip(3);
    awful.passenger_count = None;
    awful.fare_amount = Some(-5.0);
    awful.dropoff_datetime = Some(at(3, 9, 0));
    awful.tip_amount = Some(500.0);
    let mut range_and_duration = valid_trip(4);
    range_and_duration.trip_distance = Some(0.0);
    range_and_duration.dropoff_datetime = Some(at(4, 23, 0));

    let outcome = h
        .pipeline
        .run(batch(vec![awful, range_and_duration, valid_trip(5)]), &ctx())
        .await
        .unwrap();

    assert_eq!(outcome.metrics.get(RuleId::NullInRequiredField), Some(1));
    assert_eq!(outcome.metrics.get(RuleId::NumericRangeViolation), Some(1));
    assert_eq!(outcome.metrics.get(RuleId::InvalidDatetimeSequence), Some(0));
    assert_eq!(outcome.metrics.get(RuleId::InvalidTripDuration), Some(0));
    assert_eq!(outcome.summary.rejected, 2);
    assert_metric_sum(&outcome);
}

#[tokio::test]
async fn test_schema_without_optional_columns_skips_their_rules() {
    let h = harness();
    let columns = [
        Field::PickupDatetime,
        Field::DropoffDatetime,
        Field::PassengerCount,
        Field::TripDistance,
        Field::FareAmount,
        Field::TotalAmount,
    ]
    .into_iter()
    .collect();
    let mut trip = valid_trip(7);
    trip.tip_amount = None;
    let narrow = Batch::new("narrow", columns, vec![trip]);

    let outcome = h.pipeline.run(narrow, &ctx()).await.unwrap();

    assert_eq!(outcome.summary.skipped_rules, vec!["invalid_tip_percentage".to_string()]);
    assert!(!outcome.summary.rejected_by_rule.contains_key("invalid_tip_percentage"));
    assert_eq!(outcome.summary.passed, 1);
}

#[test]
fn test_derived_columns_are_deterministic() {
    let mut odd = valid_trip(9);
    odd.fare_amount = Some(0.0);
    odd.dropoff_datetime = None;
    let raw = batch(vec![valid_trip(8), odd]);

    let computer = DerivedColumnComputer::new();
    assert_eq!(computer.compute(&raw), computer.compute(&raw));
}

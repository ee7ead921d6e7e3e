use chrono::{Datelike, Timelike};
use std::collections::BTreeSet;
use tracing::debug;

use crate::domain::{
    Batch, DerivedColumns, EnrichedBatch, EnrichedRecord, Field, QualityFlag, RawBatch, TripRecord,
};

const SUSPICIOUS_FARE_MAX_DISTANCE: f64 = 0.5;
const SUSPICIOUS_FARE_MIN_AMOUNT: f64 = 20.0;
const HIGH_SPEED_MPH: f64 = 60.0;

/// Computes the columns later rules depend on. Never filters.
///
/// Pure: the same batch always produces the same derived values, so running
/// it twice is harmless.
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedColumnComputer;

impl DerivedColumnComputer {
    pub fn new() -> Self {
        Self
    }

    /// Produce a new batch carrying derived columns; the input is untouched
    pub fn compute(&self, batch: &RawBatch) -> EnrichedBatch {
        let columns = Self::derived_schema(&batch.columns);
        let added: Vec<&str> = columns
            .difference(&batch.columns)
            .map(|f| f.as_str())
            .collect();
        debug!(source = %batch.source, "Derived columns added: {:?}", added);

        let records = batch
            .records
            .iter()
            .enumerate()
            .map(|(row, trip)| EnrichedRecord {
                row,
                trip: trip.clone(),
                derived: Self::derive(trip, &columns),
            })
            .collect();

        Batch::new(batch.source.clone(), columns, records)
    }

    /// Source schema plus the derived columns whose inputs it carries.
    ///
    /// A schema without timestamps gets no duration column, which is what
    /// lets the duration rule skip instead of rejecting every record.
    pub fn derived_schema(source: &BTreeSet<Field>) -> BTreeSet<Field> {
        let has = |field: Field| source.contains(&field);
        let mut columns = source.clone();

        let has_times = has(Field::PickupDatetime) && has(Field::DropoffDatetime);
        if has_times {
            columns.insert(Field::TripDurationMinutes);
        }
        if has(Field::FareAmount) && has(Field::TipAmount) {
            columns.insert(Field::TipPercentage);
        }
        if has_times && has(Field::TripDistance) {
            columns.insert(Field::AvgSpeedMph);
        }
        if has(Field::PickupDatetime) {
            columns.insert(Field::PickupHour);
            columns.insert(Field::PickupDayOfWeek);
        }
        if has(Field::TripDistance) && has(Field::FareAmount) {
            columns.insert(Field::QualityFlag);
        }
        columns
    }

    /// Derived values for one trip, limited to the columns in `schema`
    pub fn derive(trip: &TripRecord, schema: &BTreeSet<Field>) -> DerivedColumns {
        let in_schema = |field: Field| schema.contains(&field);

        let trip_duration_minutes = if in_schema(Field::TripDurationMinutes) {
            trip_duration_minutes(trip)
        } else {
            None
        };

        let tip_percentage = if in_schema(Field::TipPercentage) {
            tip_percentage(trip)
        } else {
            None
        };

        let avg_speed_mph = if in_schema(Field::AvgSpeedMph) {
            match (trip.trip_distance, trip_duration_minutes) {
                (Some(distance), Some(minutes)) if minutes > 0.0 => Some(distance / (minutes / 60.0)),
                (Some(_), Some(_)) => Some(0.0),
                _ => None,
            }
        } else {
            None
        };

        let (pickup_hour, pickup_day_of_week) = match trip.pickup_datetime {
            Some(pickup) if in_schema(Field::PickupHour) => (
                Some(pickup.hour()),
                Some(pickup.weekday().number_from_sunday()),
            ),
            _ => (None, None),
        };

        let quality_flag = if in_schema(Field::QualityFlag) {
            Some(quality_flag(trip, avg_speed_mph))
        } else {
            None
        };

        DerivedColumns {
            trip_duration_minutes,
            tip_percentage,
            avg_speed_mph,
            pickup_hour,
            pickup_day_of_week,
            quality_flag,
        }
    }
}

/// Whole-second elapsed time in minutes; absent when either end is missing
fn trip_duration_minutes(trip: &TripRecord) -> Option<f64> {
    let pickup = trip.pickup_datetime?;
    let dropoff = trip.dropoff_datetime?;
    Some((dropoff - pickup).num_seconds() as f64 / 60.0)
}

fn tip_percentage(trip: &TripRecord) -> Option<f64> {
    match trip.fare_amount {
        Some(fare) if fare > 0.0 => trip.tip_amount.map(|tip| tip / fare * 100.0),
        _ => Some(0.0),
    }
}

fn quality_flag(trip: &TripRecord, avg_speed_mph: Option<f64>) -> QualityFlag {
    let short_trip = trip
        .trip_distance
        .map_or(false, |d| d < SUSPICIOUS_FARE_MAX_DISTANCE);
    let high_fare = trip
        .fare_amount
        .map_or(false, |f| f > SUSPICIOUS_FARE_MIN_AMOUNT);

    if short_trip && high_fare {
        QualityFlag::SuspiciousFare
    } else if avg_speed_mph.map_or(false, |s| s > HIGH_SPEED_MPH) {
        QualityFlag::HighSpeed
    } else {
        QualityFlag::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn full_schema() -> BTreeSet<Field> {
        Field::SOURCE.iter().copied().collect()
    }

    fn trip() -> TripRecord {
        TripRecord {
            pickup_datetime: Some(at(12, 0, 0)),
            dropoff_datetime: Some(at(12, 15, 30)),
            passenger_count: Some(2),
            trip_distance: Some(2.5),
            fare_amount: Some(12.5),
            tip_amount: Some(2.5),
            total_amount: Some(15.5),
            ..Default::default()
        }
    }

    #[test]
    fn test_duration_and_tip_percentage() {
        let derived = DerivedColumnComputer::derive(&trip(), &DerivedColumnComputer::derived_schema(&full_schema()));
        assert_eq!(derived.trip_duration_minutes, Some(15.5));
        assert_eq!(derived.tip_percentage, Some(20.0));
        assert_eq!(derived.pickup_hour, Some(12));
        // 2023-01-01 was a Sunday
        assert_eq!(derived.pickup_day_of_week, Some(1));
        assert_eq!(derived.quality_flag, Some(QualityFlag::Normal));
    }

    #[test]
    fn test_missing_timestamp_leaves_duration_absent() {
        let mut record = trip();
        record.dropoff_datetime = None;
        let schema = DerivedColumnComputer::derived_schema(&full_schema());
        let derived = DerivedColumnComputer::derive(&record, &schema);
        assert_eq!(derived.trip_duration_minutes, None);
        assert_eq!(derived.avg_speed_mph, None);
    }

    #[test]
    fn test_tip_percentage_is_zero_without_positive_fare() {
        let schema = DerivedColumnComputer::derived_schema(&full_schema());

        let mut zero_fare = trip();
        zero_fare.fare_amount = Some(0.0);
        assert_eq!(DerivedColumnComputer::derive(&zero_fare, &schema).tip_percentage, Some(0.0));

        let mut null_fare = trip();
        null_fare.fare_amount = None;
        assert_eq!(DerivedColumnComputer::derive(&null_fare, &schema).tip_percentage, Some(0.0));

        let mut null_tip = trip();
        null_tip.tip_amount = None;
        assert_eq!(DerivedColumnComputer::derive(&null_tip, &schema).tip_percentage, None);
    }

    #[test]
    fn test_schema_without_timestamps_gets_no_duration_column() {
        let source: BTreeSet<Field> = [Field::PassengerCount, Field::TripDistance, Field::FareAmount, Field::TipAmount]
            .into_iter()
            .collect();
        let schema = DerivedColumnComputer::derived_schema(&source);
        assert!(!schema.contains(&Field::TripDurationMinutes));
        assert!(!schema.contains(&Field::PickupHour));
        assert!(schema.contains(&Field::TipPercentage));
        assert!(schema.contains(&Field::QualityFlag));
    }

    #[test]
    fn test_quality_flags() {
        let schema = DerivedColumnComputer::derived_schema(&full_schema());

        let mut suspicious = trip();
        suspicious.trip_distance = Some(0.3);
        suspicious.fare_amount = Some(45.0);
        assert_eq!(
            DerivedColumnComputer::derive(&suspicious, &schema).quality_flag,
            Some(QualityFlag::SuspiciousFare)
        );

        let mut fast = trip();
        fast.trip_distance = Some(30.0);
        fast.dropoff_datetime = Some(at(12, 20, 0));
        let derived = DerivedColumnComputer::derive(&fast, &schema);
        assert_eq!(derived.avg_speed_mph, Some(90.0));
        assert_eq!(derived.quality_flag, Some(QualityFlag::HighSpeed));
    }

    #[test]
    fn test_compute_is_idempotent_and_preserves_order() {
        let mut second = trip();
        second.pickup_datetime = Some(at(13, 0, 0));
        second.dropoff_datetime = Some(at(13, 40, 0));
        let batch = Batch::new("2023-01", full_schema(), vec![trip(), second]);

        let computer = DerivedColumnComputer::new();
        let first_pass = computer.compute(&batch);
        let second_pass = computer.compute(&batch);

        assert_eq!(first_pass, second_pass);
        assert_eq!(first_pass.records[0].row, 0);
        assert_eq!(first_pass.records[1].row, 1);
        assert_eq!(first_pass.records[1].derived.trip_duration_minutes, Some(40.0));
        assert_eq!(batch.len(), 2);
    }
}

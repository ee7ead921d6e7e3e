use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::field::Field;
use super::rule_id::RuleId;

/// One trip as read from a source partition.
///
/// Every column is optional: partitions from different schema generations
/// omit columns, and nulls are data the rules must see rather than parse errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    #[serde(
        rename = "VendorID",
        default,
        deserialize_with = "lenient_int::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub vendor_id: Option<i64>,
    #[serde(
        rename = "tpep_pickup_datetime",
        default,
        with = "trip_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub pickup_datetime: Option<NaiveDateTime>,
    #[serde(
        rename = "tpep_dropoff_datetime",
        default,
        with = "trip_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub dropoff_datetime: Option<NaiveDateTime>,
    #[serde(
        default,
        deserialize_with = "lenient_int::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub passenger_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mta_tax: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolls_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvement_surcharge: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_int::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_type: Option<i64>,
    #[serde(
        rename = "PULocationID",
        default,
        deserialize_with = "lenient_int::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub pickup_location_id: Option<i64>,
    #[serde(
        rename = "DOLocationID",
        default,
        deserialize_with = "lenient_int::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub dropoff_location_id: Option<i64>,
}

impl TripRecord {
    /// Numeric view of a source column, `None` when the value is null or the
    /// column is not numeric.
    pub fn numeric(&self, field: Field) -> Option<f64> {
        match field {
            Field::VendorId => self.vendor_id.map(|v| v as f64),
            Field::PassengerCount => self.passenger_count.map(|v| v as f64),
            Field::TripDistance => self.trip_distance,
            Field::FareAmount => self.fare_amount,
            Field::Extra => self.extra,
            Field::MtaTax => self.mta_tax,
            Field::TipAmount => self.tip_amount,
            Field::TollsAmount => self.tolls_amount,
            Field::ImprovementSurcharge => self.improvement_surcharge,
            Field::TotalAmount => self.total_amount,
            Field::PaymentType => self.payment_type.map(|v| v as f64),
            Field::PickupLocationId => self.pickup_location_id.map(|v| v as f64),
            Field::DropoffLocationId => self.dropoff_location_id.map(|v| v as f64),
            _ => None,
        }
    }

    /// Whether a source column holds a value for this record
    pub fn has_value(&self, field: Field) -> bool {
        match field {
            Field::PickupDatetime => self.pickup_datetime.is_some(),
            Field::DropoffDatetime => self.dropoff_datetime.is_some(),
            other => self.numeric(other).is_some(),
        }
    }
}

/// Informational tag attached during derivation; never a rejection reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    Normal,
    SuspiciousFare,
    HighSpeed,
}

/// Columns computed from a trip before the rules run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_duration_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_speed_mph: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_hour: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_day_of_week: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_flag: Option<QualityFlag>,
}

/// A trip together with its derived columns.
///
/// `row` is the record's position in its source partition and serves as
/// its identity for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub row: usize,
    #[serde(flatten)]
    pub trip: TripRecord,
    #[serde(flatten)]
    pub derived: DerivedColumns,
}

/// A record that failed a rule, tagged with the first rule it failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    #[serde(flatten)]
    pub record: EnrichedRecord,
    pub failure_reason: RuleId,
    pub failed_at: DateTime<Utc>,
}

/// A rejected record stamped with the run that quarantined it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    #[serde(flatten)]
    pub rejected: RejectedRecord,
    pub run_id: String,
}

/// Serde adapter for TLC timestamps.
///
/// Exports come as either `2023-01-01 12:00:00` or ISO-8601 with a `T`
/// separator; both are accepted, output always uses the space form.
pub mod trip_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    const INPUT_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let trimmed = raw.trim().trim_end_matches('Z');
        INPUT_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
    }

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(OUTPUT_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid trip timestamp '{}'", s))),
        }
    }
}

/// Integer columns arrive as `1` or `1.0` depending on the exporter.
pub mod lenient_int {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(i64),
        Float(f64),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Number>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Number::Int(v)) => Ok(Some(v)),
            Some(Number::Float(v)) if v.fract() == 0.0 && v.is_finite() => Ok(Some(v as i64)),
            Some(Number::Float(v)) => Err(serde::de::Error::custom(format!(
                "expected a whole number, got {}",
                v
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_deserialize_accepts_both_timestamp_forms() {
        let record: TripRecord = serde_json::from_value(json!({
            "tpep_pickup_datetime": "2023-01-01 12:00:00",
            "tpep_dropoff_datetime": "2023-01-01T12:15:30",
            "passenger_count": 2,
            "trip_distance": 2.5
        }))
        .unwrap();

        let day = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert_eq!(record.pickup_datetime, Some(day.and_hms_opt(12, 0, 0).unwrap()));
        assert_eq!(record.dropoff_datetime, Some(day.and_hms_opt(12, 15, 30).unwrap()));
        assert_eq!(record.passenger_count, Some(2));
        assert_eq!(record.fare_amount, None);
    }

    #[test]
    fn test_null_and_missing_columns_are_absent() {
        let record: TripRecord = serde_json::from_value(json!({
            "tpep_pickup_datetime": null,
            "fare_amount": null
        }))
        .unwrap();

        assert!(!record.has_value(Field::PickupDatetime));
        assert!(!record.has_value(Field::FareAmount));
        assert!(!record.has_value(Field::TripDistance));
    }

    #[test]
    fn test_integer_columns_accept_whole_floats() {
        let record: TripRecord = serde_json::from_value(json!({
            "passenger_count": 1.0,
            "PULocationID": 142
        }))
        .unwrap();
        assert_eq!(record.passenger_count, Some(1));
        assert_eq!(record.pickup_location_id, Some(142));

        let fractional: Result<TripRecord, _> =
            serde_json::from_value(json!({ "passenger_count": 1.5 }));
        assert!(fractional.is_err());
    }

    #[test]
    fn test_invalid_timestamp_fails_deserialization() {
        let result: Result<TripRecord, _> =
            serde_json::from_value(json!({ "tpep_pickup_datetime": "yesterday" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_quarantine_entry_serializes_flat() {
        let entry = QuarantineEntry {
            rejected: RejectedRecord {
                record: EnrichedRecord {
                    row: 3,
                    trip: TripRecord {
                        passenger_count: Some(0),
                        ..Default::default()
                    },
                    derived: DerivedColumns {
                        tip_percentage: Some(0.0),
                        ..Default::default()
                    },
                },
                failure_reason: RuleId::NumericRangeViolation,
                failed_at: Utc::now(),
            },
            run_id: "20240101_000000_abcdef01".to_string(),
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["passenger_count"], json!(0));
        assert_eq!(value["tip_percentage"], json!(0.0));
        assert_eq!(value["failure_reason"], json!("numeric_range_violation"));
        assert_eq!(value["run_id"], json!("20240101_000000_abcdef01"));
        assert!(value.get("trip_distance").is_none());
    }
}

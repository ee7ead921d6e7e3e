use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every column a trip batch can carry, source and derived.
///
/// The wire names follow the TLC yellow-taxi trip record layout so that
/// partitions exported from the upstream store can be read as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    // Source columns
    #[serde(rename = "VendorID")]
    VendorId,
    #[serde(rename = "tpep_pickup_datetime")]
    PickupDatetime,
    #[serde(rename = "tpep_dropoff_datetime")]
    DropoffDatetime,
    #[serde(rename = "passenger_count")]
    PassengerCount,
    #[serde(rename = "trip_distance")]
    TripDistance,
    #[serde(rename = "fare_amount")]
    FareAmount,
    #[serde(rename = "extra")]
    Extra,
    #[serde(rename = "mta_tax")]
    MtaTax,
    #[serde(rename = "tip_amount")]
    TipAmount,
    #[serde(rename = "tolls_amount")]
    TollsAmount,
    #[serde(rename = "improvement_surcharge")]
    ImprovementSurcharge,
    #[serde(rename = "total_amount")]
    TotalAmount,
    #[serde(rename = "payment_type")]
    PaymentType,
    #[serde(rename = "PULocationID")]
    PickupLocationId,
    #[serde(rename = "DOLocationID")]
    DropoffLocationId,

    // Derived columns
    #[serde(rename = "trip_duration_minutes")]
    TripDurationMinutes,
    #[serde(rename = "tip_percentage")]
    TipPercentage,
    #[serde(rename = "avg_speed_mph")]
    AvgSpeedMph,
    #[serde(rename = "pickup_hour")]
    PickupHour,
    #[serde(rename = "pickup_day_of_week")]
    PickupDayOfWeek,
    #[serde(rename = "quality_flag")]
    QualityFlag,
}

impl Field {
    pub const SOURCE: [Field; 15] = [
        Field::VendorId,
        Field::PickupDatetime,
        Field::DropoffDatetime,
        Field::PassengerCount,
        Field::TripDistance,
        Field::FareAmount,
        Field::Extra,
        Field::MtaTax,
        Field::TipAmount,
        Field::TollsAmount,
        Field::ImprovementSurcharge,
        Field::TotalAmount,
        Field::PaymentType,
        Field::PickupLocationId,
        Field::DropoffLocationId,
    ];

    pub const DERIVED: [Field; 6] = [
        Field::TripDurationMinutes,
        Field::TipPercentage,
        Field::AvgSpeedMph,
        Field::PickupHour,
        Field::PickupDayOfWeek,
        Field::QualityFlag,
    ];

    /// Column name as it appears in partition files
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::VendorId => "VendorID",
            Field::PickupDatetime => "tpep_pickup_datetime",
            Field::DropoffDatetime => "tpep_dropoff_datetime",
            Field::PassengerCount => "passenger_count",
            Field::TripDistance => "trip_distance",
            Field::FareAmount => "fare_amount",
            Field::Extra => "extra",
            Field::MtaTax => "mta_tax",
            Field::TipAmount => "tip_amount",
            Field::TollsAmount => "tolls_amount",
            Field::ImprovementSurcharge => "improvement_surcharge",
            Field::TotalAmount => "total_amount",
            Field::PaymentType => "payment_type",
            Field::PickupLocationId => "PULocationID",
            Field::DropoffLocationId => "DOLocationID",
            Field::TripDurationMinutes => "trip_duration_minutes",
            Field::TipPercentage => "tip_percentage",
            Field::AvgSpeedMph => "avg_speed_mph",
            Field::PickupHour => "pickup_hour",
            Field::PickupDayOfWeek => "pickup_day_of_week",
            Field::QualityFlag => "quality_flag",
        }
    }

    pub fn is_derived(&self) -> bool {
        Field::DERIVED.contains(self)
    }

    /// Source columns that carry a number and can therefore take a range check
    pub fn is_numeric_source(&self) -> bool {
        matches!(
            self,
            Field::VendorId
                | Field::PassengerCount
                | Field::TripDistance
                | Field::FareAmount
                | Field::Extra
                | Field::MtaTax
                | Field::TipAmount
                | Field::TollsAmount
                | Field::ImprovementSurcharge
                | Field::TotalAmount
                | Field::PaymentType
                | Field::PickupLocationId
                | Field::DropoffLocationId
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField(pub String);

impl fmt::Display for UnknownField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown column '{}'", self.0)
    }
}

impl std::error::Error for UnknownField {}

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::SOURCE
            .iter()
            .chain(Field::DERIVED.iter())
            .find(|field| field.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_round_trip_through_from_str() {
        for field in Field::SOURCE.iter().chain(Field::DERIVED.iter()) {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), *field);
        }
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = "fare".parse::<Field>().unwrap_err();
        assert_eq!(err, UnknownField("fare".to_string()));
    }

    #[test]
    fn test_timestamps_are_not_numeric() {
        assert!(!Field::PickupDatetime.is_numeric_source());
        assert!(!Field::TripDurationMinutes.is_numeric_source());
        assert!(Field::MtaTax.is_numeric_source());
    }
}

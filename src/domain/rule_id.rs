use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of rejection reasons, in the order the rules run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    NullInRequiredField,
    NumericRangeViolation,
    InvalidDatetimeSequence,
    InvalidTripDuration,
    InvalidTipPercentage,
}

impl RuleId {
    pub const ORDERED: [RuleId; 5] = [
        RuleId::NullInRequiredField,
        RuleId::NumericRangeViolation,
        RuleId::InvalidDatetimeSequence,
        RuleId::InvalidTripDuration,
        RuleId::InvalidTipPercentage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::NullInRequiredField => "null_in_required_field",
            RuleId::NumericRangeViolation => "numeric_range_violation",
            RuleId::InvalidDatetimeSequence => "invalid_datetime_sequence",
            RuleId::InvalidTripDuration => "invalid_trip_duration",
            RuleId::InvalidTipPercentage => "invalid_tip_percentage",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

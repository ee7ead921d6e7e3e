use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

use crate::config::{Bounds, RuleConfig};
use crate::domain::{Batch, EnrichedBatch, EnrichedRecord, Field, RejectedBatch, RejectedRecord, RuleId};
use crate::error::{PipelineError, Result};

/// One integrity check, with its parameters resolved against known columns
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    RequiredFields(Vec<Field>),
    NumericRange(Vec<(Field, Bounds)>),
    TemporalOrdering,
    DurationBound(Bounds),
    TipRatioBound(Bounds),
}

impl Rule {
    pub fn id(&self) -> RuleId {
        match self {
            Rule::RequiredFields(_) => RuleId::NullInRequiredField,
            Rule::NumericRange(_) => RuleId::NumericRangeViolation,
            Rule::TemporalOrdering => RuleId::InvalidDatetimeSequence,
            Rule::DurationBound(_) => RuleId::InvalidTripDuration,
            Rule::TipRatioBound(_) => RuleId::InvalidTipPercentage,
        }
    }

    /// Why the rule cannot run against this schema, if it cannot.
    ///
    /// Only required-field presence treats a missing column as a schema
    /// error; the other rules quietly step aside.
    fn precondition<R>(&self, batch: &Batch<R>) -> Result<Option<String>> {
        match self {
            Rule::RequiredFields(fields) => {
                let absent = batch.missing_columns(fields);
                if absent.is_empty() {
                    Ok(None)
                } else {
                    Err(PipelineError::SchemaMismatch {
                        rule: self.id(),
                        missing: absent,
                    })
                }
            }
            Rule::NumericRange(ranges) => {
                if ranges.iter().any(|(field, _)| batch.has_column(*field)) {
                    Ok(None)
                } else {
                    Ok(Some("none of the range-checked columns are in the schema".to_string()))
                }
            }
            Rule::TemporalOrdering => Ok(skip_reason(
                &batch.missing_columns(&[Field::PickupDatetime, Field::DropoffDatetime]),
            )),
            Rule::DurationBound(_) => Ok(skip_reason(&batch.missing_columns(&[Field::TripDurationMinutes]))),
            Rule::TipRatioBound(_) => Ok(skip_reason(&batch.missing_columns(&[Field::TipPercentage]))),
        }
    }

    /// Whether a record fails this rule. Absent values only fail the
    /// required-field check.
    fn violated_by(&self, record: &EnrichedRecord, columns: &BTreeSet<Field>) -> bool {
        match self {
            Rule::RequiredFields(fields) => fields.iter().any(|f| !record.trip.has_value(*f)),
            Rule::NumericRange(ranges) => ranges.iter().any(|(field, bounds)| {
                columns.contains(field)
                    && record
                        .trip
                        .numeric(*field)
                        .map_or(false, |value| !bounds.contains(value))
            }),
            Rule::TemporalOrdering => match (record.trip.pickup_datetime, record.trip.dropoff_datetime) {
                (Some(pickup), Some(dropoff)) => dropoff <= pickup,
                _ => false,
            },
            Rule::DurationBound(bounds) => record
                .derived
                .trip_duration_minutes
                .map_or(false, |minutes| !bounds.contains(minutes)),
            Rule::TipRatioBound(bounds) => record
                .derived
                .tip_percentage
                .map_or(false, |ratio| !bounds.contains(ratio)),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::RequiredFields(fields) => {
                let names: Vec<&str> = fields.iter().map(|f| f.as_str()).collect();
                write!(f, "{}: non-null {}", self.id(), names.join(", "))
            }
            Rule::NumericRange(ranges) => {
                let parts: Vec<String> = ranges
                    .iter()
                    .map(|(field, b)| format!("{} in [{}, {}]", field, b.min, b.max))
                    .collect();
                write!(f, "{}: {}", self.id(), parts.join("; "))
            }
            Rule::TemporalOrdering => write!(
                f,
                "{}: {} > {}",
                self.id(),
                Field::DropoffDatetime,
                Field::PickupDatetime
            ),
            Rule::DurationBound(b) => write!(
                f,
                "{}: {} in [{}, {}]",
                self.id(),
                Field::TripDurationMinutes,
                b.min,
                b.max
            ),
            Rule::TipRatioBound(b) => write!(
                f,
                "{}: {} in [{}, {}]",
                self.id(),
                Field::TipPercentage,
                b.min,
                b.max
            ),
        }
    }
}

fn skip_reason(missing: &[Field]) -> Option<String> {
    if missing.is_empty() {
        None
    } else {
        let names: Vec<&str> = missing.iter().map(|f| f.as_str()).collect();
        Some(format!("schema lacks {}", names.join(", ")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleStatus {
    Evaluated,
    Skipped { reason: String },
}

/// Disjoint split of one rule's input
#[derive(Debug, Clone)]
pub struct RuleResult {
    pub rule: RuleId,
    pub status: RuleStatus,
    pub valid: EnrichedBatch,
    pub invalid: RejectedBatch,
}

impl RuleResult {
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, RuleStatus::Skipped { .. })
    }
}

/// The fixed, ordered rule catalog
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    /// Resolve and validate rule parameters. Any problem here is fatal and
    /// surfaces before a single record is read.
    pub fn from_config(config: &RuleConfig) -> Result<Self> {
        if config.required_fields.is_empty() {
            return Err(PipelineError::RuleConfiguration(
                "required_fields must name at least one column".to_string(),
            ));
        }

        let mut required = Vec::with_capacity(config.required_fields.len());
        for name in &config.required_fields {
            let field = parse_field(name, "required_fields")?;
            if field.is_derived() {
                return Err(PipelineError::RuleConfiguration(format!(
                    "required_fields: '{}' is a derived column",
                    name
                )));
            }
            if !required.contains(&field) {
                required.push(field);
            }
        }

        let mut ranges = Vec::with_capacity(config.numeric_ranges.len());
        for (name, bounds) in &config.numeric_ranges {
            let field = parse_field(name, "numeric_ranges")?;
            if !field.is_numeric_source() {
                return Err(PipelineError::RuleConfiguration(format!(
                    "numeric_ranges: '{}' is not a numeric source column",
                    name
                )));
            }
            check_bounds(&format!("numeric_ranges.{}", name), bounds)?;
            ranges.push((field, *bounds));
        }

        check_bounds("trip_duration_minutes", &config.trip_duration_minutes)?;
        check_bounds("tip_percentage", &config.tip_percentage)?;

        let rules = vec![
            Rule::RequiredFields(required),
            Rule::NumericRange(ranges),
            Rule::TemporalOrdering,
            Rule::DurationBound(config.trip_duration_minutes),
            Rule::TipRatioBound(config.tip_percentage),
        ];
        debug!("Rule engine built with {} rules", rules.len());

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Split `batch` into records that pass `rule` and records that fail it.
    ///
    /// Order is preserved on both sides. Failing records are tagged with the
    /// rule id and `failed_at`.
    pub fn evaluate(&self, batch: EnrichedBatch, rule: &Rule, failed_at: DateTime<Utc>) -> Result<RuleResult> {
        let id = rule.id();

        if let Some(reason) = rule.precondition(&batch)? {
            warn!(rule = %id, source = %batch.source, "Skipping rule: {}", reason);
            let invalid = batch.empty_like();
            return Ok(RuleResult {
                rule: id,
                status: RuleStatus::Skipped { reason },
                valid: batch,
                invalid,
            });
        }

        if let Rule::NumericRange(ranges) = rule {
            for (field, _) in ranges.iter().filter(|(f, _)| !batch.has_column(*f)) {
                warn!(rule = %id, source = %batch.source, "Range check on {} skipped: column not in schema", field);
            }
        }

        let Batch {
            source,
            columns,
            records,
        } = batch;

        let (failed, passed): (Vec<EnrichedRecord>, Vec<EnrichedRecord>) = records
            .into_iter()
            .partition(|record| rule.violated_by(record, &columns));

        let rejected = failed
            .into_iter()
            .map(|record| RejectedRecord {
                record,
                failure_reason: id,
                failed_at,
            })
            .collect();

        debug!(rule = %id, passed = passed.len(), "Rule evaluated");

        Ok(RuleResult {
            rule: id,
            status: RuleStatus::Evaluated,
            valid: Batch::new(source.clone(), columns.clone(), passed),
            invalid: Batch::new(source, columns, rejected),
        })
    }
}

fn parse_field(name: &str, key: &str) -> Result<Field> {
    name.parse::<Field>()
        .map_err(|e| PipelineError::RuleConfiguration(format!("{}: {}", key, e)))
}

fn check_bounds(key: &str, bounds: &Bounds) -> Result<()> {
    if !bounds.min.is_finite() || !bounds.max.is_finite() {
        return Err(PipelineError::RuleConfiguration(format!(
            "{}: bounds must be finite",
            key
        )));
    }
    if bounds.min > bounds.max {
        return Err(PipelineError::RuleConfiguration(format!(
            "{}: min {} exceeds max {}",
            key, bounds.min, bounds.max
        )));
    }
    Ok(())
}

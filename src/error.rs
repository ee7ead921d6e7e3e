use thiserror::Error;

use crate::domain::{Field, RuleId};
use crate::pipeline::PipelineState;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Rule configuration error: {0}")]
    RuleConfiguration(String),

    #[error("Schema mismatch in rule '{rule}': batch lacks column(s) {}", format_fields(.missing))]
    SchemaMismatch { rule: RuleId, missing: Vec<Field> },

    #[error("Quarantine write failed for run {run_id}: {message}")]
    QuarantineWrite { run_id: String, message: String },

    #[error("Accepted stream write failed: {0}")]
    AcceptedWrite(String),

    #[error("Batch source read failed: {0}")]
    Source(String),

    #[error("Rule '{0}' was already recorded for this run")]
    DuplicateMetric(RuleId),

    #[error("Pipeline aborted in state {state}: {source}")]
    Aborted {
        state: PipelineState,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    /// Wrap a fatal error with the state the run was in when it happened
    pub fn aborted_in(self, state: PipelineState) -> Self {
        match self {
            already @ PipelineError::Aborted { .. } => already,
            other => PipelineError::Aborted {
                state,
                source: Box::new(other),
            },
        }
    }

    /// State a run aborted in, if this error aborted one
    pub fn aborted_state(&self) -> Option<&PipelineState> {
        match self {
            PipelineError::Aborted { state, .. } => Some(state),
            _ => None,
        }
    }
}

fn format_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_in_does_not_double_wrap() {
        let err = PipelineError::Source("gone".to_string())
            .aborted_in(PipelineState::Start)
            .aborted_in(PipelineState::Summarize);
        assert_eq!(err.aborted_state(), Some(&PipelineState::Start));
    }

    #[test]
    fn test_schema_mismatch_names_rule_and_columns() {
        let err = PipelineError::SchemaMismatch {
            rule: RuleId::NullInRequiredField,
            missing: vec![Field::PickupDatetime, Field::TotalAmount],
        };
        assert_eq!(
            err.to_string(),
            "Schema mismatch in rule 'null_in_required_field': batch lacks column(s) tpep_pickup_datetime, total_amount"
        );
    }
}

// Validation pipeline: derived columns, ordered rules, quarantine, and run summary

pub mod pipeline;
pub mod processing;
pub mod quarantine;
pub mod state;
pub mod summary;

// Re-export key types
pub use pipeline::{Pipeline, RunOutcome};
pub use processing::derived::DerivedColumnComputer;
pub use processing::quality_metrics::QualityMetrics;
pub use processing::rules::{Rule, RuleEngine, RuleResult, RuleStatus};
pub use quarantine::{QuarantineBatch, QuarantinePartition, QuarantineWriteOutcome, QuarantineWriter};
pub use state::PipelineState;
pub use summary::{AcceptedStats, QuarantineStatus, RunSummary};

// Domain data shapes shared across layers

pub mod batch;
pub mod field;
pub mod record;
pub mod rule_id;
pub mod run;

pub use batch::{Batch, EnrichedBatch, RawBatch, RejectedBatch};
pub use field::{Field, UnknownField};
pub use record::{
    DerivedColumns, EnrichedRecord, QualityFlag, QuarantineEntry, RejectedRecord, TripRecord,
};
pub use rule_id::RuleId;
pub use run::{RunContext, RunId};

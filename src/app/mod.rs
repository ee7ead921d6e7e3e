pub mod partition_validation_use_case;
pub mod ports;

pub use partition_validation_use_case::{PartitionReport, PartitionRun, PartitionValidationUseCase};

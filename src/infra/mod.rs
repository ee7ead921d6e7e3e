// Adapters behind the app ports: NDJSON files on disk and in-memory doubles

pub mod accepted_output_adapter;
pub mod in_memory;
pub mod ndjson_source_adapter;
pub mod quarantine_output_adapter;

pub use accepted_output_adapter::FileAcceptedOutputAdapter;
pub use ndjson_source_adapter::NdjsonBatchSource;
pub use quarantine_output_adapter::FileQuarantineOutputAdapter;

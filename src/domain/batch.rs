use std::collections::BTreeSet;

use super::field::Field;
use super::record::{EnrichedRecord, RejectedRecord, TripRecord};

/// An ordered set of records read from one partition, plus the columns its
/// schema carries. The column set is fixed for the life of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<R> {
    pub source: String,
    pub columns: BTreeSet<Field>,
    pub records: Vec<R>,
}

pub type RawBatch = Batch<TripRecord>;
pub type EnrichedBatch = Batch<EnrichedRecord>;
pub type RejectedBatch = Batch<RejectedRecord>;

impl<R> Batch<R> {
    pub fn new(source: impl Into<String>, columns: BTreeSet<Field>, records: Vec<R>) -> Self {
        Self {
            source: source.into(),
            columns,
            records,
        }
    }

    /// An empty batch sharing this batch's source and schema
    pub fn empty_like<T>(&self) -> Batch<T> {
        Batch {
            source: self.source.clone(),
            columns: self.columns.clone(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, field: Field) -> bool {
        self.columns.contains(&field)
    }

    /// Columns from `required` that this batch's schema lacks
    pub fn missing_columns(&self, required: &[Field]) -> Vec<Field> {
        required
            .iter()
            .filter(|field| !self.columns.contains(field))
            .copied()
            .collect()
    }
}

impl RejectedBatch {
    /// Concatenate rejected batches by column name.
    ///
    /// Batches rejected at different rules may carry different column sets;
    /// the result carries the union and records keep absent columns absent.
    pub fn union_by_name(source: impl Into<String>, batches: Vec<RejectedBatch>) -> RejectedBatch {
        let mut columns = BTreeSet::new();
        let mut records = Vec::new();
        for batch in batches {
            columns.extend(batch.columns);
            records.extend(batch.records);
        }
        Batch::new(source, columns, records)
    }
}

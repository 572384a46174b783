// ==============================================================================
// store/mod.rs - Variant Store Contract
// ==============================================================================
// Description: Storage interface shared by the pipeline and the browsing layer
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Backends:
//   - SqliteStore:   relational, UNIQUE constraints enforce the dedup keys
//   - DocumentStore: schemaless JSON document, in-memory key indexes stand in
//                    for the constraints
// The pipeline behaves identically on both.
// ==============================================================================

pub mod document;
pub mod sqlite;

pub use document::DocumentStore;
pub use sqlite::SqliteStore;

use thiserror::Error;

use crate::audit::AuditEvent;
use crate::models::{
    ClinicalAnnotation, ClinicalAnnotationRow, GenotypeRow, NewVariant, SampleRow, VariantKey,
    VariantRow,
};

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// A row with the same unique key already exists
    #[error("Uniqueness conflict on {0}")]
    Conflict(String),

    #[error("Row references missing {0}")]
    MissingReference(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Document store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Read/write contract over the variant graph
///
/// Writes between `begin` and `commit` form one unit of work; `rollback`
/// discards all of them.
pub trait VariantStore {
    fn begin(&mut self) -> Result<(), StoreError>;
    fn commit(&mut self) -> Result<(), StoreError>;
    fn rollback(&mut self) -> Result<(), StoreError>;

    /// Drop and recreate every variant-graph table
    fn reinitialize(&mut self) -> Result<(), StoreError>;

    /// Insert a variant; `StoreError::Conflict` if its key exists
    fn insert_variant(&mut self, variant: &NewVariant) -> Result<i64, StoreError>;
    fn find_variant_by_key(&self, key: &VariantKey) -> Result<Option<i64>, StoreError>;

    /// Insert a sample; `StoreError::Conflict` if the name exists
    fn insert_sample(&mut self, name: &str) -> Result<i64, StoreError>;
    fn find_sample_by_name(&self, name: &str) -> Result<Option<i64>, StoreError>;

    /// Insert a genotype unless one exists for (variant, sample)
    ///
    /// Returns whether a row was written.
    fn insert_genotype(&mut self, genotype: &GenotypeRow) -> Result<bool, StoreError>;

    /// Attach a ClinVar annotation unless the variant already has one
    ///
    /// Returns whether a row was written.
    fn insert_annotation(&mut self, variant_id: i64, annotation: &ClinicalAnnotation) -> Result<bool, StoreError>;

    /// All variants ordered by id
    fn list_all(&self) -> Result<Vec<VariantRow>, StoreError>;

    fn query_by_predicate(&self, predicate: &dyn Fn(&VariantRow) -> bool) -> Result<Vec<VariantRow>, StoreError> {
        Ok(self.list_all()?.into_iter().filter(|v| predicate(v)).collect())
    }

    fn list_samples(&self) -> Result<Vec<SampleRow>, StoreError>;
    fn genotypes_for_variant(&self, variant_id: i64) -> Result<Vec<GenotypeRow>, StoreError>;
    fn annotation_for_variant(&self, variant_id: i64) -> Result<Option<ClinicalAnnotationRow>, StoreError>;

    fn record_audit(&mut self, event: &AuditEvent) -> Result<(), StoreError>;
    fn list_audit(&self) -> Result<Vec<AuditEvent>, StoreError>;

    /// Write anything buffered outside a transaction
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Outcome of `upsert_by_unique_key`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// A new row was written
    Inserted(i64),
    /// The key existed; this is the existing row
    Existing(i64),
    /// The key conflicted but the lookup found nothing
    Missing,
}

impl Upserted {
    pub fn id(&self) -> Option<i64> {
        match self {
            Upserted::Inserted(id) | Upserted::Existing(id) => Some(*id),
            Upserted::Missing => None,
        }
    }
}

/// Insert a row, falling back to a lookup on a uniqueness conflict
///
/// Only `StoreError::Conflict` triggers the lookup; every other error is
/// returned unchanged.
pub fn upsert_by_unique_key<S, K>(
    store: &mut S,
    key: &K,
    insert: impl FnOnce(&mut S) -> Result<i64, StoreError>,
    lookup: impl FnOnce(&S, &K) -> Result<Option<i64>, StoreError>,
) -> Result<Upserted, StoreError>
where
    S: ?Sized,
    K: ?Sized,
{
    match insert(store) {
        Ok(id) => Ok(Upserted::Inserted(id)),
        Err(StoreError::Conflict(_)) => Ok(match lookup(store, key)? {
            Some(id) => Upserted::Existing(id),
            None => Upserted::Missing,
        }),
        Err(e) => Err(e),
    }
}

// ==============================================================================
// store/document.rs - JSON Document Variant Store
// ==============================================================================
// Description: Schemaless backend persisted as a single JSON document
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Uniqueness is enforced by key indexes built once at open and kept current
// on every insert, so lookups never scan the tables. A transaction snapshots
// the variant graph; rollback restores the snapshot and rebuilds the indexes.
// Audit events live outside the snapshot and survive both rollback and
// reinitialize. They are buffered and written with the next commit, an
// explicit flush, or on drop.
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use super::{StoreError, VariantStore};
use crate::audit::AuditEvent;
use crate::models::{
    ClinicalAnnotation, ClinicalAnnotationRow, GenotypeRow, NewVariant, SampleRow, VariantKey,
    VariantRow,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tables {
    variants: Vec<VariantRow>,
    samples: Vec<SampleRow>,
    genotypes: Vec<GenotypeRow>,
    clinvar_annotations: Vec<ClinicalAnnotationRow>,
    next_variant_id: i64,
    next_sample_id: i64,
    next_annotation_id: i64,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            variants: Vec::new(),
            samples: Vec::new(),
            genotypes: Vec::new(),
            clinvar_annotations: Vec::new(),
            next_variant_id: 1,
            next_sample_id: 1,
            next_annotation_id: 1,
        }
    }
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    #[serde(flatten)]
    tables: &'a Tables,
    audit: &'a [AuditEvent],
}

#[derive(Deserialize)]
struct Document {
    #[serde(flatten)]
    tables: Tables,
    #[serde(default)]
    audit: Vec<AuditEvent>,
}

#[derive(Debug, Default)]
struct Indexes {
    variants: HashMap<VariantKey, i64>,
    samples: HashMap<String, i64>,
    sample_ids: HashSet<i64>,
    genotypes: HashSet<(i64, i64)>,
    annotated: HashSet<i64>,
}

impl Indexes {
    fn build(tables: &Tables) -> Self {
        Self {
            variants: tables
                .variants
                .iter()
                .map(|v| (v.key.clone(), v.variant_id))
                .collect(),
            samples: tables
                .samples
                .iter()
                .map(|s| (s.sample_name.clone(), s.sample_id))
                .collect(),
            sample_ids: tables.samples.iter().map(|s| s.sample_id).collect(),
            genotypes: tables
                .genotypes
                .iter()
                .map(|g| (g.variant_id, g.sample_id))
                .collect(),
            annotated: tables
                .clinvar_annotations
                .iter()
                .map(|a| a.variant_id)
                .collect(),
        }
    }
}

/// JSON-document-backed variant store
pub struct DocumentStore {
    path: Option<PathBuf>,
    tables: Tables,
    audit: Vec<AuditEvent>,
    indexes: Indexes,
    variant_ids: HashSet<i64>,
    snapshot: Option<Tables>,
    /// Audit events not yet written
    audit_dirty: bool,
}

impl DocumentStore {
    /// Open the document at `path`, creating an empty one if absent
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let (tables, audit) = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let doc: Document = serde_json::from_reader(reader)?;
            (doc.tables, doc.audit)
        } else {
            (Tables::default(), Vec::new())
        };

        info!(
            "Opened document store at {:?} ({} variants, {} samples)",
            path,
            tables.variants.len(),
            tables.samples.len()
        );

        let mut store = Self::from_parts(Some(path), tables, audit);
        store.persist()?;
        Ok(store)
    }

    /// Create a store that never touches disk (for testing)
    pub fn in_memory() -> Self {
        Self::from_parts(None, Tables::default(), Vec::new())
    }

    fn from_parts(path: Option<PathBuf>, tables: Tables, audit: Vec<AuditEvent>) -> Self {
        let indexes = Indexes::build(&tables);
        let variant_ids = tables.variants.iter().map(|v| v.variant_id).collect();
        Self {
            path,
            tables,
            audit,
            indexes,
            variant_ids,
            snapshot: None,
            audit_dirty: false,
        }
    }

    fn reindex(&mut self) {
        self.indexes = Indexes::build(&self.tables);
        self.variant_ids = self.tables.variants.iter().map(|v| v.variant_id).collect();
    }

    fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Write the document atomically (temp file + rename)
    fn persist(&mut self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            self.audit_dirty = false;
            return Ok(());
        };

        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(
                &mut writer,
                &DocumentRef {
                    tables: &self.tables,
                    audit: &self.audit,
                },
            )?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        debug!("Persisted document store to {:?}", path);
        self.audit_dirty = false;
        Ok(())
    }

    /// Persist immediately when no transaction is open
    fn autocommit(&mut self) -> Result<(), StoreError> {
        if self.in_transaction() {
            Ok(())
        } else {
            self.persist()
        }
    }
}

impl VariantStore for DocumentStore {
    fn begin(&mut self) -> Result<(), StoreError> {
        if self.in_transaction() {
            return Err(StoreError::Transaction("transaction already open".to_string()));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction() {
            return Err(StoreError::Transaction("no open transaction to commit".to_string()));
        }
        // Snapshot stays until the write lands so a failed commit can roll back
        self.persist()?;
        self.snapshot = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if let Some(snapshot) = self.snapshot.take() {
            self.tables = snapshot;
            self.reindex();
        }
        Ok(())
    }

    fn reinitialize(&mut self) -> Result<(), StoreError> {
        self.tables = Tables::default();
        self.snapshot = None;
        self.reindex();
        info!("Document store reinitialized");
        self.persist()
    }

    fn insert_variant(&mut self, variant: &NewVariant) -> Result<i64, StoreError> {
        if self.indexes.variants.contains_key(&variant.key) {
            return Err(StoreError::Conflict(variant.key.to_string()));
        }

        let id = self.tables.next_variant_id;
        self.tables.next_variant_id += 1;
        self.tables.variants.push(VariantRow::from_new(id, variant.clone()));
        self.indexes.variants.insert(variant.key.clone(), id);
        self.variant_ids.insert(id);

        self.autocommit()?;
        Ok(id)
    }

    fn find_variant_by_key(&self, key: &VariantKey) -> Result<Option<i64>, StoreError> {
        Ok(self.indexes.variants.get(key).copied())
    }

    fn insert_sample(&mut self, name: &str) -> Result<i64, StoreError> {
        if self.indexes.samples.contains_key(name) {
            return Err(StoreError::Conflict(name.to_string()));
        }

        let id = self.tables.next_sample_id;
        self.tables.next_sample_id += 1;
        self.tables.samples.push(SampleRow {
            sample_id: id,
            sample_name: name.to_string(),
        });
        self.indexes.samples.insert(name.to_string(), id);
        self.indexes.sample_ids.insert(id);

        self.autocommit()?;
        Ok(id)
    }

    fn find_sample_by_name(&self, name: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.indexes.samples.get(name).copied())
    }

    fn insert_genotype(&mut self, genotype: &GenotypeRow) -> Result<bool, StoreError> {
        if !self.variant_ids.contains(&genotype.variant_id) {
            return Err(StoreError::MissingReference(format!("variant {}", genotype.variant_id)));
        }
        if !self.indexes.sample_ids.contains(&genotype.sample_id) {
            return Err(StoreError::MissingReference(format!("sample {}", genotype.sample_id)));
        }
        if !self.indexes.genotypes.insert((genotype.variant_id, genotype.sample_id)) {
            return Ok(false);
        }

        self.tables.genotypes.push(genotype.clone());
        self.autocommit()?;
        Ok(true)
    }

    fn insert_annotation(&mut self, variant_id: i64, annotation: &ClinicalAnnotation) -> Result<bool, StoreError> {
        if !self.variant_ids.contains(&variant_id) {
            return Err(StoreError::MissingReference(format!("variant {}", variant_id)));
        }
        if !self.indexes.annotated.insert(variant_id) {
            return Ok(false);
        }

        let annotation_id = self.tables.next_annotation_id;
        self.tables.next_annotation_id += 1;
        self.tables.clinvar_annotations.push(ClinicalAnnotationRow {
            annotation_id,
            variant_id,
            annotation: annotation.clone(),
        });

        self.autocommit()?;
        Ok(true)
    }

    fn list_all(&self) -> Result<Vec<VariantRow>, StoreError> {
        Ok(self.tables.variants.clone())
    }

    fn query_by_predicate(&self, predicate: &dyn Fn(&VariantRow) -> bool) -> Result<Vec<VariantRow>, StoreError> {
        Ok(self
            .tables
            .variants
            .iter()
            .filter(|v| predicate(v))
            .cloned()
            .collect())
    }

    fn list_samples(&self) -> Result<Vec<SampleRow>, StoreError> {
        Ok(self.tables.samples.clone())
    }

    fn genotypes_for_variant(&self, variant_id: i64) -> Result<Vec<GenotypeRow>, StoreError> {
        let mut rows: Vec<GenotypeRow> = self
            .tables
            .genotypes
            .iter()
            .filter(|g| g.variant_id == variant_id)
            .cloned()
            .collect();
        rows.sort_by_key(|g| g.sample_id);
        Ok(rows)
    }

    fn annotation_for_variant(&self, variant_id: i64) -> Result<Option<ClinicalAnnotationRow>, StoreError> {
        if !self.indexes.annotated.contains(&variant_id) {
            return Ok(None);
        }
        Ok(self
            .tables
            .clinvar_annotations
            .iter()
            .find(|a| a.variant_id == variant_id)
            .cloned())
    }

    fn record_audit(&mut self, event: &AuditEvent) -> Result<(), StoreError> {
        self.audit.push(event.clone());
        self.audit_dirty = true;
        Ok(())
    }

    fn list_audit(&self) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self.audit.clone())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if self.audit_dirty && !self.in_transaction() {
            self.persist()?;
        }
        Ok(())
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        if !self.audit_dirty {
            return;
        }
        // Only the audit list is written; an open transaction is discarded
        if let Some(snapshot) = self.snapshot.take() {
            self.tables = snapshot;
        }
        if let Err(e) = self.persist() {
            error!("Failed to write buffered audit events: {}", e);
        }
    }
}

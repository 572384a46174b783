// ==============================================================================
// store/sqlite.rs - SQLite Variant Store
// ==============================================================================
// Description: Relational backend; UNIQUE constraints enforce the dedup keys
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-10-19
// Version: 2.0.0
// ==============================================================================
// Column names of the variants and clinvar_annotations tables follow the INFO
// keys (DP, AF, CLNSIG, ...) because the browsing layer filters on them.
// ==============================================================================

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::info;

use super::{StoreError, VariantStore};
use crate::audit::AuditEvent;
use crate::models::{
    ClinicalAnnotation, ClinicalAnnotationRow, ExtractedFields, GenotypeRow, NewVariant, SampleRow,
    VariantKey, VariantRow,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS variants (
        variant_id INTEGER PRIMARY KEY AUTOINCREMENT,
        chrom TEXT NOT NULL,
        pos INTEGER NOT NULL,
        ref TEXT NOT NULL,
        alt TEXT NOT NULL,
        qual REAL,
        filter TEXT,
        info TEXT,
        DP INTEGER,
        AF REAL,
        AC INTEGER,
        AN INTEGER,
        ExcessHet REAL,
        FS REAL,
        MLEAC INTEGER,
        MLEAF REAL,
        MQ REAL,
        QD REAL,
        SOR REAL,
        ANN TEXT,
        RS INTEGER,
        UNIQUE(chrom, pos, ref, alt)
    );

    CREATE TABLE IF NOT EXISTS samples (
        sample_id INTEGER PRIMARY KEY AUTOINCREMENT,
        sample_name TEXT UNIQUE NOT NULL
    );

    CREATE TABLE IF NOT EXISTS genotype (
        genotype_id INTEGER PRIMARY KEY AUTOINCREMENT,
        variant_id INTEGER NOT NULL,
        sample_id INTEGER NOT NULL,
        genotype TEXT,
        FOREIGN KEY (variant_id) REFERENCES variants(variant_id),
        FOREIGN KEY (sample_id) REFERENCES samples(sample_id),
        UNIQUE(variant_id, sample_id)
    );

    CREATE TABLE IF NOT EXISTS clinvar_annotations (
        annotation_id INTEGER PRIMARY KEY AUTOINCREMENT,
        variant_id INTEGER NOT NULL,
        clinvar_id TEXT,
        clinical_significance TEXT,
        condition TEXT,
        review_status TEXT,
        CLNREVSTAT TEXT,
        CLNSIG TEXT,
        CLNVC TEXT,
        CLNVCSO TEXT,
        GENEINFO TEXT,
        MC TEXT,
        ORIGIN TEXT,
        ALLELEID INTEGER,
        CLNDISDB TEXT,
        CLNDN TEXT,
        CLNHGVS TEXT,
        AF_EXAC REAL,
        FOREIGN KEY (variant_id) REFERENCES variants(variant_id),
        UNIQUE(variant_id)
    );

    CREATE TABLE IF NOT EXISTS ingest_audit (
        id TEXT PRIMARY KEY,
        timestamp TEXT NOT NULL,
        run_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        resource TEXT,
        severity TEXT NOT NULL,
        details TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_variants_chrom_pos ON variants (chrom, pos);
    CREATE INDEX IF NOT EXISTS idx_clinvar_variant_id ON clinvar_annotations (variant_id);
    CREATE INDEX IF NOT EXISTS idx_genotype_variant_id ON genotype (variant_id);
    CREATE INDEX IF NOT EXISTS idx_genotype_sample_id ON genotype (sample_id);
";

// Children first: with foreign_keys on, dropping a referenced table fails
const DROP_SCHEMA: &str = "
    DROP TABLE IF EXISTS genotype;
    DROP TABLE IF EXISTS clinvar_annotations;
    DROP TABLE IF EXISTS variants;
    DROP TABLE IF EXISTS samples;
";

const VARIANT_COLUMNS: &str = "variant_id, chrom, pos, ref, alt, qual, filter, info,
    DP, AF, AC, AN, ExcessHet, FS, MLEAC, MLEAF, MQ, QD, SOR, ANN, RS";

const ANNOTATION_COLUMNS: &str = "annotation_id, variant_id, clinvar_id, clinical_significance,
    condition, review_status, CLNREVSTAT, CLNSIG, CLNVC, CLNVCSO, GENEINFO, MC, ORIGIN,
    ALLELEID, CLNDISDB, CLNDN, CLNHGVS, AF_EXAC";

/// SQLite-backed variant store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the store database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        info!("Connected to SQLite database at {:?}", path.as_ref());
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn conflict_or(e: rusqlite::Error, key: impl ToString) -> StoreError {
        if is_unique_violation(&e) {
            StoreError::Conflict(key.to_string())
        } else {
            StoreError::Sqlite(e)
        }
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
                && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

fn variant_from_row(row: &Row<'_>) -> rusqlite::Result<VariantRow> {
    Ok(VariantRow {
        variant_id: row.get(0)?,
        key: VariantKey {
            chrom: row.get(1)?,
            pos: row.get(2)?,
            ref_allele: row.get(3)?,
            alt: row.get(4)?,
        },
        qual: row.get(5)?,
        filter: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        info: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        fields: ExtractedFields {
            dp: row.get(8)?,
            af: row.get(9)?,
            ac: row.get(10)?,
            an: row.get(11)?,
            excess_het: row.get(12)?,
            fs: row.get(13)?,
            mleac: row.get(14)?,
            mleaf: row.get(15)?,
            mq: row.get(16)?,
            qd: row.get(17)?,
            sor: row.get(18)?,
            rs: row.get(20)?,
        },
        ann: row.get(19)?,
    })
}

fn annotation_from_row(row: &Row<'_>) -> rusqlite::Result<ClinicalAnnotationRow> {
    Ok(ClinicalAnnotationRow {
        annotation_id: row.get(0)?,
        variant_id: row.get(1)?,
        annotation: ClinicalAnnotation {
            clinvar_id: row.get(2)?,
            clinical_significance: row.get(3)?,
            condition: row.get(4)?,
            review_status: row.get(5)?,
            clnrevstat: row.get(6)?,
            clnsig: row.get(7)?,
            clnvc: row.get(8)?,
            clnvcso: row.get(9)?,
            geneinfo: row.get(10)?,
            mc: row.get(11)?,
            origin: row.get(12)?,
            alleleid: row.get(13)?,
            clndisdb: row.get(14)?,
            clndn: row.get(15)?,
            clnhgvs: row.get(16)?,
            af_exac: row.get(17)?,
        },
    })
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String, Option<String>, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

impl VariantStore for SqliteStore {
    fn begin(&mut self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            return Err(StoreError::Transaction("transaction already open".to_string()));
        }
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.conn.is_autocommit() {
            return Err(StoreError::Transaction("no open transaction to commit".to_string()));
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        // SQLite may already have rolled back on its own after some errors
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn reinitialize(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(DROP_SCHEMA)?;
        self.conn.execute_batch(SCHEMA)?;
        info!("Database initialized successfully with required tables and indexes");
        Ok(())
    }

    fn insert_variant(&mut self, variant: &NewVariant) -> Result<i64, StoreError> {
        let f = &variant.fields;
        let result = self
            .conn
            .prepare_cached(
                "INSERT INTO variants (
                    chrom, pos, ref, alt, qual, filter, info, DP, AF, AC, AN,
                    ExcessHet, FS, MLEAC, MLEAF, MQ, QD, SOR, ANN, RS
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            )?
            .execute(params![
                variant.key.chrom,
                variant.key.pos,
                variant.key.ref_allele,
                variant.key.alt,
                variant.qual,
                variant.filter,
                variant.info,
                f.dp,
                f.af,
                f.ac,
                f.an,
                f.excess_het,
                f.fs,
                f.mleac,
                f.mleaf,
                f.mq,
                f.qd,
                f.sor,
                variant.ann,
                f.rs,
            ]);

        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) => Err(Self::conflict_or(e, &variant.key)),
        }
    }

    fn find_variant_by_key(&self, key: &VariantKey) -> Result<Option<i64>, StoreError> {
        let id = self
            .conn
            .prepare_cached(
                "SELECT variant_id FROM variants
                 WHERE chrom = ?1 AND pos = ?2 AND ref = ?3 AND alt = ?4",
            )?
            .query_row(params![key.chrom, key.pos, key.ref_allele, key.alt], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    fn insert_sample(&mut self, name: &str) -> Result<i64, StoreError> {
        let result = self
            .conn
            .prepare_cached("INSERT INTO samples (sample_name) VALUES (?1)")?
            .execute(params![name]);

        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) => Err(Self::conflict_or(e, name)),
        }
    }

    fn find_sample_by_name(&self, name: &str) -> Result<Option<i64>, StoreError> {
        let id = self
            .conn
            .prepare_cached("SELECT sample_id FROM samples WHERE sample_name = ?1")?
            .query_row(params![name], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    fn insert_genotype(&mut self, genotype: &GenotypeRow) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .prepare_cached(
                "INSERT OR IGNORE INTO genotype (variant_id, sample_id, genotype)
                 VALUES (?1, ?2, ?3)",
            )?
            .execute(params![genotype.variant_id, genotype.sample_id, genotype.genotype])?;
        Ok(changed > 0)
    }

    fn insert_annotation(&mut self, variant_id: i64, a: &ClinicalAnnotation) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .prepare_cached(
                "INSERT OR IGNORE INTO clinvar_annotations (
                    variant_id, clinvar_id, clinical_significance, condition, review_status,
                    CLNREVSTAT, CLNSIG, CLNVC, CLNVCSO, GENEINFO, MC, ORIGIN,
                    ALLELEID, CLNDISDB, CLNDN, CLNHGVS, AF_EXAC
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            )?
            .execute(params![
                variant_id,
                a.clinvar_id,
                a.clinical_significance,
                a.condition,
                a.review_status,
                a.clnrevstat,
                a.clnsig,
                a.clnvc,
                a.clnvcso,
                a.geneinfo,
                a.mc,
                a.origin,
                a.alleleid,
                a.clndisdb,
                a.clndn,
                a.clnhgvs,
                a.af_exac,
            ])?;
        Ok(changed > 0)
    }

    fn list_all(&self) -> Result<Vec<VariantRow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM variants ORDER BY variant_id", VARIANT_COLUMNS))?;
        let rows = stmt.query_map([], variant_from_row)?;

        let mut variants = Vec::new();
        for row in rows {
            variants.push(row?);
        }
        Ok(variants)
    }

    fn list_samples(&self) -> Result<Vec<SampleRow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT sample_id, sample_name FROM samples ORDER BY sample_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(SampleRow {
                sample_id: row.get(0)?,
                sample_name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn genotypes_for_variant(&self, variant_id: i64) -> Result<Vec<GenotypeRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT variant_id, sample_id, genotype FROM genotype
             WHERE variant_id = ?1 ORDER BY sample_id",
        )?;
        let rows = stmt.query_map(params![variant_id], |row| {
            Ok(GenotypeRow {
                variant_id: row.get(0)?,
                sample_id: row.get(1)?,
                genotype: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn annotation_for_variant(&self, variant_id: i64) -> Result<Option<ClinicalAnnotationRow>, StoreError> {
        let row = self
            .conn
            .prepare_cached(&format!(
                "SELECT {} FROM clinvar_annotations WHERE variant_id = ?1",
                ANNOTATION_COLUMNS
            ))?
            .query_row(params![variant_id], annotation_from_row)
            .optional()?;
        Ok(row)
    }

    fn record_audit(&mut self, event: &AuditEvent) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO ingest_audit (id, timestamp, run_id, event_type, resource, severity, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id.to_string(),
                event.timestamp.to_rfc3339(),
                event.run_id.to_string(),
                event.event_type.as_str(),
                event.resource,
                event.severity.as_str(),
                event.details.to_string(),
            ],
        )?;
        Ok(())
    }

    fn list_audit(&self) -> Result<Vec<AuditEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, run_id, event_type, resource, severity, details
             FROM ingest_audit ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], audit_from_row)?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, run_id, event_type, resource, severity, details) = row?;
            // Text columns hold the serde names, so go through serde_json
            let event = serde_json::from_value(serde_json::json!({
                "id": id,
                "timestamp": timestamp,
                "run_id": run_id,
                "event_type": event_type,
                "resource": resource,
                "severity": severity,
                "details": serde_json::from_str::<serde_json::Value>(&details)?,
            }))?;
            events.push(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEventType;
    use crate::store::test_support::new_variant;
    use tempfile::tempdir;

    #[test]
    fn test_variant_key_is_unique() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let variant = new_variant("1", 100, "A", "T");

        let id = store.insert_variant(&variant).unwrap();
        let err = store.insert_variant(&variant).unwrap_err();

        assert!(matches!(err, StoreError::Conflict(ref k) if k == "1:100:A>T"));
        assert_eq!(store.find_variant_by_key(&variant.key).unwrap(), Some(id));
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_variant_columns_roundtrip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut variant = new_variant("X", 5, "G", "C");
        variant.fields.dp = Some(30);
        variant.fields.af = Some(0.25);
        variant.fields.rs = Some(1234);
        variant.ann = Some("[]".to_string());

        store.insert_variant(&variant).unwrap();
        let rows = store.list_all().unwrap();

        assert_eq!(rows[0].fields, variant.fields);
        assert_eq!(rows[0].ann.as_deref(), Some("[]"));
        assert_eq!(rows[0].key, variant.key);
    }

    #[test]
    fn test_sample_conflict() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_sample("NA12878").unwrap();

        assert!(matches!(store.insert_sample("NA12878"), Err(StoreError::Conflict(_))));
        assert_eq!(store.find_sample_by_name("NA12878").unwrap(), Some(id));
        assert_eq!(store.find_sample_by_name("other").unwrap(), None);
    }

    #[test]
    fn test_genotype_and_annotation_ignore_duplicates() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let variant_id = store.insert_variant(&new_variant("1", 1, "A", "G")).unwrap();
        let sample_id = store.insert_sample("S1").unwrap();

        let genotype = GenotypeRow {
            variant_id,
            sample_id,
            genotype: "0/1".to_string(),
        };
        assert!(store.insert_genotype(&genotype).unwrap());
        assert!(!store.insert_genotype(&GenotypeRow { genotype: "1/1".to_string(), ..genotype.clone() }).unwrap());
        assert_eq!(store.genotypes_for_variant(variant_id).unwrap(), vec![genotype]);

        let first = ClinicalAnnotation {
            clinical_significance: Some("Pathogenic".to_string()),
            ..Default::default()
        };
        let second = ClinicalAnnotation {
            clinical_significance: Some("Benign".to_string()),
            ..Default::default()
        };
        assert!(store.insert_annotation(variant_id, &first).unwrap());
        assert!(!store.insert_annotation(variant_id, &second).unwrap());

        let stored = store.annotation_for_variant(variant_id).unwrap().unwrap();
        assert_eq!(stored.annotation, first);
    }

    #[test]
    fn test_genotype_requires_existing_variant() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let sample_id = store.insert_sample("S1").unwrap();
        let result = store.insert_genotype(&GenotypeRow {
            variant_id: 999,
            sample_id,
            genotype: "0/0".to_string(),
        });
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_variant(&new_variant("1", 1, "A", "G")).unwrap();

        store.begin().unwrap();
        store.insert_variant(&new_variant("1", 2, "A", "G")).unwrap();
        store.insert_sample("S1").unwrap();
        store.rollback().unwrap();

        assert_eq!(store.list_all().unwrap().len(), 1);
        assert!(store.list_samples().unwrap().is_empty());
        assert!(matches!(store.commit(), Err(StoreError::Transaction(_))));
    }

    #[test]
    fn test_reinitialize_drops_graph_keeps_audit() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_variant(&new_variant("1", 1, "A", "G")).unwrap();
        crate::audit::log_event(
            &mut store,
            uuid::Uuid::new_v4(),
            AuditEventType::RunStarted,
            None,
            serde_json::json!({"files": 0}),
        )
        .unwrap();

        store.reinitialize().unwrap();

        assert!(store.list_all().unwrap().is_empty());
        let audit = store.list_audit().unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].event_type, AuditEventType::RunStarted);
        assert_eq!(audit[0].details["files"], 0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("variants.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.insert_variant(&new_variant("2", 10, "T", "C")).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let key = VariantKey::new("2", 10, "T", "C");
        assert!(store.find_variant_by_key(&key).unwrap().is_some());
    }
}

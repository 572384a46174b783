// ==============================================================================
// config.rs - Ingestion Configuration
// ==============================================================================
// Description: Run settings shared by the CLI and the orchestrator
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};

use crate::store::{DocumentStore, SqliteStore, VariantStore};

pub const DEFAULT_DATABASE: &str = "genomic_variants.db";
pub const DEFAULT_UNMATCHED_LOG: &str = "unmatched_variants.log";
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Backend {
    /// Relational SQLite database
    #[default]
    Sqlite,
    /// Single JSON document
    Document,
}

impl Backend {
    /// Open the store at `path`
    pub fn open(self, path: &Path) -> Result<Box<dyn VariantStore>> {
        let store: Box<dyn VariantStore> = match self {
            Backend::Sqlite => Box::new(
                SqliteStore::open(path).with_context(|| format!("Failed to open SQLite store {:?}", path))?,
            ),
            Backend::Document => Box::new(
                DocumentStore::open(path).with_context(|| format!("Failed to open document store {:?}", path))?,
            ),
        };
        Ok(store)
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory scanned (non-recursively) for *.vcf / *.vcf.gz
    pub vcf_dir: Option<PathBuf>,
    /// Files ingested in addition to the directory scan
    pub vcf_files: Vec<PathBuf>,
    /// ClinVar VCF for the annotation pass
    pub clinvar: Option<PathBuf>,
    /// Append-only log of ClinVar alleles with no stored variant
    pub unmatched_log: PathBuf,
    /// Records read per batch
    pub batch_size: usize,
    /// Drop and recreate the variant tables before ingesting
    pub reinit: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            vcf_dir: None,
            vcf_files: Vec::new(),
            clinvar: None,
            unmatched_log: PathBuf::from(DEFAULT_UNMATCHED_LOG),
            batch_size: DEFAULT_BATCH_SIZE,
            reinit: false,
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch size must be at least 1");
        }
        if self.vcf_dir.is_none() && self.vcf_files.is_empty() && self.clinvar.is_none() {
            anyhow::bail!("nothing to ingest: give a VCF directory, VCF files or a ClinVar file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_needs_input() {
        let config = IngestConfig::default();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.validate().is_err());

        let config = IngestConfig {
            vcf_dir: Some(PathBuf::from("vcfs")),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = IngestConfig {
            vcf_dir: Some(PathBuf::from("vcfs")),
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_open() {
        let dir = tempdir().unwrap();

        let store = Backend::Sqlite.open(&dir.path().join("v.db")).unwrap();
        assert!(store.list_all().unwrap().is_empty());

        let store = Backend::Document.open(&dir.path().join("v.json")).unwrap();
        assert!(store.list_samples().unwrap().is_empty());
        assert!(dir.path().join("v.json").exists());
    }
}

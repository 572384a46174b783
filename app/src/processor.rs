// ==============================================================================
// processor.rs - Ingestion Orchestrator
// ==============================================================================
// Description: Drives per-file variant ingestion and the ClinVar annotation pass
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-19
// Version: 3.0.0
// ==============================================================================
// Pipeline:
//   1. discover *.vcf / *.vcf.gz in the input directory (ClinVar excluded)
//   2. per file: validate, BEGIN, register samples, upsert variants and
//      genotypes batch by batch, COMMIT
//   3. a failing file is rolled back alone; the run continues
//   4. ClinVar annotation pass in its own transaction
// ==============================================================================

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::audit::{self, AuditEventType};
use crate::clinvar::{append_unmatched_log, AnnotationMatcher};
use crate::coerce::CoercionWarning;
use crate::config::IngestConfig;
use crate::genotype::{render_genotype, AllelePair};
use crate::models::GenotypeRow;
use crate::parsers::VCFReader;
use crate::registry::SampleRegistry;
use crate::store::{Upserted, VariantStore};
use crate::upsert::{build_variants, upsert_variant};
use crate::validator::FileValidator;

/// Totals reported at the end of a run
///
/// Variant and genotype counts only include committed files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub files_committed: usize,
    pub files_failed: usize,
    pub variants_inserted: usize,
    pub variants_reused: usize,
    pub genotypes_inserted: usize,
    pub annotations_attached: usize,
    pub unmatched: usize,
    pub coercion_warnings: usize,
}

/// State owned by one run and dropped with it
pub struct RunContext {
    pub run_id: Uuid,
    pub registry: SampleRegistry,
    pub warnings: Vec<CoercionWarning>,
    pub summary: RunSummary,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            registry: SampleRegistry::new(),
            warnings: Vec::new(),
            summary: RunSummary::default(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts for one file, merged into the summary on commit
#[derive(Debug, Default)]
struct FileStats {
    records: usize,
    variants_inserted: usize,
    variants_reused: usize,
    genotypes_inserted: usize,
}

pub struct IngestionOrchestrator<'a, S: VariantStore + ?Sized> {
    store: &'a mut S,
    config: IngestConfig,
    validator: FileValidator,
}

impl<'a, S: VariantStore + ?Sized> IngestionOrchestrator<'a, S> {
    pub fn new(store: &'a mut S, config: IngestConfig) -> Self {
        Self {
            store,
            config,
            validator: FileValidator::new(),
        }
    }

    /// Main ingestion pipeline
    pub fn run(&mut self) -> Result<RunSummary> {
        let mut ctx = RunContext::new();
        info!("Starting ingestion run {}", ctx.run_id);

        if self.config.reinit {
            info!("Reinitializing store");
            self.store.reinitialize().context("Failed to reinitialize store")?;
        }

        // 1. Locate input files
        let files = self.locate_input_files();
        self.audit(
            &ctx,
            AuditEventType::RunStarted,
            None,
            serde_json::json!({
                "files": files.len(),
                "reinit": self.config.reinit,
                "batch_size": self.config.batch_size,
            }),
        );

        // 2. Ingest each file in its own transaction
        for path in &files {
            self.ingest_file(&mut ctx, path);
        }

        // 3. ClinVar annotation pass
        if let Some(clinvar) = self.config.clinvar.clone() {
            self.annotate(&mut ctx, &clinvar);
        }

        ctx.summary.coercion_warnings = ctx.warnings.len();
        let summary = ctx.summary.clone();

        info!(
            "Run {} complete: {} files committed, {} failed, {} variants inserted, {} reused, {} genotypes, {} annotations, {} unmatched, {} coercion warnings",
            ctx.run_id,
            summary.files_committed,
            summary.files_failed,
            summary.variants_inserted,
            summary.variants_reused,
            summary.genotypes_inserted,
            summary.annotations_attached,
            summary.unmatched,
            summary.coercion_warnings
        );

        self.audit(
            &ctx,
            AuditEventType::RunCompleted,
            None,
            serde_json::to_value(&summary).unwrap_or_default(),
        );
        self.store.flush().context("Failed to flush store")?;

        Ok(summary)
    }

    /// Variant files in sorted path order, explicit files appended
    fn locate_input_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        if let Some(dir) = &self.config.vcf_dir {
            debug!("Locating input files in {:?}", dir);

            for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        error!("Failed to read input directory {:?}: {}", dir, e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }

                let file_name = entry.file_name().to_string_lossy().to_lowercase();
                if FileValidator::is_variant_file(&file_name) && !file_name.contains("clinvar") {
                    files.push(entry.into_path());
                }
            }
            files.sort();
        }

        for path in &self.config.vcf_files {
            if !files.contains(path) {
                files.push(path.clone());
            }
        }

        info!("Found {} VCF files to ingest", files.len());
        files
    }

    /// Ingest one file; failures are logged and the file rolled back
    fn ingest_file(&mut self, ctx: &mut RunContext, path: &Path) {
        let resource = Some(path.display().to_string());

        let validated = match self.validator.validate(path) {
            Ok(validated) => validated,
            Err(e) => {
                error!("Rejected {:?}: {:#}", path, e);
                ctx.summary.files_failed += 1;
                self.audit(
                    ctx,
                    AuditEventType::FileRejected,
                    resource,
                    serde_json::json!({ "error": format!("{:#}", e) }),
                );
                return;
            }
        };

        info!("Processing VCF file: {:?}", path);
        match self.load_file(ctx, path) {
            Ok(stats) => {
                ctx.registry.commit_pending();
                ctx.summary.files_committed += 1;
                ctx.summary.variants_inserted += stats.variants_inserted;
                ctx.summary.variants_reused += stats.variants_reused;
                ctx.summary.genotypes_inserted += stats.genotypes_inserted;

                info!(
                    "Committed {:?}: {} records, {} new variants, {} existing, {} genotypes",
                    path, stats.records, stats.variants_inserted, stats.variants_reused, stats.genotypes_inserted
                );
                self.audit(
                    ctx,
                    AuditEventType::FileCommitted,
                    resource,
                    serde_json::json!({
                        "records": stats.records,
                        "variants_inserted": stats.variants_inserted,
                        "variants_reused": stats.variants_reused,
                        "genotypes_inserted": stats.genotypes_inserted,
                        "sha256": validated.hash_sha256,
                        "size": validated.size,
                    }),
                );
            }
            Err(e) => {
                if let Err(rollback_err) = self.store.rollback() {
                    error!("Rollback of {:?} failed: {}", path, rollback_err);
                }
                ctx.registry.rollback_pending();
                ctx.summary.files_failed += 1;

                error!("Error processing VCF file {:?}, rolled back: {:#}", path, e);
                self.audit(
                    ctx,
                    AuditEventType::FileRolledBack,
                    resource,
                    serde_json::json!({
                        "error": format!("{:#}", e),
                        "sha256": validated.hash_sha256,
                    }),
                );
            }
        }
    }

    /// Read and write one file inside a transaction, committing on success
    fn load_file(&mut self, ctx: &mut RunContext, path: &Path) -> Result<FileStats> {
        let mut reader = VCFReader::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        self.store.begin().context("Failed to begin transaction")?;

        // Samples before any genotype referencing them
        let mut sample_ids = Vec::with_capacity(reader.sample_names().len());
        for name in reader.sample_names() {
            let id = ctx
                .registry
                .register(&mut *self.store, name)
                .with_context(|| format!("Failed to register sample {}", name))?;
            sample_ids.push(id);
        }
        debug!("Registered {} samples for {:?}", sample_ids.len(), path);

        let mut stats = FileStats::default();
        loop {
            let batch = reader
                .read_batch(self.config.batch_size)
                .with_context(|| format!("Failed to read {:?}", path))?;
            if batch.is_empty() {
                break;
            }

            for record in &batch {
                for variant in build_variants(record, &mut ctx.warnings) {
                    let variant_id = match upsert_variant(&mut *self.store, &variant)? {
                        Upserted::Inserted(id) => {
                            stats.variants_inserted += 1;
                            id
                        }
                        Upserted::Existing(id) => {
                            stats.variants_reused += 1;
                            id
                        }
                        Upserted::Missing => continue,
                    };

                    for (index, sample_id) in sample_ids.iter().enumerate() {
                        let Some(sample_id) = *sample_id else {
                            continue;
                        };
                        let pair = record.genotypes.get(index).copied().unwrap_or(AllelePair::MISSING);
                        let genotype = GenotypeRow {
                            variant_id,
                            sample_id,
                            genotype: render_genotype(pair),
                        };
                        if self.store.insert_genotype(&genotype)? {
                            stats.genotypes_inserted += 1;
                        }
                    }
                }
            }

            stats.records += batch.len();
            info!("Processed {} records from {:?}", stats.records, path);
        }

        self.store.commit().context("Failed to commit transaction")?;
        Ok(stats)
    }

    /// ClinVar pass; unmatched keys are logged whether or not it commits
    fn annotate(&mut self, ctx: &mut RunContext, path: &Path) {
        let resource = Some(path.display().to_string());

        if !path.exists() {
            error!("ClinVar VCF file not found: {:?}", path);
            self.audit(ctx, AuditEventType::AnnotationFileMissing, resource, serde_json::json!({}));
            return;
        }

        info!("Processing ClinVar VCF: {:?}", path);
        let mut matcher = AnnotationMatcher::new();
        let result = self.match_annotations(ctx, path, &mut matcher);

        ctx.summary.unmatched += matcher.unmatched.len();
        if !matcher.unmatched.is_empty() {
            warn!(
                "Unmatched variants found: {}. Details in {:?}",
                matcher.unmatched.len(),
                self.config.unmatched_log
            );
        }
        if let Err(e) = append_unmatched_log(&self.config.unmatched_log, &matcher.unmatched) {
            error!("Failed to write unmatched log {:?}: {}", self.config.unmatched_log, e);
        }

        match result {
            Ok(()) => {
                ctx.summary.annotations_attached += matcher.attached;
                info!(
                    "ClinVar annotations committed: {} attached, {} already annotated, {} unmatched",
                    matcher.attached,
                    matcher.already_annotated,
                    matcher.unmatched.len()
                );
                self.audit(
                    ctx,
                    AuditEventType::AnnotationPassCommitted,
                    resource,
                    serde_json::json!({
                        "records": matcher.records,
                        "attached": matcher.attached,
                        "already_annotated": matcher.already_annotated,
                        "unmatched": matcher.unmatched.len(),
                    }),
                );
            }
            Err(e) => {
                if let Err(rollback_err) = self.store.rollback() {
                    error!("Rollback of ClinVar pass failed: {}", rollback_err);
                }
                error!("Error processing ClinVar VCF file {:?}, rolled back: {:#}", path, e);
                self.audit(
                    ctx,
                    AuditEventType::AnnotationPassRolledBack,
                    resource,
                    serde_json::json!({
                        "error": format!("{:#}", e),
                        "records": matcher.records,
                    }),
                );
            }
        }
    }

    fn match_annotations(&mut self, ctx: &mut RunContext, path: &Path, matcher: &mut AnnotationMatcher) -> Result<()> {
        let mut reader = VCFReader::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        self.store.begin().context("Failed to begin transaction")?;

        loop {
            let batch = reader
                .read_batch(self.config.batch_size)
                .with_context(|| format!("Failed to read {:?}", path))?;
            if batch.is_empty() {
                break;
            }

            for record in &batch {
                matcher.match_record(&mut *self.store, record, &mut ctx.warnings)?;
            }
            debug!("Matched {} ClinVar records", matcher.records);
        }

        self.store.commit().context("Failed to commit transaction")?;
        Ok(())
    }

    /// Record an audit event; a failed write is logged, never fatal
    fn audit(
        &mut self,
        ctx: &RunContext,
        event_type: AuditEventType,
        resource: Option<String>,
        details: serde_json::Value,
    ) {
        if let Err(e) = audit::log_event(&mut *self.store, ctx.run_id, event_type, resource, details) {
            warn!("Failed to record audit event {}: {}", event_type.as_str(), e);
        }
    }
}

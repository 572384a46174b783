// ==============================================================================
// main.rs - Variant Ingest Entry Point
// ==============================================================================
// Description: CLI for VCF ingestion, ClinVar matching and store queries
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-19
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use variant_ingest::config::{
    Backend, IngestConfig, DEFAULT_BATCH_SIZE, DEFAULT_DATABASE, DEFAULT_UNMATCHED_LOG,
};
use variant_ingest::processor::IngestionOrchestrator;
use variant_ingest::query::{run_query, VariantQuery};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Store location (SQLite database or JSON document)
    #[arg(long, env = "VARIANT_DB", default_value = DEFAULT_DATABASE, global = true)]
    database: PathBuf,

    /// Storage backend
    #[arg(long, value_enum, env = "VARIANT_BACKEND", default_value_t = Backend::Sqlite, global = true)]
    backend: Backend,

    /// Append-only log of unmatched ClinVar variants
    #[arg(long, env = "VARIANT_UNMATCHED_LOG", default_value = DEFAULT_UNMATCHED_LOG, global = true)]
    unmatched_log: PathBuf,

    /// Also write logs to this file (appended, no colors)
    #[arg(long, env = "VARIANT_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Records read per batch
    #[arg(long, env = "VARIANT_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE, global = true)]
    batch_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest VCF files, then attach ClinVar annotations
    Ingest {
        /// Directory scanned for *.vcf / *.vcf.gz
        #[arg(long, env = "VARIANT_VCF_DIR")]
        vcf_dir: Option<PathBuf>,

        /// Additional VCF file (repeatable)
        #[arg(long = "vcf")]
        vcf_files: Vec<PathBuf>,

        /// ClinVar VCF for the annotation pass
        #[arg(long, env = "VARIANT_CLINVAR")]
        clinvar: Option<PathBuf>,

        /// Drop and recreate the variant tables first
        #[arg(long)]
        reinit: bool,
    },

    /// Print matching variants as JSON lines
    Query {
        #[arg(long)]
        chrom: Option<String>,

        /// Inclusive start position
        #[arg(long)]
        start: Option<i64>,

        /// Inclusive end position
        #[arg(long)]
        end: Option<i64>,

        #[arg(long)]
        min_qual: Option<f64>,

        /// Exact filter status, e.g. PASS
        #[arg(long)]
        filter: Option<String>,

        /// Substring of the ClinVar clinical significance
        #[arg(long)]
        clinical_significance: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },
}

fn init_tracing(log_file: Option<&PathBuf>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "variant_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.log_file.as_ref())?;

    let mut store = args.backend.open(&args.database)?;

    match args.command {
        Command::Ingest {
            vcf_dir,
            vcf_files,
            clinvar,
            reinit,
        } => {
            info!("Variant ingest starting ({:?} store at {:?})", args.backend, args.database);

            let config = IngestConfig {
                vcf_dir,
                vcf_files,
                clinvar,
                unmatched_log: args.unmatched_log,
                batch_size: args.batch_size,
                reinit,
            };
            config.validate()?;

            let summary = IngestionOrchestrator::new(store.as_mut(), config).run()?;
            if summary.files_failed > 0 {
                warn!("{} file(s) failed and were rolled back", summary.files_failed);
            }

            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Query {
            chrom,
            start,
            end,
            min_qual,
            filter,
            clinical_significance,
            limit,
        } => {
            let query = VariantQuery {
                chrom,
                start,
                end,
                min_qual,
                filter,
                clinical_significance,
                limit,
            };

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for detail in run_query(store.as_ref(), &query)? {
                writeln!(out, "{}", serde_json::to_string(&detail)?)?;
            }
        }
    }

    Ok(())
}

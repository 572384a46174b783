// ==============================================================================
// validator.rs - Input File Validation
// ==============================================================================
// Description: Pre-flight checks for variant files (size, type, format, hash)
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-19
// Version: 2.0.0
// Security: Allowlist-only file types, magic number verification
// ==============================================================================

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

const MAX_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024; // 4 GB

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone)]
pub struct ValidatedFile {
    pub file_name: String,
    pub extension: String,
    pub size: u64,
    pub hash_sha256: String,
    pub validated_at: chrono::DateTime<chrono::Utc>,
}

pub struct FileValidator {
    max_file_size: u64,
    allowed_types: HashMap<&'static str, &'static [u8]>,
}

impl FileValidator {
    pub fn new() -> Self {
        let mut allowed_types: HashMap<&'static str, &'static [u8]> = HashMap::new();

        // Plain-text VCF (no magic number)
        allowed_types.insert("vcf", &[]);

        // Gzip / BGZF compressed VCF
        allowed_types.insert("vcf.gz", &GZIP_MAGIC);

        Self {
            max_file_size: MAX_FILE_SIZE,
            allowed_types,
        }
    }

    pub fn with_max_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Whether a file name carries an accepted variant-file extension
    pub fn is_variant_file(file_name: &str) -> bool {
        get_extension(file_name).is_some()
    }

    pub fn validate(&self, file_path: &Path) -> Result<ValidatedFile> {
        let file_name = file_path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid file path"))?
            .to_string_lossy()
            .to_string();

        info!("Validating file: {}", file_name);

        // 1. Size check
        let metadata = std::fs::metadata(file_path)
            .with_context(|| format!("Failed to get file metadata for {:?}", file_path))?;
        let size = metadata.len();

        if size > self.max_file_size {
            anyhow::bail!(
                "File too large: {} bytes (max: {} bytes)",
                size,
                self.max_file_size
            );
        }
        debug!("Size check passed: {} bytes", size);

        // 2. Extension check (allowlist)
        let ext = get_extension(&file_name)
            .filter(|ext| self.allowed_types.contains_key(ext))
            .ok_or_else(|| anyhow::anyhow!("Invalid file type: {}", file_name))?;
        debug!("Extension check passed: {}", ext);

        // 3. Magic number verification
        if let Some(expected_magic) = self.allowed_types.get(ext) {
            if !expected_magic.is_empty() {
                let actual_magic = read_magic_number(file_path)?;
                if !actual_magic.starts_with(expected_magic) {
                    anyhow::bail!("Magic number mismatch for .{} file", ext);
                }
                debug!("Magic number check passed");
            }
        }

        // 4. Content validation (header line)
        validate_vcf_format(file_path, ext == "vcf.gz")?;
        debug!("Content validation passed");

        // 5. Compute SHA-256 hash
        let hash = compute_sha256(file_path)?;
        debug!("SHA-256: {}", hash);

        Ok(ValidatedFile {
            file_name,
            extension: ext.to_string(),
            size,
            hash_sha256: hash,
            validated_at: chrono::Utc::now(),
        })
    }
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn get_extension(filename: &str) -> Option<&'static str> {
    let lower = filename.to_lowercase();
    if lower.ends_with(".vcf.gz") {
        Some("vcf.gz")
    } else if lower.ends_with(".vcf") {
        Some("vcf")
    } else {
        None
    }
}

fn read_magic_number(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buffer = Vec::with_capacity(4);
    file.by_ref().take(4).read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn validate_vcf_format(path: &Path, compressed: bool) -> Result<()> {
    let file = File::open(path)?;
    let reader: Box<dyn BufRead> = if compressed {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    // First line should be ##fileformat=VCFv4.x
    let first_line = reader
        .lines()
        .next()
        .ok_or_else(|| anyhow::anyhow!("VCF file is empty"))?
        .context("Failed to read VCF header")?;

    if !first_line.starts_with("##fileformat=VCFv4") {
        anyhow::bail!("Invalid VCF format: missing fileformat header");
    }

    Ok(())
}

/// Hex SHA-256 of the raw file bytes
pub fn compute_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

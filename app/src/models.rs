// ==============================================================================
// models.rs - Variant Store Data Models
// ==============================================================================
// Description: Rows and keys shared by the pipeline and both store backends
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-10-19
// Version: 3.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deduplication key of a variant: one alternate allele at one position
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantKey {
    /// Normalized chromosome (see `normalize::normalize_chrom`)
    pub chrom: String,
    /// 1-based position
    pub pos: i64,
    /// Reference allele
    #[serde(rename = "ref")]
    pub ref_allele: String,
    /// A single alternate allele ("." when the record has none)
    pub alt: String,
}

impl VariantKey {
    pub fn new(chrom: impl Into<String>, pos: i64, ref_allele: impl Into<String>, alt: impl Into<String>) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
            ref_allele: ref_allele.into(),
            alt: alt.into(),
        }
    }
}

/// Renders `chrom:pos:ref>alt`, the unmatched-log line format
impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}>{}", self.chrom, self.pos, self.ref_allele, self.alt)
    }
}

/// Typed INFO columns extracted from the attribute blob
///
/// Every field is independently nullable; a failed extraction never prevents
/// the others from being stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    /// Read depth (DP)
    pub dp: Option<i64>,
    /// Allele frequency (AF)
    pub af: Option<f64>,
    /// Allele count (AC)
    pub ac: Option<i64>,
    /// Total allele number (AN)
    pub an: Option<i64>,
    /// Excess heterozygosity (ExcessHet)
    pub excess_het: Option<f64>,
    /// Fisher strand bias (FS)
    pub fs: Option<f64>,
    /// ML-estimated allele count (MLEAC)
    pub mleac: Option<i64>,
    /// ML-estimated allele frequency (MLEAF)
    pub mleaf: Option<f64>,
    /// Mapping quality (MQ)
    pub mq: Option<f64>,
    /// Quality by depth (QD)
    pub qd: Option<f64>,
    /// Symmetric odds ratio (SOR)
    pub sor: Option<f64>,
    /// dbSNP reference id (RS)
    pub rs: Option<i64>,
}

/// A variant row ready to be written, one per alternate allele
#[derive(Debug, Clone, PartialEq)]
pub struct NewVariant {
    pub key: VariantKey,
    pub qual: Option<f64>,
    /// Filter status, "PASS" when the record had none
    pub filter: String,
    /// Canonical JSON of all raw INFO attributes
    pub info: String,
    pub fields: ExtractedFields,
    /// JSON list of functional annotation entries, None without ANN
    pub ann: Option<String>,
}

/// A stored variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRow {
    pub variant_id: i64,
    #[serde(flatten)]
    pub key: VariantKey,
    pub qual: Option<f64>,
    pub filter: String,
    pub info: String,
    #[serde(flatten)]
    pub fields: ExtractedFields,
    pub ann: Option<String>,
}

impl VariantRow {
    pub fn from_new(variant_id: i64, variant: NewVariant) -> Self {
        Self {
            variant_id,
            key: variant.key,
            qual: variant.qual,
            filter: variant.filter,
            info: variant.info,
            fields: variant.fields,
            ann: variant.ann,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRow {
    pub sample_id: i64,
    pub sample_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenotypeRow {
    pub variant_id: i64,
    pub sample_id: i64,
    /// Rendered allele-index token, e.g. "0/1" or "./."
    pub genotype: String,
}

/// ClinVar fields attached to a variant
///
/// The first four fields are the browsing layer's summary columns; the rest
/// mirror the ClinVar INFO keys of the same name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalAnnotation {
    /// RCV accession
    pub clinvar_id: Option<String>,
    /// CLNSIG
    pub clinical_significance: Option<String>,
    /// CLNDBN
    pub condition: Option<String>,
    /// CLNREVSTAT
    pub review_status: Option<String>,
    pub clnrevstat: Option<String>,
    pub clnsig: Option<String>,
    pub clnvc: Option<String>,
    pub clnvcso: Option<String>,
    pub geneinfo: Option<String>,
    pub mc: Option<String>,
    pub origin: Option<String>,
    pub alleleid: Option<i64>,
    pub clndisdb: Option<String>,
    pub clndn: Option<String>,
    pub clnhgvs: Option<String>,
    pub af_exac: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalAnnotationRow {
    pub annotation_id: i64,
    pub variant_id: i64,
    #[serde(flatten)]
    pub annotation: ClinicalAnnotation,
}

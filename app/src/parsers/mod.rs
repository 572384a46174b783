// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Parsers for genetic data file formats
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-19
// Version: 2.0.0
// ==============================================================================

pub mod vcf;

pub use vcf::{AttributeValue, Compression, VCFParseError, VCFReader, VariantRecord};

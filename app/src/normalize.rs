// ==============================================================================
// normalize.rs - Key Normalization
// ==============================================================================
// Description: Canonical chromosome and sample names shared by ingestion and matching
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Examples:
//   "chr1"  -> "1"
//   "chrM"  -> "MT"
//   " x "   -> "X"
//   "CHRmt" -> "MT"
// ==============================================================================

/// Normalize a chromosome label into the store's key space
///
/// Trims whitespace, strips a case-insensitive `chr` prefix, maps the
/// mitochondrial alias `M` to `MT` and uppercases the result. The function is
/// total, so the ingestion and ClinVar passes produce bit-identical keys.
/// The prefix is stripped once: re-normalizing is a no-op except for labels
/// with a doubled prefix such as `chrchr1`.
pub fn normalize_chrom(raw: &str) -> String {
    let trimmed = raw.trim();

    let stripped = match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("chr") => &trimmed[3..],
        _ => trimmed,
    };

    if stripped.eq_ignore_ascii_case("m") {
        return "MT".to_string();
    }

    stripped.to_uppercase()
}

/// Normalize a sample name as declared in a VCF header
pub fn normalize_sample_name(raw: &str) -> String {
    raw.trim().to_string()
}

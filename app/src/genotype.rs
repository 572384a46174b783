// ==============================================================================
// genotype.rs - Genotype Token Rendering
// ==============================================================================
// Description: Converts per-sample allele-index calls into stored genotype tokens
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-19
// Version: 2.0.0
// ==============================================================================
// Algorithm:
//   Given the two allele indices of a diploid call (0 = REF, 1 = first ALT, ...):
//   - either index missing -> "./."
//   - otherwise            -> "{first}/{second}"
//   Indices are the raw indices of the source record. They are NOT remapped
//   onto the per-alternate variant rows a multi-allelic record is split into,
//   so every row of a split record carries the same token for a sample.
//   Phasing ("|") is not preserved.
// ==============================================================================

/// Allele index used for a missing call (".")
pub const MISSING_ALLELE: i32 = -1;

/// Token stored for a call with a missing allele
pub const MISSING_GENOTYPE: &str = "./.";

/// The first two allele indices of one sample's GT value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllelePair(pub i32, pub i32);

impl AllelePair {
    pub const MISSING: AllelePair = AllelePair(MISSING_ALLELE, MISSING_ALLELE);

    /// Parse a GT value such as "0/1", "1|1", "./." or "1"
    ///
    /// # Returns
    /// * `Some(pair)` - Parsed call; haploid calls get a missing second allele
    /// * `None` - Value is not a GT encoding
    pub fn parse_gt(gt: &str) -> Option<Self> {
        let gt = gt.trim();
        if gt.is_empty() {
            return None;
        }

        let mut alleles = gt.split(['/', '|']).map(|allele| match allele {
            "." => Some(MISSING_ALLELE),
            index => index.parse::<u16>().ok().map(i32::from),
        });

        let first = alleles.next()??;
        let second = match alleles.next() {
            Some(allele) => allele?,
            None => MISSING_ALLELE,
        };

        Some(AllelePair(first, second))
    }

    pub fn is_missing(&self) -> bool {
        self.0 == MISSING_ALLELE || self.1 == MISSING_ALLELE
    }
}

/// Render an allele pair into the stored genotype token
///
/// # Examples
/// ```
/// use variant_ingest::genotype::{render_genotype, AllelePair};
///
/// assert_eq!(render_genotype(AllelePair(0, 1)), "0/1");
/// assert_eq!(render_genotype(AllelePair(-1, 0)), "./.");
/// ```
pub fn render_genotype(pair: AllelePair) -> String {
    if pair.is_missing() {
        return MISSING_GENOTYPE.to_string();
    }
    format!("{}/{}", pair.0, pair.1)
}

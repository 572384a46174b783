// ==============================================================================
// query.rs - Variant Browsing Queries
// ==============================================================================
// Description: Read-side filters over the populated store
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use serde::Serialize;

use crate::models::{ClinicalAnnotation, GenotypeRow, VariantRow};
use crate::normalize::normalize_chrom;
use crate::store::{StoreError, VariantStore};

/// Filter over stored variants; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct VariantQuery {
    pub chrom: Option<String>,
    /// Inclusive lower bound on position
    pub start: Option<i64>,
    /// Inclusive upper bound on position
    pub end: Option<i64>,
    pub min_qual: Option<f64>,
    pub filter: Option<String>,
    /// Case-insensitive substring of the ClinVar significance
    pub clinical_significance: Option<String>,
    pub limit: Option<usize>,
}

impl VariantQuery {
    /// Positional and quality filters that need only the variant row
    pub fn matches(&self, variant: &VariantRow) -> bool {
        if let Some(chrom) = &self.chrom {
            if variant.key.chrom != normalize_chrom(chrom) {
                return false;
            }
        }
        if self.start.is_some_and(|start| variant.key.pos < start) {
            return false;
        }
        if self.end.is_some_and(|end| variant.key.pos > end) {
            return false;
        }
        if let Some(min_qual) = self.min_qual {
            if !variant.qual.is_some_and(|q| q >= min_qual) {
                return false;
            }
        }
        if let Some(filter) = &self.filter {
            if &variant.filter != filter {
                return false;
            }
        }
        true
    }
}

/// A variant joined with its annotation and genotypes
#[derive(Debug, Clone, Serialize)]
pub struct VariantDetail {
    #[serde(flatten)]
    pub variant: VariantRow,
    pub clinvar: Option<ClinicalAnnotation>,
    pub genotypes: Vec<GenotypeRow>,
}

/// Run a query and join each hit with its annotation and genotypes
pub fn run_query<S: VariantStore + ?Sized>(store: &S, query: &VariantQuery) -> Result<Vec<VariantDetail>, StoreError> {
    let significance = query.clinical_significance.as_ref().map(|s| s.to_lowercase());
    let mut results = Vec::new();

    for variant in store.query_by_predicate(&|v: &VariantRow| query.matches(v))? {
        if query.limit.is_some_and(|limit| results.len() >= limit) {
            break;
        }

        let clinvar = store
            .annotation_for_variant(variant.variant_id)?
            .map(|row| row.annotation);

        if let Some(wanted) = &significance {
            let hit = clinvar
                .as_ref()
                .and_then(|a| a.clinical_significance.as_deref())
                .is_some_and(|s| s.to_lowercase().contains(wanted.as_str()));
            if !hit {
                continue;
            }
        }

        let genotypes = store.genotypes_for_variant(variant.variant_id)?;
        results.push(VariantDetail {
            variant,
            clinvar,
            genotypes,
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::new_variant;
    use crate::store::SqliteStore;

    fn populated() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        for (chrom, pos) in [("1", 100), ("1", 200), ("2", 150)] {
            store.insert_variant(&new_variant(chrom, pos, "A", "T")).unwrap();
        }
        let annotation = ClinicalAnnotation {
            clinical_significance: Some("Pathogenic".to_string()),
            ..Default::default()
        };
        store.insert_annotation(2, &annotation).unwrap();
        store
    }

    #[test]
    fn test_position_range() {
        let store = populated();
        let query = VariantQuery {
            chrom: Some("chr1".to_string()),
            start: Some(150),
            ..Default::default()
        };

        let results = run_query(&store, &query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].variant.key.pos, 200);
    }

    #[test]
    fn test_clinical_significance_and_limit() {
        let store = populated();

        let query = VariantQuery {
            clinical_significance: Some("pathogenic".to_string()),
            ..Default::default()
        };
        let results = run_query(&store, &query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].variant.variant_id, 2);

        let query = VariantQuery {
            limit: Some(2),
            ..Default::default()
        };
        assert_eq!(run_query(&store, &query).unwrap().len(), 2);
    }

    #[test]
    fn test_min_qual_excludes_missing() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut variant = new_variant("1", 1, "A", "G");
        variant.qual = None;
        store.insert_variant(&variant).unwrap();

        let query = VariantQuery {
            min_qual: Some(10.0),
            ..Default::default()
        };
        assert!(run_query(&store, &query).unwrap().is_empty());
    }
}

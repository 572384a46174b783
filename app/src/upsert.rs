// ==============================================================================
// upsert.rs - Variant Upsert Engine
// ==============================================================================
// Description: Decomposes records into per-allele variants and inserts or
//              reuses them by (chrom, pos, ref, alt)
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use tracing::warn;

use crate::annotation::ann_json;
use crate::coerce::{extract_fields, info_blob, serialize_attributes, CoercionWarning};
use crate::models::{NewVariant, VariantKey};
use crate::normalize::normalize_chrom;
use crate::parsers::VariantRecord;
use crate::store::{upsert_by_unique_key, StoreError, Upserted, VariantStore};

/// Alt used for a record whose ALT column is "."
pub const NO_ALT: &str = ".";

/// Filter status stored when a record has no failed filters
pub const PASS: &str = "PASS";

/// Build one `NewVariant` per alternate allele of a record
///
/// Attribute serialization and typed extraction run once per record and are
/// shared by every allele.
pub fn build_variants(record: &VariantRecord, warnings: &mut Vec<CoercionWarning>) -> Vec<NewVariant> {
    let chrom = normalize_chrom(&record.chrom);
    let filter = if record.filters.is_empty() {
        PASS.to_string()
    } else {
        record.filters.join(";")
    };

    let info = serialize_attributes(&record.attributes);
    let blob = info_blob(&info);
    let fields = extract_fields(&info, warnings);
    let ann = ann_json(info.get("ANN"));

    let alts: Vec<&str> = if record.alts.is_empty() {
        vec![NO_ALT]
    } else {
        record.alts.iter().map(String::as_str).collect()
    };

    alts.into_iter()
        .map(|alt| NewVariant {
            key: VariantKey::new(chrom.clone(), record.pos, record.ref_allele.clone(), alt),
            qual: record.qual,
            filter: filter.clone(),
            info: blob.clone(),
            fields: fields.clone(),
            ann: ann.clone(),
        })
        .collect()
}

/// Insert a variant, or resolve the id of the row already holding its key
pub fn upsert_variant<S: VariantStore + ?Sized>(
    store: &mut S,
    variant: &NewVariant,
) -> Result<Upserted, StoreError> {
    let upserted = upsert_by_unique_key(
        store,
        &variant.key,
        |s| s.insert_variant(variant),
        |s, key| s.find_variant_by_key(key),
    )?;

    if upserted == Upserted::Missing {
        warn!("Variant {} conflicted on insert but could not be found", variant.key);
    }
    Ok(upserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::{AttributeValue, VCFReader};
    use crate::store::{DocumentStore, SqliteStore};
    use std::io::Cursor;

    const VCF: &str = "\
##fileformat=VCFv4.2
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">
##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele frequency\">
##INFO=<ID=ANN,Number=.,Type=String,Description=\"Functional annotations\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO
chr1\t100\trs1\tA\tT,G\t50\tPASS\tDP=10;AF=0.25,0.5;ANN=T|missense_variant|MODERATE
chrM\t7\t.\tC\t.\t.\tq10;lowDP\tDP=bad
";

    fn records() -> Vec<VariantRecord> {
        VCFReader::from_reader(Cursor::new(VCF))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_multiallelic_decomposes() {
        let mut warnings = Vec::new();
        let variants = build_variants(&records()[0], &mut warnings);

        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].key, VariantKey::new("1", 100, "A", "T"));
        assert_eq!(variants[1].key, VariantKey::new("1", 100, "A", "G"));
        assert_eq!(variants[0].filter, PASS);
        assert_eq!(variants[0].fields.dp, Some(10));
        // First element of a per-allele list
        assert_eq!(variants[0].fields.af, Some(0.25));
        assert!(variants[0].ann.as_deref().unwrap().contains("\"Impact\":\"MODERATE\""));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_no_alt_and_failed_filters() {
        let mut warnings = Vec::new();
        let variants = build_variants(&records()[1], &mut warnings);

        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].key, VariantKey::new("MT", 7, "C", NO_ALT));
        assert_eq!(variants[0].filter, "q10;lowDP");
        assert_eq!(variants[0].qual, None);
        assert_eq!(variants[0].fields.dp, None);
        assert_eq!(variants[0].ann, None);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "DP");
    }

    #[test]
    fn test_info_blob_keeps_all_attributes() {
        let mut record = records()[0].clone();
        record
            .attributes
            .insert("CUSTOM".to_string(), AttributeValue::String("x".to_string()));
        let variants = build_variants(&record, &mut Vec::new());

        let blob: serde_json::Value = serde_json::from_str(&variants[0].info).unwrap();
        assert_eq!(blob["CUSTOM"], "x");
        assert_eq!(blob["DP"], 10);
    }

    fn double_upsert<S: VariantStore>(mut store: S) {
        let variant = build_variants(&records()[0], &mut Vec::new()).remove(0);

        let first = upsert_variant(&mut store, &variant).unwrap();
        let second = upsert_variant(&mut store, &variant).unwrap();

        assert!(matches!(first, Upserted::Inserted(_)));
        assert_eq!(second, Upserted::Existing(first.id().unwrap()));
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_double_upsert_sqlite() {
        double_upsert(SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_double_upsert_document() {
        double_upsert(DocumentStore::in_memory());
    }
}

// ==============================================================================
// clinvar.rs - ClinVar Annotation Matcher
// ==============================================================================
// Description: Attaches ClinVar clinical annotations to already-ingested
//              variants by exact (chrom, pos, ref, alt)
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// The matcher never creates a variant. A ClinVar allele with no stored
// counterpart is collected as unmatched and later appended to the unmatched
// log as `chrom:pos:ref>alt`.
// ==============================================================================

use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::coerce::{coerce_field, serialize_attributes, CoercionWarning, FieldKind, Scalar};
use crate::models::{ClinicalAnnotation, VariantKey};
use crate::normalize::normalize_chrom;
use crate::parsers::VariantRecord;
use crate::store::{StoreError, VariantStore};
use crate::upsert::NO_ALT;

/// Render an attribute as text; list elements are joined back with ','
///
/// ClinVar text values such as CLNREVSTAT and CLNDISDB contain commas of
/// their own.
fn field_text(info: &Map<String, Value>, key: &str) -> Option<String> {
    match info.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::Null => ".".to_string(),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(","))
            }
        }
        other => Some(other.to_string()),
    }
}

/// Build the clinical annotation carried by one ClinVar record
pub fn clinical_annotation(info: &Map<String, Value>, warnings: &mut Vec<CoercionWarning>) -> ClinicalAnnotation {
    let text = |key: &str| field_text(info, key);

    ClinicalAnnotation {
        clinvar_id: text("RCV"),
        clinical_significance: text("CLNSIG"),
        condition: text("CLNDBN"),
        review_status: text("CLNREVSTAT"),
        clnrevstat: text("CLNREVSTAT"),
        clnsig: text("CLNSIG"),
        clnvc: text("CLNVC"),
        clnvcso: text("CLNVCSO"),
        geneinfo: text("GENEINFO"),
        mc: text("MC"),
        origin: text("ORIGIN"),
        alleleid: coerce_field("ALLELEID", info.get("ALLELEID"), FieldKind::Integer, warnings)
            .and_then(Scalar::as_integer),
        clndisdb: text("CLNDISDB"),
        clndn: text("CLNDN"),
        clnhgvs: text("CLNHGVS"),
        af_exac: coerce_field("AF_EXAC", info.get("AF_EXAC"), FieldKind::Real, warnings)
            .and_then(Scalar::as_real),
    }
}

/// Outcome counters and unmatched keys of one annotation pass
#[derive(Debug, Default)]
pub struct AnnotationMatcher {
    /// Alleles with no stored variant, in encounter order
    pub unmatched: Vec<VariantKey>,
    /// Annotations newly attached
    pub attached: usize,
    /// Matches whose variant already carried an annotation
    pub already_annotated: usize,
    pub records: usize,
}

impl AnnotationMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match every alternate allele of one ClinVar record
    pub fn match_record<S: VariantStore + ?Sized>(
        &mut self,
        store: &mut S,
        record: &VariantRecord,
        warnings: &mut Vec<CoercionWarning>,
    ) -> Result<(), StoreError> {
        self.records += 1;

        let chrom = normalize_chrom(&record.chrom);
        let info = serialize_attributes(&record.attributes);
        let annotation = clinical_annotation(&info, warnings);

        let alts: Vec<&str> = if record.alts.is_empty() {
            vec![NO_ALT]
        } else {
            record.alts.iter().map(String::as_str).collect()
        };

        for alt in alts {
            let key = VariantKey::new(chrom.clone(), record.pos, record.ref_allele.clone(), alt);

            match store.find_variant_by_key(&key)? {
                Some(variant_id) => {
                    if store.insert_annotation(variant_id, &annotation)? {
                        self.attached += 1;
                    } else {
                        debug!("Variant {} already annotated, keeping first annotation", key);
                        self.already_annotated += 1;
                    }
                }
                None => self.unmatched.push(key),
            }
        }

        Ok(())
    }
}

/// Append unmatched keys to the log, one `chrom:pos:ref>alt` per line
pub fn append_unmatched_log(path: &Path, keys: &[VariantKey]) -> std::io::Result<()> {
    if keys.is_empty() {
        return Ok(());
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for key in keys {
        writeln!(writer, "{}", key)?;
    }
    writer.flush()?;

    info!("Logged {} unmatched ClinVar variants to {:?}", keys.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::VCFReader;
    use crate::store::test_support::new_variant;
    use crate::store::{DocumentStore, SqliteStore};
    use serde_json::json;
    use std::io::Cursor;
    use tempfile::tempdir;

    const CLINVAR: &str = "\
##fileformat=VCFv4.1
##INFO=<ID=ALLELEID,Number=1,Type=Integer,Description=\"Allele id\">
##INFO=<ID=CLNSIG,Number=.,Type=String,Description=\"Clinical significance\">
##INFO=<ID=CLNREVSTAT,Number=.,Type=String,Description=\"Review status\">
##INFO=<ID=CLNDISDB,Number=.,Type=String,Description=\"Disease database ids\">
##INFO=<ID=GENEINFO,Number=1,Type=String,Description=\"Gene\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO
1\t100\t1\tA\tT,C\t.\t.\tALLELEID=15;CLNSIG=Pathogenic;CLNREVSTAT=criteria_provided,_multiple_submitters,_no_conflicts;CLNDISDB=MedGen:C0027672,SNOMED_CT:699346009;GENEINFO=BRCA1:672
";

    fn clinvar_record() -> VariantRecord {
        VCFReader::from_reader(Cursor::new(CLINVAR))
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_clinical_annotation_fields() {
        let info = json!({
            "CLNSIG": ["Likely_pathogenic", "other"],
            "CLNDBN": "Breast cancer",
            "ALLELEID": "77",
            "AF_EXAC": 0.001,
            "ORIGIN": 1
        });
        let mut warnings = Vec::new();
        let annotation = clinical_annotation(info.as_object().unwrap(), &mut warnings);

        assert_eq!(annotation.clinical_significance.as_deref(), Some("Likely_pathogenic,other"));
        assert_eq!(annotation.clnsig, annotation.clinical_significance);
        assert_eq!(annotation.condition.as_deref(), Some("Breast cancer"));
        assert_eq!(annotation.origin.as_deref(), Some("1"));
        assert_eq!(annotation.alleleid, Some(77));
        assert_eq!(annotation.af_exac, Some(0.001));
        assert_eq!(annotation.clinvar_id, None);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_bad_alleleid_is_null_with_warning() {
        let info = json!({ "ALLELEID": "n/a" });
        let mut warnings = Vec::new();
        let annotation = clinical_annotation(info.as_object().unwrap(), &mut warnings);

        assert_eq!(annotation.alleleid, None);
        assert_eq!(warnings.len(), 1);
    }

    fn match_twice<S: VariantStore>(mut store: S) {
        let variant_id = store.insert_variant(&new_variant("1", 100, "A", "T")).unwrap();
        let record = clinvar_record();

        let mut first = AnnotationMatcher::new();
        first.match_record(&mut store, &record, &mut Vec::new()).unwrap();
        assert_eq!(first.attached, 1);
        assert_eq!(first.unmatched, vec![VariantKey::new("1", 100, "A", "C")]);

        let mut second = AnnotationMatcher::new();
        second.match_record(&mut store, &record, &mut Vec::new()).unwrap();
        assert_eq!(second.attached, 0);
        assert_eq!(second.already_annotated, 1);

        let stored = store.annotation_for_variant(variant_id).unwrap().unwrap();
        assert_eq!(stored.annotation.clinical_significance.as_deref(), Some("Pathogenic"));
        assert_eq!(stored.annotation.geneinfo.as_deref(), Some("BRCA1:672"));
        assert_eq!(stored.annotation.alleleid, Some(15));
        assert_eq!(
            stored.annotation.review_status.as_deref(),
            Some("criteria_provided,_multiple_submitters,_no_conflicts")
        );
        assert_eq!(stored.annotation.clnrevstat, stored.annotation.review_status);
        assert_eq!(
            stored.annotation.clndisdb.as_deref(),
            Some("MedGen:C0027672,SNOMED_CT:699346009")
        );

        // Unmatched alleles never create variants
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_match_twice_sqlite() {
        match_twice(SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_match_twice_document() {
        match_twice(DocumentStore::in_memory());
    }

    #[test]
    fn test_unmatched_log_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unmatched.log");

        append_unmatched_log(&path, &[VariantKey::new("1", 5, "A", "T")]).unwrap();
        append_unmatched_log(&path, &[]).unwrap();
        append_unmatched_log(&path, &[VariantKey::new("X", 9, "G", "C")]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "1:5:A>T\nX:9:G>C\n");
    }
}

// ==============================================================================
// annotation.rs - Functional Annotation (ANN) Splitter
// ==============================================================================
// Description: Decomposes pipe-delimited ANN entries into fixed-schema records
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Format (one entry per transcript, entries comma-separated in INFO):
//   T|missense_variant|MODERATE|BRCA1|ENSG...|transcript|ENST...|protein_coding|...
// Values are matched to the schema by position. An entry with fewer than 17
// values produces a record WITHOUT the trailing keys (they are absent, not
// null); values past the 17th are dropped.
// ==============================================================================

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

/// ANN subfield names in positional order
pub const ANN_FIELDS: [&str; 17] = [
    "Allele",
    "Consequence",
    "Impact",
    "Symbol",
    "Gene",
    "Feature_type",
    "Feature",
    "Biotype",
    "Rank",
    "HGVS.c",
    "HGVS.p",
    "cDNA_position",
    "CDS_position",
    "Protein_position",
    "Distance",
    "ERRORS",
    "WARNINGS",
];

/// One functional annotation, keys in schema order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationEntry(IndexMap<String, String>);

impl AnnotationEntry {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Split one pipe-delimited entry
pub fn split_annotation(entry: &str) -> AnnotationEntry {
    AnnotationEntry(
        ANN_FIELDS
            .iter()
            .zip(entry.split('|'))
            .map(|(field, value)| (field.to_string(), value.to_string()))
            .collect(),
    )
}

/// Split the raw ANN attribute, a single entry or a list of entries
pub fn parse_ann(raw: &Value) -> Vec<AnnotationEntry> {
    match raw {
        Value::String(entry) => vec![split_annotation(entry)],
        Value::Array(entries) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::Null => None,
                Value::String(s) => Some(split_annotation(s)),
                other => Some(split_annotation(&other.to_string())),
            })
            .collect(),
        Value::Null => Vec::new(),
        other => vec![split_annotation(&other.to_string())],
    }
}

/// Serialized annotation list for the variant row
///
/// `None` when ANN is absent, empty, or yields no entries.
pub fn ann_json(raw: Option<&Value>) -> Option<String> {
    let raw = raw?;
    let is_empty = match raw {
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Null => true,
        _ => false,
    };
    if is_empty {
        return None;
    }

    let entries = parse_ann(raw);
    if entries.is_empty() {
        return None;
    }

    match serde_json::to_string(&entries) {
        Ok(json) => Some(json),
        Err(e) => {
            error!("Failed to serialize ANN entries: {}", e);
            None
        }
    }
}

// ==============================================================================
// coerce.rs - INFO Field Coercion
// ==============================================================================
// Description: JSON serialization of raw attributes and typed column extraction
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Two independent paths leave this module for every record:
//   1. the full attribute blob, serialized as canonical (key-sorted) JSON
//   2. the fixed typed columns of `ExtractedFields`
// Neither path can fail. A value that cannot be coerced to its column type is
// stored as NULL and reported as a `CoercionWarning`.
// ==============================================================================

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, error, warn};

use crate::models::ExtractedFields;
use crate::parsers::AttributeValue;

/// Declared type of an extracted column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Real,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Integer => write!(f, "integer"),
            FieldKind::Real => write!(f, "real"),
        }
    }
}

/// A successfully coerced column value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Integer(i64),
    Real(f64),
}

impl Scalar {
    pub fn as_integer(self) -> Option<i64> {
        match self {
            Scalar::Integer(i) => Some(i),
            Scalar::Real(_) => None,
        }
    }

    pub fn as_real(self) -> Option<f64> {
        match self {
            Scalar::Real(r) => Some(r),
            Scalar::Integer(i) => Some(i as f64),
        }
    }
}

/// A value that could not be coerced and was stored as NULL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionWarning {
    pub field: String,
    pub value: String,
    pub kind: FieldKind,
}

impl fmt::Display for CoercionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not convert field '{}' value '{}' to {}",
            self.field, self.value, self.kind
        )
    }
}

/// Convert one raw attribute value into JSON
///
/// Lists are converted element by element. Non-finite reals have no JSON
/// representation and become null.
pub fn to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Flag => Value::Bool(true),
        AttributeValue::Integer(i) => Value::from(*i),
        AttributeValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        AttributeValue::String(s) => Value::String(s.clone()),
        AttributeValue::Missing => Value::Null,
        AttributeValue::List(items) => Value::Array(items.iter().map(to_json).collect()),
    }
}

/// Convert a whole attribute bag into a JSON object, keys in sorted order
pub fn serialize_attributes(attributes: &BTreeMap<String, AttributeValue>) -> Map<String, Value> {
    attributes
        .iter()
        .map(|(k, v)| (k.clone(), to_json(v)))
        .collect()
}

/// Render a JSON attribute object as text, "{}" if serialization fails
pub fn info_blob(info: &Map<String, Value>) -> String {
    serde_json::to_string(info).unwrap_or_else(|e| {
        error!("Failed to serialize INFO attributes: {}", e);
        "{}".to_string()
    })
}

/// Reduce a raw value to one scalar of the requested kind
///
/// A list contributes its first element. Absent values, empty lists and
/// values that do not convert all yield `None`; conversion failures are
/// additionally pushed onto `warnings`.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use variant_ingest::coerce::{coerce_field, FieldKind, Scalar};
///
/// let mut warnings = Vec::new();
/// let ac = coerce_field("AC", Some(&json!(["3"])), FieldKind::Integer, &mut warnings);
/// assert_eq!(ac, Some(Scalar::Integer(3)));
/// assert!(warnings.is_empty());
/// ```
pub fn coerce_field(
    name: &str,
    raw: Option<&Value>,
    kind: FieldKind,
    warnings: &mut Vec<CoercionWarning>,
) -> Option<Scalar> {
    let mut value = match raw {
        None | Some(Value::Null) => {
            debug!("Field '{}' is absent", name);
            return None;
        }
        Some(value) => value,
    };

    if let Value::Array(items) = value {
        debug!("Field '{}' is a list: {}. Using first element.", name, value);
        match items.first() {
            Some(Value::Null) => return None,
            Some(first) => value = first,
            None => {
                reject(name, value, kind, warnings);
                return None;
            }
        }
    }

    let coerced = match kind {
        FieldKind::Integer => to_integer(value).map(Scalar::Integer),
        FieldKind::Real => to_real(value).map(Scalar::Real),
    };

    if coerced.is_none() {
        reject(name, value, kind, warnings);
    }
    coerced
}

fn reject(name: &str, value: &Value, kind: FieldKind, warnings: &mut Vec<CoercionWarning>) {
    let warning = CoercionWarning {
        field: name.to_string(),
        value: match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
        kind,
    };
    warn!("{}. Setting as None.", warning);
    warnings.push(warning);
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn to_real(value: &Value) -> Option<f64> {
    let real = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    real.filter(|f| f.is_finite())
}

/// Pulls typed columns out of one attribute object
struct FieldExtractor<'a> {
    info: &'a Map<String, Value>,
    warnings: &'a mut Vec<CoercionWarning>,
}

impl FieldExtractor<'_> {
    fn integer(&mut self, name: &str) -> Option<i64> {
        coerce_field(name, self.info.get(name), FieldKind::Integer, self.warnings)
            .and_then(Scalar::as_integer)
    }

    fn real(&mut self, name: &str) -> Option<f64> {
        coerce_field(name, self.info.get(name), FieldKind::Real, self.warnings)
            .and_then(Scalar::as_real)
    }
}

/// Extract the fixed typed columns from a serialized attribute object
pub fn extract_fields(info: &Map<String, Value>, warnings: &mut Vec<CoercionWarning>) -> ExtractedFields {
    let mut x = FieldExtractor { info, warnings };

    ExtractedFields {
        dp: x.integer("DP"),
        af: x.real("AF"),
        ac: x.integer("AC"),
        an: x.integer("AN"),
        excess_het: x.real("ExcessHet"),
        fs: x.real("FS"),
        mleac: x.integer("MLEAC"),
        mleaf: x.real("MLEAF"),
        mq: x.real("MQ"),
        qd: x.real("QD"),
        sor: x.real("SOR"),
        rs: x.integer("RS"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coerce(raw: Value, kind: FieldKind) -> (Option<Scalar>, Vec<CoercionWarning>) {
        let mut warnings = Vec::new();
        let value = coerce_field("F", Some(&raw), kind, &mut warnings);
        (value, warnings)
    }

    #[test]
    fn test_list_reduces_to_first_element() {
        assert_eq!(coerce(json!(["3"]), FieldKind::Integer).0, Some(Scalar::Integer(3)));
        assert_eq!(coerce(json!([0.5, 0.25]), FieldKind::Real).0, Some(Scalar::Real(0.5)));
    }

    #[test]
    fn test_bad_value_is_null_with_warning() {
        let (value, warnings) = coerce(json!("abc"), FieldKind::Integer);
        assert_eq!(value, None);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "F");
        assert_eq!(warnings[0].value, "abc");
        assert_eq!(warnings[0].kind, FieldKind::Integer);
    }

    #[test]
    fn test_absent_value_is_null_without_warning() {
        let mut warnings = Vec::new();
        assert_eq!(coerce_field("DP", None, FieldKind::Integer, &mut warnings), None);
        assert_eq!(coerce_field("DP", Some(&Value::Null), FieldKind::Integer, &mut warnings), None);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_empty_list_warns() {
        let (value, warnings) = coerce(json!([]), FieldKind::Real);
        assert_eq!(value, None);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_integer_casts() {
        assert_eq!(coerce(json!(3.9), FieldKind::Integer).0, Some(Scalar::Integer(3)));
        assert_eq!(coerce(json!(" 42 "), FieldKind::Integer).0, Some(Scalar::Integer(42)));
        assert_eq!(coerce(json!(true), FieldKind::Integer).0, Some(Scalar::Integer(1)));
        assert_eq!(coerce(json!("3.5"), FieldKind::Integer).0, None);
    }

    #[test]
    fn test_real_casts() {
        assert_eq!(coerce(json!(7), FieldKind::Real).0, Some(Scalar::Real(7.0)));
        assert_eq!(coerce(json!("1e-3"), FieldKind::Real).0, Some(Scalar::Real(0.001)));
        assert_eq!(coerce(json!("inf"), FieldKind::Real).0, None);
        assert_eq!(coerce(json!({"a": 1}), FieldKind::Real).0, None);
    }

    #[test]
    fn test_to_json_recursive() {
        let value = AttributeValue::List(vec![
            AttributeValue::Flag,
            AttributeValue::Float(f64::NAN),
            AttributeValue::String("x".to_string()),
            AttributeValue::List(vec![AttributeValue::Integer(1), AttributeValue::Missing]),
        ]);

        assert_eq!(to_json(&value), json!([true, null, "x", [1, null]]));
    }

    #[test]
    fn test_info_blob_is_key_sorted() {
        let mut attributes = BTreeMap::new();
        attributes.insert("b".to_string(), AttributeValue::Integer(2));
        attributes.insert("A".to_string(), AttributeValue::Flag);
        attributes.insert("a".to_string(), AttributeValue::Float(0.5));

        let blob = info_blob(&serialize_attributes(&attributes));
        assert_eq!(blob, r#"{"A":true,"a":0.5,"b":2}"#);
    }

    #[test]
    fn test_extract_fields_survives_every_failure() {
        let info = json!({
            "DP": "deep",
            "AF": ["n/a"],
            "AC": [],
            "MQ": {"nested": true}
        });
        let mut warnings = Vec::new();
        let fields = extract_fields(info.as_object().unwrap(), &mut warnings);

        assert_eq!(fields, ExtractedFields::default());
        assert_eq!(warnings.len(), 4);
    }

    #[test]
    fn test_extract_fields_typed() {
        let info = json!({
            "DP": 14, "AF": [0.5], "AC": [1], "AN": 2, "ExcessHet": 3.01,
            "FS": 0.0, "MLEAC": [1], "MLEAF": [0.5], "MQ": 60.0, "QD": 12.5,
            "SOR": 0.7, "RS": "12345", "OTHER": "ignored"
        });
        let mut warnings = Vec::new();
        let fields = extract_fields(info.as_object().unwrap(), &mut warnings);

        assert!(warnings.is_empty());
        assert_eq!(fields.dp, Some(14));
        assert_eq!(fields.af, Some(0.5));
        assert_eq!(fields.ac, Some(1));
        assert_eq!(fields.mleaf, Some(0.5));
        assert_eq!(fields.rs, Some(12345));
        assert_eq!(fields.sor, Some(0.7));
    }
}

//! Structured data extraction from free-text model output
//!
//! Model replies are free text that may wrap the requested JSON object in
//! prose or a fenced code block. Extraction runs in two stages:
//!
//! 1. **Locate**: parse the whole (trimmed) text; if that does not yield a
//!    JSON object, find the first balanced `{...}` span (string literals and
//!    escapes are tracked so braces inside strings do not count) and parse it.
//! 2. **Decode**: deserialize the object into the target [`Schema`] with
//!    serde, then run the schema's invariant checks.
//!
//! Missing optional fields take their declared defaults. A field that is
//! present with the wrong type is a [`SchemaValidationError`]; nothing is
//! coerced.

use std::ops::Range;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// No usable JSON object could be located in the model output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("Empty response")]
    Empty,

    #[error("No JSON object found in response")]
    NoJsonObject,

    /// A brace-balanced span was found but is not valid JSON
    #[error("Malformed JSON object in response: {0}")]
    Malformed(String),
}

/// A located JSON object does not satisfy the target schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{schema} validation failed: {}{message}", field_prefix(.field))]
pub struct SchemaValidationError {
    /// Schema the payload was decoded against
    pub schema: &'static str,
    /// Offending field, when known
    pub field: Option<String>,
    pub message: String,
}

fn field_prefix(field: &Option<String>) -> String {
    field.as_ref().map(|f| format!("{f} ")).unwrap_or_default()
}

impl SchemaValidationError {
    /// Shape error reported by the decoder (wrong type, missing required field)
    pub fn shape(schema: &'static str, message: impl Into<String>) -> Self {
        Self {
            schema,
            field: None,
            message: message.into(),
        }
    }

    /// Numeric or structural invariant violated by a decoded field
    pub fn invariant(schema: &'static str, field: &str, message: impl Into<String>) -> Self {
        Self {
            schema,
            field: Some(field.to_string()),
            message: message.into(),
        }
    }
}

/// Either stage of extraction failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Schema(#[from] SchemaValidationError),
}

/// A record type that model output can be decoded into
pub trait Schema: DeserializeOwned + Sized {
    /// Name used in validation error messages
    const NAME: &'static str;

    /// Check invariants after decoding; may normalize values within tolerance
    fn validate(self) -> Result<Self, SchemaValidationError> {
        Ok(self)
    }
}

/// Byte range of the first brace-balanced `{...}` span in `text`
///
/// The scan starts at the first `{`. Braces inside string literals are
/// ignored, with `\"` escapes honoured. Returns `None` when the braces never
/// balance.
pub fn find_json_object_span(text: &str) -> Option<Range<usize>> {
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    // Scanning bytes is safe: every byte we match on is ASCII, and ASCII
    // bytes never occur inside a multi-byte UTF-8 sequence.
    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some(start..end);
                }
            }
            _ => {}
        }
    }

    None
}

/// Locate and parse the JSON object embedded in `text`
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, ExtractionError> {
    let stripped = text.trim();
    if stripped.is_empty() {
        return Err(ExtractionError::Empty);
    }

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(stripped) {
        return Ok(object);
    }

    let span = find_json_object_span(stripped).ok_or(ExtractionError::NoJsonObject)?;

    match serde_json::from_str::<Value>(&stripped[span]) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ExtractionError::NoJsonObject),
        Err(e) => Err(ExtractionError::Malformed(e.to_string())),
    }
}

/// Decode an already-located JSON object into `T` and validate it
pub fn decode<T: Schema>(object: Map<String, Value>) -> Result<T, SchemaValidationError> {
    let record: T = serde_json::from_value(Value::Object(object))
        .map_err(|e| SchemaValidationError::shape(T::NAME, e.to_string()))?;
    record.validate()
}

/// Full two-stage extraction of a `T` from raw model output
pub fn extract_and_validate<T: Schema>(raw_text: &str) -> Result<T, OutputError> {
    let object = extract_json_object(raw_text)?;
    let record = decode::<T>(object)?;
    tracing::debug!(schema = T::NAME, "Model output decoded");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InstrumentDescription, ValuationResult};

    #[test]
    fn test_fenced_block_extracts_object() {
        let text = "Here is the result:\n```json\n{\"category\":\"Guitar\"}\n```";
        let object = extract_json_object(text).unwrap();

        let mut expected = Map::new();
        expected.insert("category".into(), Value::from("Guitar"));
        assert_eq!(object, expected);
    }

    #[test]
    fn test_bare_object_parses_directly() {
        let object = extract_json_object("  {\"brand\": \"Yamaha\"}  ").unwrap();
        assert_eq!(object["brand"], "Yamaha");
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"prefix {"notes": "a } brace and \" quote {", "brand": "Ibanez"} suffix }"#;
        let span = find_json_object_span(text).unwrap();
        let object: Value = serde_json::from_str(&text[span]).unwrap();
        assert_eq!(object["brand"], "Ibanez");
        assert_eq!(object["notes"], "a } brace and \" quote {");
    }

    #[test]
    fn test_nested_objects_balance() {
        let text = "x {\"a\": {\"b\": {}}, \"c\": 1} y {\"d\": 2}";
        let span = find_json_object_span(text).unwrap();
        assert_eq!(&text[span], "{\"a\": {\"b\": {}}, \"c\": 1}");
    }

    #[test]
    fn test_multibyte_text_around_object() {
        let text = "結果です：{\"category\": \"バイオリン\"}。以上";
        let object = extract_json_object(text).unwrap();
        assert_eq!(object["category"], "バイオリン");
    }

    #[test]
    fn test_empty_text_is_extraction_error() {
        assert_eq!(extract_json_object("   \n"), Err(ExtractionError::Empty));
    }

    #[test]
    fn test_text_without_object_is_extraction_error() {
        assert_eq!(
            extract_json_object("I could not identify the instrument."),
            Err(ExtractionError::NoJsonObject)
        );
        assert_eq!(
            extract_json_object("unbalanced { \"a\": 1"),
            Err(ExtractionError::NoJsonObject)
        );
    }

    #[test]
    fn test_top_level_array_is_not_accepted() {
        assert_eq!(
            extract_json_object("[1, 2, 3]"),
            Err(ExtractionError::NoJsonObject)
        );
    }

    #[test]
    fn test_balanced_but_invalid_json_is_malformed() {
        let err = extract_json_object("answer: {category: Guitar}").unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed(_)));
    }

    #[test]
    fn test_missing_description_fields_take_defaults() {
        let desc: InstrumentDescription =
            extract_and_validate("{\"category\": \"Guitar\"}").unwrap();
        assert_eq!(desc.category, "Guitar");
        assert_eq!(desc.brand, "");
        assert_eq!(desc.year, None);
        assert!(desc.materials.is_empty());
        assert!(desc.features.is_empty());
    }

    #[test]
    fn test_null_year_is_absent() {
        let desc: InstrumentDescription =
            extract_and_validate("{\"year\": null, \"brand\": \"Gibson\"}").unwrap();
        assert_eq!(desc.year, None);
    }

    #[test]
    fn test_wrong_type_is_schema_error_not_coerced() {
        let err = extract_and_validate::<InstrumentDescription>("{\"materials\": 3}").unwrap_err();
        match err {
            OutputError::Schema(e) => assert_eq!(e.schema, "InstrumentDescription"),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_valuation_missing_required_field_is_schema_error() {
        let err = extract_and_validate::<ValuationResult>(
            "{\"price_jpy\": 1000, \"range_jpy\": [900, 1100], \"confidence\": 0.5}",
        )
        .unwrap_err();
        assert!(matches!(err, OutputError::Schema(_)));
    }

    #[test]
    fn test_valuation_invariants_apply_after_extraction() {
        let text = "```json\n{\"price_jpy\": 5000, \"range_jpy\": [6000, 9000], \
                    \"confidence\": 0.4, \"rationale\": \"r\", \"evidence\": []}\n```";
        let err = extract_and_validate::<ValuationResult>(text).unwrap_err();
        match err {
            OutputError::Schema(e) => assert_eq!(e.field.as_deref(), Some("range_jpy")),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_whole_float_price_survives_extraction() {
        let text = "{\"price_jpy\": 120000.0, \"range_jpy\": [90000.0, 150000.0], \
                    \"confidence\": 0.7, \"rationale\": \"r\", \"evidence\": []}";
        let v = extract_and_validate::<ValuationResult>(text).unwrap();
        assert_eq!(v.price_jpy, 120_000);
        assert_eq!(v.range_jpy, (90_000, 150_000));

        let fractional = text.replace("120000.0", "120000.5");
        let err = extract_and_validate::<ValuationResult>(&fractional).unwrap_err();
        assert!(matches!(err, OutputError::Schema(_)));
    }

    #[test]
    fn test_schema_error_message_names_field() {
        let err = SchemaValidationError::invariant("ValuationResult", "confidence", "too high");
        assert_eq!(
            err.to_string(),
            "ValuationResult validation failed: confidence too high"
        );
    }
}

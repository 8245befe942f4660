//! Data model shared by the pipelines, the wire protocol and the client

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::extract::{Schema, SchemaValidationError};

/// Distance from a bound inside which an out-of-range confidence is clamped
/// rather than rejected.
pub const CONFIDENCE_EPSILON: f64 = 1e-3;

/// Structured description of an instrument, produced by the vision model
///
/// Every field is optional on the wire: missing strings decode as empty,
/// missing lists as empty lists and a missing year as `None`. The user may
/// edit the description before it is sent for valuation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentDescription {
    /// Instrument category (e.g. "electric guitar")
    pub category: String,
    pub brand: String,
    pub model: String,
    /// Year of manufacture if known (free text, e.g. "1996" or "unknown")
    pub year: Option<String>,
    /// Condition / wear summary
    pub condition: String,
    /// Key materials, in the order the model reported them
    pub materials: Vec<String>,
    /// Notable features / hardware
    pub features: Vec<String>,
    /// Extra notes or caveats from the description model
    pub notes: String,
}

impl Schema for InstrumentDescription {
    const NAME: &'static str = "InstrumentDescription";
}

/// Price estimate produced by the valuation pipeline
///
/// All fields are required. Invariants checked by [`Schema::validate`]:
/// `0 < price_jpy`, `range_jpy.0 <= price_jpy <= range_jpy.1`,
/// `0 <= confidence <= 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    /// Estimated fair price in JPY
    #[serde(deserialize_with = "whole_jpy")]
    pub price_jpy: i64,
    /// Low / high price range in JPY
    #[serde(deserialize_with = "whole_jpy_pair")]
    pub range_jpy: (i64, i64),
    /// Confidence score between 0 and 1
    pub confidence: f64,
    pub rationale: String,
    /// Evidence bullets backing the estimate
    pub evidence: Vec<String>,
}

impl Schema for ValuationResult {
    const NAME: &'static str = "ValuationResult";

    fn validate(mut self) -> Result<Self, SchemaValidationError> {
        let (low, high) = self.range_jpy;

        if self.price_jpy <= 0 {
            return Err(SchemaValidationError::invariant(
                Self::NAME,
                "price_jpy",
                format!("must be positive, got {}", self.price_jpy),
            ));
        }
        if low > high {
            return Err(SchemaValidationError::invariant(
                Self::NAME,
                "range_jpy",
                format!("must be an ordered pair, got [{low}, {high}]"),
            ));
        }
        if self.price_jpy < low || self.price_jpy > high {
            return Err(SchemaValidationError::invariant(
                Self::NAME,
                "range_jpy",
                format!(
                    "[{low}, {high}] does not contain price_jpy {}",
                    self.price_jpy
                ),
            ));
        }

        self.confidence = clamp_confidence(self.confidence).ok_or_else(|| {
            SchemaValidationError::invariant(
                Self::NAME,
                "confidence",
                format!("must be within [0, 1], got {}", self.confidence),
            )
        })?;

        Ok(self)
    }
}

/// A JPY amount as written by the model: an integer, or a float with no
/// fractional part (`120000.0`)
#[derive(Deserialize)]
#[serde(untagged)]
enum JpyAmount {
    Integer(i64),
    Float(f64),
}

impl JpyAmount {
    fn into_whole<E: de::Error>(self) -> Result<i64, E> {
        match self {
            JpyAmount::Integer(value) => Ok(value),
            JpyAmount::Float(value)
                if value.is_finite()
                    && value.fract() == 0.0
                    && value >= i64::MIN as f64
                    && value < i64::MAX as f64 =>
            {
                Ok(value as i64)
            }
            JpyAmount::Float(value) => Err(E::custom(format!(
                "expected a whole number of JPY, got {value}"
            ))),
        }
    }
}

fn whole_jpy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    JpyAmount::deserialize(deserializer)?.into_whole()
}

fn whole_jpy_pair<'de, D: Deserializer<'de>>(deserializer: D) -> Result<(i64, i64), D::Error> {
    let (low, high) = <(JpyAmount, JpyAmount)>::deserialize(deserializer)?;
    Ok((low.into_whole()?, high.into_whole()?))
}

/// Clamp a confidence value that overshoots [0, 1] by at most
/// [`CONFIDENCE_EPSILON`]; anything further out is rejected.
fn clamp_confidence(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    if (0.0..=1.0).contains(&value) {
        return Some(value);
    }
    if value < 0.0 && value >= -CONFIDENCE_EPSILON {
        return Some(0.0);
    }
    if value > 1.0 && value <= 1.0 + CONFIDENCE_EPSILON {
        return Some(1.0);
    }
    None
}

/// A reference record returned by the retrieval store for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    /// Free-form metadata (title, price_jpy, source, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Similarity to the query; higher is closer
    pub score: f32,
}

impl RetrievedDocument {
    /// Render a metadata value as display text, `None` when the key is absent
    pub fn metadata_text(&self, key: &str) -> Option<String> {
        self.metadata.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valuation(price: i64, range: (i64, i64), confidence: f64) -> ValuationResult {
        ValuationResult {
            price_jpy: price,
            range_jpy: range,
            confidence,
            rationale: "similar listings".to_string(),
            evidence: vec![],
        }
    }

    #[test]
    fn test_valid_valuation_passes_unchanged() {
        let v = valuation(120_000, (90_000, 150_000), 0.72);
        assert_eq!(v.clone().validate().unwrap(), v);
    }

    #[test]
    fn test_price_on_range_bounds_is_accepted() {
        assert!(valuation(90_000, (90_000, 150_000), 0.5).validate().is_ok());
        assert!(valuation(150_000, (90_000, 150_000), 0.5).validate().is_ok());
    }

    #[test]
    fn test_price_outside_range_is_rejected() {
        let err = valuation(200_000, (90_000, 150_000), 0.5)
            .validate()
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("range_jpy"));
    }

    #[test]
    fn test_unordered_range_is_rejected() {
        let err = valuation(100_000, (150_000, 90_000), 0.5)
            .validate()
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("range_jpy"));
    }

    #[test]
    fn test_negative_range_low_is_accepted() {
        assert!(valuation(200, (-100, 500), 0.5).validate().is_ok());
    }

    #[test]
    fn test_whole_float_amounts_decode_as_integers() {
        let v: ValuationResult = serde_json::from_str(
            r#"{"price_jpy": 120000.0, "range_jpy": [90000.0, 150000], "confidence": 0.7,
                "rationale": "similar listings", "evidence": []}"#,
        )
        .unwrap();
        assert_eq!(v.price_jpy, 120_000);
        assert_eq!(v.range_jpy, (90_000, 150_000));
    }

    #[test]
    fn test_fractional_amounts_are_rejected() {
        let err = serde_json::from_str::<ValuationResult>(
            r#"{"price_jpy": 120000.5, "range_jpy": [90000, 150000], "confidence": 0.7,
                "rationale": "similar listings", "evidence": []}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("whole number"), "{err}");

        assert!(serde_json::from_str::<ValuationResult>(
            r#"{"price_jpy": 120000, "range_jpy": [90000.25, 150000], "confidence": 0.7,
                "rationale": "similar listings", "evidence": []}"#,
        )
        .is_err());
    }

    #[test]
    fn test_non_positive_price_is_rejected() {
        let err = valuation(0, (0, 10), 0.5).validate().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("price_jpy"));
    }

    #[test]
    fn test_confidence_within_epsilon_is_clamped() {
        let v = valuation(100, (50, 150), 1.0005).validate().unwrap();
        assert_eq!(v.confidence, 1.0);

        let v = valuation(100, (50, 150), -0.0004).validate().unwrap();
        assert_eq!(v.confidence, 0.0);
    }

    #[test]
    fn test_confidence_far_outside_is_rejected() {
        let err = valuation(100, (50, 150), 1.2).validate().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("confidence"));

        let err = valuation(100, (50, 150), -0.5).validate().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("confidence"));
    }

    #[test]
    fn test_metadata_text_renders_numbers_and_strings() {
        let mut metadata = Map::new();
        metadata.insert("title".into(), Value::from("Fender Stratocaster"));
        metadata.insert("price_jpy".into(), Value::from(98000));
        let doc = RetrievedDocument {
            content: "used, good".into(),
            metadata,
            score: 0.9,
        };

        assert_eq!(doc.metadata_text("title").as_deref(), Some("Fender Stratocaster"));
        assert_eq!(doc.metadata_text("price_jpy").as_deref(), Some("98000"));
        assert_eq!(doc.metadata_text("source"), None);
    }
}

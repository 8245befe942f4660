//! Instructions sent to the models

/// Vision model instruction; the reply must be one JSON object
pub const DESCRIPTION_PROMPT: &str = r#"
You are an appraiser of used musical instruments. Look at the photo and
describe the instrument. Return ONLY valid JSON with this schema:
{
  "category": string,
  "brand": string,
  "model": string,
  "year": string | null,
  "condition": string,
  "materials": string[],
  "features": string[],
  "notes": string
}
Rules:
- Use an empty string when a field cannot be determined; use null for an unknown year.
- condition summarizes visible wear, damage and modifications.
- notes lists caveats about what the photo does not show.
"#;

/// Reasoning model instruction; the reply must be one JSON object
pub const VALUATION_PROMPT: &str = r#"
You are a pricing analyst for used musical instruments. Given a target instrument
summary and a set of retrieved reference records, estimate a fair market price
in JPY. Return ONLY valid JSON with this schema:
{
  "price_jpy": integer,
  "range_jpy": [integer, integer],
  "confidence": number,
  "rationale": string,
  "evidence": string[]
}
Rules:
- confidence is between 0 and 1.
- range_jpy must include price_jpy and be ordered low to high.
- rationale and evidence must be in Japanese.
- If references are thin, lower confidence and say so.
"#;

/// Placeholder used when retrieval returned nothing
pub const NO_REFERENCES: &str = "(no references found)";

/// Second input part of a valuation request
pub fn valuation_input(target: &str, references: &str) -> String {
    let references = if references.trim().is_empty() {
        NO_REFERENCES
    } else {
        references
    };
    format!("Target\n{target}\n\nReferences\n{references}")
}

//! Field extraction from generated text.
//!
//! Generated replies are expected to follow a fixed layout:
//!
//! ```text
//! Crop: Rice
//! Match: 92
//! Description: ...
//! ```
//!
//! `parse` walks an ordered list of labels. Each label must appear after the
//! previous one; its value runs up to the next label (the last value runs to
//! the end of the text). If any label is missing or out of order the whole
//! parse fails. A partially filled record is never returned.

use serde_json::{Map, Value};

pub const PARSE_ERROR_MESSAGE: &str = "Invalid or improperly formatted response";

/// One expected field: the label as it appears in the text and the key it is
/// stored under.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub label: &'static str,
    pub key: &'static str,
}

const fn field(label: &'static str, key: &'static str) -> FieldSpec {
    FieldSpec { label, key }
}

/// Ordered field list for one reply layout.
#[derive(Debug, Clone, Copy)]
pub struct FieldLayout {
    pub fields: &'static [FieldSpec],
}

impl FieldLayout {
    /// The layout as prompt text, one `Label: <key>` line per field.
    pub fn template(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{} <{}>", f.label, f.key))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub const CROP_SUGGESTION: FieldLayout = FieldLayout {
    fields: &[
        field("Crop:", "Crop"),
        field("Match:", "Match"),
        field("Description:", "Description"),
        field("Explanation:", "Explanation"),
        field("Growing Season:", "growing_season"),
        field("Water Requirement:", "water_requirement"),
        field("Expected Yield:", "expected_yield"),
        field("Recommendations:", "Recommendations"),
    ],
};

pub const FERTILIZER_SUGGESTION: FieldLayout = FieldLayout {
    fields: &[
        field("Crop:", "Crop"),
        field("Fertilizer:", "Fertilizer"),
        field("Fertilizer Product:", "Product"),
        field("Buy at:", "Buy at"),
        field("Amount:", "Amount"),
        field("Price:", "Price"),
        field("Description:", "Description"),
        field("Explanation:", "Explanation"),
    ],
};

/// Outcome of a parse: every field of the layout, or the error marker.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    Record(Vec<(&'static str, String)>),
    Error,
}

impl ParsedResponse {
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            ParsedResponse::Record(fields) => fields
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str()),
            ParsedResponse::Error => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ParsedResponse::Error)
    }

    /// `{key: value, ...}` or `{"Error": "..."}`.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        match self {
            ParsedResponse::Record(fields) => {
                for (k, v) in fields {
                    map.insert((*k).to_string(), Value::String(v.clone()));
                }
            }
            ParsedResponse::Error => {
                map.insert(
                    "Error".to_string(),
                    Value::String(PARSE_ERROR_MESSAGE.to_string()),
                );
            }
        }
        Value::Object(map)
    }
}

fn clean(value: &str) -> String {
    value
        .trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '`')
        .to_string()
}

/// Extract `layout`'s fields from `text`.
pub fn parse(text: &str, layout: &FieldLayout) -> ParsedResponse {
    let Some((first, rest)) = layout.fields.split_first() else {
        return ParsedResponse::Error;
    };
    let Some(start) = text.find(first.label) else {
        return ParsedResponse::Error;
    };

    let mut fields = Vec::with_capacity(layout.fields.len());
    let mut current = first;
    let mut cursor = start + first.label.len();

    for next in rest {
        let Some(offset) = text[cursor..].find(next.label) else {
            tracing::debug!("Generated text is missing label '{}'", next.label);
            return ParsedResponse::Error;
        };
        fields.push((current.key, clean(&text[cursor..cursor + offset])));
        current = next;
        cursor += offset + next.label.len();
    }
    fields.push((current.key, clean(&text[cursor..])));

    ParsedResponse::Record(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(layout: &FieldLayout, values: &[&str]) -> String {
        layout
            .fields
            .iter()
            .zip(values)
            .map(|(f, v)| format!("{} {}", f.label, v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    const CROP_VALUES: [&str; 8] = [
        "Rice",
        "92",
        "Staple cereal grown in flooded fields.",
        "High rainfall and warm temperatures suit paddy.",
        "Kharif (June to October)",
        "High, 1200-1500 mm",
        "4-6 tonnes per hectare",
        "Transplant 25-day seedlings; keep 5 cm standing water.",
    ];

    #[test]
    fn test_crop_layout_recovers_every_field() {
        let text = render(&CROP_SUGGESTION, &CROP_VALUES);
        let parsed = parse(&text, &CROP_SUGGESTION);
        for (spec, expected) in CROP_SUGGESTION.fields.iter().zip(CROP_VALUES) {
            assert_eq!(parsed.get(spec.key), Some(expected), "field {}", spec.key);
        }
    }

    #[test]
    fn test_fertilizer_layout_uses_product_key() {
        let values = [
            "Wheat",
            "Urea",
            "IFFCO Urea 45kg",
            "Local cooperative society",
            "100 kg per acre",
            "Rs 266 per bag",
            "Nitrogen fertilizer with 46% N.",
            "Soil nitrogen is low for wheat.",
        ];
        let text = render(&FERTILIZER_SUGGESTION, &values);
        let parsed = parse(&text, &FERTILIZER_SUGGESTION);
        assert_eq!(parsed.get("Fertilizer"), Some("Urea"));
        assert_eq!(parsed.get("Product"), Some("IFFCO Urea 45kg"));
        assert_eq!(parsed.get("Buy at"), Some("Local cooperative society"));
        assert_eq!(parsed.get("Explanation"), Some("Soil nitrogen is low for wheat."));
    }

    #[test]
    fn test_missing_any_field_is_error() {
        for skip in 0..CROP_SUGGESTION.fields.len() {
            let text: String = CROP_SUGGESTION
                .fields
                .iter()
                .zip(CROP_VALUES)
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, (f, v))| format!("{} {}\n", f.label, v))
                .collect();
            assert_eq!(parse(&text, &CROP_SUGGESTION), ParsedResponse::Error);
        }
    }

    #[test]
    fn test_out_of_order_fields_are_error() {
        let text = "Match: 90\nCrop: Rice\nDescription: a\nExplanation: b\n\
                    Growing Season: c\nWater Requirement: d\nExpected Yield: e\nRecommendations: f";
        assert!(parse(text, &CROP_SUGGESTION).is_error());
    }

    #[test]
    fn test_markdown_decoration_and_preamble_are_stripped() {
        let text = "Here is my suggestion:\n\n**Crop:** Maize\n**Match:** 0.8\n\
                    **Description:** Cereal\n**Explanation:** Warm\n**Growing Season:** Kharif\n\
                    **Water Requirement:** Moderate\n**Expected Yield:** 3 t/ha\n\
                    **Recommendations:** Sow early\n```";
        let parsed = parse(text, &CROP_SUGGESTION);
        assert_eq!(parsed.get("Crop"), Some("Maize"));
        assert_eq!(parsed.get("Match"), Some("0.8"));
        assert_eq!(parsed.get("Recommendations"), Some("Sow early"));
    }

    #[test]
    fn test_multiline_values_are_kept() {
        let mut values = CROP_VALUES;
        values[7] = "1. Level the field\n2. Puddle before transplanting";
        let text = render(&CROP_SUGGESTION, &values);
        assert_eq!(
            parse(&text, &CROP_SUGGESTION).get("Recommendations"),
            Some("1. Level the field\n2. Puddle before transplanting")
        );
    }

    #[test]
    fn test_error_record_json() {
        assert_eq!(
            ParsedResponse::Error.to_json(),
            serde_json::json!({ "Error": PARSE_ERROR_MESSAGE })
        );
        assert!(parse("", &FERTILIZER_SUGGESTION).get("Crop").is_none());
    }

    #[test]
    fn test_template_lists_labels_in_order() {
        let template = FERTILIZER_SUGGESTION.template();
        assert!(template.starts_with("Crop: <Crop>\nFertilizer: <Fertilizer>\n"));
        assert!(template.ends_with("Explanation: <Explanation>"));
    }
}

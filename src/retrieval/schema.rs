//! Knowledge-base record layouts.
//!
//! Two collection layouts exist in the wild. Which one a collection uses is
//! detected from its property names at read time; records are then mapped
//! to logical fields through [`FieldMapping`].

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    /// `question` / `answer` / `source`
    Current,
    /// `input` / `label` / `source_file`; `label` may be numeric.
    Legacy,
}

/// Physical property names backing the logical question/answer/source fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub question: &'static str,
    pub answer: &'static str,
    pub source: &'static str,
}

const CURRENT_FIELDS: FieldMapping = FieldMapping {
    question: "question",
    answer: "answer",
    source: "source",
};

const LEGACY_FIELDS: FieldMapping = FieldMapping {
    question: "input",
    answer: "label",
    source: "source_file",
};

impl SchemaVariant {
    pub fn fields(&self) -> FieldMapping {
        match self {
            SchemaVariant::Current => CURRENT_FIELDS,
            SchemaVariant::Legacy => LEGACY_FIELDS,
        }
    }

    /// Unknown or empty property lists resolve to `Legacy`.
    pub fn detect<S: AsRef<str>>(property_names: &[S]) -> Self {
        let has = |name: &str| property_names.iter().any(|p| p.as_ref() == name);
        if has(CURRENT_FIELDS.question) && has(CURRENT_FIELDS.answer) {
            SchemaVariant::Current
        } else {
            SchemaVariant::Legacy
        }
    }

    pub fn other(&self) -> Self {
        match self {
            SchemaVariant::Current => SchemaVariant::Legacy,
            SchemaVariant::Legacy => SchemaVariant::Current,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVariant::Current => "current",
            SchemaVariant::Legacy => "legacy",
        }
    }
}

/// Logical view of one stored record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MappedRecord {
    pub question: String,
    pub answer: String,
    pub source: String,
}

impl FieldMapping {
    pub fn map(&self, properties: &Value) -> MappedRecord {
        MappedRecord {
            question: text_field(properties, self.question),
            answer: text_field(properties, self.answer),
            source: text_field(properties, self.source),
        }
    }
}

/// Strings are taken as-is, numbers rendered (`3` not `3.0`), anything
/// else becomes empty.
fn text_field(properties: &Value, name: &str) -> String {
    match properties.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Similarity in [0, 1]: certainty when reported, else `1 - distance`.
pub fn similarity(certainty: Option<f64>, distance: Option<f64>) -> f32 {
    let raw = match (certainty, distance) {
        (Some(c), _) => c,
        (None, Some(d)) => 1.0 - d,
        (None, None) => 0.0,
    };
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_current_layout() {
        let props = ["question", "answer", "source"];
        assert_eq!(SchemaVariant::detect(&props), SchemaVariant::Current);
    }

    #[test]
    fn legacy_and_unknown_layouts_fall_back() {
        assert_eq!(
            SchemaVariant::detect(&["input", "label", "source_file"]),
            SchemaVariant::Legacy
        );
        assert_eq!(SchemaVariant::detect::<&str>(&[]), SchemaVariant::Legacy);
        assert_eq!(SchemaVariant::detect(&["question"]), SchemaVariant::Legacy);
    }

    #[test]
    fn legacy_numeric_label_becomes_text() {
        let record = SchemaVariant::Legacy.fields().map(&json!({
            "input": "What is 2+2?",
            "label": 4,
            "source_file": "arith.csv"
        }));
        assert_eq!(record.question, "What is 2+2?");
        assert_eq!(record.answer, "4");
        assert_eq!(record.source, "arith.csv");

        let float_label = SchemaVariant::Legacy.fields().map(&json!({"label": 7.0}));
        assert_eq!(float_label.answer, "7");
        let fractional = SchemaVariant::Legacy.fields().map(&json!({"label": 0.5}));
        assert_eq!(fractional.answer, "0.5");
    }

    #[test]
    fn current_mapping_reads_current_fields() {
        let record = SchemaVariant::Current.fields().map(&json!({
            "question": "Derivative of x^2?",
            "answer": "2x",
            "input": "ignored"
        }));
        assert_eq!(record.question, "Derivative of x^2?");
        assert_eq!(record.answer, "2x");
        assert_eq!(record.source, "");
    }

    #[test]
    fn similarity_prefers_certainty_and_clamps() {
        assert!((similarity(Some(0.9), Some(0.5)) - 0.9).abs() < 1e-6);
        assert!((similarity(None, Some(0.25)) - 0.75).abs() < 1e-6);
        assert_eq!(similarity(None, Some(1.7)), 0.0);
        assert_eq!(similarity(Some(1.2), None), 1.0);
        assert_eq!(similarity(None, None), 0.0);
    }
}

//! Structural validation of generated coaching feedback
//!
//! Model output is untrusted: it is parsed as JSON and checked against a
//! fixed field table before anything downstream touches it. Violations are
//! collected rather than short-circuited so the retry prompt can name
//! everything wrong at once.

use serde_json::Value;

pub const FEEDBACK_SCHEMA_VERSION: &str = "coaching-feedback/v1";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaViolation {
    #[error("missing required field \"{field}\"")]
    MissingField { field: &'static str },

    #[error("field \"{field}\" must be {expected}")]
    WrongKind { field: String, expected: &'static str },

    #[error("field \"{field}\" has {len} entries, allowed {min} to {max}")]
    LengthOutOfBounds {
        field: &'static str,
        len: usize,
        min: usize,
        max: usize,
    },

    #[error("unknown field \"{field}\"")]
    UnknownField { field: String },

    #[error("field \"{field}\" contains empty text")]
    EmptyText { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Text,
    TextArray,
    TextMap,
}

struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
    required: bool,
    /// Entry count bounds for arrays, inclusive
    bounds: Option<(usize, usize)>,
}

/// Fixed field table for one schema revision
pub struct FeedbackSchema {
    fields: &'static [FieldSpec],
}

/// The only revision currently in use
pub const V1: FeedbackSchema = FeedbackSchema {
    fields: &[
        FieldSpec {
            name: "overall_assessment",
            kind: FieldKind::Text,
            required: true,
            bounds: None,
        },
        FieldSpec {
            name: "strengths",
            kind: FieldKind::TextArray,
            required: true,
            bounds: Some((2, 4)),
        },
        FieldSpec {
            name: "growth_areas",
            kind: FieldKind::TextArray,
            required: true,
            bounds: Some((2, 4)),
        },
        FieldSpec {
            name: "priority_actions",
            kind: FieldKind::TextArray,
            required: true,
            bounds: Some((3, 5)),
        },
        FieldSpec {
            name: "pedagogical_recommendations",
            kind: FieldKind::TextMap,
            required: true,
            bounds: None,
        },
        FieldSpec {
            name: "resources",
            kind: FieldKind::TextArray,
            required: false,
            bounds: None,
        },
        FieldSpec {
            name: "next_session_goals",
            kind: FieldKind::TextArray,
            required: false,
            bounds: None,
        },
    ],
};

impl FeedbackSchema {
    /// Check `value` against the field table, returning every violation
    ///
    /// An empty result means the document is acceptable.
    pub fn validate(&self, value: &Value) -> Vec<SchemaViolation> {
        let Some(object) = value.as_object() else {
            return vec![SchemaViolation::WrongKind {
                field: "$".to_string(),
                expected: "a JSON object",
            }];
        };

        let mut violations = Vec::new();

        for spec in self.fields {
            match object.get(spec.name) {
                None if spec.required => {
                    violations.push(SchemaViolation::MissingField { field: spec.name });
                }
                None => {}
                Some(field_value) => check_field(spec, field_value, &mut violations),
            }
        }

        // Only declared fields are allowed at the top level; anything else
        // (including a model-supplied "provenance") is rejected
        for key in object.keys() {
            if !self.fields.iter().any(|spec| spec.name == key) {
                violations.push(SchemaViolation::UnknownField { field: key.clone() });
            }
        }

        violations
    }

    /// Declared field names in table order, for prompt construction
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|spec| spec.name).collect()
    }
}

fn check_field(spec: &FieldSpec, value: &Value, violations: &mut Vec<SchemaViolation>) {
    match spec.kind {
        FieldKind::Text => match value.as_str() {
            Some(text) if text.trim().is_empty() => violations.push(SchemaViolation::EmptyText {
                field: spec.name.to_string(),
            }),
            Some(_) => {}
            None => violations.push(SchemaViolation::WrongKind {
                field: spec.name.to_string(),
                expected: "a string",
            }),
        },
        FieldKind::TextArray => match value.as_array() {
            Some(entries) => {
                if let Some((min, max)) = spec.bounds {
                    if entries.len() < min || entries.len() > max {
                        violations.push(SchemaViolation::LengthOutOfBounds {
                            field: spec.name,
                            len: entries.len(),
                            min,
                            max,
                        });
                    }
                }
                for (i, entry) in entries.iter().enumerate() {
                    match entry.as_str() {
                        Some(text) if text.trim().is_empty() => {
                            violations.push(SchemaViolation::EmptyText {
                                field: format!("{}[{}]", spec.name, i),
                            });
                        }
                        Some(_) => {}
                        None => violations.push(SchemaViolation::WrongKind {
                            field: format!("{}[{}]", spec.name, i),
                            expected: "a string",
                        }),
                    }
                }
            }
            None => violations.push(SchemaViolation::WrongKind {
                field: spec.name.to_string(),
                expected: "an array of strings",
            }),
        },
        FieldKind::TextMap => match value.as_object() {
            Some(entries) => {
                for (key, entry) in entries {
                    match entry.as_str() {
                        Some(text) if text.trim().is_empty() => {
                            violations.push(SchemaViolation::EmptyText {
                                field: format!("{}.{}", spec.name, key),
                            });
                        }
                        Some(_) => {}
                        None => violations.push(SchemaViolation::WrongKind {
                            field: format!("{}.{}", spec.name, key),
                            expected: "a string",
                        }),
                    }
                }
            }
            None => violations.push(SchemaViolation::WrongKind {
                field: spec.name.to_string(),
                expected: "an object mapping dimension to text",
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_document() -> Value {
        json!({
            "overall_assessment": "A balanced lesson with strong questioning.",
            "strengths": ["Good wait time", "Varied question depth"],
            "growth_areas": ["More student summaries", "Deeper closing discussion"],
            "priority_actions": [
                "Ask one evaluation-level question per topic",
                "Pause three seconds after each question",
                "End with a student-led recap"
            ],
            "pedagogical_recommendations": {
                "questioning": "Build follow-up chains on student answers"
            },
            "resources": ["Classroom questioning handbook"],
            "next_session_goals": ["Raise higher-order question share"]
        })
    }

    #[test]
    fn test_valid_document_passes() {
        assert!(V1.validate(&valid_document()).is_empty());
    }

    #[test]
    fn test_optional_fields_may_be_absent() {
        let mut doc = valid_document();
        doc.as_object_mut().unwrap().remove("resources");
        doc.as_object_mut().unwrap().remove("next_session_goals");
        assert!(V1.validate(&doc).is_empty());
    }

    #[test]
    fn test_missing_priority_actions_is_rejected() {
        let mut doc = valid_document();
        doc.as_object_mut().unwrap().remove("priority_actions");
        let violations = V1.validate(&doc);
        assert!(violations.contains(&SchemaViolation::MissingField {
            field: "priority_actions"
        }));
    }

    #[test]
    fn test_array_length_bounds() {
        let mut doc = valid_document();
        doc["strengths"] = json!(["only one"]);
        let violations = V1.validate(&doc);
        assert!(violations.iter().any(|v| matches!(
            v,
            SchemaViolation::LengthOutOfBounds {
                field: "strengths",
                len: 1,
                min: 2,
                max: 4
            }
        )));

        let mut doc = valid_document();
        doc["priority_actions"] = json!(["a", "b", "c", "d", "e", "f"]);
        let violations = V1.validate(&doc);
        assert!(violations
            .iter()
            .any(|v| matches!(v, SchemaViolation::LengthOutOfBounds { field: "priority_actions", len: 6, .. })));
    }

    #[test]
    fn test_unknown_top_level_key_is_rejected() {
        let mut doc = valid_document();
        doc["teacher_rating"] = json!(9.5);
        let violations = V1.validate(&doc);
        assert!(violations.contains(&SchemaViolation::UnknownField {
            field: "teacher_rating".to_string()
        }));
    }

    #[test]
    fn test_model_supplied_provenance_is_rejected() {
        let mut doc = valid_document();
        doc["provenance"] = json!("generated");
        let violations = V1.validate(&doc);
        assert!(violations.contains(&SchemaViolation::UnknownField {
            field: "provenance".to_string()
        }));
    }

    #[test]
    fn test_wrong_kinds_are_reported() {
        let mut doc = valid_document();
        doc["overall_assessment"] = json!(["not", "a", "string"]);
        doc["strengths"] = json!("not an array");
        doc["pedagogical_recommendations"] = json!(["not", "a", "map"]);
        let violations = V1.validate(&doc);
        assert_eq!(violations.len(), 3);
        assert!(violations
            .iter()
            .all(|v| matches!(v, SchemaViolation::WrongKind { .. })));
    }

    #[test]
    fn test_empty_text_is_rejected() {
        let mut doc = valid_document();
        doc["strengths"] = json!(["Good pacing", "   "]);
        let violations = V1.validate(&doc);
        assert!(violations
            .iter()
            .any(|v| matches!(v, SchemaViolation::EmptyText { field } if field == "strengths[1]")));
    }

    #[test]
    fn test_non_object_root_is_rejected() {
        let violations = V1.validate(&json!("just a string"));
        assert_eq!(violations.len(), 1);
        assert!(matches!(violations[0], SchemaViolation::WrongKind { .. }));
    }

    #[test]
    fn test_collects_multiple_violations_at_once() {
        let doc = json!({
            "overall_assessment": "",
            "strengths": ["one"],
            "extra": true
        });
        let violations = V1.validate(&doc);
        // Empty assessment, short strengths, three missing required fields,
        // one unknown key
        assert!(violations.len() >= 5);
    }
}

//! Category-driven document forms.
//!
//! A category's field descriptors decide which inputs a document form shows
//! and which values a document may carry. The same cleaning runs in the
//! client before submit and in the service before a result is encrypted, so
//! a stored result only ever holds keys from its category's schema.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::{Category, CreateDocumentInput, Field, FieldType};
use crate::validation::FieldError;

/// What kind of control to show for a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "options", rename_all = "snake_case")]
pub enum InputKind {
    SingleLine,
    Number,
    Date,
    MultiLine,
    Choice(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormInput {
    pub name: String,
    pub kind: InputKind,
    pub required: bool,
}

impl From<&Field> for FormInput {
    fn from(field: &Field) -> Self {
        let kind = match field.field_type {
            FieldType::Text => InputKind::SingleLine,
            FieldType::Number => InputKind::Number,
            FieldType::Date => InputKind::Date,
            FieldType::Textarea => InputKind::MultiLine,
            FieldType::Select => InputKind::Choice(field.options.clone()),
        };
        Self {
            name: field.name.clone(),
            kind,
            required: field.required,
        }
    }
}

fn error_key(name: &str) -> String {
    format!("result.{}", name)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn check_value(field: &Field, value: &str) -> Result<(), FieldError> {
    match field.field_type {
        FieldType::Number => match value.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(()),
            _ => Err(FieldError::new(
                error_key(&field.name),
                format!("{} must be a number", field.name),
            )),
        },
        FieldType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(|_| ())
            .map_err(|_| {
                FieldError::new(
                    error_key(&field.name),
                    format!("{} must be a date (YYYY-MM-DD)", field.name),
                )
            }),
        FieldType::Select if !field.options.iter().any(|o| o == value) => Err(FieldError::new(
            error_key(&field.name),
            format!("{} must be one of: {}", field.name, field.options.join(", ")),
        )),
        _ => Ok(()),
    }
}

/// Validate raw values against a schema and keep only schema fields.
///
/// Blank optional fields are dropped; keys unknown to the schema are
/// discarded without error.
pub fn clean_result(
    fields: &[Field],
    raw: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, String>, Vec<FieldError>> {
    let mut cleaned = BTreeMap::new();
    let mut errors = Vec::new();

    for field in fields {
        let value = match raw.get(&field.name) {
            None => String::new(),
            Some(v) => match scalar_to_string(v) {
                Some(s) => s.trim().to_string(),
                None => {
                    errors.push(FieldError::new(
                        error_key(&field.name),
                        format!("{} must be a single value", field.name),
                    ));
                    continue;
                }
            },
        };

        if value.is_empty() {
            if field.required {
                errors.push(FieldError::new(
                    error_key(&field.name),
                    format!("{} is required.", field.name),
                ));
            }
            continue;
        }

        match check_value(field, &value) {
            Ok(()) => {
                cleaned.insert(field.name.clone(), value);
            }
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(cleaned)
    } else {
        Err(errors)
    }
}

/// Client-side draft of a document for one category.
#[derive(Debug, Clone)]
pub struct DocumentForm {
    category_id: i64,
    fields: Vec<Field>,
    values: BTreeMap<String, Value>,
}

impl DocumentForm {
    pub fn new(category: &Category) -> Self {
        Self {
            category_id: category.id,
            fields: category.fields.clone(),
            values: BTreeMap::new(),
        }
    }

    pub fn category_id(&self) -> i64 {
        self.category_id
    }

    /// Inputs to render, in schema order.
    pub fn inputs(&self) -> Vec<FormInput> {
        self.fields.iter().map(FormInput::from).collect()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.into(), Value::String(value.into()));
        self
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }

    pub fn validate(&self) -> Result<BTreeMap<String, String>, Vec<FieldError>> {
        clean_result(&self.fields, &self.values)
    }

    /// Build the request body; out-of-schema values never leave the form.
    pub fn submission(&self, patient_id: i64) -> Result<CreateDocumentInput, Vec<FieldError>> {
        let cleaned = self.validate()?;
        Ok(CreateDocumentInput {
            patient_id,
            category_id: self.category_id,
            result: cleaned
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(id: i64, name: &str, field_type: FieldType, required: bool) -> Field {
        Field {
            id,
            category_id: 1,
            name: name.to_string(),
            field_type,
            required,
            options: if field_type == FieldType::Select {
                vec!["A+".to_string(), "O-".to_string()]
            } else {
                vec![]
            },
        }
    }

    fn category() -> Category {
        Category {
            id: 1,
            name: "Blood test".to_string(),
            fields: vec![
                field(1, "glucose", FieldType::Number, true),
                field(2, "sampled_on", FieldType::Date, true),
                field(3, "group", FieldType::Select, false),
                field(4, "notes", FieldType::Textarea, false),
            ],
        }
    }

    #[test]
    fn test_inputs_follow_schema_order() {
        let form = DocumentForm::new(&category());
        let inputs = form.inputs();
        assert_eq!(inputs.len(), 4);
        assert_eq!(inputs[0].kind, InputKind::Number);
        assert!(inputs[0].required);
        assert_eq!(
            inputs[2].kind,
            InputKind::Choice(vec!["A+".to_string(), "O-".to_string()])
        );
        assert_eq!(inputs[3].kind, InputKind::MultiLine);
    }

    #[test]
    fn test_submission_omits_fields_outside_schema() {
        let mut form = DocumentForm::new(&category());
        form.set("glucose", "1.05")
            .set("sampled_on", "2024-02-01")
            .set("cholesterol", "2.1")
            .set("notes", "");

        let body = form.submission(42).unwrap();
        assert_eq!(body.patient_id, 42);
        assert_eq!(body.category_id, 1);
        let keys: Vec<_> = body.result.keys().cloned().collect();
        assert_eq!(keys, vec!["glucose".to_string(), "sampled_on".to_string()]);
    }

    #[test]
    fn test_required_fields_must_be_filled() {
        let mut form = DocumentForm::new(&category());
        form.set("glucose", "   ");

        let errors = form.validate().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["result.glucose", "result.sampled_on"]);
    }

    #[test]
    fn test_typed_values_are_checked() {
        let mut form = DocumentForm::new(&category());
        form.set("glucose", "high")
            .set("sampled_on", "01/02/2024")
            .set("group", "B+");

        let errors = form.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_clean_result_accepts_json_scalars() {
        let fields = category().fields;
        let raw: BTreeMap<String, Value> = serde_json::from_value(json!({
            "glucose": 0.98,
            "sampled_on": "2024-02-01",
            "group": null,
            "unexpected": {"nested": true}
        }))
        .unwrap();

        let cleaned = clean_result(&fields, &raw).unwrap();
        assert_eq!(cleaned.get("glucose").map(String::as_str), Some("0.98"));
        assert!(!cleaned.contains_key("group"));
        assert!(!cleaned.contains_key("unexpected"));
    }

    #[test]
    fn test_clean_result_rejects_structured_values() {
        let fields = category().fields;
        let raw: BTreeMap<String, Value> = serde_json::from_value(json!({
            "glucose": [1, 2],
            "sampled_on": "2024-02-01"
        }))
        .unwrap();

        let errors = clean_result(&fields, &raw).unwrap_err();
        assert_eq!(errors[0].field, "result.glucose");
    }
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::validation::{self, FieldError, Validator};

/// Input kinds a category field can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Textarea,
    Select,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Textarea => "textarea",
            FieldType::Select => "select",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown field type: {0}")]
pub struct UnknownFieldType(String);

impl FromStr for FieldType {
    type Err = UnknownFieldType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(FieldType::Text),
            "number" => Ok(FieldType::Number),
            "date" => Ok(FieldType::Date),
            "textarea" => Ok(FieldType::Textarea),
            "select" => Ok(FieldType::Select),
            other => Err(UnknownFieldType(other.to_string())),
        }
    }
}

impl TryFrom<String> for FieldType {
    type Error = UnknownFieldType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Field {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub field_type: FieldType,
    pub required: bool,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub fields: Vec<Field>,
}

impl Category {
    pub fn from_row(row: CategoryRow, fields: Vec<Field>) -> Self {
        Self {
            id: row.id,
            name: row.name,
            fields,
        }
    }
}

/// Input for creating a field
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FieldInput {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

impl FieldInput {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut v = Validator::new();
        v.check(validation::validate_name("name", &self.name, 100));

        let has_options = self.options.iter().any(|o| !o.trim().is_empty());
        match (self.field_type, has_options) {
            (FieldType::Select, false) => {
                v.check(Err(FieldError::new(
                    "options",
                    "A select field needs at least one option",
                )));
            }
            (FieldType::Select, true) => {}
            (_, true) => {
                v.check(Err(FieldError::new(
                    "options",
                    "Only select fields take options",
                )));
            }
            (_, false) => {}
        }
        v.finish()
    }
}

/// Input for creating a category
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateCategoryInput {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldInput>,
}

impl CreateCategoryInput {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if let Err(e) = validation::validate_name("name", &self.name, 50) {
            errors.push(e);
        }

        let mut seen = std::collections::HashSet::new();
        for (idx, field) in self.fields.iter().enumerate() {
            if let Err(field_errors) = field.validate() {
                errors.extend(field_errors.into_iter().map(|e| FieldError {
                    field: format!("fields[{}].{}", idx, e.field),
                    message: e.message,
                }));
            }
            if !seen.insert(field.name.trim().to_string()) {
                errors.push(FieldError::new(
                    format!("fields[{}].name", idx),
                    "Field names must be unique within a category",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Input for renaming a category
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateCategoryInput {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, field_type: FieldType, options: &[&str]) -> FieldInput {
        FieldInput {
            name: name.to_string(),
            field_type,
            required: false,
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_field_type_wire_names() {
        assert_eq!(serde_json::to_string(&FieldType::Textarea).unwrap(), "\"textarea\"");
        assert_eq!("number".parse::<FieldType>().unwrap(), FieldType::Number);
        assert!("checkbox".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_select_requires_options() {
        assert!(field("blood group", FieldType::Select, &[]).validate().is_err());
        assert!(field("blood group", FieldType::Select, &["A", "B"]).validate().is_ok());
        assert!(field("weight", FieldType::Number, &["1"]).validate().is_err());
    }

    #[test]
    fn test_category_rejects_duplicate_field_names() {
        let input = CreateCategoryInput {
            name: "Blood test".to_string(),
            fields: vec![
                field("glucose", FieldType::Number, &[]),
                field("glucose", FieldType::Text, &[]),
            ],
        };
        let errors = input.validate().unwrap_err();
        assert_eq!(errors[0].field, "fields[1].name");
    }
}

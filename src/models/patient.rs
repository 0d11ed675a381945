use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::validation::{self, FieldError, Validator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Patient {
    pub id: i64,
    pub identity_number: String,
    pub last_name: String,
    pub first_name: String,
    pub birth_date: NaiveDate,
    pub sex: String,
    pub phone_number: String,
}

/// Input for creating or replacing a patient
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PatientInput {
    pub identity_number: String,
    pub last_name: String,
    pub first_name: String,
    pub birth_date: NaiveDate,
    pub sex: String,
    pub phone_number: String,
}

impl PatientInput {
    pub fn validate(&self, today: NaiveDate) -> Result<(), Vec<FieldError>> {
        let mut v = Validator::new();
        v.check(validation::validate_identity_number(&self.identity_number))
            .check(validation::validate_name("last_name", &self.last_name, 50))
            .check(validation::validate_name("first_name", &self.first_name, 50))
            .check(validation::validate_birth_date(self.birth_date, today))
            .check(validation::validate_sex(&self.sex))
            .check(validation::validate_phone_number(&self.phone_number));
        v.finish()
    }

    /// Names are stored trimmed.
    pub fn normalized(mut self) -> Self {
        self.last_name = self.last_name.trim().to_string();
        self.first_name = self.first_name.trim().to_string();
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
pub struct PatientQuery {
    /// Case-insensitive match on identity number, last name or first name
    pub search: Option<String>,
    /// `M` or `F`
    pub sex: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> PatientInput {
        PatientInput {
            identity_number: "1234567890".to_string(),
            last_name: " Ould ".to_string(),
            first_name: "Sidi".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1988, 3, 14).unwrap(),
            sex: "M".to_string(),
            phone_number: "22334455".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn test_valid_patient() {
        assert!(input().validate(today()).is_ok());
        assert_eq!(input().normalized().last_name, "Ould");
    }

    #[test]
    fn test_invalid_patient_reports_each_field() {
        let mut p = input();
        p.identity_number = "12345".to_string();
        p.phone_number = "92334455".to_string();
        p.first_name = "  ".to_string();

        let errors = p.validate(today()).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["identity_number", "first_name", "phone_number"]);
    }
}

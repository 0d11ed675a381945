//! Form-level validation rules shared by the service handlers and the client
//! forms.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// `\d` in `regex` matches any Unicode digit; these fields take ASCII only.
static IDENTITY_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{10}$").unwrap());
static PHONE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[2-4][0-9]{7}$").unwrap());
static OTP_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{6}$").unwrap());
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

pub const MIN_PASSWORD_LEN: usize = 8;

/// A single failing input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type FieldResult = Result<(), FieldError>;

/// Collects failures so every bad field is reported at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, result: FieldResult) -> &mut Self {
        if let Err(e) = result {
            self.errors.push(e);
        }
        self
    }

    pub fn finish(self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

pub fn validate_identity_number(value: &str) -> FieldResult {
    if IDENTITY_NUMBER.is_match(value) {
        Ok(())
    } else {
        Err(FieldError::new(
            "identity_number",
            "Identity number must contain exactly 10 digits",
        ))
    }
}

pub fn validate_phone_number(value: &str) -> FieldResult {
    if PHONE_NUMBER.is_match(value) {
        Ok(())
    } else {
        Err(FieldError::new(
            "phone_number",
            "Phone number must contain exactly 8 digits and start with 2, 3 or 4",
        ))
    }
}

pub fn validate_sex(value: &str) -> FieldResult {
    match value {
        "M" | "F" => Ok(()),
        _ => Err(FieldError::new("sex", "Sex must be M or F")),
    }
}

pub fn validate_birth_date(date: NaiveDate, today: NaiveDate) -> FieldResult {
    if date < today {
        Ok(())
    } else {
        Err(FieldError::new("birth_date", "Birth date must be in the past"))
    }
}

pub fn validate_email(value: &str) -> FieldResult {
    if EMAIL.is_match(value.trim()) {
        Ok(())
    } else {
        Err(FieldError::new("email", "Enter a valid email address"))
    }
}

pub fn validate_otp_code(value: &str) -> FieldResult {
    if OTP_CODE.is_match(value) {
        Ok(())
    } else {
        Err(FieldError::new("otp", "The code must contain exactly 6 digits"))
    }
}

pub fn validate_name(field: &str, value: &str, max_chars: usize) -> FieldResult {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FieldError::new(field, format!("{} is required", field)));
    }
    if trimmed.chars().count() > max_chars {
        return Err(FieldError::new(
            field,
            format!("{} must be at most {} characters", field, max_chars),
        ));
    }
    Ok(())
}

pub fn validate_registration(password: &str, confirm_password: &str) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    if password != confirm_password {
        errors.push(FieldError::new("confirm_password", "Passwords must match."));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_number() {
        assert!(validate_identity_number("0123456789").is_ok());
        assert!(validate_identity_number("012345678").is_err());
        assert!(validate_identity_number("01234567890").is_err());
        assert!(validate_identity_number("01234a6789").is_err());
        assert!(validate_identity_number(" 123456789").is_err());
        assert!(validate_identity_number("٠١٢٣٤٥٦٧٨٩").is_err());
        assert!(validate_identity_number("０１２３４５６７８９").is_err());
    }

    #[test]
    fn test_phone_number() {
        assert!(validate_phone_number("22123456").is_ok());
        assert!(validate_phone_number("31234567").is_ok());
        assert!(validate_phone_number("49999999").is_ok());
        assert!(validate_phone_number("12345678").is_err());
        assert!(validate_phone_number("52345678").is_err());
        assert!(validate_phone_number("2234567").is_err());
        assert!(validate_phone_number("223456789").is_err());
        assert!(validate_phone_number("2٠٠٠٠٠٠٠").is_err());
        assert!(validate_phone_number("٢2123456").is_err());
    }

    #[test]
    fn test_birth_date_must_be_past() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert!(validate_birth_date(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(), today).is_ok());
        assert!(validate_birth_date(today, today).is_err());
        assert!(validate_birth_date(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(), today).is_err());
    }

    #[test]
    fn test_otp_code() {
        assert!(validate_otp_code("004213").is_ok());
        assert!(validate_otp_code("42131").is_err());
        assert!(validate_otp_code("42a131").is_err());
        assert!(validate_otp_code("١٢٣٤٥٦").is_err());
    }

    #[test]
    fn test_email_and_sex() {
        assert!(validate_email("dr.house@clinic.org").is_ok());
        assert!(validate_email("nobody").is_err());
        assert!(validate_sex("F").is_ok());
        assert!(validate_sex("X").is_err());
    }

    #[test]
    fn test_registration_collects_all_errors() {
        let errors = validate_registration("short", "other").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(validate_registration("long enough", "long enough").is_ok());
    }

    #[test]
    fn test_validator_collects() {
        let mut v = Validator::new();
        v.check(validate_identity_number("1"))
            .check(validate_phone_number("22123456"))
            .check(validate_sex("Z"));
        let errors = v.finish().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["identity_number", "sex"]);
    }
}

//! Field validation
//!
//! [`validate`] is the lenient transcript path: invalid fields are dropped and
//! nothing fails. [`validate_quote_form`] is the strict form path: the first
//! problem is reported back to the submitter.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::extraction::pattern::{MAX_VEHICLE_YEAR, MIN_VEHICLE_YEAR};
use crate::fields::{ExtractedFields, FieldKey, ValidatedFields};
use leadflow_common::phone::{digits_only, has_valid_length, normalize_phone, strip_to_dial_chars};

/// Maximum email length (RFC 5321 path limit)
const MAX_EMAIL_LEN: usize = 254;

/// HTML5-style address grammar, at least one dot in the domain
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .expect("static pattern")
});

/// True for a syntactically valid email address
pub fn is_valid_email(value: &str) -> bool {
    value.len() <= MAX_EMAIL_LEN && EMAIL_RE.is_match(value)
}

/// True for an integer year in the accepted vehicle range
pub fn is_valid_year(value: &str) -> bool {
    value
        .trim()
        .parse::<i32>()
        .map(|y| (MIN_VEHICLE_YEAR..=MAX_VEHICLE_YEAR).contains(&y))
        .unwrap_or(false)
}

/// Keep only the fields that pass their rule
///
/// Output keys are always a subset of input keys.
pub fn validate(fields: &ExtractedFields) -> ValidatedFields {
    let mut validated = BTreeMap::new();

    for (key, value) in fields.iter() {
        let value = value.trim();
        let kept = match key {
            FieldKey::Phone => {
                let phone = strip_to_dial_chars(value);
                has_valid_length(&phone).then_some(phone)
            }
            FieldKey::Year => value
                .parse::<i32>()
                .ok()
                .filter(|y| (MIN_VEHICLE_YEAR..=MAX_VEHICLE_YEAR).contains(y))
                .map(|y| y.to_string()),
            FieldKey::Email => is_valid_email(value).then(|| value.to_string()),
            _ => (!value.is_empty()).then(|| value.to_string()),
        };

        if let Some(v) = kept {
            validated.insert(key, v);
        }
    }

    ValidatedFields::from_map(validated)
}

// ============================================================================
// Direct form submissions
// ============================================================================

/// Raw quote form as posted by the website
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteForm {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub vehicle_year: Option<String>,
    pub vehicle_make: Option<String>,
    pub vehicle_model: Option<String>,
    pub service_type: Option<String>,
    pub description: Option<String>,
}

/// Quote form rejection, message shown to the submitter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid phone number format")]
    InvalidPhone,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Invalid vehicle year")]
    InvalidYear,
}

/// Quote form that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteSubmission {
    pub name: String,
    /// Exactly ten digits
    pub phone: String,
    /// Canonical `+1XXXXXXXXXX`
    pub phone_e164: String,
    pub email: Option<String>,
    pub vehicle_year: i32,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub service_type: Option<String>,
    pub description: Option<String>,
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, FormValidationError> {
    trimmed(value).ok_or(FormValidationError::MissingField(field))
}

/// Strictly validate a quote form
///
/// `current_year` bounds the vehicle year from above.
pub fn validate_quote_form(
    form: &QuoteForm,
    current_year: i32,
) -> Result<QuoteSubmission, FormValidationError> {
    let name = required(&form.name, "name")?;
    let phone_raw = required(&form.phone, "phone")?;
    let year_raw = required(&form.vehicle_year, "vehicle_year")?;
    let make = required(&form.vehicle_make, "vehicle_make")?;
    let model = required(&form.vehicle_model, "vehicle_model")?;

    let phone = digits_only(phone_raw);
    if phone.len() != 10 {
        return Err(FormValidationError::InvalidPhone);
    }
    let phone_e164 = normalize_phone(&phone).map_err(|_| FormValidationError::InvalidPhone)?;

    let email = match trimmed(&form.email) {
        Some(e) if is_valid_email(e) => Some(e.to_string()),
        Some(_) => return Err(FormValidationError::InvalidEmail),
        None => None,
    };

    let vehicle_year = year_raw
        .parse::<i32>()
        .ok()
        .filter(|y| (MIN_VEHICLE_YEAR..=current_year).contains(y))
        .ok_or(FormValidationError::InvalidYear)?;

    Ok(QuoteSubmission {
        name: name.to_string(),
        phone,
        phone_e164,
        email,
        vehicle_year,
        vehicle_make: make.to_string(),
        vehicle_model: model.to_string(),
        service_type: trimmed(&form.service_type).map(str::to_string),
        description: trimmed(&form.description).map(str::to_string),
    })
}

impl QuoteSubmission {
    /// Lead fields for this submission
    pub fn to_fields(&self) -> ExtractedFields {
        let mut fields = ExtractedFields::new();
        fields.insert(FieldKey::Name, &self.name);

        let mut parts: Vec<&str> = self.name.split_whitespace().collect();
        if parts.len() >= 2 {
            if let Some(last) = parts.pop() {
                fields.insert(FieldKey::LastName, last);
            }
        }
        fields.insert(FieldKey::FirstName, parts.join(" "));

        fields.insert(FieldKey::Phone, &self.phone);
        if let Some(email) = &self.email {
            fields.insert(FieldKey::Email, email);
        }
        fields.insert(FieldKey::Year, self.vehicle_year.to_string());
        fields.insert(FieldKey::Make, &self.vehicle_make);
        fields.insert(FieldKey::Model, &self.vehicle_model);

        let notes: Vec<&str> = [self.service_type.as_deref(), self.description.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        fields.insert(FieldKey::Notes, notes.join(": "));

        fields
    }
}

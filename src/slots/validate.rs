//! Slot validation rules

use crate::composer::format_currency;
use crate::error::ErrorCode;
use crate::models::{Field, SlotFill, SlotValue};
use lazy_static::lazy_static;
use regex::Regex;

pub const MIN_COVERAGE: f64 = 1_000.0;
pub const MAX_COVERAGE: f64 = 10_000_000.0;
pub const MIN_DAMAGE_DESCRIPTION_CHARS: usize = 10;

lazy_static! {
    static ref CLAIM_ID: Regex = Regex::new(r"^[A-Za-z0-9]{1,10}$").expect("claim id pattern");
}

/// A rejected slot value, with the corrective message shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: Field,
    pub code: ErrorCode,
    pub message: String,
}

impl FieldError {
    fn invalid(field: Field, message: String) -> Self {
        Self {
            field,
            code: ErrorCode::ValidationError,
            message,
        }
    }
}

pub fn validate(field: Field, raw: &str) -> Result<SlotValue, FieldError> {
    let value = raw.trim();

    match field {
        Field::ClaimId => {
            if CLAIM_ID.is_match(value) {
                Ok(SlotValue::Text(value.to_string()))
            } else {
                Err(FieldError::invalid(
                    field,
                    format!(
                        "'{}' is not a valid claim_id. Expected 1 to 10 letters or digits, e.g. 98765.",
                        value
                    ),
                ))
            }
        }
        Field::PolicyId => non_empty(field, value, "e.g. POL-1001"),
        Field::UserId => non_empty(field, value, "e.g. USER-002"),
        Field::Vehicle => non_empty(field, value, "make/model/year, e.g. 2021 Honda Civic"),
        Field::DamageDescription => {
            if value.chars().count() >= MIN_DAMAGE_DESCRIPTION_CHARS {
                Ok(SlotValue::Text(value.to_string()))
            } else {
                Err(FieldError::invalid(
                    field,
                    format!(
                        "damage_description must be at least {} characters. Please describe the damage in a bit more detail.",
                        MIN_DAMAGE_DESCRIPTION_CHARS
                    ),
                ))
            }
        }
        Field::Photos => Ok(SlotValue::List(
            value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        Field::CurrentCoverage | Field::NewCoverage => {
            let parsed = value.replace([',', '$'], "").parse::<f64>().ok();
            match parsed {
                Some(amount)
                    if amount.is_finite() && (MIN_COVERAGE..=MAX_COVERAGE).contains(&amount) =>
                {
                    Ok(SlotValue::Amount(amount))
                }
                _ => Err(FieldError::invalid(
                    field,
                    format!(
                        "{} must be a number between {} and {} (e.g. 50000 or 50k).",
                        field,
                        format_currency(MIN_COVERAGE, false),
                        format_currency(MAX_COVERAGE, false)
                    ),
                )),
            }
        }
    }
}

fn non_empty(field: Field, value: &str, hint: &str) -> Result<SlotValue, FieldError> {
    if value.is_empty() {
        Err(FieldError::invalid(
            field,
            format!("{} must not be empty ({}).", field, hint),
        ))
    } else {
        Ok(SlotValue::Text(value.to_string()))
    }
}

/// Cross-field rules, checked once every field they involve is present.
pub fn check_business_rules(fill: &SlotFill) -> Option<FieldError> {
    let current = fill.amount(Field::CurrentCoverage)?;
    let new = fill.amount(Field::NewCoverage)?;

    if new > current {
        return None;
    }

    Some(FieldError {
        field: Field::NewCoverage,
        code: ErrorCode::BusinessRuleViolation,
        message: format!(
            "new_coverage must be greater than current coverage ({}). Please provide a higher amount.",
            format_currency(current, false)
        ),
    })
}

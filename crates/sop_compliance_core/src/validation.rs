//! crates/sop_compliance_core/src/validation.rs
//!
//! Local input checks that run before anything reaches the backing store.

use std::sync::OnceLock;

use regex::Regex;

use crate::ports::PortError;

pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl From<ValidationError> for PortError {
    fn from(e: ValidationError) -> Self {
        PortError::Validation(e.to_string())
    }
}

/// Checks a new password and its confirmation.
pub fn validate_new_password(
    password: &str,
    confirmation: &str,
    min_length: usize,
) -> Result<(), ValidationError> {
    if password != confirmation {
        return Err(ValidationError::PasswordMismatch);
    }
    if password.chars().count() < min_length {
        return Err(ValidationError::PasswordTooShort(min_length));
    }
    Ok(())
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").expect("email pattern is valid")
    })
}

/// Shape check only: a local part, one `@`, and a dotted domain.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email_pattern().is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}

pub fn require_non_empty(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty(field))
    } else {
        Ok(())
    }
}

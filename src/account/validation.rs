//! Input validation for account fields
//!
//! Validated newtypes with private fields: the only way to get one is
//! through `new()`, so downstream code never sees an unchecked email.

use std::fmt;

use crate::error::LibraryError;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidLength { field, .. } => field,
            ValidationError::InvalidFormat { field, .. } => field,
        }
    }
}

impl From<ValidationError> for LibraryError {
    fn from(e: ValidationError) -> Self {
        LibraryError::validation(e.field(), e.to_string())
    }
}

fn check_length(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual < min || actual > max {
        return Err(ValidationError::InvalidLength {
            field,
            min,
            max,
            actual,
        });
    }
    Ok(())
}

// ============================================================================
// EmailAddress - trimmed, lowercased, one '@' with a dotted domain
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_lowercase();
        check_length("email", &normalized, 3, 254)?;

        let invalid = || ValidationError::InvalidFormat {
            field: "email",
            value: normalized.clone(),
            expected: "local@domain.tld",
        };

        let (local, domain) = normalized.split_once('@').ok_or_else(invalid)?;
        if local.is_empty()
            || domain.contains('@')
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
            || normalized.chars().any(char::is_whitespace)
        {
            return Err(invalid());
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// DisplayName
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        check_length("name", trimmed, 2, 100)?;
        Ok(Self(trimmed.to_string()))
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

// ============================================================================
// Password - length only, the hash is what gets stored
// ============================================================================

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn check_password(raw: &str) -> Result<(), ValidationError> {
    check_length("password", raw, MIN_PASSWORD_LEN, 128)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalized() {
        let email = EmailAddress::new("  Ada@Example.ORG ").unwrap();
        assert_eq!(email.as_str(), "ada@example.org");
    }

    #[test]
    fn test_email_rejects_bad_shapes() {
        for bad in ["", "no-at", "@x.org", "a@b", "a@.org", "a@b.", "a b@c.org", "a@b@c.org"] {
            assert!(EmailAddress::new(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_display_name_length() {
        assert!(DisplayName::new("A").is_err());
        assert_eq!(DisplayName::new(" Ada ").unwrap().into_inner(), "Ada");
    }

    #[test]
    fn test_password_length_maps_to_field() {
        let err = check_password("short").unwrap_err();
        assert_eq!(err.field(), "password");
        let lib: LibraryError = err.into();
        assert_eq!(lib.code(), "VALIDATION_FAILED");
    }
}

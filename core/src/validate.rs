//! Declaration validation.
//!
//! Problems are collected into [`ValidationErrors`] rather than reported
//! one at a time, so a caller sees every defect of a relationship or
//! identifier in a single pass.
//!
//! # Examples
//!
//! ```
//! use tabula_core::{validate_identifier, ValidationError};
//!
//! assert!(validate_identifier("table", "migrations").is_empty());
//!
//! let errors = validate_identifier("table", "bad name;");
//! assert_eq!(errors, vec![ValidationError::new("table", "must contain only alphanumeric characters and underscores")]);
//! ```

use std::fmt;

use thiserror::Error;

/// A single problem found while validating a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// The offending field or attribute.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A collection of [`ValidationError`]s.
///
/// Displays as the individual messages joined by `"; "`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    /// Converts the collection into `Err` when it holds any error.
    pub fn into_result(self) -> crate::Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.into())
        }
    }
}

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Checks that `value` is a usable bare SQL identifier.
///
/// Identifiers must be non-empty and contain only ASCII alphanumerics and
/// underscores. Used for names that are interpolated into DDL, such as the
/// migration ledger table.
pub fn validate_identifier(field: &str, value: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if value.trim().is_empty() {
        errors.push(ValidationError::new(field, "cannot be empty"));
    } else if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        errors.push(ValidationError::new(
            field,
            "must contain only alphanumeric characters and underscores",
        ));
    }
    errors
}

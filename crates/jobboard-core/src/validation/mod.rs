//! Input validation and sanitization.
//!
//! Every credential-bearing input is validated here before it reaches the
//! identity store or the hasher.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use validator::{Validate, ValidationErrors};

/// Validation error types.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Input exceeds maximum allowed length.
    #[error("Input exceeds maximum length ({max} chars, got {actual})")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual input length.
        actual: usize,
    },

    /// Required input was empty after trimming.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// Email address is not well formed.
    #[error("Invalid email format")]
    InvalidEmail,

    /// Role name is not one of the known roles.
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// Field-level validation failures.
    #[error("Validation error: {0}")]
    Fields(String),
}

/// Size limits per input type.
pub mod limits {
    /// Maximum email length (RFC 5321 path limit).
    pub const MAX_EMAIL_LENGTH: usize = 254;

    /// Maximum display name length.
    pub const MAX_NAME_LENGTH: usize = 120;

    /// Minimum secret length for local accounts.
    pub const MIN_SECRET_LENGTH: u64 = 6;

    /// Maximum secret length for local accounts.
    pub const MAX_SECRET_LENGTH: u64 = 100;
}

/// Normalize an email address for storage and lookup.
///
/// Trims whitespace, applies NFKC normalization and lowercases, so that
/// lookups are case-insensitive.
///
/// # Errors
///
/// Returns `ValidationError::Empty`, `TooLong` or `InvalidEmail`.
pub fn normalize_email(input: &str) -> Result<String, ValidationError> {
    let normalized: String = input.trim().nfkc().collect::<String>().to_lowercase();

    if normalized.is_empty() {
        return Err(ValidationError::Empty("email"));
    }

    let len = normalized.chars().count();
    if len > limits::MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_EMAIL_LENGTH,
            actual: len,
        });
    }

    match normalized.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !normalized.chars().any(char::is_whitespace) =>
        {
            Ok(normalized)
        }
        _ => Err(ValidationError::InvalidEmail),
    }
}

/// Sanitize a display name.
///
/// Strips control characters, applies NFKC normalization and trims.
///
/// # Errors
///
/// Returns `ValidationError::Empty` or `TooLong`.
pub fn sanitize_display_name(input: &str) -> Result<String, ValidationError> {
    let sanitized: String = input
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .nfkc()
        .collect();
    let trimmed = sanitized.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Empty("name"));
    }

    let len = trimmed.chars().count();
    if len > limits::MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_NAME_LENGTH,
            actual: len,
        });
    }

    Ok(trimmed.to_string())
}

/// Run `validator` derive rules and flatten failures into one message.
///
/// # Errors
///
/// Returns `ValidationError::Fields` listing every failing field.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ValidationError> {
    input.validate().map_err(|e| ValidationError::Fields(describe(&e)))
}

fn describe(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let messages: Vec<String> = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map_or_else(|| e.code.to_string(), ToString::to_string)
                })
                .collect();
            format!("{field}: {}", messages.join(", "))
        })
        .collect();
    parts.sort();
    parts.join("; ")
}

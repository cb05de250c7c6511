//! Input validation shared by every mutating operation.
//!
//! All checks are pure: they inspect their input and report the first
//! problem found with a human-readable reason.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Maximum entry key length
pub const MAX_KEY_LENGTH: usize = 100;

/// Maximum tool name length
pub const MAX_TOOL_NAME_LENGTH: usize = 50;

static KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.\-]+$").expect("valid key regex"));

static TOOL_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_\-]+$").expect("valid tool name regex"));

/// Why a value failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required field was absent, null, or an empty string.
    #[error("{0} is required")]
    Missing(String),

    /// The value exceeds its length bound.
    #[error("{field} must not exceed {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// The value contains characters outside the allowed set.
    #[error("{field} may only contain {allowed}")]
    InvalidChars {
        field: &'static str,
        allowed: &'static str,
    },

    /// Any other malformed input.
    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Validate a memory entry key: `[A-Za-z0-9_.-]`, 1 to 100 characters.
pub fn validate_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::Missing("key".to_string()));
    }
    if key.chars().count() > MAX_KEY_LENGTH {
        return Err(ValidationError::TooLong {
            field: "key",
            max: MAX_KEY_LENGTH,
        });
    }
    if !KEY_PATTERN.is_match(key) {
        return Err(ValidationError::InvalidChars {
            field: "key",
            allowed: "letters, digits, underscores, dots and hyphens",
        });
    }
    Ok(())
}

/// Validate a tool name: `[A-Za-z0-9_-]`, 1 to 50 characters.
pub fn validate_tool_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Missing("toolName".to_string()));
    }
    if name.chars().count() > MAX_TOOL_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "toolName",
            max: MAX_TOOL_NAME_LENGTH,
        });
    }
    if !TOOL_NAME_PATTERN.is_match(name) {
        return Err(ValidationError::InvalidChars {
            field: "toolName",
            allowed: "letters, digits, underscores and hyphens",
        });
    }
    Ok(())
}

/// Absent, `null` and `""` count as missing. `0`, `false`, `[]` and `{}` do not.
pub fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Fail with the name of the first missing field, in the order given.
pub fn validate_required(fields: &[(&str, Option<&Value>)]) -> Result<(), ValidationError> {
    for (name, value) in fields {
        if is_missing(*value) {
            return Err(ValidationError::Missing((*name).to_string()));
        }
    }
    Ok(())
}

//! Request validation utilities for the Licensegate API.
//!
//! The engine accepts any non-empty string as a key or account number; these
//! helpers apply the stricter limits the HTTP surface wants before a request
//! reaches it.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

/// Longest license key or account number accepted over HTTP.
pub const MAX_FIELD_LENGTH: usize = 128;

/// Validation error type.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations.
pub type FieldResult<T> = Result<T, ValidationError>;

/// Validate that a string is not empty or whitespace only.
///
/// # Example
/// ```
/// use licensegate::server::validation::validate_not_empty;
///
/// assert!(validate_not_empty("hello", "name").is_ok());
/// assert!(validate_not_empty("", "name").is_err());
/// assert!(validate_not_empty("   ", "name").is_err());
/// ```
pub fn validate_not_empty(value: &str, field_name: &str) -> FieldResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field_name, "cannot be empty"))
    } else {
        Ok(())
    }
}

/// Validate string length is within bounds.
///
/// # Example
/// ```
/// use licensegate::server::validation::validate_length;
///
/// assert!(validate_length("hello", 1, 10, "name").is_ok());
/// assert!(validate_length("", 1, 10, "name").is_err());
/// assert!(validate_length("a".repeat(100).as_str(), 1, 10, "name").is_err());
/// ```
pub fn validate_length(value: &str, min: usize, max: usize, field_name: &str) -> FieldResult<()> {
    let len = value.len();
    if len < min {
        Err(ValidationError::new(
            field_name,
            format!("must be at least {} characters", min),
        ))
    } else if len > max {
        Err(ValidationError::new(
            field_name,
            format!("must be at most {} characters", max),
        ))
    } else {
        Ok(())
    }
}

/// Validate an account number: non-empty, bounded, no surrounding whitespace.
pub fn validate_account_number(value: &str, field_name: &str) -> FieldResult<()> {
    validate_not_empty(value, field_name)?;
    validate_length(value, 1, MAX_FIELD_LENGTH, field_name)?;
    if value.trim() != value {
        return Err(ValidationError::new(
            field_name,
            "must not have leading or trailing whitespace",
        ));
    }
    Ok(())
}

fn custom_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{2,127}$").expect("static pattern"))
}

/// Validate an administrator-chosen license key.
///
/// Custom keys need not follow the generated `PREFIX-XXXX-...` layout but
/// are restricted to 3..=128 characters of letters, digits, `-` and `_`,
/// starting with a letter or digit.
///
/// # Example
/// ```
/// use licensegate::server::validation::validate_custom_key;
///
/// assert!(validate_custom_key("MQL5-MASTER-LICENSE-2025", "customKey").is_ok());
/// assert!(validate_custom_key("-leading-dash", "customKey").is_err());
/// assert!(validate_custom_key("has space", "customKey").is_err());
/// ```
pub fn validate_custom_key(value: &str, field_name: &str) -> FieldResult<()> {
    if custom_key_regex().is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field_name,
            "must be 3-128 characters of letters, digits, '-' or '_'",
        ))
    }
}

/// Parse an expiry timestamp.
///
/// Accepts formats:
/// - RFC 3339: `2025-12-31T23:59:59Z`
/// - Without timezone (taken as UTC): `2025-12-31T23:59:59`
/// - Date only: `2025-12-31`, meaning the last second of that day in UTC
pub fn parse_expiry(value: &str, field_name: &str) -> FieldResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(end_of_day) = date.and_hms_opt(23, 59, 59) {
            return Ok(end_of_day.and_utc());
        }
    }

    Err(ValidationError::new(
        field_name,
        "invalid datetime format (expected: ISO 8601, e.g., '2025-12-31T23:59:59Z' or '2025-12-31')",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn account_number_rules() {
        assert!(validate_account_number("12345678", "accountNumber").is_ok());
        assert!(validate_account_number("", "accountNumber").is_err());
        assert!(validate_account_number(" 123", "accountNumber").is_err());
        assert!(validate_account_number(&"9".repeat(200), "accountNumber").is_err());
    }

    #[test]
    fn custom_key_rules() {
        assert!(validate_custom_key("MQL5-MASTER-LICENSE-2025", "customKey").is_ok());
        assert!(validate_custom_key("abc", "customKey").is_ok());
        assert!(validate_custom_key("ab", "customKey").is_err());
        assert!(validate_custom_key("_abc", "customKey").is_err());
        assert!(validate_custom_key("key/with/slash", "customKey").is_err());
    }

    #[test]
    fn parse_expiry_rfc3339_with_offset() {
        let parsed = parse_expiry("2025-06-30T14:00:00+02:00", "expiryDate").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap());
    }

    #[test]
    fn parse_expiry_date_only_is_end_of_day() {
        let parsed = parse_expiry("2025-12-31", "expiryDate").unwrap();
        assert_eq!(parsed.year(), 2025);
        assert_eq!(parsed.day(), 31);
        assert_eq!(parsed.hour(), 23);
        assert_eq!(parsed.second(), 59);
    }

    #[test]
    fn parse_expiry_naive_is_utc() {
        let parsed = parse_expiry("2025-01-02T03:04:05", "expiryDate").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn parse_expiry_rejects_garbage() {
        let err = parse_expiry("next tuesday", "expiryDate").unwrap_err();
        assert_eq!(err.field, "expiryDate");
    }
}

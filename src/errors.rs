//! Error types shared by the engine, the storage backends and the HTTP layer.
//!
//! Validation denials (unknown key, disabled license, ...) are *not* errors:
//! they are ordinary outcomes carried by
//! [`ValidationResult`](crate::engine::ValidationResult). Everything in here
//! is either a failed administrative request or an infrastructure failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LicenseError {
    /// No license with the given id or key.
    #[error("license not found: {0}")]
    NotFound(String),

    /// A license with this key already exists.
    #[error("license key already exists: {0}")]
    DuplicateKey(String),

    /// Every generated candidate key was already taken.
    #[error("failed to generate a unique license key after {0} attempts")]
    KeyGenerationExhausted(u32),

    /// The storage backend could not be reached or a write failed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Caller supplied data the engine refuses to store.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl LicenseError {
    /// Shorthand used by the backends when wrapping driver / IO errors.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        LicenseError::StorageUnavailable(err.to_string())
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, LicenseError::StorageUnavailable(_))
    }
}

pub type LicenseResult<T> = Result<T, LicenseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_helper_wraps_message() {
        let err = LicenseError::storage("disk full");
        assert!(err.is_storage());
        assert_eq!(err.to_string(), "storage unavailable: disk full");
    }

    #[test]
    fn denial_like_errors_are_not_storage_errors() {
        assert!(!LicenseError::NotFound("7".into()).is_storage());
        assert!(!LicenseError::DuplicateKey("MQL5-A".into()).is_storage());
    }
}

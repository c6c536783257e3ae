//! Standardized API error responses for all Licensegate endpoints.
//!
//! Every failed request, public or admin, is answered with the same JSON
//! structure:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "NOT_FOUND",
//!     "message": "License '42' not found",
//!     "details": null
//!   }
//! }
//! ```
//!
//! The `details` field is optional and may contain additional context.
//!
//! Validation *denials* are not errors and never go through this type: they
//! are ordinary `200 OK` responses carrying `valid: false`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::LicenseError;
use crate::server::validation::ValidationError;

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === Validation Errors (400) ===
    /// Request payload is invalid or malformed
    InvalidRequest,
    /// A required field is missing
    MissingField,
    /// A field value is invalid
    InvalidField,

    // === Authentication Errors (401/501) ===
    /// No admin secret header was sent
    MissingSecret,
    /// Admin secret does not match
    Unauthorized,
    /// No admin secret is configured on the server
    AuthDisabled,

    // === Resource Errors (404/409) ===
    /// Requested resource was not found
    NotFound,
    /// A license with this key already exists
    Conflict,

    // === Server Errors (5xx) ===
    /// Storage backend could not be reached
    StorageUnavailable,
    /// No free license key could be generated
    KeyGenerationFailed,
    /// Server configuration error
    ConfigError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest | ErrorCode::MissingField | ErrorCode::InvalidField => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::MissingSecret | ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,

            ErrorCode::NotFound => StatusCode::NOT_FOUND,

            ErrorCode::Conflict => StatusCode::CONFLICT,

            ErrorCode::KeyGenerationFailed | ErrorCode::ConfigError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            ErrorCode::AuthDisabled => StatusCode::NOT_IMPLEMENTED,

            ErrorCode::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "Request payload is invalid",
            ErrorCode::MissingField => "A required field is missing",
            ErrorCode::InvalidField => "A field value is invalid",
            ErrorCode::MissingSecret => "Admin secret header is required",
            ErrorCode::Unauthorized => "Admin secret is invalid",
            ErrorCode::AuthDisabled => "Admin access is not configured on this server",
            ErrorCode::NotFound => "The requested resource was not found",
            ErrorCode::Conflict => "A license with this key already exists",
            ErrorCode::StorageUnavailable => "Storage backend is unavailable",
            ErrorCode::KeyGenerationFailed => "Could not generate a unique license key",
            ErrorCode::ConfigError => "Server configuration error",
        }
    }
}

/// The inner error object containing code, message, and optional details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (field name, constraint violated, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Standardized API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorBody,
}

impl ApiError {
    /// Creates a new API error with the default message for `code`.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: code.default_message().to_string(),
                details: None,
            },
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.error.code.status_code()
    }

    // === Convenience constructors for common errors ===

    pub fn invalid_field(field: &str, reason: &str) -> Self {
        Self::with_details(
            ErrorCode::InvalidField,
            format!("Invalid value for '{}': {}", field, reason),
            serde_json::json!({ "field": field }),
        )
    }

    pub fn missing_field(field: &str) -> Self {
        Self::with_details(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
            serde_json::json!({ "field": field }),
        )
    }

    pub fn license_not_found(key_or_id: &str) -> Self {
        Self::with_message(
            ErrorCode::NotFound,
            format!("License '{}' not found", key_or_id),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.error.code.default_message(),
            self.error.message
        )
    }
}

impl std::error::Error for ApiError {}

// === Conversions from core error types ===

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        match err {
            LicenseError::NotFound(what) => ApiError::license_not_found(&what),
            LicenseError::DuplicateKey(key) => ApiError::with_details(
                ErrorCode::Conflict,
                format!("License key '{}' already exists", key),
                serde_json::json!({ "licenseKey": key }),
            ),
            LicenseError::KeyGenerationExhausted(attempts) => ApiError::with_message(
                ErrorCode::KeyGenerationFailed,
                format!("No unique license key found after {} attempts", attempts),
            ),
            // Driver detail stays in the server log.
            LicenseError::StorageUnavailable(_) => ApiError::new(ErrorCode::StorageUnavailable),
            LicenseError::InvalidInput(msg) => ApiError::with_message(ErrorCode::InvalidField, msg),
            LicenseError::ConfigError(msg) => ApiError::with_message(ErrorCode::ConfigError, msg),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::invalid_field(&err.field, &err.message)
    }
}

//! Shared-secret guard for the admin routes.
//!
//! Admin requests must carry the configured secret in the `X-Admin-Secret`
//! header. When no secret is configured the admin surface is switched off
//! and every admin request is answered with `AUTH_DISABLED`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use axum::middleware;
//! use licensegate::server::auth::require_admin;
//!
//! let admin = Router::new()
//!     .route("/api/stats", get(stats_handler))
//!     .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));
//! ```

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::handlers::AppState;

/// Header carrying the admin secret.
pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Compare two secrets without short-circuiting on the first differing byte.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Middleware rejecting requests without the right admin secret.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.admin_secret.as_deref() else {
        return Err(ApiError::new(ErrorCode::AuthDisabled));
    };

    let matched = request
        .headers()
        .get(ADMIN_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|secret| secrets_match(secret, expected));

    match matched {
        None => Err(ApiError::new(ErrorCode::MissingSecret)),
        Some(true) => Ok(next.run(request).await),
        Some(false) => {
            warn!(path = %request.uri().path(), "Rejected admin request with wrong secret");
            Err(ApiError::new(ErrorCode::Unauthorized))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_secrets() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3creT"));
        assert!(!secrets_match("s3cret", "s3cret!"));
        assert!(!secrets_match("", "s3cret"));
    }
}

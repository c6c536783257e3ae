use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::auth::require_admin;
use crate::server::handlers::{
    add_account_handler, create_license_handler, delete_license_handler, get_license_handler,
    health_handler, list_licenses_handler, logs_handler, root_handler, stats_handler,
    toggle_license_handler, update_license_handler, validate_handler, AppState,
};
use crate::server::logging::request_logging_middleware;

/// Build the application router.
///
/// # Routes
///
/// ## Public endpoints
/// - `GET /` - Service banner
/// - `GET /health` - Storage connectivity
/// - `POST /api/validate` - Validate a license key for an account
///
/// ## Admin endpoints (header `X-Admin-Secret`)
/// - `GET /api/licenses` - List licenses
/// - `POST /api/licenses` - Create a license
/// - `GET /api/licenses/:id` - Get a license by **key**
/// - `PUT /api/licenses/:id` - Update a license by id
/// - `DELETE /api/licenses/:id` - Delete a license by id
/// - `POST /api/licenses/:id/toggle` - Enable / disable a license
/// - `POST /api/accounts` - Add an account to a license's allowlist
/// - `GET /api/stats` - Aggregate counters
/// - `GET /api/logs` - Recent validation attempts
///
/// The lookup route shares the `:id` segment with update and delete because
/// the router allows a single parameter name per position.
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/api/licenses",
            get(list_licenses_handler).post(create_license_handler),
        )
        .route(
            "/api/licenses/:id",
            get(get_license_handler)
                .put(update_license_handler)
                .delete(delete_license_handler),
        )
        .route("/api/licenses/:id/toggle", post(toggle_license_handler))
        .route("/api/accounts", post(add_account_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/logs", get(logs_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/validate", post(validate_handler))
        .merge(admin)
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}

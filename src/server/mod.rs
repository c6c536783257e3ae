// src/server/mod.rs

//! Server-side components for Licensegate.
//!
//! This module contains:
//! - `handlers`    → Axum HTTP handlers and shared state
//! - `routes`      → Router builder
//! - `auth`        → `X-Admin-Secret` guard for admin routes
//! - `api_error`   → JSON error body and status mapping
//! - `logging`     → Request-id / timing middleware and health payload
//! - `validation`  → Request field validation
//! - `bootstrap`   → Fixed-license provisioning and CLI command parsing

pub mod api_error;
pub mod auth;
pub mod bootstrap;
pub mod handlers;
pub mod logging;
pub mod routes;
pub mod validation;

pub use api_error::{ApiError, ErrorBody, ErrorCode};
pub use auth::{require_admin, ADMIN_SECRET_HEADER};
pub use bootstrap::{ensure_license, parse_command, run_bootstrap, BootstrapOutcome, ServerCommand};
pub use handlers::{AccountNumberInput, AppState};
pub use logging::{request_logging_middleware, HealthResponse, REQUEST_ID_HEADER};
pub use routes::build_router;

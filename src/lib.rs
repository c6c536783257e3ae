//! Licensegate - license key issuance and validation for trading-terminal
//! products.
//!
//! A license binds a random key to an allowlist of trading account numbers,
//! an active flag and an optional expiry. Client applications present a key
//! and the account they run on; the engine answers valid or invalid with a
//! machine-readable reason and records every attempt in an audit log.
//!
//! # Features
//!
//! - `server` - Axum HTTP API and the `licensegate_server` binary. Enabled by default.
//! - `sqlite` - SQLite storage backend. Enabled by default.
//! - `postgres` - PostgreSQL storage backend.
//!
//! The in-memory and JSON-file backends are always available.
//!
//! # Example
//!
//! ```rust
//! use licensegate::engine::{LicenseEngine, ValidationRequest};
//! use licensegate::models::NewLicense;
//! use licensegate::storage::MemoryStore;
//!
//! # tokio_test_block(async {
//! let engine = LicenseEngine::with_defaults(MemoryStore::new());
//! let license = engine
//!     .create_license(NewLicense {
//!         account_numbers: vec!["12345678".to_string()],
//!         ..NewLicense::default()
//!     })
//!     .await
//!     .unwrap();
//!
//! let result = engine
//!     .validate(&ValidationRequest::new(license.key, "12345678"))
//!     .await
//!     .unwrap();
//! assert!(result.valid);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod license_key;
pub mod models;
pub mod storage;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;

pub use engine::{LicenseEngine, ValidationRequest, ValidationResult};
pub use errors::{LicenseError, LicenseResult};
pub use storage::{LicenseStore, Storage};

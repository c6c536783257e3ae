//! Storage backends for licenses and validation logs.
//!
//! The engine only sees the [`LicenseStore`] trait. Three implementations
//! exist:
//! - [`MemoryStore`]   → process-local maps, used by tests and demos
//! - [`JsonFileStore`] → `licenses.json` + `logs.json` in a data directory
//! - `SqlStore`        → SQLite / PostgreSQL via sqlx (`sqlite` / `postgres` features)
//!
//! [`Storage`] wraps whichever one the configuration selects at startup.
//!
//! Every backend enforces key uniqueness itself and reports a clash as
//! [`LicenseError::DuplicateKey`]; the existence check done by the engine is
//! only a fast path.

use std::future::Future;

use tracing::info;

use crate::config::StorageConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::models::{
    License, LicenseDraft, LicenseId, LicenseUpdate, NewLogEntry, ValidationLogEntry,
};

pub mod json_file;
pub mod memory;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use sql::SqlStore;

/// Persistence contract consumed by the license engine.
pub trait LicenseStore: Send + Sync {
    /// Short name used in health output and logs.
    fn backend_name(&self) -> &'static str;

    /// Insert a new active license. Fails with `DuplicateKey` if the key is taken.
    fn create_license(
        &self,
        draft: LicenseDraft,
    ) -> impl Future<Output = LicenseResult<License>> + Send;

    fn get_license_by_key(
        &self,
        key: &str,
    ) -> impl Future<Output = LicenseResult<Option<License>>> + Send;

    fn get_license_by_id(
        &self,
        id: &LicenseId,
    ) -> impl Future<Output = LicenseResult<Option<License>>> + Send;

    fn get_all_licenses(&self) -> impl Future<Output = LicenseResult<Vec<License>>> + Send;

    /// Apply a partial update atomically. `Ok(None)` if the id is unknown.
    fn update_license(
        &self,
        id: &LicenseId,
        update: &LicenseUpdate,
    ) -> impl Future<Output = LicenseResult<Option<License>>> + Send;

    /// Invert the active flag in one atomic step. `Ok(None)` if the id is unknown.
    fn flip_active(
        &self,
        id: &LicenseId,
    ) -> impl Future<Output = LicenseResult<Option<License>>> + Send;

    /// Hard delete. `Ok(false)` if the id is unknown.
    fn delete_license(&self, id: &LicenseId) -> impl Future<Output = LicenseResult<bool>> + Send;

    /// Atomic add-to-set on the allowlist. `Ok(None)` if the key is unknown.
    fn add_account(
        &self,
        key: &str,
        account_number: &str,
    ) -> impl Future<Output = LicenseResult<Option<License>>> + Send;

    /// Append an audit entry and return its id.
    fn append_log(&self, entry: NewLogEntry) -> impl Future<Output = LicenseResult<String>> + Send;

    /// Most recent entries first, optionally restricted to one license key.
    fn query_logs(
        &self,
        license_key: Option<&str>,
        limit: usize,
    ) -> impl Future<Output = LicenseResult<Vec<ValidationLogEntry>>> + Send;

    fn count_licenses(&self) -> impl Future<Output = LicenseResult<u64>> + Send;

    fn count_active_licenses(&self) -> impl Future<Output = LicenseResult<u64>> + Send;

    fn count_logs(&self) -> impl Future<Output = LicenseResult<u64>> + Send;

    fn count_successful_logs(&self) -> impl Future<Output = LicenseResult<u64>> + Send;
}

/// The backend selected by configuration.
#[derive(Debug)]
pub enum Storage {
    Memory(MemoryStore),
    JsonFile(JsonFileStore),
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    Sql(SqlStore),
}

impl Storage {
    /// Open the backend named by `storage.backend`.
    pub async fn connect(config: &StorageConfig) -> LicenseResult<Self> {
        let storage = match config.backend.as_str() {
            "memory" => Storage::Memory(MemoryStore::new()),
            "json" => Storage::JsonFile(JsonFileStore::open(&config.data_dir).await?),
            #[cfg(feature = "sqlite")]
            "sqlite" => Storage::Sql(
                SqlStore::connect_sqlite(&config.sqlite_url, config.max_connections).await?,
            ),
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => {
                return Err(LicenseError::ConfigError(
                    "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
                ))
            }
            #[cfg(feature = "postgres")]
            "postgres" => Storage::Sql(
                SqlStore::connect_postgres(&config.postgres_url, config.max_connections).await?,
            ),
            #[cfg(not(feature = "postgres"))]
            "postgres" => {
                return Err(LicenseError::ConfigError(
                    "PostgreSQL support not compiled in. Enable the 'postgres' feature."
                        .to_string(),
                ))
            }
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "unsupported storage backend: {other}"
                )))
            }
        };

        info!(backend = storage.backend_name(), "Storage backend ready");
        Ok(storage)
    }
}

impl LicenseStore for Storage {
    fn backend_name(&self) -> &'static str {
        match self {
            Storage::Memory(s) => s.backend_name(),
            Storage::JsonFile(s) => s.backend_name(),
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.backend_name(),
        }
    }

    async fn create_license(&self, draft: LicenseDraft) -> LicenseResult<License> {
        match self {
            Storage::Memory(s) => s.create_license(draft).await,
            Storage::JsonFile(s) => s.create_license(draft).await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.create_license(draft).await,
        }
    }

    async fn get_license_by_key(&self, key: &str) -> LicenseResult<Option<License>> {
        match self {
            Storage::Memory(s) => s.get_license_by_key(key).await,
            Storage::JsonFile(s) => s.get_license_by_key(key).await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.get_license_by_key(key).await,
        }
    }

    async fn get_license_by_id(&self, id: &LicenseId) -> LicenseResult<Option<License>> {
        match self {
            Storage::Memory(s) => s.get_license_by_id(id).await,
            Storage::JsonFile(s) => s.get_license_by_id(id).await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.get_license_by_id(id).await,
        }
    }

    async fn get_all_licenses(&self) -> LicenseResult<Vec<License>> {
        match self {
            Storage::Memory(s) => s.get_all_licenses().await,
            Storage::JsonFile(s) => s.get_all_licenses().await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.get_all_licenses().await,
        }
    }

    async fn update_license(
        &self,
        id: &LicenseId,
        update: &LicenseUpdate,
    ) -> LicenseResult<Option<License>> {
        match self {
            Storage::Memory(s) => s.update_license(id, update).await,
            Storage::JsonFile(s) => s.update_license(id, update).await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.update_license(id, update).await,
        }
    }

    async fn flip_active(&self, id: &LicenseId) -> LicenseResult<Option<License>> {
        match self {
            Storage::Memory(s) => s.flip_active(id).await,
            Storage::JsonFile(s) => s.flip_active(id).await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.flip_active(id).await,
        }
    }

    async fn delete_license(&self, id: &LicenseId) -> LicenseResult<bool> {
        match self {
            Storage::Memory(s) => s.delete_license(id).await,
            Storage::JsonFile(s) => s.delete_license(id).await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.delete_license(id).await,
        }
    }

    async fn add_account(&self, key: &str, account_number: &str) -> LicenseResult<Option<License>> {
        match self {
            Storage::Memory(s) => s.add_account(key, account_number).await,
            Storage::JsonFile(s) => s.add_account(key, account_number).await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.add_account(key, account_number).await,
        }
    }

    async fn append_log(&self, entry: NewLogEntry) -> LicenseResult<String> {
        match self {
            Storage::Memory(s) => s.append_log(entry).await,
            Storage::JsonFile(s) => s.append_log(entry).await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.append_log(entry).await,
        }
    }

    async fn query_logs(
        &self,
        license_key: Option<&str>,
        limit: usize,
    ) -> LicenseResult<Vec<ValidationLogEntry>> {
        match self {
            Storage::Memory(s) => s.query_logs(license_key, limit).await,
            Storage::JsonFile(s) => s.query_logs(license_key, limit).await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.query_logs(license_key, limit).await,
        }
    }

    async fn count_licenses(&self) -> LicenseResult<u64> {
        match self {
            Storage::Memory(s) => s.count_licenses().await,
            Storage::JsonFile(s) => s.count_licenses().await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.count_licenses().await,
        }
    }

    async fn count_active_licenses(&self) -> LicenseResult<u64> {
        match self {
            Storage::Memory(s) => s.count_active_licenses().await,
            Storage::JsonFile(s) => s.count_active_licenses().await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.count_active_licenses().await,
        }
    }

    async fn count_logs(&self) -> LicenseResult<u64> {
        match self {
            Storage::Memory(s) => s.count_logs().await,
            Storage::JsonFile(s) => s.count_logs().await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.count_logs().await,
        }
    }

    async fn count_successful_logs(&self) -> LicenseResult<u64> {
        match self {
            Storage::Memory(s) => s.count_successful_logs().await,
            Storage::JsonFile(s) => s.count_successful_logs().await,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            Storage::Sql(s) => s.count_successful_logs().await,
        }
    }
}

//! SQL storage backend over SQLite and PostgreSQL.
//!
//! Available variants depend on enabled features:
//! - `sqlite` feature enables `SqlStore::SQLite`
//! - `postgres` feature enables `SqlStore::Postgres`
//!
//! Queries are written once with `?` placeholders; the Postgres arm rewrites
//! them to `$1, $2, ...` before execution.
//!
//! Key uniqueness comes from the `UNIQUE` constraint on `license_key`.
//! Mutations of an existing row go through a compare-and-swap on the
//! `version` column so that concurrent allowlist edits never lose an update.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar, FromRow};
use tracing::{debug, error, warn};
use uuid::Uuid;

#[cfg(feature = "sqlite")]
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

#[cfg(feature = "postgres")]
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::errors::{LicenseError, LicenseResult};
use crate::models::{
    License, LicenseDraft, LicenseId, LicenseUpdate, NewLogEntry, ValidationLogEntry,
};
use crate::storage::LicenseStore;

/// Compare-and-swap attempts before a contended update gives up.
const MAX_CAS_ATTEMPTS: u32 = 8;

#[cfg(feature = "sqlite")]
const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS licenses (
        id              TEXT PRIMARY KEY,
        license_key     TEXT NOT NULL UNIQUE,
        account_numbers TEXT NOT NULL DEFAULT '[]',
        max_accounts    INTEGER NOT NULL DEFAULT 1,
        active          INTEGER NOT NULL DEFAULT 1,
        expiry_date     TEXT,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL,
        version         INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS validation_logs (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        license_key     TEXT NOT NULL,
        account_number  TEXT NOT NULL,
        account_name    TEXT,
        server_name     TEXT,
        success         INTEGER NOT NULL,
        error_message   TEXT,
        timestamp       TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_validation_logs_key ON validation_logs (license_key)",
];

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS licenses (
        id              TEXT PRIMARY KEY,
        license_key     TEXT NOT NULL UNIQUE,
        account_numbers TEXT NOT NULL DEFAULT '[]',
        max_accounts    BIGINT NOT NULL DEFAULT 1,
        active          BOOLEAN NOT NULL DEFAULT TRUE,
        expiry_date     TIMESTAMPTZ,
        created_at      TIMESTAMPTZ NOT NULL,
        updated_at      TIMESTAMPTZ NOT NULL,
        version         BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS validation_logs (
        id              BIGSERIAL PRIMARY KEY,
        license_key     TEXT NOT NULL,
        account_number  TEXT NOT NULL,
        account_name    TEXT,
        server_name     TEXT,
        success         BOOLEAN NOT NULL,
        error_message   TEXT,
        timestamp       TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_validation_logs_key ON validation_logs (license_key)",
];

const LICENSE_COLUMNS: &str = "id, license_key, account_numbers, max_accounts, active, \
                               expiry_date, created_at, updated_at, version";

const LOG_COLUMNS: &str = "id, license_key, account_number, account_name, server_name, \
                           success, error_message, timestamp";

/// Rewrite `?` placeholders into Postgres' numbered form.
#[cfg_attr(not(feature = "postgres"), allow(dead_code))]
fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Run `$body` against whichever pool backs the store, with `$sql` bound to
/// the dialect-correct query text.
macro_rules! with_pool {
    ($store:expr, $text:expr, |$pool:ident, $sql:ident| $body:expr) => {
        match $store {
            #[cfg(feature = "sqlite")]
            SqlStore::SQLite($pool) => {
                let $sql: Cow<'_, str> = Cow::Borrowed($text);
                $body
            }
            #[cfg(feature = "postgres")]
            SqlStore::Postgres($pool) => {
                let $sql: Cow<'_, str> = Cow::Owned(numbered_placeholders($text));
                $body
            }
        }
    };
}

/// Row shape of the `licenses` table.
#[derive(Debug, FromRow)]
struct LicenseRow {
    id: String,
    license_key: String,
    account_numbers: String,
    max_accounts: i64,
    active: bool,
    expiry_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl LicenseRow {
    fn into_license(self) -> LicenseResult<(License, i64)> {
        let account_numbers: Vec<String> =
            serde_json::from_str(&self.account_numbers).map_err(|e| {
                error!("Corrupt account list for license id={}: {e}", self.id);
                LicenseError::storage(format!("corrupt account_numbers column: {e}"))
            })?;

        let license = License {
            id: LicenseId(self.id),
            key: self.license_key,
            account_numbers,
            max_accounts: u32::try_from(self.max_accounts).unwrap_or(u32::MAX),
            active: self.active,
            expiry_date: self.expiry_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        Ok((license, self.version))
    }
}

/// Row shape of the `validation_logs` table.
#[derive(Debug, FromRow)]
struct LogRow {
    id: i64,
    license_key: String,
    account_number: String,
    account_name: Option<String>,
    server_name: Option<String>,
    success: bool,
    error_message: Option<String>,
    timestamp: DateTime<Utc>,
}

impl From<LogRow> for ValidationLogEntry {
    fn from(row: LogRow) -> Self {
        Self {
            id: row.id.to_string(),
            license_key: row.license_key,
            account_number: row.account_number,
            account_name: row.account_name,
            server_name: row.server_name,
            success: row.success,
            error_message: row.error_message,
            timestamp: row.timestamp,
        }
    }
}

fn db_err(op: &str) -> impl FnOnce(sqlx::Error) -> LicenseError + '_ {
    move |e| {
        error!("SQL {op} failed: {e}");
        LicenseError::storage(format!("database error: {e}"))
    }
}

fn accounts_json(accounts: &[String]) -> LicenseResult<String> {
    serde_json::to_string(accounts).map_err(LicenseError::storage)
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

/// Which row a compare-and-swap mutation targets.
enum Target<'a> {
    Id(&'a LicenseId),
    Key(&'a str),
}

#[derive(Debug, Clone)]
pub enum SqlStore {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl SqlStore {
    /// Connect to SQLite and create the schema if missing.
    ///
    /// In-memory URLs are forced onto a single connection: every connection
    /// to `sqlite::memory:` would otherwise see its own empty database.
    #[cfg(feature = "sqlite")]
    pub async fn connect_sqlite(url: &str, max_connections: u32) -> LicenseResult<Self> {
        let in_memory = url.contains(":memory:");
        let mut options = SqlitePoolOptions::new().max_connections(if in_memory {
            1
        } else {
            max_connections.max(1)
        });
        if in_memory {
            // Closing the only connection would drop the database.
            options = options.idle_timeout(None).max_lifetime(None);
        }

        let pool = options
            .connect(url)
            .await
            .map_err(|e| {
                error!("Failed to connect to SQLite: {e}");
                LicenseError::storage(format!("failed to connect to SQLite: {e}"))
            })?;

        let store = SqlStore::SQLite(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Connect to PostgreSQL and create the schema if missing.
    #[cfg(feature = "postgres")]
    pub async fn connect_postgres(url: &str, max_connections: u32) -> LicenseResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {e}");
                LicenseError::storage(format!("failed to connect to PostgreSQL: {e}"))
            })?;

        let store = SqlStore::Postgres(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables and indexes. Idempotent.
    pub async fn migrate(&self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            SqlStore::SQLite(pool) => {
                for statement in SQLITE_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(db_err("migrate"))?;
                }
            }
            #[cfg(feature = "postgres")]
            SqlStore::Postgres(pool) => {
                for statement in POSTGRES_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(db_err("migrate"))?;
                }
            }
        }
        debug!("SQL schema ready");
        Ok(())
    }

    async fn fetch_row(&self, target: &Target<'_>) -> LicenseResult<Option<LicenseRow>> {
        let (text, value) = match target {
            Target::Id(id) => (
                format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE id = ?"),
                id.as_str(),
            ),
            Target::Key(key) => (
                format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE license_key = ?"),
                *key,
            ),
        };

        with_pool!(self, text.as_str(), |pool, sql| {
            query_as::<_, LicenseRow>(&sql)
                .bind(value)
                .fetch_optional(pool)
                .await
                .map_err(db_err("fetch license"))
        })
    }

    async fn fetch_license(&self, target: Target<'_>) -> LicenseResult<Option<License>> {
        match self.fetch_row(&target).await? {
            Some(row) => Ok(Some(row.into_license()?.0)),
            None => Ok(None),
        }
    }

    /// Read-modify-write with optimistic concurrency.
    ///
    /// `mutate` returns `false` when it made no change, in which case nothing
    /// is written.
    async fn modify<F>(&self, target: Target<'_>, mutate: F) -> LicenseResult<Option<License>>
    where
        F: Fn(&mut License) -> bool + Send + Sync,
    {
        const UPDATE: &str = "UPDATE licenses SET account_numbers = ?, max_accounts = ?, \
                              active = ?, expiry_date = ?, updated_at = ?, version = version + 1 \
                              WHERE id = ? AND version = ?";

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let Some(row) = self.fetch_row(&target).await? else {
                return Ok(None);
            };
            let (mut license, version) = row.into_license()?;

            if !mutate(&mut license) {
                return Ok(Some(license));
            }

            let accounts = accounts_json(&license.account_numbers)?;
            let updated = with_pool!(self, UPDATE, |pool, sql| {
                query(&sql)
                    .bind(&accounts)
                    .bind(i64::from(license.max_accounts))
                    .bind(license.active)
                    .bind(license.expiry_date)
                    .bind(license.updated_at)
                    .bind(license.id.as_str())
                    .bind(version)
                    .execute(pool)
                    .await
                    .map_err(db_err("update license"))?
                    .rows_affected()
            });

            if updated == 1 {
                return Ok(Some(license));
            }
            warn!(
                license_id = %license.id,
                attempt, "Concurrent modification detected, retrying"
            );
        }

        Err(LicenseError::StorageUnavailable(format!(
            "license update abandoned after {MAX_CAS_ATTEMPTS} conflicting attempts"
        )))
    }

    async fn count(&self, text: &str, filter: Option<bool>) -> LicenseResult<u64> {
        let n: i64 = with_pool!(self, text, |pool, sql| {
            let q = query_scalar::<_, i64>(&sql);
            let q = match filter {
                Some(flag) => q.bind(flag),
                None => q,
            };
            q.fetch_one(pool).await.map_err(db_err("count"))?
        });
        Ok(to_count(n))
    }
}

impl LicenseStore for SqlStore {
    fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            SqlStore::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            SqlStore::Postgres(_) => "postgres",
        }
    }

    async fn create_license(&self, draft: LicenseDraft) -> LicenseResult<License> {
        const INSERT: &str = "INSERT INTO licenses (id, license_key, account_numbers, \
                              max_accounts, active, expiry_date, created_at, updated_at, version) \
                              VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)";

        let license = draft.into_license(LicenseId(Uuid::new_v4().to_string()), Utc::now());
        let accounts = accounts_json(&license.account_numbers)?;

        let result = with_pool!(self, INSERT, |pool, sql| {
            query(&sql)
                .bind(license.id.as_str())
                .bind(&license.key)
                .bind(&accounts)
                .bind(i64::from(license.max_accounts))
                .bind(license.active)
                .bind(license.expiry_date)
                .bind(license.created_at)
                .bind(license.updated_at)
                .execute(pool)
                .await
                .map(|done| done.rows_affected())
        });

        match result {
            Ok(_) => Ok(license),
            Err(sqlx::Error::Database(ref db)) if db.is_unique_violation() => {
                debug!("Unique violation on license_key={}", license.key);
                Err(LicenseError::DuplicateKey(license.key))
            }
            Err(e) => Err(db_err("insert license")(e)),
        }
    }

    async fn get_license_by_key(&self, key: &str) -> LicenseResult<Option<License>> {
        self.fetch_license(Target::Key(key)).await
    }

    async fn get_license_by_id(&self, id: &LicenseId) -> LicenseResult<Option<License>> {
        self.fetch_license(Target::Id(id)).await
    }

    async fn get_all_licenses(&self) -> LicenseResult<Vec<License>> {
        let text = format!("SELECT {LICENSE_COLUMNS} FROM licenses ORDER BY created_at, id");
        let rows = with_pool!(self, text.as_str(), |pool, sql| {
            query_as::<_, LicenseRow>(&sql)
                .fetch_all(pool)
                .await
                .map_err(db_err("list licenses"))?
        });

        rows.into_iter()
            .map(|row| row.into_license().map(|(license, _)| license))
            .collect()
    }

    async fn update_license(
        &self,
        id: &LicenseId,
        update: &LicenseUpdate,
    ) -> LicenseResult<Option<License>> {
        self.modify(Target::Id(id), |license| {
            update.apply(license, Utc::now());
            true
        })
        .await
    }

    async fn flip_active(&self, id: &LicenseId) -> LicenseResult<Option<License>> {
        self.modify(Target::Id(id), |license| {
            license.active = !license.active;
            license.updated_at = Utc::now();
            true
        })
        .await
    }

    async fn delete_license(&self, id: &LicenseId) -> LicenseResult<bool> {
        const DELETE: &str = "DELETE FROM licenses WHERE id = ?";
        let affected = with_pool!(self, DELETE, |pool, sql| {
            query(&sql)
                .bind(id.as_str())
                .execute(pool)
                .await
                .map_err(db_err("delete license"))?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn add_account(&self, key: &str, account_number: &str) -> LicenseResult<Option<License>> {
        self.modify(Target::Key(key), |license| {
            if license.has_account(account_number) {
                return false;
            }
            license.account_numbers.push(account_number.to_string());
            license.updated_at = Utc::now();
            true
        })
        .await
    }

    async fn append_log(&self, entry: NewLogEntry) -> LicenseResult<String> {
        const INSERT: &str = "INSERT INTO validation_logs (license_key, account_number, \
                              account_name, server_name, success, error_message, timestamp) \
                              VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id";

        let now = Utc::now();
        let id: i64 = with_pool!(self, INSERT, |pool, sql| {
            query_scalar::<_, i64>(&sql)
                .bind(&entry.license_key)
                .bind(&entry.account_number)
                .bind(&entry.account_name)
                .bind(&entry.server_name)
                .bind(entry.success)
                .bind(&entry.error_message)
                .bind(now)
                .fetch_one(pool)
                .await
                .map_err(db_err("append log"))?
        });
        Ok(id.to_string())
    }

    async fn query_logs(
        &self,
        license_key: Option<&str>,
        limit: usize,
    ) -> LicenseResult<Vec<ValidationLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match license_key {
            Some(key) => {
                let text = format!(
                    "SELECT {LOG_COLUMNS} FROM validation_logs WHERE license_key = ? \
                     ORDER BY id DESC LIMIT ?"
                );
                with_pool!(self, text.as_str(), |pool, sql| {
                    query_as::<_, LogRow>(&sql)
                        .bind(key)
                        .bind(limit)
                        .fetch_all(pool)
                        .await
                        .map_err(db_err("query logs"))?
                })
            }
            None => {
                let text =
                    format!("SELECT {LOG_COLUMNS} FROM validation_logs ORDER BY id DESC LIMIT ?");
                with_pool!(self, text.as_str(), |pool, sql| {
                    query_as::<_, LogRow>(&sql)
                        .bind(limit)
                        .fetch_all(pool)
                        .await
                        .map_err(db_err("query logs"))?
                })
            }
        };

        Ok(rows.into_iter().map(ValidationLogEntry::from).collect())
    }

    async fn count_licenses(&self) -> LicenseResult<u64> {
        self.count("SELECT COUNT(*) FROM licenses", None).await
    }

    async fn count_active_licenses(&self) -> LicenseResult<u64> {
        self.count("SELECT COUNT(*) FROM licenses WHERE active = ?", Some(true))
            .await
    }

    async fn count_logs(&self) -> LicenseResult<u64> {
        self.count("SELECT COUNT(*) FROM validation_logs", None).await
    }

    async fn count_successful_logs(&self) -> LicenseResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM validation_logs WHERE success = ?",
            Some(true),
        )
        .await
    }
}

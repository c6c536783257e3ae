//! Flat-file JSON storage backend.
//!
//! Two documents live in the data directory:
//! - `licenses.json` → `{ "licenses": [...], "nextId": N }`
//! - `logs.json`     → `{ "logs": [...], "nextId": N }`
//!
//! Both are loaded once at open time and kept in memory behind async
//! mutexes. License mutations are applied to a copy of the table, written to
//! a temporary file and renamed over the document; only then does the copy
//! replace the in-memory table. The append-only log is extended in place and
//! the new entry is dropped again if the write fails. Either way memory and
//! disk stay in agreement.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::errors::{LicenseError, LicenseResult};
use crate::models::{
    License, LicenseDraft, LicenseId, LicenseUpdate, NewLogEntry, ValidationLogEntry,
};
use crate::storage::memory::{LicenseTable, LogTable};
use crate::storage::LicenseStore;

const LICENSES_FILE: &str = "licenses.json";
const LOGS_FILE: &str = "logs.json";

#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    licenses: Mutex<LicenseTable>,
    logs: Mutex<LogTable>,
}

impl JsonFileStore {
    /// Open (or initialise) the store in `dir`, creating the directory and
    /// empty documents as needed.
    pub async fn open(dir: impl AsRef<Path>) -> LicenseResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            error!("Failed to create data directory {}: {e}", dir.display());
            LicenseError::storage(format!("create {}: {e}", dir.display()))
        })?;

        let licenses: LicenseTable = load_or_init(&dir.join(LICENSES_FILE)).await?;
        let logs: LogTable = load_or_init(&dir.join(LOGS_FILE)).await?;

        debug!(
            dir = %dir.display(),
            licenses = licenses.licenses.len(),
            logs = logs.logs.len(),
            "Opened JSON file store"
        );

        Ok(Self {
            dir,
            licenses: Mutex::new(licenses),
            logs: Mutex::new(logs),
        })
    }
}

async fn load_or_init<T>(path: &Path) -> LicenseResult<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
            error!("Corrupt document {}: {e}", path.display());
            LicenseError::storage(format!("parse {}: {e}", path.display()))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let empty = T::default();
            write_document(path, &empty).await?;
            Ok(empty)
        }
        Err(e) => Err(LicenseError::storage(format!("read {}: {e}", path.display()))),
    }
}

async fn write_document<T: Serialize>(path: &Path, value: &T) -> LicenseResult<()> {
    let json = serde_json::to_vec_pretty(value).map_err(LicenseError::storage)?;
    let tmp = path.with_extension("json.tmp");

    tokio::fs::write(&tmp, json).await.map_err(|e| {
        error!("Failed to write {}: {e}", tmp.display());
        LicenseError::storage(format!("write {}: {e}", tmp.display()))
    })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        error!("Failed to replace {}: {e}", path.display());
        LicenseError::storage(format!("rename {}: {e}", path.display()))
    })
}

impl LicenseStore for JsonFileStore {
    fn backend_name(&self) -> &'static str {
        "json"
    }

    async fn create_license(&self, draft: LicenseDraft) -> LicenseResult<License> {
        let mut table = self.licenses.lock().await;
        let mut next = table.clone();
        let license = next.insert(draft)?;
        write_document(&self.dir.join(LICENSES_FILE), &next).await?;
        *table = next;
        Ok(license)
    }

    async fn get_license_by_key(&self, key: &str) -> LicenseResult<Option<License>> {
        Ok(self.licenses.lock().await.by_key(key).cloned())
    }

    async fn get_license_by_id(&self, id: &LicenseId) -> LicenseResult<Option<License>> {
        Ok(self.licenses.lock().await.by_id(id).cloned())
    }

    async fn get_all_licenses(&self) -> LicenseResult<Vec<License>> {
        Ok(self.licenses.lock().await.licenses.clone())
    }

    async fn update_license(
        &self,
        id: &LicenseId,
        update: &LicenseUpdate,
    ) -> LicenseResult<Option<License>> {
        let mut table = self.licenses.lock().await;
        let mut next = table.clone();
        let Some(license) = next.update(id, update) else {
            return Ok(None);
        };
        write_document(&self.dir.join(LICENSES_FILE), &next).await?;
        *table = next;
        Ok(Some(license))
    }

    async fn flip_active(&self, id: &LicenseId) -> LicenseResult<Option<License>> {
        let mut table = self.licenses.lock().await;
        let mut next = table.clone();
        let Some(license) = next.flip_active(id) else {
            return Ok(None);
        };
        write_document(&self.dir.join(LICENSES_FILE), &next).await?;
        *table = next;
        Ok(Some(license))
    }

    async fn delete_license(&self, id: &LicenseId) -> LicenseResult<bool> {
        let mut table = self.licenses.lock().await;
        let mut next = table.clone();
        if !next.remove(id) {
            return Ok(false);
        }
        write_document(&self.dir.join(LICENSES_FILE), &next).await?;
        *table = next;
        Ok(true)
    }

    async fn add_account(&self, key: &str, account_number: &str) -> LicenseResult<Option<License>> {
        let mut table = self.licenses.lock().await;
        let mut next = table.clone();
        match next.add_account(key, account_number) {
            None => Ok(None),
            Some((license, false)) => Ok(Some(license)),
            Some((license, true)) => {
                write_document(&self.dir.join(LICENSES_FILE), &next).await?;
                *table = next;
                Ok(Some(license))
            }
        }
    }

    async fn append_log(&self, entry: NewLogEntry) -> LicenseResult<String> {
        let mut table = self.logs.lock().await;
        let id = table.append(entry);
        if let Err(e) = write_document(&self.dir.join(LOGS_FILE), &*table).await {
            table.rollback_last();
            return Err(e);
        }
        Ok(id)
    }

    async fn query_logs(
        &self,
        license_key: Option<&str>,
        limit: usize,
    ) -> LicenseResult<Vec<ValidationLogEntry>> {
        Ok(self.logs.lock().await.recent(license_key, limit))
    }

    async fn count_licenses(&self) -> LicenseResult<u64> {
        Ok(self.licenses.lock().await.licenses.len() as u64)
    }

    async fn count_active_licenses(&self) -> LicenseResult<u64> {
        Ok(self.licenses.lock().await.active_count())
    }

    async fn count_logs(&self) -> LicenseResult<u64> {
        Ok(self.logs.lock().await.logs.len() as u64)
    }

    async fn count_successful_logs(&self) -> LicenseResult<u64> {
        Ok(self.logs.lock().await.success_count())
    }
}

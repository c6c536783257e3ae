//! In-memory storage backend.
//!
//! The two tables are plain vectors guarded by a mutex each. [`LicenseTable`]
//! and [`LogTable`] are also the on-disk document shape of the JSON-file
//! store, which reuses their operations and only adds persistence.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{LicenseError, LicenseResult};
use crate::models::{
    License, LicenseDraft, LicenseId, LicenseUpdate, NewLogEntry, ValidationLogEntry,
};
use crate::storage::LicenseStore;

/// The `licenses` collection with its id sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseTable {
    pub licenses: Vec<License>,
    pub next_id: u64,
}

impl Default for LicenseTable {
    fn default() -> Self {
        Self {
            licenses: Vec::new(),
            next_id: 1,
        }
    }
}

impl LicenseTable {
    pub fn insert(&mut self, draft: LicenseDraft) -> LicenseResult<License> {
        if self.by_key(&draft.key).is_some() {
            return Err(LicenseError::DuplicateKey(draft.key));
        }

        let id = LicenseId(self.next_id.to_string());
        self.next_id += 1;

        let license = draft.into_license(id, Utc::now());
        self.licenses.push(license.clone());
        Ok(license)
    }

    pub fn by_key(&self, key: &str) -> Option<&License> {
        self.licenses.iter().find(|l| l.key == key)
    }

    pub fn by_id(&self, id: &LicenseId) -> Option<&License> {
        self.licenses.iter().find(|l| &l.id == id)
    }

    pub fn update(&mut self, id: &LicenseId, update: &LicenseUpdate) -> Option<License> {
        let license = self.licenses.iter_mut().find(|l| &l.id == id)?;
        update.apply(license, Utc::now());
        Some(license.clone())
    }

    pub fn flip_active(&mut self, id: &LicenseId) -> Option<License> {
        let license = self.licenses.iter_mut().find(|l| &l.id == id)?;
        license.active = !license.active;
        license.updated_at = Utc::now();
        Some(license.clone())
    }

    pub fn remove(&mut self, id: &LicenseId) -> bool {
        let before = self.licenses.len();
        self.licenses.retain(|l| &l.id != id);
        self.licenses.len() != before
    }

    /// Returns the license and whether the allowlist actually changed.
    pub fn add_account(&mut self, key: &str, account_number: &str) -> Option<(License, bool)> {
        let license = self.licenses.iter_mut().find(|l| l.key == key)?;
        if license.has_account(account_number) {
            return Some((license.clone(), false));
        }
        license.account_numbers.push(account_number.to_string());
        license.updated_at = Utc::now();
        Some((license.clone(), true))
    }

    pub fn active_count(&self) -> u64 {
        self.licenses.iter().filter(|l| l.active).count() as u64
    }
}

/// The `logs` collection with its id sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogTable {
    pub logs: Vec<ValidationLogEntry>,
    pub next_id: u64,
}

impl Default for LogTable {
    fn default() -> Self {
        Self {
            logs: Vec::new(),
            next_id: 1,
        }
    }
}

impl LogTable {
    pub fn append(&mut self, entry: NewLogEntry) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        self.logs.push(entry.into_entry(id.clone(), Utc::now()));
        id
    }

    /// Undo the most recent [`append`](Self::append).
    pub fn rollback_last(&mut self) {
        if self.logs.pop().is_some() {
            self.next_id -= 1;
        }
    }

    /// Entries are kept in insertion order, so newest-first is a reverse walk.
    pub fn recent(&self, license_key: Option<&str>, limit: usize) -> Vec<ValidationLogEntry> {
        self.logs
            .iter()
            .rev()
            .filter(|entry| license_key.map_or(true, |key| entry.license_key == key))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn success_count(&self) -> u64 {
        self.logs.iter().filter(|l| l.success).count() as u64
    }
}

/// Process-local store. Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    licenses: Mutex<LicenseTable>,
    logs: Mutex<LogTable>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> LicenseResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| LicenseError::StorageUnavailable(format!("failed to acquire {what} lock")))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn licenses(&self) -> LicenseResult<MutexGuard<'_, LicenseTable>> {
        lock(&self.licenses, "licenses")
    }

    fn logs(&self) -> LicenseResult<MutexGuard<'_, LogTable>> {
        lock(&self.logs, "logs")
    }
}

impl LicenseStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create_license(&self, draft: LicenseDraft) -> LicenseResult<License> {
        self.licenses()?.insert(draft)
    }

    async fn get_license_by_key(&self, key: &str) -> LicenseResult<Option<License>> {
        Ok(self.licenses()?.by_key(key).cloned())
    }

    async fn get_license_by_id(&self, id: &LicenseId) -> LicenseResult<Option<License>> {
        Ok(self.licenses()?.by_id(id).cloned())
    }

    async fn get_all_licenses(&self) -> LicenseResult<Vec<License>> {
        Ok(self.licenses()?.licenses.clone())
    }

    async fn update_license(
        &self,
        id: &LicenseId,
        update: &LicenseUpdate,
    ) -> LicenseResult<Option<License>> {
        Ok(self.licenses()?.update(id, update))
    }

    async fn flip_active(&self, id: &LicenseId) -> LicenseResult<Option<License>> {
        Ok(self.licenses()?.flip_active(id))
    }

    async fn delete_license(&self, id: &LicenseId) -> LicenseResult<bool> {
        Ok(self.licenses()?.remove(id))
    }

    async fn add_account(&self, key: &str, account_number: &str) -> LicenseResult<Option<License>> {
        Ok(self
            .licenses()?
            .add_account(key, account_number)
            .map(|(license, _)| license))
    }

    async fn append_log(&self, entry: NewLogEntry) -> LicenseResult<String> {
        Ok(self.logs()?.append(entry))
    }

    async fn query_logs(
        &self,
        license_key: Option<&str>,
        limit: usize,
    ) -> LicenseResult<Vec<ValidationLogEntry>> {
        Ok(self.logs()?.recent(license_key, limit))
    }

    async fn count_licenses(&self) -> LicenseResult<u64> {
        Ok(self.licenses()?.licenses.len() as u64)
    }

    async fn count_active_licenses(&self) -> LicenseResult<u64> {
        Ok(self.licenses()?.active_count())
    }

    async fn count_logs(&self) -> LicenseResult<u64> {
        Ok(self.logs()?.logs.len() as u64)
    }

    async fn count_successful_logs(&self) -> LicenseResult<u64> {
        Ok(self.logs()?.success_count())
    }
}

//! License lifecycle and validation.
//!
//! [`LicenseEngine`] owns a [`LicenseStore`] and implements every operation
//! the HTTP layer and the bootstrap path need: key generation, creation with
//! collision retry, partial updates, toggling, deletion, allowlist growth,
//! validation with auditing, statistics and log queries.
//!
//! The engine is generic over the store so tests can run it on
//! [`MemoryStore`](crate::storage::MemoryStore) or on a purpose-built double.

use tracing::{debug, warn};

use crate::config::LicenseConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::events::{log_license_event, LicenseEvent};
use crate::license_key::{generate_license_key, KeyFormat};
use crate::models::{
    dedup_accounts, License, LicenseDraft, LicenseId, LicenseUpdate, NewLicense,
    ValidationLogEntry,
};
use crate::storage::LicenseStore;

pub mod stats;
pub mod validation;

pub use stats::{success_rate, Statistics};
pub use validation::{
    evaluate, Decision, Denial, DenialCode, GrantedLicense, ValidationRequest, ValidationResult,
};

/// Default number of candidate keys tried before giving up.
pub const DEFAULT_MAX_KEY_ATTEMPTS: u32 = 10;

/// Tunables that do not belong to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub key_format: KeyFormat,
    pub max_key_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            key_format: KeyFormat::default(),
            max_key_attempts: DEFAULT_MAX_KEY_ATTEMPTS,
        }
    }
}

impl From<&LicenseConfig> for EngineSettings {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            key_format: KeyFormat::from(config),
            max_key_attempts: config.max_key_attempts,
        }
    }
}

#[derive(Debug)]
pub struct LicenseEngine<S> {
    store: S,
    settings: EngineSettings,
}

impl<S: LicenseStore> LicenseEngine<S> {
    pub fn new(store: S, settings: EngineSettings) -> Self {
        Self { store, settings }
    }

    pub fn with_defaults(store: S) -> Self {
        Self::new(store, EngineSettings::default())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// A fresh random key in the configured layout. Uniqueness is not checked.
    pub fn generate_key(&self) -> String {
        generate_license_key(&self.settings.key_format)
    }

    /// Create a license.
    ///
    /// With `custom_key` the key is used verbatim and must not already exist.
    /// Without it, up to `max_key_attempts` generated keys are tried; a key
    /// that turns out to be taken, whether seen by the lookup or rejected by
    /// the store on insert, costs one attempt.
    pub async fn create_license(&self, request: NewLicense) -> LicenseResult<License> {
        let supplied = u32::try_from(request.account_numbers.len()).unwrap_or(u32::MAX);
        let account_numbers = normalize_accounts(request.account_numbers)?;
        let max_accounts = request
            .max_accounts
            .filter(|&max| max > 0)
            .unwrap_or(supplied.max(1));

        let license = match request.custom_key {
            Some(key) => {
                if key.trim().is_empty() {
                    return Err(LicenseError::InvalidInput(
                        "custom key must not be empty".to_string(),
                    ));
                }
                if self.store.get_license_by_key(&key).await?.is_some() {
                    return Err(LicenseError::DuplicateKey(key));
                }
                self.store
                    .create_license(LicenseDraft {
                        key,
                        account_numbers,
                        max_accounts,
                        expiry_date: request.expiry_date,
                    })
                    .await?
            }
            None => {
                let draft = LicenseDraft {
                    key: String::new(),
                    account_numbers,
                    max_accounts,
                    expiry_date: request.expiry_date,
                };
                self.create_with_generated_key(draft).await?
            }
        };

        log_license_event(
            LicenseEvent::Created,
            &license.key,
            Some(&format!(
                "id={} accounts={}",
                license.id,
                license.account_numbers.len()
            )),
        );
        Ok(license)
    }

    async fn create_with_generated_key(&self, template: LicenseDraft) -> LicenseResult<License> {
        let attempts = self.settings.max_key_attempts;

        for attempt in 1..=attempts {
            let key = self.generate_key();

            if self.store.get_license_by_key(&key).await?.is_some() {
                debug!(attempt, "Generated key already in use, retrying");
                continue;
            }

            let draft = LicenseDraft {
                key,
                ..template.clone()
            };
            match self.store.create_license(draft).await {
                Ok(license) => return Ok(license),
                Err(LicenseError::DuplicateKey(_)) => {
                    debug!(attempt, "Generated key taken concurrently, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        warn!(attempts, "Could not find a free license key");
        Err(LicenseError::KeyGenerationExhausted(attempts))
    }

    pub async fn get_license_info(&self, key: &str) -> LicenseResult<Option<License>> {
        self.store.get_license_by_key(key).await
    }

    pub async fn get_license(&self, id: &LicenseId) -> LicenseResult<Option<License>> {
        self.store.get_license_by_id(id).await
    }

    pub async fn get_all_licenses(&self) -> LicenseResult<Vec<License>> {
        self.store.get_all_licenses().await
    }

    /// Apply a partial update. A replacement allowlist is deduplicated first.
    pub async fn update_license(
        &self,
        id: &LicenseId,
        mut update: LicenseUpdate,
    ) -> LicenseResult<License> {
        if let Some(accounts) = update.account_numbers.take() {
            update.account_numbers = Some(normalize_accounts(accounts)?);
        }

        let license = self
            .store
            .update_license(id, &update)
            .await?
            .ok_or_else(|| LicenseError::NotFound(id.to_string()))?;

        log_license_event(LicenseEvent::Updated, &license.key, None);
        Ok(license)
    }

    /// `Ok(false)` when no license has this id.
    pub async fn delete_license(&self, id: &LicenseId) -> LicenseResult<bool> {
        let deleted = self.store.delete_license(id).await?;
        if deleted {
            log_license_event(LicenseEvent::Deleted, id.as_str(), None);
        }
        Ok(deleted)
    }

    /// Set the active flag. Idempotent.
    pub async fn toggle_license(&self, id: &LicenseId, active: bool) -> LicenseResult<License> {
        let license = self
            .store
            .update_license(id, &LicenseUpdate::active(active))
            .await?
            .ok_or_else(|| LicenseError::NotFound(id.to_string()))?;

        log_license_event(
            LicenseEvent::Toggled,
            &license.key,
            Some(if active { "enabled" } else { "disabled" }),
        );
        Ok(license)
    }

    /// Invert the active flag. The store flips it atomically, so concurrent
    /// flips are never collapsed into one.
    pub async fn flip_license(&self, id: &LicenseId) -> LicenseResult<License> {
        let license = self
            .store
            .flip_active(id)
            .await?
            .ok_or_else(|| LicenseError::NotFound(id.to_string()))?;

        log_license_event(
            LicenseEvent::Toggled,
            &license.key,
            Some(if license.active { "enabled" } else { "disabled" }),
        );
        Ok(license)
    }

    /// Authorize one more account. Adding an account already present leaves
    /// the allowlist unchanged.
    pub async fn add_account_to_license(
        &self,
        key: &str,
        account_number: &str,
    ) -> LicenseResult<License> {
        if account_number.trim().is_empty() {
            return Err(LicenseError::InvalidInput(
                "account number must not be empty".to_string(),
            ));
        }

        let license = self
            .store
            .add_account(key, account_number)
            .await?
            .ok_or_else(|| LicenseError::NotFound(key.to_string()))?;

        log_license_event(
            LicenseEvent::AccountAdded,
            &license.key,
            Some(&format!("account={account_number}")),
        );
        Ok(license)
    }

    /// Newest entries first, at most `limit` of them.
    pub async fn get_logs(
        &self,
        license_key: Option<&str>,
        limit: usize,
    ) -> LicenseResult<Vec<ValidationLogEntry>> {
        self.store.query_logs(license_key, limit).await
    }
}

fn normalize_accounts(accounts: Vec<String>) -> LicenseResult<Vec<String>> {
    if accounts.iter().any(|a| a.trim().is_empty()) {
        return Err(LicenseError::InvalidInput(
            "account numbers must not be empty".to_string(),
        ));
    }
    Ok(dedup_accounts(accounts))
}

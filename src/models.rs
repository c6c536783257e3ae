//! Records persisted by the storage backends and the inputs that create or
//! change them.
//!
//! JSON field names are camelCase: this is the shape the trading-terminal
//! client and the admin tooling already speak.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque license identifier assigned by the storage backend.
///
/// The file-backed store hands out a monotonically increasing sequence, the
/// SQL stores hand out UUIDs. Callers must not interpret the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseId(pub String);

impl LicenseId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LicenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LicenseId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LicenseId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A license key together with its authorization policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub id: LicenseId,
    pub key: String,
    pub account_numbers: Vec<String>,
    /// Advisory only; validation never compares against it.
    pub max_accounts: u32,
    pub active: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl License {
    pub fn has_account(&self, account_number: &str) -> bool {
        self.account_numbers.iter().any(|a| a == account_number)
    }

    /// `true` once `now` is strictly past the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|expiry| now > expiry)
    }
}

/// Everything the storage backend needs to insert a new license.
///
/// The backend assigns the id and timestamps and always starts the license
/// as active.
#[derive(Debug, Clone)]
pub struct LicenseDraft {
    pub key: String,
    pub account_numbers: Vec<String>,
    pub max_accounts: u32,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl LicenseDraft {
    pub fn into_license(self, id: LicenseId, now: DateTime<Utc>) -> License {
        License {
            id,
            key: self.key,
            account_numbers: self.account_numbers,
            max_accounts: self.max_accounts,
            active: true,
            expiry_date: self.expiry_date,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Administrator request to create a license.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLicense {
    #[serde(default)]
    pub account_numbers: Vec<String>,
    pub max_accounts: Option<u32>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub custom_key: Option<String>,
}

/// Partial update of a license. `None` leaves a field untouched.
///
/// `expiry_date` distinguishes "omitted" (`None`) from "explicitly cleared"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseUpdate {
    /// Replaces the whole allowlist.
    pub account_numbers: Option<Vec<String>>,
    pub max_accounts: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub expiry_date: Option<Option<DateTime<Utc>>>,
    pub active: Option<bool>,
}

impl LicenseUpdate {
    pub fn active(active: bool) -> Self {
        Self {
            active: Some(active),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.account_numbers.is_none()
            && self.max_accounts.is_none()
            && self.expiry_date.is_none()
            && self.active.is_none()
    }

    /// Apply the present fields and refresh `updated_at`.
    pub fn apply(&self, license: &mut License, now: DateTime<Utc>) {
        if let Some(accounts) = &self.account_numbers {
            license.account_numbers = accounts.clone();
        }
        if let Some(max) = self.max_accounts {
            license.max_accounts = max;
        }
        if let Some(expiry) = self.expiry_date {
            license.expiry_date = expiry;
        }
        if let Some(active) = self.active {
            license.active = active;
        }
        license.updated_at = now;
    }
}

/// Maps a present JSON value (including `null`) to `Some(..)`, so that a
/// missing field stays `None` through `#[serde(default)]`.
pub fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Collapse duplicate account numbers, keeping the first occurrence.
pub fn dedup_accounts(accounts: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(accounts.len());
    for account in accounts {
        if !out.contains(&account) {
            out.push(account);
        }
    }
    out
}

/// An audit record about to be appended.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub license_key: String,
    pub account_number: String,
    pub account_name: Option<String>,
    pub server_name: Option<String>,
    pub success: bool,
    /// Set iff `success` is false.
    pub error_message: Option<String>,
}

impl NewLogEntry {
    pub fn into_entry(self, id: String, timestamp: DateTime<Utc>) -> ValidationLogEntry {
        ValidationLogEntry {
            id,
            license_key: self.license_key,
            account_number: self.account_number,
            account_name: self.account_name,
            server_name: self.server_name,
            success: self.success,
            error_message: self.error_message,
            timestamp,
        }
    }
}

/// One validation attempt and its outcome. Never modified after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationLogEntry {
    pub id: String,
    pub license_key: String,
    pub account_number: String,
    pub account_name: Option<String>,
    pub server_name: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn license() -> License {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        LicenseDraft {
            key: "MQL5-TEST".to_string(),
            account_numbers: vec!["1001".to_string()],
            max_accounts: 1,
            expiry_date: None,
        }
        .into_license(LicenseId::from("1"), created)
    }

    #[test]
    fn update_distinguishes_omitted_from_null_expiry() {
        let omitted: LicenseUpdate = serde_json::from_str(r#"{"active":false}"#).unwrap();
        assert_eq!(omitted.expiry_date, None);

        let cleared: LicenseUpdate = serde_json::from_str(r#"{"expiryDate":null}"#).unwrap();
        assert_eq!(cleared.expiry_date, Some(None));

        let set: LicenseUpdate =
            serde_json::from_str(r#"{"expiryDate":"2030-01-01T00:00:00Z"}"#).unwrap();
        assert!(matches!(set.expiry_date, Some(Some(_))));
    }

    #[test]
    fn apply_only_touches_present_fields() {
        let mut lic = license();
        lic.expiry_date = Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        let before = lic.clone();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        LicenseUpdate {
            max_accounts: Some(9),
            ..LicenseUpdate::default()
        }
        .apply(&mut lic, now);

        assert_eq!(lic.max_accounts, 9);
        assert_eq!(lic.account_numbers, before.account_numbers);
        assert_eq!(lic.expiry_date, before.expiry_date);
        assert!(lic.active);
        assert_eq!(lic.updated_at, now);
        assert_eq!(lic.created_at, before.created_at);
    }

    #[test]
    fn apply_clears_expiry_on_explicit_null() {
        let mut lic = license();
        lic.expiry_date = Some(Utc::now());
        LicenseUpdate {
            expiry_date: Some(None),
            ..LicenseUpdate::default()
        }
        .apply(&mut lic, Utc::now());
        assert!(lic.expiry_date.is_none());
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let accounts = vec!["3", "1", "3", "2", "1"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(dedup_accounts(accounts), vec!["3", "1", "2"]);
    }

    #[test]
    fn license_serializes_camel_case() {
        let json = serde_json::to_value(license()).unwrap();
        assert_eq!(json["accountNumbers"][0], "1001");
        assert_eq!(json["maxAccounts"], 1);
        assert!(json["expiryDate"].is_null());
    }
}

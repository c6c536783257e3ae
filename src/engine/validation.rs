//! The validation state machine.
//!
//! [`evaluate`] is a pure function of the stored license, the presented
//! account and the current instant. Checks run in a fixed order and the first
//! failing one decides the outcome:
//!
//! 1. lookup    → `LICENSE_NOT_FOUND`
//! 2. active    → `LICENSE_INACTIVE`
//! 3. expiry    → `LICENSE_EXPIRED` (strictly after the expiry instant)
//! 4. allowlist → `ACCOUNT_NOT_AUTHORIZED` (exact match, never auto-added)
//!
//! [`LicenseEngine::validate`] wraps it with the storage lookup and the audit
//! log write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::engine::LicenseEngine;
use crate::errors::LicenseResult;
use crate::events::{log_license_event, LicenseEvent};
use crate::models::{License, NewLogEntry};
use crate::storage::LicenseStore;

/// Audit reason recorded when the license lookup itself fails.
const STORAGE_FAILURE_REASON: &str = "storage unavailable";

/// Why a validation was refused. Serialized as `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialCode {
    LicenseNotFound,
    LicenseInactive,
    LicenseExpired,
    AccountNotAuthorized,
}

impl DenialCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialCode::LicenseNotFound => "LICENSE_NOT_FOUND",
            DenialCode::LicenseInactive => "LICENSE_INACTIVE",
            DenialCode::LicenseExpired => "LICENSE_EXPIRED",
            DenialCode::AccountNotAuthorized => "ACCOUNT_NOT_AUTHORIZED",
        }
    }
}

impl std::fmt::Display for DenialCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A refused validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Denial {
    pub code: DenialCode,
    /// Short reason written to the audit log.
    pub reason: String,
    /// Message shown to the caller.
    pub message: String,
    /// Current allowlist, only for `ACCOUNT_NOT_AUTHORIZED`.
    pub allowlist: Option<Vec<String>>,
}

/// Outcome of [`evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decision<'a> {
    Granted(&'a License),
    Denied(Denial),
}

impl Decision<'_> {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted(_))
    }
}

/// Decide whether `account_number` may use `license` at `now`.
pub fn evaluate<'a>(
    license: Option<&'a License>,
    account_number: &str,
    now: DateTime<Utc>,
) -> Decision<'a> {
    let Some(license) = license else {
        return Decision::Denied(Denial {
            code: DenialCode::LicenseNotFound,
            reason: "license not found".to_string(),
            message: "This license key does not exist".to_string(),
            allowlist: None,
        });
    };

    if !license.active {
        return Decision::Denied(Denial {
            code: DenialCode::LicenseInactive,
            reason: "license disabled".to_string(),
            message: "This license has been disabled".to_string(),
            allowlist: None,
        });
    }

    if let Some(expiry) = license.expiry_date {
        if now > expiry {
            let date = expiry.format("%Y-%m-%d");
            return Decision::Denied(Denial {
                code: DenialCode::LicenseExpired,
                reason: format!("license expired on {date}"),
                message: format!("This license expired on {date}"),
                allowlist: None,
            });
        }
    }

    if !license.has_account(account_number) {
        return Decision::Denied(Denial {
            code: DenialCode::AccountNotAuthorized,
            reason: "account not authorized".to_string(),
            message: format!(
                "Account {account_number} is not authorized. Contact support to enable it."
            ),
            allowlist: Some(license.account_numbers.clone()),
        });
    }

    Decision::Granted(license)
}

/// A validation request as sent by the client application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub license_key: String,
    pub account_number: String,
    /// Descriptive only; never checked.
    pub account_name: Option<String>,
    /// Descriptive only; never checked.
    pub server_name: Option<String>,
}

impl ValidationRequest {
    pub fn new(license_key: impl Into<String>, account_number: impl Into<String>) -> Self {
        Self {
            license_key: license_key.into(),
            account_number: account_number.into(),
            account_name: None,
            server_name: None,
        }
    }
}

/// Details returned alongside a successful validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantedLicense {
    pub key: String,
    /// Number of accounts on the allowlist.
    pub accounts_used: usize,
    pub max_accounts: u32,
    pub expiry_date: Option<DateTime<Utc>>,
}

/// What the caller gets back from [`LicenseEngine::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DenialCode>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<GrantedLicense>,
    /// Current allowlist, returned with `ACCOUNT_NOT_AUTHORIZED` so an
    /// administrator can follow up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts_used: Option<Vec<String>>,
}

impl From<Decision<'_>> for ValidationResult {
    fn from(decision: Decision<'_>) -> Self {
        match decision {
            Decision::Granted(license) => ValidationResult {
                valid: true,
                error: None,
                message: "License is valid".to_string(),
                license: Some(GrantedLicense {
                    key: license.key.clone(),
                    accounts_used: license.account_numbers.len(),
                    max_accounts: license.max_accounts,
                    expiry_date: license.expiry_date,
                }),
                accounts_used: None,
            },
            Decision::Denied(denial) => ValidationResult {
                valid: false,
                error: Some(denial.code),
                message: denial.message,
                license: None,
                accounts_used: denial.allowlist,
            },
        }
    }
}

impl<S: LicenseStore> LicenseEngine<S> {
    /// Validate a key/account pair and record the attempt.
    ///
    /// Exactly one audit entry is appended per call. A failure to append is
    /// reported through `tracing` and does not change the returned result.
    /// Storage failures during the lookup surface as `StorageUnavailable`,
    /// never as a denial.
    pub async fn validate(&self, request: &ValidationRequest) -> LicenseResult<ValidationResult> {
        let license = match self.store.get_license_by_key(&request.license_key).await {
            Ok(license) => license,
            Err(err) => {
                error!(
                    license_key = %request.license_key,
                    "License lookup failed during validation: {err}"
                );
                self.record_attempt(request, Some(STORAGE_FAILURE_REASON.to_string()))
                    .await;
                return Err(err);
            }
        };

        let decision = evaluate(license.as_ref(), &request.account_number, Utc::now());

        let failure = match &decision {
            Decision::Granted(_) => {
                log_license_event(
                    LicenseEvent::Validated,
                    &request.license_key,
                    Some(&format!("account={}", request.account_number)),
                );
                None
            }
            Decision::Denied(denial) => {
                log_license_event(
                    LicenseEvent::ValidationFailed,
                    &request.license_key,
                    Some(&format!(
                        "{} (account={})",
                        denial.code, request.account_number
                    )),
                );
                Some(denial.reason.clone())
            }
        };

        self.record_attempt(request, failure).await;

        Ok(decision.into())
    }

    /// Append the audit entry; `error_message` is `None` for a success.
    async fn record_attempt(&self, request: &ValidationRequest, error_message: Option<String>) {
        let entry = NewLogEntry {
            license_key: request.license_key.clone(),
            account_number: request.account_number.clone(),
            account_name: request.account_name.clone(),
            server_name: request.server_name.clone(),
            success: error_message.is_none(),
            error_message,
        };

        if let Err(err) = self.store.append_log(entry).await {
            error!(
                license_key = %request.license_key,
                account_number = %request.account_number,
                "Failed to record validation attempt: {err}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LicenseDraft, LicenseId};
    use chrono::{Duration, TimeZone};

    fn license(active: bool, expiry: Option<DateTime<Utc>>) -> License {
        let mut license = LicenseDraft {
            key: "MQL5-TEST".to_string(),
            account_numbers: vec!["1001".to_string(), "1002".to_string()],
            max_accounts: 5,
            expiry_date: expiry,
        }
        .into_license(LicenseId::from("1"), Utc::now());
        license.active = active;
        license
    }

    fn code(decision: &Decision<'_>) -> Option<DenialCode> {
        match decision {
            Decision::Granted(_) => None,
            Decision::Denied(d) => Some(d.code),
        }
    }

    #[test]
    fn missing_license_is_not_found() {
        let decision = evaluate(None, "1001", Utc::now());
        assert_eq!(code(&decision), Some(DenialCode::LicenseNotFound));
    }

    #[test]
    fn inactive_is_checked_before_expiry() {
        let now = Utc::now();
        let lic = license(false, Some(now - Duration::days(30)));
        let decision = evaluate(Some(&lic), "1001", now);
        assert_eq!(code(&decision), Some(DenialCode::LicenseInactive));
    }

    #[test]
    fn expiry_is_checked_before_allowlist() {
        let now = Utc::now();
        let lic = license(true, Some(now - Duration::seconds(1)));
        let decision = evaluate(Some(&lic), "9999", now);
        assert_eq!(code(&decision), Some(DenialCode::LicenseExpired));
    }

    #[test]
    fn expiry_boundary_is_strict() {
        let expiry = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
        let lic = license(true, Some(expiry));

        assert!(evaluate(Some(&lic), "1001", expiry).is_granted());

        let just_after = expiry + Duration::microseconds(1);
        assert_eq!(
            code(&evaluate(Some(&lic), "1001", just_after)),
            Some(DenialCode::LicenseExpired)
        );
    }

    #[test]
    fn expired_reason_carries_the_date() {
        let expiry = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let lic = license(true, Some(expiry));
        match evaluate(Some(&lic), "1001", expiry + Duration::days(1)) {
            Decision::Denied(denial) => {
                assert_eq!(denial.reason, "license expired on 2024-03-15");
            }
            Decision::Granted(_) => panic!("expected expiry denial"),
        }
    }

    #[test]
    fn unknown_account_is_refused_with_allowlist() {
        let lic = license(true, None);
        match evaluate(Some(&lic), "2002", Utc::now()) {
            Decision::Denied(denial) => {
                assert_eq!(denial.code, DenialCode::AccountNotAuthorized);
                assert_eq!(denial.reason, "account not authorized");
                assert_eq!(denial.allowlist, Some(vec!["1001".into(), "1002".into()]));
            }
            Decision::Granted(_) => panic!("expected allowlist denial"),
        }
    }

    #[test]
    fn account_match_is_exact() {
        let lic = license(true, None);
        assert!(!evaluate(Some(&lic), " 1001", Utc::now()).is_granted());
        assert!(!evaluate(Some(&lic), "100", Utc::now()).is_granted());
        assert!(evaluate(Some(&lic), "1002", Utc::now()).is_granted());
    }

    #[test]
    fn granted_result_reports_usage() {
        let lic = license(true, None);
        let result: ValidationResult = evaluate(Some(&lic), "1001", Utc::now()).into();
        assert!(result.valid);
        let granted = result.license.unwrap();
        assert_eq!(granted.key, "MQL5-TEST");
        assert_eq!(granted.accounts_used, 2);
        assert_eq!(granted.max_accounts, 5);
    }

    #[test]
    fn denied_result_serializes_error_code() {
        let result: ValidationResult = evaluate(None, "1001", Utc::now()).into();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["error"], "LICENSE_NOT_FOUND");
        assert!(json.get("license").is_none());
    }
}

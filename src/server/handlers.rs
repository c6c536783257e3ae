//! Axum handlers for the public validation endpoint and the admin API.
//!
//! Successful admin responses keep the `{ "success": true, ... }` envelope
//! the admin dashboard expects. Failures go through [`ApiError`].

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::{LicenseEngine, Statistics, ValidationRequest, ValidationResult};
use crate::models::{
    deserialize_some, License, LicenseId, LicenseUpdate, NewLicense, ValidationLogEntry,
};
use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::logging::HealthResponse;
use crate::server::validation::{
    parse_expiry, validate_account_number, validate_custom_key, validate_length,
    MAX_FIELD_LENGTH,
};
use crate::storage::{LicenseStore, Storage};

/// Default number of log entries returned by `GET /api/logs`.
pub const DEFAULT_LOG_LIMIT: usize = 100;
/// Upper bound on `limit` for `GET /api/logs`.
pub const MAX_LOG_LIMIT: usize = 1000;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LicenseEngine<Storage>>,
    /// `None` disables the admin routes.
    pub admin_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(engine: Arc<LicenseEngine<Storage>>, admin_secret: &str) -> Self {
        Self {
            engine,
            admin_secret: (!admin_secret.is_empty()).then(|| Arc::from(admin_secret)),
        }
    }
}

/// An account number as sent by clients: MQL5 sends a number, the admin
/// dashboard sends a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AccountNumberInput {
    Text(String),
    Number(serde_json::Number),
}

impl AccountNumberInput {
    pub fn into_string(self) -> String {
        match self {
            AccountNumberInput::Text(s) => s,
            AccountNumberInput::Number(n) => n.to_string(),
        }
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| {
            ApiError::with_message(ErrorCode::InvalidRequest, rejection.body_text())
        })
}

fn account_list(
    accounts: Vec<AccountNumberInput>,
    field_name: &str,
) -> Result<Vec<String>, ApiError> {
    accounts
        .into_iter()
        .map(|account| -> Result<String, ApiError> {
            let account = account.into_string();
            validate_account_number(&account, field_name)?;
            Ok(account)
        })
        .collect()
}

// === Public endpoints ===

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub status: String,
}

/// `GET /`
pub async fn root_handler() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "licensegate".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "online".to_string(),
    })
}

/// `GET /health` - 503 when the storage backend does not answer.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.engine.store();
    let connected = store.count_licenses().await.is_ok();
    let health = HealthResponse::from_probe(connected, store.backend_name());

    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateBody {
    pub license_key: Option<String>,
    pub account_number: Option<AccountNumberInput>,
    pub account_name: Option<String>,
    pub server_name: Option<String>,
}

/// `POST /api/validate`
///
/// Grants and denials are both `200 OK`; only malformed requests and storage
/// failures produce an error status.
pub async fn validate_handler(
    State(state): State<AppState>,
    payload: Result<Json<ValidateBody>, JsonRejection>,
) -> Result<Json<ValidationResult>, ApiError> {
    let body = json_body(payload)?;

    let license_key = body
        .license_key
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ApiError::missing_field("licenseKey"))?;
    let account_number = body
        .account_number
        .map(AccountNumberInput::into_string)
        .filter(|account| !account.trim().is_empty())
        .ok_or_else(|| ApiError::missing_field("accountNumber"))?;

    validate_length(&license_key, 1, MAX_FIELD_LENGTH, "licenseKey")?;
    validate_length(&account_number, 1, MAX_FIELD_LENGTH, "accountNumber")?;

    let request = ValidationRequest {
        license_key,
        account_number,
        account_name: body.account_name,
        server_name: body.server_name,
    };

    let result = state.engine.validate(&request).await?;
    Ok(Json(result))
}

// === Admin endpoints ===

#[derive(Debug, Serialize, Deserialize)]
pub struct LicenseListResponse {
    pub success: bool,
    pub licenses: Vec<License>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LicenseResponse {
    pub success: bool,
    pub license: License,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateLicenseResponse {
    pub success: bool,
    pub message: String,
    pub license: License,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: Statistics,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub success: bool,
    pub logs: Vec<ValidationLogEntry>,
}

/// `GET /api/licenses`
pub async fn list_licenses_handler(
    State(state): State<AppState>,
) -> Result<Json<LicenseListResponse>, ApiError> {
    let licenses = state.engine.get_all_licenses().await?;
    Ok(Json(LicenseListResponse {
        success: true,
        licenses,
    }))
}

/// `GET /api/licenses/:key`
pub async fn get_license_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LicenseResponse>, ApiError> {
    let license = state
        .engine
        .get_license_info(&key)
        .await?
        .ok_or_else(|| ApiError::license_not_found(&key))?;

    Ok(Json(LicenseResponse {
        success: true,
        license,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLicenseBody {
    #[serde(default)]
    pub account_numbers: Vec<AccountNumberInput>,
    pub max_accounts: Option<u32>,
    pub expiry_date: Option<String>,
    pub custom_key: Option<String>,
}

/// `POST /api/licenses` - 201 with the stored license.
pub async fn create_license_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateLicenseBody>, JsonRejection>,
) -> Result<(StatusCode, Json<LicenseResponse>), ApiError> {
    let body = json_body(payload)?;

    let account_numbers = account_list(body.account_numbers, "accountNumbers")?;

    let custom_key = body.custom_key.filter(|key| !key.trim().is_empty());
    if let Some(key) = &custom_key {
        validate_custom_key(key, "customKey")?;
    }

    let expiry_date = match body.expiry_date.as_deref() {
        Some(value) if !value.trim().is_empty() => Some(parse_expiry(value, "expiryDate")?),
        _ => None,
    };

    let license = state
        .engine
        .create_license(NewLicense {
            account_numbers,
            max_accounts: body.max_accounts,
            expiry_date,
            custom_key,
        })
        .await?;

    info!(license_id = %license.id, "License created via admin API");

    Ok((
        StatusCode::CREATED,
        Json(LicenseResponse {
            success: true,
            license,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLicenseBody {
    pub account_numbers: Option<Vec<AccountNumberInput>>,
    pub max_accounts: Option<u32>,
    /// Omitted leaves the expiry alone; `null` or `""` clears it.
    #[serde(default, deserialize_with = "deserialize_some")]
    pub expiry_date: Option<Option<String>>,
    pub active: Option<bool>,
}

/// `PUT /api/licenses/:id`
pub async fn update_license_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateLicenseBody>, JsonRejection>,
) -> Result<Json<UpdateLicenseResponse>, ApiError> {
    let body = json_body(payload)?;

    let account_numbers = body
        .account_numbers
        .map(|accounts| account_list(accounts, "accountNumbers"))
        .transpose()?;

    let expiry_date = match body.expiry_date {
        None => None,
        Some(None) => Some(None),
        Some(Some(value)) if value.trim().is_empty() => Some(None),
        Some(Some(value)) => Some(Some(parse_expiry(&value, "expiryDate")?)),
    };

    let update = LicenseUpdate {
        account_numbers,
        max_accounts: body.max_accounts,
        expiry_date,
        active: body.active,
    };

    let license = state
        .engine
        .update_license(&LicenseId::from(id), update)
        .await?;

    Ok(Json(UpdateLicenseResponse {
        success: true,
        message: "License updated".to_string(),
        license,
    }))
}

/// `DELETE /api/licenses/:id`
pub async fn delete_license_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.engine.delete_license(&LicenseId::from(id.as_str())).await? {
        return Err(ApiError::license_not_found(&id));
    }

    Ok(Json(MessageResponse {
        success: true,
        message: "License deleted".to_string(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ToggleBody {
    /// Target state; flips the current one when omitted.
    pub active: Option<bool>,
}

/// `POST /api/licenses/:id/toggle`
pub async fn toggle_license_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<ToggleBody>>,
) -> Result<Json<LicenseResponse>, ApiError> {
    let id = LicenseId::from(id);
    let license = match payload.and_then(|Json(body)| body.active) {
        Some(active) => state.engine.toggle_license(&id, active).await?,
        None => state.engine.flip_license(&id).await?,
    };
    Ok(Json(LicenseResponse {
        success: true,
        license,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAccountBody {
    pub license_key: Option<String>,
    pub account_number: Option<AccountNumberInput>,
}

/// `POST /api/accounts` - authorize one more account on a license.
pub async fn add_account_handler(
    State(state): State<AppState>,
    payload: Result<Json<AddAccountBody>, JsonRejection>,
) -> Result<Json<LicenseResponse>, ApiError> {
    let body = json_body(payload)?;

    let license_key = body
        .license_key
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ApiError::missing_field("licenseKey"))?;
    let account_number = body
        .account_number
        .map(AccountNumberInput::into_string)
        .ok_or_else(|| ApiError::missing_field("accountNumber"))?;
    validate_account_number(&account_number, "accountNumber")?;

    let license = state
        .engine
        .add_account_to_license(&license_key, &account_number)
        .await?;

    Ok(Json(LicenseResponse {
        success: true,
        license,
    }))
}

/// `GET /api/stats`
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.engine.get_statistics().await?;
    Ok(Json(StatsResponse {
        success: true,
        stats,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub license_key: Option<String>,
    /// Parsed leniently: anything that is not a positive integer means the default.
    pub limit: Option<String>,
}

impl LogsQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|&limit| limit > 0)
            .unwrap_or(DEFAULT_LOG_LIMIT)
            .min(MAX_LOG_LIMIT)
    }
}

/// `GET /api/logs?licenseKey=&limit=`
pub async fn logs_handler(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    let filter = query.license_key.as_deref().filter(|key| !key.is_empty());
    let logs = state
        .engine
        .get_logs(filter, query.effective_limit())
        .await?;

    Ok(Json(LogsResponse {
        success: true,
        logs,
    }))
}

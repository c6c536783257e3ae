//! Startup provisioning of a fixed license.
//!
//! Products that ship with one hard-coded key need that license to exist
//! before the first client connects. There are two ways to get it:
//!
//! 1. **Configuration**: set `bootstrap.license_key`
//!    (`LICENSEGATE_BOOTSTRAP_LICENSE_KEY`). The server creates the license on
//!    startup if it is missing, then serves as usual.
//!
//! 2. **CLI Command**: run `licensegate_server init-license --key <KEY>` to
//!    create it once and exit.
//!
//! The license is created with an empty allowlist and no expiry; accounts are
//! added afterwards through the admin API. An existing license is never
//! modified.

use tracing::info;

use crate::config::BootstrapConfig;
use crate::engine::LicenseEngine;
use crate::errors::LicenseResult;
use crate::models::{License, NewLicense};
use crate::storage::LicenseStore;

/// What [`ensure_license`] found or did.
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapOutcome {
    Created(License),
    AlreadyPresent(License),
}

impl BootstrapOutcome {
    pub fn license(&self) -> &License {
        match self {
            BootstrapOutcome::Created(license) | BootstrapOutcome::AlreadyPresent(license) => {
                license
            }
        }
    }
}

/// Make sure a license with `key` exists.
pub async fn ensure_license<S: LicenseStore>(
    engine: &LicenseEngine<S>,
    key: &str,
    max_accounts: u32,
) -> LicenseResult<BootstrapOutcome> {
    if let Some(existing) = engine.get_license_info(key).await? {
        info!(
            license_key = %existing.key,
            accounts = existing.account_numbers.len(),
            max_accounts = existing.max_accounts,
            active = existing.active,
            "Bootstrap license already present"
        );
        return Ok(BootstrapOutcome::AlreadyPresent(existing));
    }

    let license = engine
        .create_license(NewLicense {
            account_numbers: Vec::new(),
            max_accounts: Some(max_accounts),
            expiry_date: None,
            custom_key: Some(key.to_string()),
        })
        .await?;

    info!(
        license_key = %license.key,
        max_accounts = license.max_accounts,
        "Bootstrap license created"
    );
    Ok(BootstrapOutcome::Created(license))
}

/// Apply the `bootstrap` configuration section. `Ok(None)` when no fixed key
/// is configured.
pub async fn run_bootstrap<S: LicenseStore>(
    engine: &LicenseEngine<S>,
    config: &BootstrapConfig,
) -> LicenseResult<Option<BootstrapOutcome>> {
    match config.license_key.as_deref() {
        Some(key) => ensure_license(engine, key, config.max_accounts)
            .await
            .map(Some),
        None => Ok(None),
    }
}

/// Command selected on the server command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    /// Create the fixed license and exit.
    InitLicense {
        key: Option<String>,
        max_accounts: Option<u32>,
    },
    /// No command (run server normally)
    Serve,
}

/// Parse CLI arguments.
///
/// # Supported Commands
///
/// ```text
/// licensegate_server
/// licensegate_server init-license [--key <KEY>] [--max-accounts <N>]
/// ```
///
/// Options left out fall back to the `bootstrap` configuration section.
pub fn parse_command(args: &[String]) -> ServerCommand {
    if args.len() < 2 || args[1] != "init-license" {
        return ServerCommand::Serve;
    }

    let mut key = None;
    let mut max_accounts = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--key" | "-k" => {
                key = args.get(i + 1).cloned();
                i += 2;
            }
            "--max-accounts" | "-m" => {
                max_accounts = args.get(i + 1).and_then(|raw| raw.parse().ok());
                i += 2;
            }
            _ => i += 1,
        }
    }

    ServerCommand::InitLicense { key, max_accounts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_serve_by_default() {
        assert_eq!(parse_command(&args(&["licensegate_server"])), ServerCommand::Serve);
        assert_eq!(
            parse_command(&args(&["licensegate_server", "bogus"])),
            ServerCommand::Serve
        );
    }

    #[test]
    fn parse_init_license_options() {
        let cmd = parse_command(&args(&[
            "licensegate_server",
            "init-license",
            "--key",
            "MQL5-INDICATOR-PROD-2024-V1",
            "--max-accounts",
            "50",
        ]));
        assert_eq!(
            cmd,
            ServerCommand::InitLicense {
                key: Some("MQL5-INDICATOR-PROD-2024-V1".to_string()),
                max_accounts: Some(50),
            }
        );

        let bare = parse_command(&args(&["licensegate_server", "init-license", "--key"]));
        assert_eq!(
            bare,
            ServerCommand::InitLicense {
                key: None,
                max_accounts: None
            }
        );
    }

    #[tokio::test]
    async fn ensure_license_creates_once() {
        let engine = LicenseEngine::with_defaults(MemoryStore::new());

        let first = ensure_license(&engine, "MQL5-FIXED-KEY", 999).await.unwrap();
        assert!(matches!(first, BootstrapOutcome::Created(_)));
        assert_eq!(first.license().max_accounts, 999);
        assert!(first.license().account_numbers.is_empty());
        assert!(first.license().expiry_date.is_none());

        engine
            .add_account_to_license("MQL5-FIXED-KEY", "1001")
            .await
            .unwrap();

        let second = ensure_license(&engine, "MQL5-FIXED-KEY", 5).await.unwrap();
        assert!(matches!(second, BootstrapOutcome::AlreadyPresent(_)));
        assert_eq!(second.license().account_numbers, vec!["1001"]);
        assert_eq!(second.license().max_accounts, 999);
    }

    #[tokio::test]
    async fn run_bootstrap_without_key_is_noop() {
        let engine = LicenseEngine::with_defaults(MemoryStore::new());
        let config = BootstrapConfig {
            license_key: None,
            max_accounts: 999,
        };
        assert!(run_bootstrap(&engine, &config).await.unwrap().is_none());
        assert_eq!(engine.get_all_licenses().await.unwrap().len(), 0);
    }
}

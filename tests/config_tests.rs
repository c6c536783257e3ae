use std::env;
use std::path::PathBuf;

use licensegate::config::LicensegateConfig;
use serial_test::serial;

const VARS: &[&str] = &[
    "LICENSEGATE_SERVER_HOST",
    "LICENSEGATE_SERVER_PORT",
    "PORT",
    "LICENSEGATE_STORAGE_BACKEND",
    "LICENSEGATE_DATA_DIR",
    "LICENSEGATE_DATABASE_URL",
    "LICENSEGATE_LICENSE_KEY_PREFIX",
    "LICENSEGATE_LOGGING_ENABLED",
    "LICENSEGATE_LOG_LEVEL",
    "LICENSEGATE_ADMIN_SECRET",
    "ADMIN_SECRET",
    "LICENSEGATE_BOOTSTRAP_LICENSE_KEY",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn load_uses_defaults_without_env() {
    clear_env();

    let config = LicensegateConfig::load().expect("load config");
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.license.key_prefix, "MQL5");
    assert_eq!(config.license.max_key_attempts, 10);
    assert_eq!(config.storage.backend, "json");
    assert_eq!(config.bootstrap.max_accounts, 999);
    assert!(config.bootstrap.license_key.is_none());
    assert!(config.admin.secret.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn env_overrides_apply() {
    clear_env();
    env::set_var("LICENSEGATE_SERVER_PORT", "8088");
    env::set_var("LICENSEGATE_STORAGE_BACKEND", "memory");
    env::set_var("LICENSEGATE_DATA_DIR", "/tmp/licensegate-data");
    env::set_var("LICENSEGATE_LICENSE_KEY_PREFIX", "PRO");
    env::set_var("LICENSEGATE_LOG_LEVEL", "debug");
    env::set_var("LICENSEGATE_BOOTSTRAP_LICENSE_KEY", "MQL5-INDICATOR-PROD-2024-V1");

    let config = LicensegateConfig::load().expect("load config");
    assert_eq!(config.server.port, 8088);
    assert_eq!(config.storage.backend, "memory");
    assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/licensegate-data"));
    assert_eq!(config.license.key_prefix, "PRO");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(
        config.bootstrap.license_key.as_deref(),
        Some("MQL5-INDICATOR-PROD-2024-V1")
    );

    clear_env();
}

#[test]
#[serial]
fn plain_port_and_admin_secret_are_fallbacks() {
    clear_env();
    env::set_var("PORT", "9000");
    env::set_var("ADMIN_SECRET", "from-plain-var");

    let config = LicensegateConfig::load().expect("load config");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.admin.secret, "from-plain-var");

    env::set_var("LICENSEGATE_SERVER_PORT", "9100");
    env::set_var("LICENSEGATE_ADMIN_SECRET", "prefixed");
    let config = LicensegateConfig::load().expect("load config");
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.admin.secret, "prefixed");

    clear_env();
}

#[test]
#[serial]
fn database_url_is_routed_by_scheme() {
    clear_env();
    env::set_var("LICENSEGATE_DATABASE_URL", "postgres://db.internal/licenses");

    let config = LicensegateConfig::load().expect("load config");
    assert_eq!(config.storage.postgres_url, "postgres://db.internal/licenses");
    assert_eq!(config.storage.sqlite_url, "sqlite://licensegate.db?mode=rwc");

    env::set_var("LICENSEGATE_DATABASE_URL", "sqlite::memory:");
    let config = LicensegateConfig::load().expect("load config");
    assert_eq!(config.storage.sqlite_url, "sqlite::memory:");

    clear_env();
}

#[test]
#[serial]
fn invalid_backend_fails_validation() {
    clear_env();
    env::set_var("LICENSEGATE_STORAGE_BACKEND", "mongodb");

    let config = LicensegateConfig::load().expect("load config");
    assert!(config.validate().is_err());

    clear_env();
}

//! Structured tracing for license state changes.
//!
//! These events go to the operational log (whatever `tracing` subscriber the
//! host installs). The durable audit trail of validation attempts is the
//! validation log kept by the storage backend, not this.

use tracing::{info, info_span, warn};

/// License state change event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    Created,
    Updated,
    Toggled,
    Deleted,
    AccountAdded,
    Validated,
    ValidationFailed,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Created => "created",
            LicenseEvent::Updated => "updated",
            LicenseEvent::Toggled => "toggled",
            LicenseEvent::Deleted => "deleted",
            LicenseEvent::AccountAdded => "account_added",
            LicenseEvent::Validated => "validated",
            LicenseEvent::ValidationFailed => "validation_failed",
        };
        write!(f, "{}", s)
    }
}

/// Log a license state change event.
///
/// # Arguments
///
/// * `event` - The type of license event
/// * `license` - The license key, or the id when only the id is known
/// * `details` - Optional additional details about the event
pub fn log_license_event(event: LicenseEvent, license: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        license = %license,
    );
    let _enter = span.enter();

    match event {
        LicenseEvent::ValidationFailed => {
            if let Some(d) = details {
                warn!(reason = %d, "License event occurred");
            } else {
                warn!("License event occurred");
            }
        }
        _ => {
            if let Some(d) = details {
                info!(details = %d, "License event occurred");
            } else {
                info!("License event occurred");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(LicenseEvent::AccountAdded.to_string(), "account_added");
        assert_eq!(
            LicenseEvent::ValidationFailed.to_string(),
            "validation_failed"
        );
    }

    #[test]
    fn logging_without_subscriber_is_harmless() {
        log_license_event(LicenseEvent::Created, "MQL5-TEST", None);
        log_license_event(
            LicenseEvent::ValidationFailed,
            "MQL5-TEST",
            Some("license disabled"),
        );
    }
}

//! Aggregate counters for the admin dashboard.

use serde::{Deserialize, Serialize};

use crate::engine::LicenseEngine;
use crate::errors::LicenseResult;
use crate::storage::LicenseStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_licenses: u64,
    pub active_licenses: u64,
    pub total_validations: u64,
    pub successful_validations: u64,
    /// Percentage in `0.0..=100.0`, rounded to two decimals.
    pub success_rate: f64,
}

/// Successful attempts as a percentage of all attempts. `0.0` when there
/// were no attempts.
pub fn success_rate(successful: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = successful as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

impl<S: LicenseStore> LicenseEngine<S> {
    pub async fn get_statistics(&self) -> LicenseResult<Statistics> {
        let (total_licenses, active_licenses, total_validations, successful_validations) =
            tokio::try_join!(
                self.store.count_licenses(),
                self.store.count_active_licenses(),
                self.store.count_logs(),
                self.store.count_successful_logs(),
            )?;

        Ok(Statistics {
            total_licenses,
            active_licenses,
            total_validations,
            successful_validations,
            success_rate: success_rate(successful_validations, total_validations),
        })
    }
}

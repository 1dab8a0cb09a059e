//! Engine tunables. Loaded by `configs`, defaults match the deployed service.

use chrono::Duration;
use domains::geo::BoundingBox;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Reports closer than this (strictly) to a pothole attach to it.
    pub distance_threshold_m: f64,
    /// Lifetime of a freshly created pothole.
    pub expiry_primary_days: i64,
    /// Lifetime granted on every new report or resubmission.
    pub expiry_refresh_days: i64,
    /// A report whose net score drops to this value or below is deleted.
    pub report_deletion_threshold: i64,
    /// Service area; reports outside it are rejected.
    pub bounding_box: BoundingBox,
}

impl EngineSettings {
    pub fn primary_ttl(&self) -> Duration {
        Duration::days(self.expiry_primary_days)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::days(self.expiry_refresh_days)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            distance_threshold_m: 15.0,
            expiry_primary_days: 60,
            expiry_refresh_days: 30,
            report_deletion_threshold: -5,
            bounding_box: BoundingBox::TRINIDAD_AND_TOBAGO,
        }
    }
}

//! Spatiotemporal alert clustering
//!
//! Groups alerts that are close in space and time into incident candidates.
//! The scan is deterministic: candidates are evaluated in ascending alert_id
//! order, so the same snapshot always produces the same grouping.

use serde::{Deserialize, Serialize};

use crate::model::{Alert, AlertId};

/// Mean Earth radius in kilometers, for the haversine distance
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Clustering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Maximum distance (inclusive) between the new alert and a candidate
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,

    /// How far back from the new alert's capture time candidates may lie
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,

    /// Minimum group size (the new alert counts) to open an incident
    #[serde(default = "default_threshold")]
    pub threshold: usize,
}

// Defaults
fn default_radius_km() -> f64 {
    2.0
}
fn default_window_minutes() -> i64 {
    120
}
fn default_threshold() -> usize {
    3
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            radius_km: default_radius_km(),
            window_minutes: default_window_minutes(),
            threshold: default_threshold(),
        }
    }
}

/// Great-circle distance between two coordinates in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[derive(Debug, Clone)]
pub struct ClusterEngine {
    config: ClusterConfig,
}

impl ClusterEngine {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Decide whether `alert` completes a cluster against the candidate
    /// snapshot. Candidates must already be window-filtered and unescalated;
    /// the engine applies the distance test and the size threshold.
    ///
    /// Returns the member alert_ids with `alert` last, or `None` when the
    /// group stays below the threshold. Candidates without coordinates are
    /// skipped, as is the alert itself if the snapshot contains it.
    pub fn correlate(&self, alert: &Alert, candidates: &[Alert]) -> Option<Vec<AlertId>> {
        let (lat, lng) = match (alert.lat, alert.lng) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => return None,
        };

        let mut members: Vec<AlertId> = Vec::new();
        for candidate in candidates {
            if candidate.alert_id == alert.alert_id {
                continue;
            }
            let (c_lat, c_lng) = match (candidate.lat, candidate.lng) {
                (Some(c_lat), Some(c_lng)) => (c_lat, c_lng),
                _ => continue,
            };
            if haversine_km(lat, lng, c_lat, c_lng) <= self.config.radius_km {
                members.push(candidate.alert_id.clone());
            }
        }

        if members.len() + 1 < self.config.threshold {
            return None;
        }

        members.push(alert.alert_id.clone());
        Some(members)
    }
}

// src/config.rs
//! Pipeline configuration: defaults, JSON files and environment overrides

use crate::error::{NmeaError, Result};
use crate::geofence::Geofence;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_IDLE_TIMEOUT_MS: &str = "NMEA_IDLE_TIMEOUT_MS";
pub const ENV_HISTORY_CAPACITY: &str = "NMEA_HISTORY_CAPACITY";
pub const ENV_MIN_MOVEMENT: &str = "NMEA_MIN_MOVEMENT";
pub const ENV_GEOFENCES: &str = "NMEA_GEOFENCES";
pub const ENV_STRICT_CHECKSUM: &str = "NMEA_STRICT_CHECKSUM";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Idle time after which an open block is closed.
    pub idle_timeout_ms: u64,
    /// Number of fixes kept for movement computation.
    pub history_capacity: usize,
    /// Distance under which callers may treat a fix as stationary.
    pub min_movement_meters: f64,
    pub geofences: Vec<Geofence>,
    /// Drop sentences whose checksum does not match instead of decoding them.
    pub strict_checksum: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 1000,
            history_capacity: 10,
            min_movement_meters: 1.0,
            geofences: Vec::new(),
            strict_checksum: false,
        }
    }
}

impl PipelineConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)
            .map_err(|e| NmeaError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            NmeaError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    /// Defaults overlaid with the `NMEA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_IDLE_TIMEOUT_MS) {
            config.idle_timeout_ms = parse_var(ENV_IDLE_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_HISTORY_CAPACITY) {
            config.history_capacity = parse_var(ENV_HISTORY_CAPACITY, &value)?;
        }
        if let Some(value) = lookup(ENV_MIN_MOVEMENT) {
            config.min_movement_meters = parse_var(ENV_MIN_MOVEMENT, &value)?;
        }
        if let Some(value) = lookup(ENV_GEOFENCES) {
            config.geofences = serde_json::from_str(&value)
                .map_err(|e| NmeaError::Config(format!("Invalid {}: {}", ENV_GEOFENCES, e)))?;
        }
        if let Some(value) = lookup(ENV_STRICT_CHECKSUM) {
            config.strict_checksum = parse_bool(&value);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every rule and report all violations together.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.idle_timeout_ms == 0 {
            errors.push("idle_timeout_ms must be greater than 0".to_string());
        }
        if self.history_capacity < 1 {
            errors.push("history_capacity must be at least 1".to_string());
        }
        if !self.min_movement_meters.is_finite() || self.min_movement_meters < 0.0 {
            errors.push(format!(
                "min_movement_meters must be >= 0, got {}",
                self.min_movement_meters
            ));
        }
        for fence in &self.geofences {
            if !(-90.0..=90.0).contains(&fence.lat) {
                errors.push(format!("geofence {}: lat {} out of range", fence.name, fence.lat));
            }
            if !(-180.0..=180.0).contains(&fence.lon) {
                errors.push(format!("geofence {}: lon {} out of range", fence.name, fence.lon));
            }
            if !fence.radius_m.is_finite() || fence.radius_m < 0.0 {
                errors.push(format!(
                    "geofence {}: radius_m must be >= 0, got {}",
                    fence.name, fence.radius_m
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NmeaError::Config(errors.join("; ")))
        }
    }

    pub fn add_geofence(&mut self, fence: Geofence) {
        self.geofences.push(fence);
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| NmeaError::Config(format!("Invalid {}={:?}: {}", key, value, e)))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Engine configuration.
///
/// All fields have serde defaults so a host can deserialize a partial
/// config. `validate` is called at engine construction; an invalid config
/// never produces an engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lowest candidate score that still counts as a match (0.0 to 1.0).
    #[serde(default = "default_match_threshold")]
    pub minimum_match_threshold: f64,

    /// Scores in `[minimum_match_threshold, reuse_threshold)` yield
    /// `pending` when `require_reconsent` is set; at or above this the
    /// consent is reused outright.
    #[serde(default = "default_reuse_threshold")]
    pub reuse_threshold: f64,

    /// Expiry cap applied to emergency-override approvals.
    #[serde(default = "default_emergency_cap_hours")]
    pub emergency_cap_hours: u32,

    /// Largest consent tree accepted, counted over all provisions.
    #[serde(default = "default_max_provision_nodes")]
    pub max_provision_nodes: usize,

    /// Deepest consent tree accepted.
    #[serde(default = "default_max_provision_depth")]
    pub max_provision_depth: usize,

    /// When true, `parse_instant` accepts only RFC 3339 forms with an
    /// explicit zone; the documented unsuffixed-UTC forms are rejected.
    #[serde(default = "default_strict_timestamp_parsing")]
    pub strict_timestamp_parsing: bool,

    /// When true, matches below `reuse_threshold` come back as `pending`
    /// so the host can run an explicit reconsent flow. Off by default;
    /// simple deployments then never observe `pending`.
    #[serde(default)]
    pub require_reconsent: bool,
}

fn default_match_threshold() -> f64 {
    0.7
}

fn default_reuse_threshold() -> f64 {
    0.8
}

fn default_emergency_cap_hours() -> u32 {
    24
}

fn default_max_provision_nodes() -> usize {
    256
}

fn default_max_provision_depth() -> usize {
    16
}

fn default_strict_timestamp_parsing() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            minimum_match_threshold: default_match_threshold(),
            reuse_threshold: default_reuse_threshold(),
            emergency_cap_hours: default_emergency_cap_hours(),
            max_provision_nodes: default_max_provision_nodes(),
            max_provision_depth: default_max_provision_depth(),
            strict_timestamp_parsing: default_strict_timestamp_parsing(),
            require_reconsent: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.minimum_match_threshold)
            || !self.minimum_match_threshold.is_finite()
        {
            return Err(ConfigError::MatchThresholdOutOfRange(
                self.minimum_match_threshold,
            ));
        }
        if !self.reuse_threshold.is_finite()
            || self.reuse_threshold < self.minimum_match_threshold
            || self.reuse_threshold > 1.0
        {
            return Err(ConfigError::ReuseThresholdOutOfRange {
                reuse: self.reuse_threshold,
                minimum: self.minimum_match_threshold,
            });
        }
        if self.emergency_cap_hours < 1 {
            return Err(ConfigError::EmergencyCapZero);
        }
        if self.max_provision_nodes < 1 || self.max_provision_depth < 1 {
            return Err(ConfigError::ProvisionBoundsZero);
        }
        Ok(())
    }
}

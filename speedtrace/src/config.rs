//! Pipeline configuration, loaded from TOML.
//!
//! ```toml
//! time_unit = "seconds"
//! pixels_per_ms = 0.5
//! significance_px = 1.0
//! aggregate_significance_px = 5.0
//! drop_negative_times = true
//! profiles = true
//! ```

use crate::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unit of raw source-clock timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    #[default]
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    /// Multiplier that turns a raw time span into milliseconds.
    pub fn to_ms(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1000.0,
            TimeUnit::Milliseconds => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub time_unit: TimeUnit,
    /// Rendering scale. Fold thresholds in ms are `px / pixels_per_ms`.
    pub pixels_per_ms: f64,
    /// Events narrower than this many pixels are insignificant.
    pub significance_px: f64,
    /// Aggregate time, in pixels, a type needs across a whole root before
    /// insignificant events of that type are promoted.
    pub aggregate_significance_px: f64,
    /// Drop records whose normalized time is negative.
    pub drop_negative_times: bool,
    /// Parse profile records.
    pub profiles: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_unit: TimeUnit::Seconds,
            pixels_per_ms: 1.0,
            significance_px: 1.0,
            aggregate_significance_px: 5.0,
            drop_negative_times: true,
            profiles: true,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let positive = [
            ("pixels_per_ms", self.pixels_per_ms),
            ("significance_px", self.significance_px),
            ("aggregate_significance_px", self.aggregate_significance_px),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SessionError::InvalidConfig(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.time_unit.to_ms(), 1000.0);
    }

    #[test]
    fn partial_config() {
        let config = Config::from_toml(
            r#"
time_unit = "milliseconds"
pixels_per_ms = 0.25
profiles = false
"#,
        )
        .unwrap();
        assert_eq!(config.time_unit, TimeUnit::Milliseconds);
        assert_eq!(config.pixels_per_ms, 0.25);
        assert!(!config.profiles);
        assert_eq!(config.aggregate_significance_px, 5.0);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::from_toml("pixels_per_ms = 0.0"),
            Err(SessionError::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_toml("time_unit = \"fortnights\""),
            Err(SessionError::Toml(_))
        ));
    }
}

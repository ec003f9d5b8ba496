//! Simulation configuration and the providers that hand it to adapters.
//!
//! Adapters never cache configuration: every intercepted call asks its
//! [`ConfigProvider`] for a fresh snapshot, so edits made through
//! [`SharedConfig`] apply to the next call.

use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Shape of the randomness applied to jitter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    /// Offset drawn uniformly from `[-jitter, +jitter]`
    #[default]
    Uniform,
    /// Offset drawn from a normal distribution with standard deviation `jitter`
    Normal,
    /// Mostly small offsets with rare spikes up to `jitter`
    Burst,
}

impl FromStr for Distribution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uniform" => Ok(Distribution::Uniform),
            "normal" => Ok(Distribution::Normal),
            "burst" => Ok(Distribution::Burst),
            _ => Err(ConfigError::UnknownDistribution {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Uniform => write!(f, "uniform"),
            Distribution::Normal => write!(f, "normal"),
            Distribution::Burst => write!(f, "burst"),
        }
    }
}

/// Errors raised when a configuration cannot be accepted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("Error rate must be within 0-100 percent, got {value}")]
    ErrorRateOutOfRange { value: f64 },

    #[error("Invalid HTTP status code: {code}")]
    InvalidStatusCode { code: u16 },

    #[error("Unknown distribution: {value}")]
    UnknownDistribution { value: String },
}

/// Parameters controlling delay and error injection for each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Latency added to every call before jitter, in milliseconds
    pub base_latency_ms: f64,
    /// Spread of the random offset, in milliseconds
    pub jitter_ms: f64,
    /// Shape of the random offset
    pub distribution: Distribution,
    /// Chance of replacing a call's outcome with a synthetic error (0-100)
    pub error_rate_percent: f64,
    /// Status code of synthesized error responses
    pub error_status_code: u16,
    /// Status text of synthesized error responses
    pub error_status_text: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base_latency_ms: 100.0,
            jitter_ms: 50.0,
            distribution: Distribution::Uniform,
            error_rate_percent: 0.0,
            error_status_code: 500,
            error_status_text: "Internal Server Error".to_string(),
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration that adds no latency and never fails.
    pub fn passthrough() -> Self {
        Self {
            base_latency_ms: 0.0,
            jitter_ms: 0.0,
            error_rate_percent: 0.0,
            ..Self::default()
        }
    }

    /// Sets the error injection parameters.
    pub fn with_errors(
        mut self,
        rate_percent: f64,
        status_code: u16,
        status_text: impl Into<String>,
    ) -> Self {
        self.error_rate_percent = rate_percent;
        self.error_status_code = status_code;
        self.error_status_text = status_text.into();
        self
    }

    /// Sets the latency parameters.
    pub fn with_latency(mut self, base_ms: f64, jitter_ms: f64, distribution: Distribution) -> Self {
        self.base_latency_ms = base_ms;
        self.jitter_ms = jitter_ms;
        self.distribution = distribution;
        self
    }

    /// Checks that every field is usable by the sampler and error decision.
    ///
    /// # Errors
    ///
    /// - `ConfigError::NonFinite` - If latency, jitter or error rate is NaN or infinite
    /// - `ConfigError::Negative` - If latency or jitter is negative
    /// - `ConfigError::ErrorRateOutOfRange` - If error rate is outside 0-100
    /// - `ConfigError::InvalidStatusCode` - If status code is outside 100-599
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("base_latency_ms", self.base_latency_ms),
            ("jitter_ms", self.jitter_ms),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field });
            }
            if value < 0.0 {
                return Err(ConfigError::Negative { field, value });
            }
        }

        if !self.error_rate_percent.is_finite() {
            return Err(ConfigError::NonFinite {
                field: "error_rate_percent",
            });
        }
        if !(0.0..=100.0).contains(&self.error_rate_percent) {
            return Err(ConfigError::ErrorRateOutOfRange {
                value: self.error_rate_percent,
            });
        }

        if !(100..=599).contains(&self.error_status_code) {
            return Err(ConfigError::InvalidStatusCode {
                code: self.error_status_code,
            });
        }

        Ok(())
    }

    /// Creates configuration with environment variable overrides.
    ///
    /// Malformed values are logged and ignored so a typo never prevents
    /// start-up.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary key lookup on top of the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = parse_override::<f64>(&lookup, "NETLAG_BASE_LATENCY_MS") {
            config.base_latency_ms = value;
        }
        if let Some(value) = parse_override::<f64>(&lookup, "NETLAG_JITTER_MS") {
            config.jitter_ms = value;
        }
        if let Some(value) = parse_override::<Distribution>(&lookup, "NETLAG_DISTRIBUTION") {
            config.distribution = value;
        }
        if let Some(value) = parse_override::<f64>(&lookup, "NETLAG_ERROR_RATE") {
            config.error_rate_percent = value;
        }
        if let Some(value) = parse_override::<u16>(&lookup, "NETLAG_ERROR_STATUS") {
            config.error_status_code = value;
        }
        if let Some(text) = lookup("NETLAG_ERROR_TEXT") {
            config.error_status_text = text;
        }

        config
    }
}

fn parse_override<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring malformed override");
            None
        }
    }
}

/// Named network conditions for quick selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConditionPreset {
    /// Low, stable latency with no failures
    Good,
    /// Typical mobile link with occasional failures
    Average,
    /// Slow, noisy link with a noticeable failure rate
    Poor,
    /// Mostly responsive link with large latency spikes and a failing backend
    Flaky,
}

impl ConditionPreset {
    /// All presets in display order.
    pub const ALL: [ConditionPreset; 4] = [
        ConditionPreset::Good,
        ConditionPreset::Average,
        ConditionPreset::Poor,
        ConditionPreset::Flaky,
    ];

    /// Builds the configuration this preset stands for.
    pub fn config(self) -> SimulationConfig {
        match self {
            ConditionPreset::Good => SimulationConfig::default()
                .with_latency(50.0, 10.0, Distribution::Uniform)
                .with_errors(0.0, 500, "Internal Server Error"),
            ConditionPreset::Average => SimulationConfig::default()
                .with_latency(275.0, 20.0, Distribution::Normal)
                .with_errors(1.0, 500, "Internal Server Error"),
            ConditionPreset::Poor => SimulationConfig::default()
                .with_latency(500.0, 150.0, Distribution::Normal)
                .with_errors(5.0, 503, "Service Unavailable"),
            ConditionPreset::Flaky => SimulationConfig::default()
                .with_latency(150.0, 600.0, Distribution::Burst)
                .with_errors(10.0, 502, "Bad Gateway"),
        }
    }

    /// One-line description for listings.
    pub fn description(self) -> &'static str {
        match self {
            ConditionPreset::Good => "low, stable latency with no failures",
            ConditionPreset::Average => "typical mobile link with occasional failures",
            ConditionPreset::Poor => "slow, noisy link with a noticeable failure rate",
            ConditionPreset::Flaky => "responsive link with large latency spikes",
        }
    }
}

impl fmt::Display for ConditionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionPreset::Good => write!(f, "good"),
            ConditionPreset::Average => write!(f, "average"),
            ConditionPreset::Poor => write!(f, "poor"),
            ConditionPreset::Flaky => write!(f, "flaky"),
        }
    }
}

/// Supplies the configuration snapshot for each intercepted call.
pub trait ConfigProvider: Send + Sync {
    /// Returns the configuration to apply to the call being intercepted.
    fn snapshot(&self) -> SimulationConfig;
}

impl ConfigProvider for SimulationConfig {
    fn snapshot(&self) -> SimulationConfig {
        self.clone()
    }
}

/// Mutable configuration cell edited by a UI or CLI while calls are running.
#[derive(Debug, Default)]
pub struct SharedConfig {
    current: RwLock<SimulationConfig>,
}

impl SharedConfig {
    /// Creates a cell holding `config`.
    ///
    /// # Errors
    ///
    /// - `ConfigError` - If `config` fails validation
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(config),
        })
    }

    /// Replaces the configuration.
    ///
    /// # Errors
    ///
    /// - `ConfigError` - If `config` fails validation; the previous value is kept
    pub fn update(&self, config: SimulationConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.current.write() = config;
        Ok(())
    }

    /// Edits the configuration in place.
    ///
    /// # Errors
    ///
    /// - `ConfigError` - If the edited value fails validation; the previous value is kept
    pub fn modify(&self, edit: impl FnOnce(&mut SimulationConfig)) -> Result<(), ConfigError> {
        let mut candidate = self.current.read().clone();
        edit(&mut candidate);
        self.update(candidate)
    }
}

impl ConfigProvider for SharedConfig {
    fn snapshot(&self) -> SimulationConfig {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
        assert!(SimulationConfig::passthrough().validate().is_ok());
    }

    #[test]
    fn test_all_presets_are_valid() {
        for preset in ConditionPreset::ALL {
            assert!(preset.config().validate().is_ok(), "preset {preset} invalid");
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_error_rate() {
        let config = SimulationConfig::default().with_errors(150.0, 500, "x");
        assert_eq!(
            config.validate(),
            Err(ConfigError::ErrorRateOutOfRange { value: 150.0 })
        );
    }

    #[test]
    fn test_validate_rejects_negative_jitter() {
        let config = SimulationConfig::default().with_latency(10.0, -5.0, Distribution::Uniform);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Negative {
                field: "jitter_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_nan_latency() {
        let config = SimulationConfig::default().with_latency(f64::NAN, 0.0, Distribution::Uniform);
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonFinite {
                field: "base_latency_ms"
            })
        );
    }

    #[test]
    fn test_validate_rejects_bad_status_code() {
        let config = SimulationConfig::default().with_errors(10.0, 42, "Nope");
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidStatusCode { code: 42 })
        );
    }

    #[test]
    fn test_distribution_parsing() {
        assert_eq!("Normal".parse::<Distribution>(), Ok(Distribution::Normal));
        assert_eq!(" burst ".parse::<Distribution>(), Ok(Distribution::Burst));
        assert!("gaussian".parse::<Distribution>().is_err());
        assert_eq!(Distribution::Uniform.to_string(), "uniform");
    }

    #[test]
    fn test_from_lookup_applies_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("NETLAG_BASE_LATENCY_MS", "250"),
            ("NETLAG_DISTRIBUTION", "burst"),
            ("NETLAG_ERROR_RATE", "12.5"),
            ("NETLAG_ERROR_STATUS", "503"),
            ("NETLAG_ERROR_TEXT", "Service Unavailable"),
        ]);
        let config = SimulationConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.base_latency_ms, 250.0);
        assert_eq!(config.jitter_ms, 50.0);
        assert_eq!(config.distribution, Distribution::Burst);
        assert_eq!(config.error_rate_percent, 12.5);
        assert_eq!(config.error_status_code, 503);
        assert_eq!(config.error_status_text, "Service Unavailable");
    }

    #[test]
    fn test_from_lookup_ignores_malformed_values() {
        let config = SimulationConfig::from_lookup(|name| match name {
            "NETLAG_JITTER_MS" => Some("lots".to_string()),
            _ => None,
        });
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn test_shared_config_keeps_previous_value_on_invalid_update() {
        let shared = SharedConfig::default();
        let result = shared.modify(|config| config.error_rate_percent = 101.0);

        assert!(result.is_err());
        assert_eq!(shared.snapshot(), SimulationConfig::default());
    }

    #[test]
    fn test_shared_config_update_is_visible_in_next_snapshot() {
        let shared = SharedConfig::default();
        shared
            .modify(|config| config.distribution = Distribution::Normal)
            .unwrap();
        assert_eq!(shared.snapshot().distribution, Distribution::Normal);
    }

    #[test]
    fn test_config_serializes_distribution_lowercase() {
        let json = serde_json::to_value(SimulationConfig::default()).unwrap();
        assert_eq!(json["distribution"], "uniform");
    }
}

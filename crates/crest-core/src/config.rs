//! Controller tuning parameters.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunable parameters for [`HillClimber`](crate::HillClimber).
///
/// All values are fixed for the controller's lifetime. `Default` is the
/// production tuning; individual fields can be overridden from a TOML file
/// via [`ClimbConfig::from_file`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimbConfig {
    /// Probe oscillation period, in samples.
    pub wave_period: u32,
    /// Cap on the injected oscillation size, in workers.
    pub max_wave_magnitude: u32,
    /// Scales the derived probe amplitude.
    pub wave_magnitude_multiplier: f64,
    /// Retained sample window; must be a positive multiple of `wave_period`
    /// so the probe frequency falls exactly on an analysis bin.
    pub wave_history_size: u32,
    /// Desired relative throughput gain per added worker.
    pub target_throughput_ratio: f64,
    /// Signal-to-noise ratio at which a measured ratio earns full confidence.
    pub target_signal_to_noise_ratio: f64,
    /// Control-setting rate limit, in workers per second.
    pub max_change_per_second: f64,
    /// Per-call move clamp, in workers.
    pub max_change_per_sample: f64,
    /// Lower bound of the randomized sample interval, in milliseconds.
    pub sample_interval_low_ms: u32,
    /// Upper bound of the randomized sample interval, in milliseconds.
    pub sample_interval_high_ms: u32,
    /// Exponential-moving-average weight for the throughput noise estimate.
    pub error_smoothing_factor: f64,
    /// Exponent for nonlinear move shaping: values near zero are attenuated,
    /// large confident values pass through.
    pub gain_exponent: f64,
    /// Maximum tolerated relative sample error before a sample is deferred.
    pub max_sample_error: f64,
}

impl Default for ClimbConfig {
    fn default() -> Self {
        let wave_period = 4;
        Self {
            wave_period,
            max_wave_magnitude: 20,
            wave_magnitude_multiplier: 1.0,
            wave_history_size: wave_period * 8,
            target_throughput_ratio: 0.15,
            target_signal_to_noise_ratio: 3.0,
            max_change_per_second: 4.0,
            max_change_per_sample: 20.0,
            sample_interval_low_ms: 10,
            sample_interval_high_ms: 200,
            error_smoothing_factor: 0.01,
            gain_exponent: 2.0,
            max_sample_error: 0.15,
        }
    }
}

impl ClimbConfig {
    /// Load overrides from a TOML file; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClimbConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the controller relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wave_period < 2 {
            return Err(ConfigError::WavePeriodTooShort(self.wave_period));
        }
        if self.wave_history_size == 0 || self.wave_history_size % self.wave_period != 0 {
            return Err(ConfigError::HistoryNotMultipleOfPeriod {
                size: self.wave_history_size,
                period: self.wave_period,
            });
        }
        if self.max_wave_magnitude < 1 {
            return Err(ConfigError::WaveMagnitudeTooSmall);
        }
        if self.sample_interval_low_ms < 1
            || self.sample_interval_low_ms > self.sample_interval_high_ms
        {
            return Err(ConfigError::InvalidSampleInterval {
                low: self.sample_interval_low_ms,
                high: self.sample_interval_high_ms,
            });
        }
        if self.error_smoothing_factor <= 0.0 || self.error_smoothing_factor > 1.0 {
            return Err(ConfigError::InvalidSmoothingFactor(
                self.error_smoothing_factor,
            ));
        }
        Ok(())
    }
}

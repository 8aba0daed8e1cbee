//! Error types for controller configuration.

use thiserror::Error;

/// Errors raised while validating a [`ClimbConfig`](crate::ClimbConfig).
///
/// All of these indicate a configuration defect and are raised at
/// construction; a running controller never fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("wave_period must be at least 2 samples, got {0}")]
    WavePeriodTooShort(u32),

    #[error("wave_history_size must be a positive multiple of wave_period {period}, got {size}")]
    HistoryNotMultipleOfPeriod { size: u32, period: u32 },

    #[error("max_wave_magnitude must be at least 1")]
    WaveMagnitudeTooSmall,

    #[error("sample interval bounds must satisfy 1 <= low <= high, got {low}..{high}")]
    InvalidSampleInterval { low: u32, high: u32 },

    #[error("error_smoothing_factor must be in (0, 1], got {0}")]
    InvalidSmoothingFactor(f64),
}

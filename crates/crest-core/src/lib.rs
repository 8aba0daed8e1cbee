//! crest-core — hill-climbing concurrency control for worker pools.
//!
//! Once per measurement interval the hosting pool reports
//! `(workers, duration, completions)` and receives back a new worker target
//! plus the number of milliseconds to wait before reporting again. The
//! controller rides a small square-wave probe on top of its continuous
//! control setting, measures the throughput response at the probe frequency
//! with a Goertzel extraction, and climbs toward the worker count where an
//! extra worker stops paying for itself.
//!
//! # Decision pipeline
//!
//! ```text
//! throughput = completions / duration        (deferred if too inaccurate)
//! ratio      = (throughput_wave - target * worker_wave) / worker_wave
//! confidence = |worker_wave| / noise_floor / target_snr
//! move       = sign * |clamp(ratio) * clamp(confidence)|^gain_exp * gain
//! workers    = round(control_setting + wave_magnitude * square(t))
//! ```
//!
//! The sample interval is randomized per adjustment so that independent
//! controllers on one host do not phase-lock their probes.

pub mod climb;
pub mod complex;
pub mod config;
pub mod error;
pub mod history;
pub mod observer;
pub mod wave;

pub use climb::{Decision, HillClimber, PoolHost, Transition};
pub use config::ClimbConfig;
pub use error::ConfigError;
pub use observer::{ClimbObserver, ClimbStats, NoopObserver};

//! Telemetry hooks for the controller.
//!
//! The controller reports three kinds of events: the throughput of each
//! accepted sample, every change of the worker target, and the full
//! per-sample diagnostics behind a decision. Hosts that want to export
//! these (event tracing, CSV capture, metrics) implement [`ClimbObserver`];
//! everything defaults to a no-op.

use crate::climb::Transition;

/// Per-sample diagnostics reported through [`ClimbObserver::stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimbStats {
    /// Duration the sample covers, in seconds (including deferred data).
    pub sample_duration_secs: f64,
    /// Measured throughput, completions per second.
    pub throughput: f64,
    /// Real part of the normalized worker-count wave component.
    pub worker_wave: f64,
    /// Real part of the normalized throughput wave component.
    pub throughput_wave: f64,
    /// Noise-floor estimate from the adjacent frequency bins.
    pub throughput_error_estimate: f64,
    /// Smoothed noise estimate used for the probe amplitude.
    pub average_throughput_noise: f64,
    /// Real part of the throughput/worker response ratio.
    pub ratio: f64,
    /// Signal-to-noise confidence applied to the move.
    pub confidence: f64,
    /// Control setting after the move was applied.
    pub control_setting: f64,
    /// Probe amplitude injected into the returned worker count.
    pub wave_magnitude: u32,
}

/// Observer for controller events. Every method has a no-op default.
pub trait ClimbObserver: Send {
    /// An accepted sample's measured throughput.
    fn sample(&mut self, throughput: f64) {
        let _ = throughput;
    }

    /// The worker target changed, by the controller or by a forced resync.
    /// `throughput` is the average over the whole time the previous target
    /// was in force.
    fn adjustment(&mut self, workers: u32, throughput: f64, transition: Transition) {
        let _ = (workers, throughput, transition);
    }

    /// Full diagnostics for an accepted sample.
    fn stats(&mut self, stats: &ClimbStats) {
        let _ = stats;
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ClimbObserver for NoopObserver {}

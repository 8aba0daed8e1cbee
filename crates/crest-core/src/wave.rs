//! Goertzel single-frequency wave extraction.
//!
//! Recovers the complex amplitude of one periodic component from the most
//! recent window of a circular sample buffer. A full FFT would compute every
//! bin; the controller only ever needs three (the probe frequency and its
//! two neighbors), so the single-bin recurrence is the right tool.

use std::f64::consts::PI;

use crate::complex::Complex;

/// Extract the complex amplitude of the component with the given `period`
/// (in samples) from the last `sample_count` entries of `ring`.
///
/// `total_samples` is the monotonic write counter for the ring; the window
/// covers logical indices `total_samples - sample_count .. total_samples`,
/// oldest to newest.
///
/// # Panics
///
/// Panics if `sample_count < period` (the wave does not fit in the window)
/// or `period < 2` (above the Nyquist frequency). Both indicate a
/// misconfigured caller, not a runtime condition.
pub fn wave_component(
    ring: &[f64],
    total_samples: u64,
    sample_count: usize,
    period: f64,
) -> Complex {
    assert!(
        sample_count as f64 >= period,
        "analysis window ({sample_count}) shorter than the period under test ({period})"
    );
    assert!(period >= 2.0, "period {period} is above the Nyquist limit");

    let w = 2.0 * PI / period;
    let cosine = w.cos();
    let sine = w.sin();
    let coeff = 2.0 * cosine;

    let capacity = ring.len() as u64;
    let start = total_samples - sample_count as u64;

    let mut q0;
    let mut q1 = 0.0;
    let mut q2 = 0.0;
    for i in 0..sample_count as u64 {
        let sample = ring[((start + i) % capacity) as usize];
        q0 = coeff * q1 - q2 + sample;
        q2 = q1;
        q1 = q0;
    }

    Complex::new(q1 - q2 * cosine, q2 * sine) / sample_count as f64
}

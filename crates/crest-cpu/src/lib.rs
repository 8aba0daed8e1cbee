//! crest-cpu — system-wide CPU utilization sampling.
//!
//! The controller in `crest-core` consults CPU utilization on every
//! decision, so the reading has to be a non-blocking load. A
//! [`CpuSampler`] owns a background thread that re-reads `/proc/stat` on a
//! fixed cadence and publishes the busy percentage to an atomic cell; the
//! control path only ever loads the cell.

pub mod sampler;

pub use sampler::{CpuSampler, CpuTimes, read_cpu_times, utilization_between};

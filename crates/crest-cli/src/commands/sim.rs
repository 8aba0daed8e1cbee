//! Synthetic-workload simulation.
//!
//! Models a pool where every work item takes exactly one second, so a
//! workload needing N concurrent workers completes `min(N, workers)` items
//! per simulated second. The pool follows the controller conservatively:
//! grow by one worker at a time and never more than one past what the
//! workload can use, shrink by one when the target drops below
//! `workers - 1`. The per-second trace goes to a CSV for offline plotting.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crest_core::{ClimbConfig, HillClimber, PoolHost, Transition};
use crest_cpu::CpuSampler;

/// Workers each phase of the workload can keep busy.
const PHASE_WORKLOADS: [i64; 5] = [3, 7, 10, 7, 3];

/// Work items per phase, per unit of workload.
const PHASE_LENGTH: i64 = 500;

pub struct SimOptions {
    pub output: PathBuf,
    pub random_jumps: bool,
    pub seed: Option<u64>,
    pub min_workers: u32,
    pub max_workers: u32,
    pub fixed_cpu: Option<u32>,
    pub burn: Option<u32>,
    pub config: Option<PathBuf>,
}

pub fn run(options: SimOptions) -> anyhow::Result<()> {
    if options.min_workers > options.max_workers {
        bail!(
            "--min-workers ({}) must not exceed --max-workers ({})",
            options.min_workers,
            options.max_workers
        );
    }

    let config = match &options.config {
        Some(path) => ClimbConfig::from_file(path)
            .with_context(|| format!("loading controller config from {}", path.display()))?,
        None => ClimbConfig::default(),
    };

    if let Some(percentage) = options.burn {
        burn_cpu(percentage);
    }

    // The sampler must outlive the controller; its reading is consulted on
    // every decision through the host closure.
    let sampler = options
        .fixed_cpu
        .is_none()
        .then(|| CpuSampler::start(Duration::from_millis(500)));
    let cpu_fn: Box<dyn Fn() -> u32 + Send + Sync> = match (options.fixed_cpu, &sampler) {
        (Some(cpu), _) => {
            let cpu = cpu.min(100);
            Box::new(move || cpu)
        }
        (None, Some(sampler)) => Box::new(sampler.reader()),
        (None, None) => unreachable!(),
    };

    let (min_workers, max_workers) = (options.min_workers, options.max_workers);
    let host = PoolHost::new(move || min_workers, move || max_workers, move || cpu_fn());

    let mut climber = HillClimber::new(config, host)?;
    if let Some(seed) = options.seed {
        climber = climber.with_rng_seed(seed);
    }
    let mut workload_rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15),
        None => StdRng::from_entropy(),
    };

    let file = File::create(&options.output)
        .with_context(|| format!("creating {}", options.output.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "time,throughput,workers")?;

    let mut workers = options.min_workers;
    climber.force_change(workers, Transition::Initializing);

    let mut timer: u64 = 0;
    let mut last_sample_at: u64 = 0;
    let mut interval_ms: u32 = 0;
    let mut total_completions: u64 = 0;

    for (index, &base_workload) in PHASE_WORKLOADS.iter().enumerate() {
        let mut workload = base_workload;
        let mut budget = base_workload * PHASE_LENGTH;
        info!(phase = index + 1, workload, "phase start");

        while budget > 0 {
            if options.random_jumps && workload_rng.gen_range(0..21) >= 19 {
                let jump = workload_rng.gen_range(-2i64..=2);
                if jump != 0 {
                    workload = (workload + jump).max(1);
                    debug!(workload, "workload shifted");
                }
            }

            // One simulated second per tick; every item takes one second.
            timer += 1;
            let completions = workload.min(workers as i64).max(0) as u64;
            total_completions += completions;
            budget -= workers as i64;

            let noise = 0.95 + workload_rng.r#gen::<f64>() / 100.0 * 5.0;
            writeln!(out, "{},{},{}", timer, completions as f64 * noise, workers)?;

            // Consult the controller only when the pool is mis-sized, and
            // no more often than half the suggested interval.
            if workers as i64 != workload {
                let duration_secs = (timer - last_sample_at) as f64;
                if duration_secs * 1000.0 >= (interval_ms / 2) as f64 {
                    let decision = climber.update(workers, duration_secs, completions);
                    interval_ms = decision.next_sample_ms;
                    debug!(
                        proposed = decision.workers,
                        workers, workload, interval_ms, "controller consulted"
                    );

                    if decision.workers > workers {
                        let usable = (workload + 1).max(1) as u32;
                        if decision.workers.min(usable) > workers {
                            workers += 1;
                        }
                    } else if decision.workers + 1 < workers {
                        workers -= 1;
                    }
                    workers = workers.clamp(options.min_workers, options.max_workers);
                    last_sample_at = timer;
                }
            }
        }
        out.flush()?;
    }

    info!(
        ticks = timer,
        total_completions,
        output = %options.output.display(),
        "simulation finished"
    );
    Ok(())
}

/// Spin detached busy-loop threads on roughly `percentage` of the cores,
/// so the CPU sampler has real load to observe.
fn burn_cpu(percentage: u32) {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let threads = ((cores as u64 * percentage as u64) / 100).max(1);
    info!(threads, cores, "spinning busy-loop threads");
    for _ in 0..threads {
        std::thread::spawn(|| {
            loop {
                std::hint::spin_loop();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(output: PathBuf, seed: u64) -> SimOptions {
        SimOptions {
            output,
            random_jumps: true,
            seed: Some(seed),
            min_workers: 2,
            max_workers: 1000,
            fixed_cpu: Some(50),
            burn: None,
            config: None,
        }
    }

    #[test]
    fn trace_is_reproducible_with_a_fixed_seed() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");

        run(options(first.clone(), 11)).unwrap();
        run(options(second.clone(), 11)).unwrap();

        assert_eq!(
            std::fs::read_to_string(&first).unwrap(),
            std::fs::read_to_string(&second).unwrap()
        );
    }

    #[test]
    fn trace_rows_are_monotonic_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        run(options(path.clone(), 5)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("time,throughput,workers"));

        let mut last_time = 0u64;
        for line in lines {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), 3, "line={line}");
            let time: u64 = fields[0].parse().unwrap();
            let workers: u32 = fields[2].parse().unwrap();
            assert!(time > last_time, "line={line}");
            last_time = time;
            assert!((2..=1000).contains(&workers), "line={line}");
        }
        assert!(last_time > 0);
    }

    #[test]
    fn rejects_inverted_worker_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = options(dir.path().join("unused.csv"), 1);
        bad.min_workers = 10;
        bad.max_workers = 5;
        assert!(run(bad).is_err());
    }
}

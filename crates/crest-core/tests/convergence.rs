//! End-to-end behavior against a workload with a fixed parallelism limit.
//!
//! The workload completes at most 7 items per second no matter how many
//! workers run, so the optimal pool size is exactly 7. After warm-up the
//! controller must hold the worker count near that optimum, never straying
//! further than the probe wave can reach.

use crest_core::{ClimbConfig, HillClimber, PoolHost, Transition};

#[test]
fn settles_near_the_workload_parallelism() {
    let config = ClimbConfig::default();
    let warmup_samples = (config.wave_history_size + config.wave_period) as u64;
    let ceiling = 7 + config.max_wave_magnitude;

    let mut hc = HillClimber::new(config, PoolHost::fixed(2, 1000, 50))
        .unwrap()
        .with_rng_seed(1);
    hc.force_change(2, Transition::Initializing);

    let mut workers = 2u32;
    let mut post_warmup_sum = 0u64;
    let mut post_warmup_ticks = 0u64;
    let mut peak = 0u32;

    for tick in 0..2000u64 {
        let completions = workers.min(7) as u64;
        let decision = hc.update(workers, 1.0, completions);
        workers = decision.workers;

        assert!(
            (2..=1000).contains(&workers),
            "tick={tick} workers={workers}"
        );

        if hc.total_samples() > warmup_samples {
            assert!(
                workers <= ceiling,
                "tick={tick} workers={workers} ceiling={ceiling}"
            );
            post_warmup_sum += workers as u64;
            post_warmup_ticks += 1;
            peak = peak.max(workers);
        }
    }

    // The controller actually climbed out of the floor...
    assert!(peak > 4, "peak={peak}");
    // ...and spent its time near the optimum rather than pinned at either
    // bound.
    let mean = post_warmup_sum as f64 / post_warmup_ticks as f64;
    assert!((3.0..=16.0).contains(&mean), "mean={mean}");
}

#[test]
fn deferred_samples_do_not_advance_the_counter() {
    // With 40 workers and only 7 completions per second, almost every tick
    // fails the accuracy gate; accepted samples must stay far rarer than
    // ticks.
    let mut hc = HillClimber::new(ClimbConfig::default(), PoolHost::fixed(2, 1000, 50))
        .unwrap()
        .with_rng_seed(3);
    hc.force_change(40, Transition::Initializing);

    for _ in 0..100u64 {
        hc.update(40, 1.0, 7);
    }
    // (40 - 1) / (7 k) < 0.15 needs k >= 38 deferred ticks per acceptance.
    assert!(hc.total_samples() <= 3, "samples={}", hc.total_samples());
    assert!(hc.total_samples() >= 1);
}

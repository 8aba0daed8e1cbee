//! One-shot CPU utilization probe.

use std::time::Duration;

use anyhow::Context;

use crest_cpu::{read_cpu_times, utilization_between};

pub fn show(window_ms: u64, format: &str) -> anyhow::Result<()> {
    let first = read_cpu_times().context("reading /proc/stat")?;
    std::thread::sleep(Duration::from_millis(window_ms));
    let second = read_cpu_times().context("reading /proc/stat")?;
    let percent = utilization_between(first, second);

    match format {
        "json" => {
            let report = serde_json::json!({
                "cpu_percent": percent,
                "window_ms": window_ms,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!("cpu utilization: {percent}% over {window_ms}ms");
        }
    }

    Ok(())
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "crest",
    about = "Crest — adaptive worker-pool concurrency tuning",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the controller against a synthetic workload, writing a CSV trace.
    ///
    /// The workload steps through five phases needing 3, 7, 10, 7 and 3
    /// concurrent workers; with --random-jumps it also drifts by up to 2
    /// workers at random. Each CSV row is one simulated second:
    /// time,throughput,workers.
    Sim {
        /// CSV output path
        #[arg(short, long, default_value = "results.csv")]
        output: PathBuf,
        /// Let the workload jump around instead of stepping smoothly
        #[arg(long)]
        random_jumps: bool,
        /// Seed for the workload and interval generators (reproducible runs)
        #[arg(long)]
        seed: Option<u64>,
        /// Smallest worker count the pool may run
        #[arg(long, default_value_t = 2)]
        min_workers: u32,
        /// Largest worker count the pool may run
        #[arg(long, default_value_t = 1000)]
        max_workers: u32,
        /// Fixed CPU utilization percentage instead of sampling /proc/stat
        #[arg(long)]
        fixed_cpu: Option<u32>,
        /// Spin busy-loop threads on roughly this percentage of cores
        #[arg(long)]
        burn: Option<u32>,
        /// Controller tuning overrides (TOML file)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the current system CPU utilization
    Cpu {
        /// Measurement window in milliseconds
        #[arg(long, default_value_t = 500)]
        window_ms: u64,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("crest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sim {
            output,
            random_jumps,
            seed,
            min_workers,
            max_workers,
            fixed_cpu,
            burn,
            config,
        } => commands::sim::run(commands::sim::SimOptions {
            output,
            random_jumps,
            seed,
            min_workers,
            max_workers,
            fixed_cpu,
            burn,
            config,
        }),
        Commands::Cpu { window_ms, format } => commands::cpu::show(window_ms, &format),
    }
}

mod driver;
mod worker;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};

use resman_core::infrastructure_in_memory::BufferedGrantSink;
use resman_core::journal::Journal;
use resman_core::master::Master;
use resman_core::types::{ExternalId, Message, SimConfig};

#[derive(Parser)]
#[command(
    name = "resman",
    about = "resman — OS resource-manager simulator with deadlock detection and recovery",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulation: launch workers, arbitrate requests, detect
    /// and break deadlocks
    Run {
        /// Total workers to launch over the run
        #[arg(short = 'n', long, default_value_t = 5)]
        max_workers: u32,

        /// Concurrent worker ceiling
        #[arg(short = 's', long, default_value_t = 5)]
        max_concurrent: usize,

        /// Simulated milliseconds between worker launches
        #[arg(short = 'i', long, default_value_t = 100)]
        interval_ms: u64,

        /// Event log path
        #[arg(short = 'f', long, default_value = "resman.log")]
        log_file: PathBuf,

        /// Suppress per-request log entries
        #[arg(short = 'q', long)]
        quiet: bool,

        /// RNG seed for the clock and the worker walks
        #[arg(long, default_value_t = 0, env = "RESMAN_SEED")]
        seed: u64,

        /// Wall-clock budget in seconds
        #[arg(long, default_value_t = 5)]
        wall_budget_secs: u64,
    },

    /// Apply a JSON message trace from stdin to a fresh master and print
    /// the resulting statistics
    Replay {
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            max_workers,
            max_concurrent,
            interval_ms,
            log_file,
            quiet,
            seed,
            wall_budget_secs,
        } => {
            let config = SimConfig {
                max_total_workers: max_workers,
                max_concurrent_workers: max_concurrent,
                launch_interval_ms: interval_ms,
                verbose: !quiet,
                seed,
                ..SimConfig::default()
            };
            if let Err(err) = config.validate() {
                eprintln!("resman: {err}");
                process::exit(1);
            }
            if let Err(err) =
                driver::run(config, &log_file, Duration::from_secs(wall_budget_secs)).await
            {
                eprintln!("resman: {err}");
                process::exit(1);
            }
        }

        Commands::Replay { seed } => replay(seed),

        Commands::Version => {
            println!("resman {}", env!("CARGO_PKG_VERSION"));
            println!("OS resource-manager simulator with deadlock detection and recovery");
        }
    }
}

/// Feed a recorded message trace through the kernel with every slot
/// pre-activated, run one detection pass, and report what happened.
fn replay(seed: u64) {
    eprintln!("Reading message trace from stdin...");
    let mut input = String::new();
    if let Err(err) = std::io::Read::read_to_string(&mut std::io::stdin(), &mut input) {
        eprintln!("resman: failed to read stdin: {err}");
        process::exit(1);
    }

    let messages: Vec<Message> = match serde_json::from_str(&input) {
        Ok(messages) => messages,
        Err(err) => {
            eprintln!("resman: invalid trace: {err}");
            process::exit(1);
        }
    };

    let config = SimConfig {
        seed,
        verbose: false,
        ..SimConfig::default()
    };
    let mut master = Master::new(config.clone(), Journal::disabled());
    let mut sink = BufferedGrantSink::new();

    // Slot i answers to external id i, so traces can be written by hand.
    for i in 0..config.max_slots {
        let _ = master.activate_worker(i as ExternalId);
    }

    let mut violations = 0usize;
    for msg in &messages {
        if master.handle_message(msg, &mut sink).is_err() {
            violations += 1;
        }
    }
    master.run_detection(&mut sink);

    let report = serde_json::json!({
        "messages": messages.len(),
        "violations": violations,
        "grants_emitted": sink.sent.len(),
        "available": master.ledger().available_all(),
        "stats": master.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report).unwrap());
}

//! Command-line pipeline runner
//!
//! Runs a program given inline or from a file against the built-in
//! function catalog:
//!
//!   fpipe "test-pattern -> grayscale -> count @ 5s"
//!   fpipe --file demo.fp --fps 60
//!   fpipe --print-graph "test-pattern -> (invert | grayscale) -> null"
//!
//! `--duration` bounds the whole run by tripping the cancellation signal,
//! which also demonstrates the clean-drain shutdown path.

use clap::Parser;
use framepipe::{RunOutcome, RuntimeConfig, Supervisor, compile_with, default_registry};
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Program text (unless --file is given)
    program: Option<String>,

    /// Read the program from a file instead
    #[arg(long)]
    file: Option<String>,

    /// Source pacing in frames per second (0 = free-running)
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Capacity of -> edges, in frames
    #[arg(long, default_value = "10")]
    edge_capacity: usize,

    /// Capacity of ~> edges, in frames
    #[arg(long, default_value = "20")]
    async_edge_capacity: usize,

    /// Consecutive transform failures before a worker is fatal
    #[arg(long, default_value = "16")]
    failure_limit: usize,

    /// Shutdown grace period in seconds
    #[arg(long, default_value = "2.0")]
    grace: f64,

    /// Stop the run after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Compile only and print the execution graph
    #[arg(long)]
    print_graph: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let source = match (&args.program, &args.file) {
        (_, Some(path)) => std::fs::read_to_string(path)?,
        (Some(text), None) => text.clone(),
        (None, None) => {
            error!("no program given; pass it inline or with --file");
            std::process::exit(2);
        }
    };

    let interval = if args.fps > 0.0 {
        Duration::from_secs_f64(1.0 / args.fps)
    } else {
        Duration::ZERO
    };
    let config = RuntimeConfig::default()
        .with_source_interval(interval)
        .with_edge_capacities(args.edge_capacity, args.async_edge_capacity)
        .with_failure_limit(args.failure_limit)
        .with_shutdown_grace(Duration::from_secs_f64(args.grace.max(0.0)));

    let registry = default_registry().clone();
    let graph = compile_with(&source, &registry, &config)?;

    if args.print_graph {
        print!("{}", graph);
        return Ok(());
    }

    if let Some(seconds) = args.duration {
        let cancel = config.cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs_f64(seconds.max(0.0)));
            info!("duration elapsed, stopping");
            cancel.cancel();
        });
    }

    info!("running {} nodes", graph.nodes().len());
    let outcome = Supervisor::new(graph, config).run(&registry)?;
    match outcome {
        RunOutcome::Normal => info!("done"),
        RunOutcome::Cancelled => info!("stopped"),
        RunOutcome::Failed { reason } => {
            error!("run failed: {}", reason);
            std::process::exit(1);
        }
    }
    Ok(())
}

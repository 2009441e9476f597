//! ferrocomm experiment runner.
//!
//! # Usage
//!
//! ```bash
//! # Latency of 8-byte messages between two ranks
//! ferrocomm -n 2 ping-pong
//!
//! # Token ring over 4 ranks
//! ferrocomm -n 4 ring
//!
//! # Matched blocking sends, detected after 500 ms
//! ferrocomm -n 2 --timeout-ms 500 deadlock --order send-first
//!
//! # Lost updates on a fence-only shared counter
//! ferrocomm -n 4 race --strategy fence-only
//! ```
//!
//! Results go to stdout, logs to stderr. The exit code is 0 on success, 1 when
//! the world is too small or another error occurs, and 2 when a blocked
//! operation hit the deadlock timeout.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
#[cfg(feature = "rma")]
use ferrocomm::counter::{shared_counter, CounterConfig, Strategy};
use ferrocomm::exchange::{exchange_traced, ExchangeOrder};
use ferrocomm::pingpong::{bandwidth_sweep, ping_pong, PingPongConfig, DEFAULT_SWEEP_SIZES};
use ferrocomm::ring::{token_ring, INITIAL_TOKEN};
use ferrocomm::{config, Error, Result, RuntimeConfig, Universe};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Timeout the deadlock demo falls back to, so it terminates on its own.
const DEMO_DEADLOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Message-passing exchange experiments
#[derive(Parser, Debug)]
#[command(name = "ferrocomm")]
#[command(about = "Rank-to-rank message-passing experiments")]
#[command(version)]
struct Args {
    /// Number of ranks to launch (defaults to FERROCOMM_NP, then 2)
    #[arg(short = 'n', long = "np", global = true)]
    np: Option<i32>,

    /// Largest message in bytes delivered without a matching receive
    #[arg(long, global = true)]
    eager_limit: Option<usize>,

    /// Fail blocking operations after this many milliseconds (0 = never)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ping-pong latency benchmark between ranks 0 and 1
    PingPong {
        /// Message size in bytes
        #[arg(long, default_value_t = ferrocomm::pingpong::DEFAULT_MESSAGE_SIZE)]
        size: usize,
        /// Timed round trips
        #[arg(long, default_value_t = ferrocomm::pingpong::DEFAULT_ITERATIONS)]
        iterations: usize,
        /// Untimed warm-up round trips
        #[arg(long, default_value_t = 0)]
        warmup: usize,
    },
    /// Ping-pong over a range of message sizes
    Bandwidth {
        /// Comma-separated message sizes in bytes
        #[arg(long, value_delimiter = ',')]
        sizes: Vec<usize>,
        /// Timed round trips per size
        #[arg(long, default_value_t = 100)]
        iterations: usize,
    },
    /// Pass a token once around all ranks
    Ring {
        /// Initial token value
        #[arg(long, default_value_t = INITIAL_TOKEN)]
        token: i32,
    },
    /// Two ranks exchanging messages, with or without a deadlock
    Deadlock {
        /// send-first, alternating, sendrecv or nonblocking
        #[arg(long, default_value = "send-first")]
        order: ExchangeOrder,
        /// Doubles per message
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Every rank increments a counter on rank 0
    #[cfg(feature = "rma")]
    Race {
        /// Increments per rank
        #[arg(long, default_value_t = ferrocomm::counter::DEFAULT_INCREMENTS)]
        increments: usize,
        /// fence-only, accumulate or exclusive-lock
        #[arg(long, default_value = "fence-only")]
        strategy: Strategy,
        /// Simulated work per increment, in microseconds
        #[arg(long, default_value_t = 1)]
        work_us: u64,
    },
}

impl Args {
    fn universe(&self) -> Result<Universe> {
        let mut runtime = RuntimeConfig::from_env();
        if let Some(bytes) = self.eager_limit {
            runtime.eager_limit = bytes;
        }
        if let Some(ms) = self.timeout_ms {
            runtime.deadlock_timeout = (ms > 0).then_some(Duration::from_millis(ms));
        }
        if matches!(self.command, Command::Deadlock { .. }) && runtime.deadlock_timeout.is_none()
        {
            runtime.deadlock_timeout = Some(DEMO_DEADLOCK_TIMEOUT);
        }
        let np = self.np.or_else(config::world_size).unwrap_or(2);
        Ok(Universe::new(np)?.with_config(runtime))
    }
}

/// Reduce per-rank outcomes to one, preferring a timeout over other errors.
fn settle<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    if let Some(timeout) = results
        .iter()
        .find_map(|r| r.as_ref().err().filter(|e| matches!(e, Error::Timeout { .. })))
    {
        return Err(timeout.clone());
    }
    results.into_iter().collect()
}

fn run(args: &Args) -> Result<()> {
    let universe = args.universe()?;
    tracing::info!(np = universe.size(), command = ?args.command, "starting");

    match &args.command {
        Command::PingPong {
            size,
            iterations,
            warmup,
        } => {
            let config = PingPongConfig::default()
                .with_message_size(*size)
                .with_iterations(*iterations)
                .with_warmup(*warmup);
            let runs = settle(universe.launch(|mpi| ping_pong(&mpi.world(), &config)))?;
            if let Some(run) = runs.into_iter().flatten().next() {
                println!("{}", run.report);
            }
        }
        Command::Bandwidth { sizes, iterations } => {
            let sizes = if sizes.is_empty() {
                DEFAULT_SWEEP_SIZES.to_vec()
            } else {
                sizes.clone()
            };
            let reports = settle(
                universe.launch(|mpi| bandwidth_sweep(&mpi.world(), &sizes, *iterations)),
            )?;
            for report in reports.into_iter().flatten() {
                println!("Size: {} bytes", report.message_size);
                println!("Bandwidth: {:.2} MB/s", report.bandwidth_mb_s());
                println!("Latency: {:.3} us", report.mean_us);
            }
            println!("Bandwidth test completed");
        }
        Command::Ring { token } => {
            let outcomes = settle(universe.launch(|mpi| token_ring(&mpi.world(), *token)))?;
            for (rank, outcome) in outcomes.iter().enumerate().skip(1) {
                println!("{}", outcome.describe(rank as i32));
            }
            if let Some(origin) = outcomes.first() {
                println!("{}", origin.describe(0));
            }
        }
        Command::Deadlock { order, count } => {
            let received = settle(universe.launch(|mpi| {
                exchange_traced(&mpi.world(), *order, *count, |event| println!("{event}"))
            }))?;
            for (rank, data) in received.iter().enumerate() {
                println!("Rank {rank} received {} values from rank {}", data.len(), 1 - rank);
            }
            println!("Exchange ({order}) completed without deadlock");
        }
        #[cfg(feature = "rma")]
        Command::Race {
            increments,
            strategy,
            work_us,
        } => {
            let config = CounterConfig::default()
                .with_increments(*increments)
                .with_strategy(*strategy)
                .with_work(Duration::from_micros(*work_us));
            let reports = settle(universe.launch(|mpi| {
                let world = mpi.world();
                println!("Process {}: Starting race condition test...", world.rank());
                shared_counter(&world, &config, |progress| println!("{progress}"))
            }))?;
            if let Some(report) = reports.into_iter().flatten().next() {
                println!("{report}");
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::InsufficientRanks { required, .. }) => {
            eprintln!("Need at least {required} ranks.");
            ExitCode::from(1)
        }
        Err(Error::InvalidWorldSize { required, .. }) => {
            eprintln!("This program requires exactly {required} MPI processes");
            ExitCode::from(1)
        }
        Err(err) if err.is_config() => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
        Err(err) => {
            tracing::error!(%err, "run failed");
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

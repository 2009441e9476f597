//! Ping-pong latency and bandwidth benchmark.
//!
//! Rank 0 sends a fixed-size byte message to rank 1, which sends it straight
//! back. One round trip is two one-way transfers, so the mean one-way latency
//! is the timed loop's elapsed time divided by `2 × iterations`. Ranks other
//! than 0 and 1 take no part.
//!
//! # Example
//!
//! ```
//! use ferrocomm::pingpong::{ping_pong, PingPongConfig};
//! use ferrocomm::Universe;
//!
//! let config = PingPongConfig::default().with_iterations(50);
//! let runs = Universe::new(2).unwrap().run(|mpi| {
//!     ping_pong(&mpi.world(), &config)
//! }).unwrap();
//!
//! let run = runs[0].as_ref().unwrap();
//! assert_eq!(run.echoed, config.payload());
//! println!("{}", run.report.summary());
//! assert!(runs[1].is_none());
//! ```

use std::fmt;

use tracing::{debug, info};

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::Mpi;

/// Default message size in bytes.
pub const DEFAULT_MESSAGE_SIZE: usize = 8;

/// Default number of timed round trips.
pub const DEFAULT_ITERATIONS: usize = 10_000;

/// Message sizes used by [`bandwidth_sweep`] when none are given.
pub const DEFAULT_SWEEP_SIZES: [usize; 5] = [8, 1024, 8 * 1024, 64 * 1024, 1024 * 1024];

const PING_TAG: i32 = 0;

/// Parameters of one ping-pong run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPongConfig {
    /// Bytes per message.
    pub message_size: usize,
    /// Timed round trips.
    pub iterations: usize,
    /// Untimed round trips before the timed loop.
    pub warmup: usize,
}

impl Default for PingPongConfig {
    fn default() -> Self {
        PingPongConfig {
            message_size: DEFAULT_MESSAGE_SIZE,
            iterations: DEFAULT_ITERATIONS,
            warmup: 0,
        }
    }
}

impl PingPongConfig {
    /// Set the message size in bytes.
    pub fn with_message_size(mut self, bytes: usize) -> Self {
        self.message_size = bytes;
        self
    }

    /// Set the number of timed round trips.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the number of untimed warm-up round trips.
    pub fn with_warmup(mut self, warmup: usize) -> Self {
        self.warmup = warmup;
        self
    }

    /// The message rank 0 starts with.
    ///
    /// A non-constant pattern, so a reordered or corrupted echo is caught.
    pub fn payload(&self) -> Vec<u8> {
        (0..self.message_size).map(|i| (i % 251) as u8).collect()
    }

    fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::Config(
                "ping-pong needs at least one iteration".into(),
            ));
        }
        Ok(())
    }
}

/// Timing summary of one ping-pong run, in microseconds unless noted.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyReport {
    /// Bytes per message.
    pub message_size: usize,
    /// Timed round trips.
    pub iterations: usize,
    /// Wall-clock time of the timed loop, in seconds.
    pub elapsed: f64,
    /// Mean one-way latency.
    pub mean_us: f64,
    /// Variance of the per-iteration one-way latency, in µs².
    pub variance_us2: f64,
    /// Fastest one-way latency seen.
    pub min_us: f64,
    /// Slowest one-way latency seen.
    pub max_us: f64,
}

impl LatencyReport {
    fn from_samples(config: &PingPongConfig, elapsed: f64, samples: &[f64]) -> Self {
        let mean_us = elapsed * 1e6 / (2.0 * config.iterations as f64);
        let n = samples.len() as f64;
        let sample_mean = samples.iter().sum::<f64>() / n;
        let variance_us2 = samples
            .iter()
            .map(|s| (s - sample_mean).powi(2))
            .sum::<f64>()
            / n;
        LatencyReport {
            message_size: config.message_size,
            iterations: config.iterations,
            elapsed,
            mean_us,
            variance_us2,
            min_us: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max_us: samples.iter().copied().fold(0.0, f64::max),
        }
    }

    /// Throughput of one-way transfers in MB/s (10⁶ bytes per second).
    pub fn bandwidth_mb_s(&self) -> f64 {
        if self.mean_us > 0.0 {
            self.message_size as f64 / self.mean_us
        } else {
            0.0
        }
    }

    /// Standard deviation of the one-way latency.
    pub fn stddev_us(&self) -> f64 {
        self.variance_us2.sqrt()
    }

    /// The `PingPong: size=<n> bytes, latency=<x> us` line.
    pub fn summary(&self) -> String {
        format!(
            "PingPong: size={} bytes, latency={:.3} us",
            self.message_size, self.mean_us
        )
    }
}

impl fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        writeln!(
            f,
            "  min={:.3} us, max={:.3} us, stddev={:.3} us",
            self.min_us,
            self.max_us,
            self.stddev_us()
        )?;
        write!(f, "Bandwidth: {:.2} MB/s", self.bandwidth_mb_s())
    }
}

/// Rank 0's view of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct PingPongRun {
    /// Timing summary.
    pub report: LatencyReport,
    /// The buffer as it came back from the last round trip.
    pub echoed: Vec<u8>,
}

fn require_pair(comm: &Communicator) -> Result<()> {
    if comm.size() < 2 {
        return Err(Error::InsufficientRanks {
            required: 2,
            actual: comm.size(),
        });
    }
    Ok(())
}

/// Run the ping-pong benchmark between ranks 0 and 1 of `comm`.
///
/// Collective over `comm`. Returns `Some` on rank 0 and `None` everywhere
/// else. Fails with [`Error::InsufficientRanks`] before sending anything if
/// `comm` has fewer than two ranks.
pub fn ping_pong(comm: &Communicator, config: &PingPongConfig) -> Result<Option<PingPongRun>> {
    require_pair(comm)?;
    config.validate()?;

    let mut buf = config.payload();
    match comm.rank() {
        0 => {
            for _ in 0..config.warmup {
                comm.send(&buf, 1, PING_TAG)?;
                comm.recv(&mut buf, 1, PING_TAG)?;
            }

            let mut samples = Vec::with_capacity(config.iterations);
            let start = Mpi::wtime();
            for _ in 0..config.iterations {
                let t0 = Mpi::wtime();
                comm.send(&buf, 1, PING_TAG)?;
                comm.recv(&mut buf, 1, PING_TAG)?;
                samples.push((Mpi::wtime() - t0) * 1e6 / 2.0);
            }
            let elapsed = Mpi::wtime() - start;

            let report = LatencyReport::from_samples(config, elapsed, &samples);
            info!(
                size = report.message_size,
                iterations = report.iterations,
                latency_us = report.mean_us,
                "ping-pong finished"
            );
            Ok(Some(PingPongRun {
                report,
                echoed: buf,
            }))
        }
        1 => {
            for _ in 0..config.warmup + config.iterations {
                comm.recv(&mut buf, 0, PING_TAG)?;
                comm.send(&buf, 0, PING_TAG)?;
            }
            debug!("pong side finished");
            Ok(None)
        }
        _ => Ok(None),
    }
}

/// Run [`ping_pong`] once per message size.
///
/// Returns one report per size on rank 0 and an empty list elsewhere.
pub fn bandwidth_sweep(
    comm: &Communicator,
    sizes: &[usize],
    iterations: usize,
) -> Result<Vec<LatencyReport>> {
    require_pair(comm)?;
    let mut reports = Vec::new();
    for &size in sizes {
        let config = PingPongConfig::default()
            .with_message_size(size)
            .with_iterations(iterations)
            .with_warmup(iterations.min(10));
        if let Some(run) = ping_pong(comm, &config)? {
            reports.push(run.report);
        }
    }
    Ok(reports)
}

//! Shared-counter race experiment.
//!
//! Rank 0 exposes a single counter in a [`Window`], initialised to zero, and
//! every rank increments it a fixed number of times. How the increment is
//! done is the point of the experiment:
//!
//! - [`Strategy::FenceOnly`] reads the counter in one fenced epoch and writes
//!   `value + 1` back in a later one. Fences only order epochs, so ranks that
//!   read the same value overwrite each other's increments. The expected
//!   total is an upper bound, not a guarantee.
//! - [`Strategy::Accumulate`] adds one with an atomic accumulate.
//! - [`Strategy::ExclusiveLock`] does the read-modify-write while holding an
//!   exclusive lock on rank 0's region.
//!
//! The last two always reach `size × increments`.

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::window::{Exclusive, OneSided, Window};
use crate::ReduceOp;

/// Default increments per rank.
pub const DEFAULT_INCREMENTS: usize = 1000;

/// Rank 0 reports progress every this many iterations.
pub const PROGRESS_INTERVAL: usize = 100;

const COUNTER_RANK: i32 = 0;

/// How each rank increments the shared counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Fenced get, then fenced put. Loses updates when ranks overlap.
    FenceOnly,
    /// Atomic accumulate of one.
    Accumulate,
    /// Read-modify-write under an exclusive lock.
    ExclusiveLock,
}

impl Strategy {
    /// Whether this strategy guarantees that no increment is lost.
    pub fn is_synchronized(self) -> bool {
        !matches!(self, Strategy::FenceOnly)
    }

    fn name(self) -> &'static str {
        match self {
            Strategy::FenceOnly => "fence-only",
            Strategy::Accumulate => "accumulate",
            Strategy::ExclusiveLock => "exclusive-lock",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [Strategy::FenceOnly, Strategy::Accumulate, Strategy::ExclusiveLock]
            .into_iter()
            .find(|strategy| strategy.name() == s)
            .ok_or_else(|| Error::Config(format!("unknown counter strategy: {s}")))
    }
}

/// Parameters of one counter run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterConfig {
    /// Increments per rank.
    pub increments: usize,
    /// Increment strategy.
    pub strategy: Strategy,
    /// Simulated work between reading and writing the counter.
    pub work: Duration,
}

impl Default for CounterConfig {
    fn default() -> Self {
        CounterConfig {
            increments: DEFAULT_INCREMENTS,
            strategy: Strategy::FenceOnly,
            work: Duration::from_micros(1),
        }
    }
}

impl CounterConfig {
    /// Set the increments per rank.
    pub fn with_increments(mut self, increments: usize) -> Self {
        self.increments = increments;
        self
    }

    /// Set the increment strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the simulated work per increment.
    pub fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }
}

/// Periodic progress note from rank 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Reporting rank.
    pub rank: i32,
    /// Zero-based iteration just finished.
    pub iteration: usize,
    /// Counter value if no update had been lost so far.
    pub should_be: i64,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Process {}: Iteration {}, counter should be {}",
            self.rank, self.iteration, self.should_be
        )
    }
}

/// Final state of the counter, as seen by rank 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterReport {
    /// `size × increments`.
    pub expected: i64,
    /// Value the counter ended at.
    pub actual: i64,
    /// `expected - actual`.
    pub lost_updates: i64,
}

impl CounterReport {
    /// Build a report from the expected and final values.
    pub fn new(expected: i64, actual: i64) -> Self {
        CounterReport {
            expected,
            actual,
            lost_updates: expected - actual,
        }
    }

    /// Whether any increment was lost in this run.
    pub fn race_detected(&self) -> bool {
        self.lost_updates != 0
    }
}

impl fmt::Display for CounterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Final counter value: {} (expected: {})",
            self.actual, self.expected
        )?;
        if self.race_detected() {
            write!(f, "RACE CONDITION DETECTED! Lost updates: {}", self.lost_updates)
        } else {
            write!(f, "No race detected in this run (but race still exists!)")
        }
    }
}

/// Run the shared-counter experiment over `comm`.
///
/// Collective over `comm`. Rank 0 calls `on_progress` every
/// [`PROGRESS_INTERVAL`] iterations and gets the final report; other ranks
/// get `None`.
pub fn shared_counter<F>(
    comm: &Communicator,
    config: &CounterConfig,
    mut on_progress: F,
) -> Result<Option<CounterReport>>
where
    F: FnMut(Progress),
{
    let (rank, size) = (comm.rank(), comm.size());
    let local = if rank == COUNTER_RANK { vec![0i64] } else { Vec::new() };
    let win = Window::create(comm, local)?;
    comm.barrier()?;
    debug!(rank, strategy = %config.strategy, increments = config.increments, "counter started");

    for i in 0..config.increments {
        match config.strategy {
            Strategy::FenceOnly => {
                let mut value = [0i64];
                win.fence()?;
                win.get(COUNTER_RANK, 0, &mut value)?;
                win.fence()?;
                work(config.work);
                value[0] += 1;
                win.fence()?;
                win.put(COUNTER_RANK, 0, &value)?;
                win.fence()?;
            }
            Strategy::Accumulate => {
                work(config.work);
                win.accumulate(COUNTER_RANK, 0, &[1], ReduceOp::Sum)?;
            }
            Strategy::ExclusiveLock => {
                let mut guard = win.lock_exclusive(COUNTER_RANK)?;
                work(config.work);
                guard.update(0, |v| v + 1)?;
            }
        }

        if rank == COUNTER_RANK && i % PROGRESS_INTERVAL == 0 {
            on_progress(Progress {
                rank,
                iteration: i,
                should_be: ((i + 1) * size as usize) as i64,
            });
        }
    }

    // Every rank has finished incrementing before the counter is read.
    win.fence()?;
    let report = if rank == COUNTER_RANK {
        let actual = win.local()?[0];
        let report = CounterReport::new((config.increments * size as usize) as i64, actual);
        if report.race_detected() {
            warn!(
                strategy = %config.strategy,
                lost_updates = report.lost_updates,
                "lost updates on shared counter"
            );
        } else {
            info!(strategy = %config.strategy, actual, "shared counter complete");
        }
        Some(report)
    } else {
        None
    };
    win.free()?;
    Ok(report)
}

fn work(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Universe;

    fn run(size: i32, config: CounterConfig) -> CounterReport {
        let reports = Universe::new(size)
            .unwrap()
            .run(|mpi| shared_counter(&mpi.world(), &config, |_| {}))
            .unwrap();
        assert!(reports[1..].iter().all(Option::is_none));
        reports[0].unwrap()
    }

    #[test]
    fn report_lines() {
        let clean = CounterReport::new(4000, 4000);
        assert_eq!(
            clean.to_string(),
            "Final counter value: 4000 (expected: 4000)\n\
             No race detected in this run (but race still exists!)"
        );
        let racy = CounterReport::new(4000, 1500);
        assert!(racy.race_detected());
        assert!(racy
            .to_string()
            .ends_with("RACE CONDITION DETECTED! Lost updates: 2500"));
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!("fence-only".parse::<Strategy>(), Ok(Strategy::FenceOnly));
        assert_eq!("exclusive-lock".parse::<Strategy>(), Ok(Strategy::ExclusiveLock));
        assert!("hope".parse::<Strategy>().is_err());
        assert!(!Strategy::FenceOnly.is_synchronized());
    }

    #[test]
    fn accumulate_loses_nothing() {
        let config = CounterConfig::default()
            .with_strategy(Strategy::Accumulate)
            .with_increments(200);
        assert_eq!(run(4, config), CounterReport::new(800, 800));
    }

    #[test]
    fn exclusive_lock_loses_nothing() {
        let config = CounterConfig::default()
            .with_strategy(Strategy::ExclusiveLock)
            .with_increments(200);
        assert_eq!(run(3, config), CounterReport::new(600, 600));
    }

    #[test]
    fn fence_only_never_overcounts() {
        let config = CounterConfig::default().with_increments(50);
        let report = run(4, config);
        assert_eq!(report.expected, 200);
        assert!(report.actual <= report.expected);
        assert!(report.actual >= 50);
    }

    #[test]
    fn fence_only_is_exact_on_one_rank() {
        let config = CounterConfig::default().with_increments(30);
        assert_eq!(run(1, config), CounterReport::new(30, 30));
    }

    #[test]
    fn progress_every_hundred_iterations() {
        let config = CounterConfig::default()
            .with_strategy(Strategy::Accumulate)
            .with_increments(250)
            .with_work(Duration::ZERO);
        let notes = Universe::new(2)
            .unwrap()
            .run(|mpi| {
                let mut notes = Vec::new();
                shared_counter(&mpi.world(), &config, |p| notes.push(p.to_string()))?;
                Ok(notes)
            })
            .unwrap();
        assert_eq!(
            notes[0],
            vec![
                "Process 0: Iteration 0, counter should be 2",
                "Process 0: Iteration 100, counter should be 202",
                "Process 0: Iteration 200, counter should be 402",
            ]
        );
        assert!(notes[1].is_empty());
    }
}

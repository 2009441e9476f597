//! Launching a fixed group of ranks.

use std::rc::Rc;
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use crate::config::{self, RuntimeConfig};
use crate::error::{Error, Result};
use crate::fabric::{Endpoint, Fabric};
use crate::Mpi;

/// A fixed-size group of ranks sharing one in-process fabric.
///
/// Each rank runs the same program on its own thread with its own state,
/// gated by its rank identity. The world size is fixed at launch and rank
/// identities never change.
///
/// # Example
///
/// ```
/// use ferrocomm::{ReduceOp, Universe};
///
/// let sums = Universe::new(4).unwrap().run(|mpi| {
///     let world = mpi.world();
///     world.allreduce_scalar(world.rank() as i64, ReduceOp::Sum)
/// }).unwrap();
/// assert_eq!(sums, vec![6; 4]);
/// ```
#[derive(Debug, Clone)]
pub struct Universe {
    size: i32,
    config: RuntimeConfig,
}

impl Universe {
    /// Create a universe of `size` ranks with the default configuration.
    pub fn new(size: i32) -> Result<Self> {
        if size < 1 {
            return Err(Error::Config(format!(
                "world size must be at least 1, got {size}"
            )));
        }
        Ok(Universe {
            size,
            config: RuntimeConfig::default(),
        })
    }

    /// Create a universe from the `FERROCOMM_*` environment variables.
    ///
    /// The world size defaults to 1 when `FERROCOMM_NP` is unset.
    pub fn from_env() -> Result<Self> {
        let universe = Universe::new(config::world_size().unwrap_or(1))?;
        Ok(universe.with_config(RuntimeConfig::from_env()))
    }

    /// Replace the runtime configuration.
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Buffer messages of at most `bytes` bytes.
    pub fn with_eager_limit(mut self, bytes: usize) -> Self {
        self.config.eager_limit = bytes;
        self
    }

    /// Fail blocking operations that wait longer than `timeout`.
    pub fn with_deadlock_timeout(mut self, timeout: Duration) -> Self {
        self.config.deadlock_timeout = Some(timeout);
        self
    }

    /// Number of ranks.
    pub fn size(&self) -> i32 {
        self.size
    }

    /// The runtime configuration every rank sees.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Run `program` on every rank and return each rank's outcome in rank
    /// order.
    ///
    /// A rank that panics is reported as [`Error::RankPanicked`]. Its
    /// endpoint is finalized while unwinding, so peers waiting on it fail
    /// with [`Error::Disconnected`] instead of hanging.
    pub fn launch<F, T>(&self, program: F) -> Vec<Result<T>>
    where
        F: Fn(Mpi) -> Result<T> + Sync,
        T: Send,
    {
        if let Err(err) = self.config.validate() {
            return (0..self.size).map(|_| Err(err.clone())).collect();
        }
        info!(size = self.size, config = ?self.config, "launching universe");
        let (fabric, inboxes) = Fabric::new(self.size, self.config.clone());
        let program = &program;

        thread::scope(|scope| {
            let handles: Vec<_> = inboxes
                .into_iter()
                .enumerate()
                .map(|(rank, inbox)| {
                    let rank = rank as i32;
                    let fabric = fabric.clone();
                    thread::Builder::new()
                        .name(format!("rank-{rank}"))
                        .spawn_scoped(scope, move || {
                            let mpi = Mpi::new(Rc::new(Endpoint::new(rank, fabric, inbox)));
                            program(mpi)
                        })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    let rank = rank as i32;
                    match handle {
                        Ok(handle) => handle.join().unwrap_or_else(|_| {
                            error!(rank, "rank panicked");
                            Err(Error::RankPanicked { rank })
                        }),
                        Err(err) => Err(Error::Internal(format!(
                            "failed to spawn rank {rank}: {err}"
                        ))),
                    }
                })
                .collect()
        })
    }

    /// Run `program` on every rank, returning the per-rank values in rank
    /// order or the error of the lowest failing rank.
    pub fn run<F, T>(&self, program: F) -> Result<Vec<T>>
    where
        F: Fn(Mpi) -> Result<T> + Sync,
        T: Send,
    {
        self.launch(program).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_size_must_be_positive() {
        assert!(matches!(Universe::new(0), Err(Error::Config(_))));
        assert!(matches!(Universe::new(-2), Err(Error::Config(_))));
        assert_eq!(Universe::new(3).unwrap().size(), 3);
    }

    #[test]
    fn results_come_back_in_rank_order() {
        let ranks = Universe::new(5)
            .unwrap()
            .run(|mpi| Ok(mpi.world().rank() * 10))
            .unwrap();
        assert_eq!(ranks, vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn panicking_rank_is_reported() {
        let results = Universe::new(2).unwrap().launch(|mpi| {
            if mpi.world().rank() == 1 {
                panic!("rank 1 gives up");
            }
            Ok(())
        });
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(Error::RankPanicked { rank: 1 }));
    }

    #[test]
    fn peer_of_panicked_rank_is_disconnected() {
        let results = Universe::new(2).unwrap().launch(|mpi| {
            let world = mpi.world();
            if world.rank() == 1 {
                panic!("rank 1 gives up");
            }
            let mut buf = [0u8];
            world.recv(&mut buf, 1, 0).map(|_| ())
        });
        assert_eq!(results[0], Err(Error::Disconnected(1)));
    }

    #[test]
    fn invalid_config_fails_every_rank() {
        let universe = Universe::new(2)
            .unwrap()
            .with_deadlock_timeout(Duration::ZERO);
        let results = universe.launch(|_| Ok(()));
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(Error::Config(_)))));
    }

    #[test]
    fn thread_names_carry_the_rank() {
        let names = Universe::new(2)
            .unwrap()
            .run(|mpi| mpi.world().processor_name())
            .unwrap();
        assert_eq!(names, vec!["rank-0".to_string(), "rank-1".to_string()]);
    }
}

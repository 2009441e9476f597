//! # ferrocomm
//!
//! A small, in-process message-passing runtime for rank-to-rank exchange
//! experiments.
//!
//! A [`Universe`] launches a fixed number of ranks, each running the same
//! program on its own thread with its own state. Ranks talk to each other
//! only through:
//! - Blocking, tagged point-to-point `send`/`recv` with FIFO ordering per
//!   (source, destination, tag) and both rendezvous and eager delivery
//! - Nonblocking `isend`/`irecv` and the combined `sendrecv`
//! - Collectives: barrier, broadcast, reduce, allreduce, gather
//! - One-sided memory windows with fenced epochs, atomic accumulate and
//!   exclusive locks (with the `rma` feature)
//!
//! On top of those primitives the crate ships the classic exchange
//! experiments: a ping-pong latency and bandwidth benchmark, a token ring,
//! the matched-blocking-send deadlock and the shared-counter race.
//!
//! ## Quick Start
//!
//! ```
//! use ferrocomm::{ReduceOp, Universe};
//!
//! fn main() -> Result<(), ferrocomm::Error> {
//!     let totals = Universe::new(4)?.run(|mpi| {
//!         let world = mpi.world();
//!
//!         let mut data = vec![0.0f64; 8];
//!         if world.rank() == 0 {
//!             data.fill(42.0);
//!         }
//!         world.broadcast(&mut data, 0)?;
//!
//!         world.allreduce_scalar(world.rank() as f64, ReduceOp::Sum)
//!     })?;
//!     assert_eq!(totals, vec![6.0; 4]);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Default |
//! |---------|-------------|---------|
//! | `rma`   | One-sided windows and the shared-counter experiment | yes |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

mod comm;
pub mod config;
mod datatype;
mod error;
pub mod exchange;
mod fabric;
pub mod pingpong;
mod request;
pub mod ring;
mod status;
mod universe;

#[cfg(feature = "rma")]
pub mod counter;
#[cfg(feature = "rma")]
mod window;

pub use comm::Communicator;
pub use config::RuntimeConfig;
pub use datatype::{Datatype, DatatypeTag};
pub use error::{Error, Result};
pub use request::{RecvRequest, Request};
pub use status::Status;
pub use universe::Universe;
#[cfg(feature = "rma")]
pub use window::{Exclusive, ExclusiveGuard, OneSided, SharedGuard, Window};

use std::rc::Rc;
use std::sync::OnceLock;
use std::time::Instant;

use fabric::Endpoint;

/// Wildcard source for receives and probes.
pub const ANY_SOURCE: i32 = -1;

/// Wildcard tag for receives and probes.
pub const ANY_TAG: i32 = -1;

/// Reduction operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ReduceOp {
    /// Sum of values
    Sum = 0,
    /// Maximum value
    Max = 1,
    /// Minimum value
    Min = 2,
    /// Product of values
    Prod = 3,
}

/// Per-rank runtime handle.
///
/// Every rank of a [`Universe`] receives one of these when it starts; it is
/// the rank's view of an initialized runtime. Dropping it, or calling
/// [`finalize()`](Self::finalize), finalizes the rank: its mailbox closes,
/// undelivered messages are discarded, and peers that still try to talk to
/// it get [`Error::Disconnected`].
///
/// # Example
///
/// ```
/// use ferrocomm::Universe;
///
/// Universe::new(2).unwrap().run(|mpi| {
///     let world = mpi.world();
///     println!("Running on {} ranks", world.size());
///     mpi.finalize()
/// }).unwrap();
/// ```
pub struct Mpi {
    endpoint: Rc<Endpoint>,
}

impl Mpi {
    pub(crate) fn new(endpoint: Rc<Endpoint>) -> Self {
        tracing::debug!(rank = endpoint.rank(), "rank initialized");
        Mpi { endpoint }
    }

    /// Get a handle to the communicator spanning every rank.
    pub fn world(&self) -> Communicator {
        Communicator::world(self.endpoint.clone())
    }

    /// Get the current wall-clock time in seconds.
    ///
    /// This is a monotonic, high-resolution timer suitable for benchmarking.
    /// Only differences between two readings are meaningful.
    pub fn wtime() -> f64 {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
    }

    /// Get the library version string.
    pub fn version() -> String {
        format!("ferrocomm {}", env!("CARGO_PKG_VERSION"))
    }

    /// Check if this rank has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.endpoint.is_finalized()
    }

    /// Finalize this rank explicitly.
    ///
    /// Communicators obtained from this handle fail with
    /// [`Error::AlreadyFinalized`] afterwards.
    pub fn finalize(self) -> Result<()> {
        if self.endpoint.is_finalized() {
            return Err(Error::AlreadyFinalized);
        }
        self.endpoint.shutdown();
        Ok(())
    }
}

impl Drop for Mpi {
    fn drop(&mut self) {
        if !self.endpoint.is_finalized() {
            self.endpoint.shutdown();
            tracing::debug!(rank = self.endpoint.rank(), "rank finalized");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wtime_is_monotonic() {
        let t0 = Mpi::wtime();
        let t1 = Mpi::wtime();
        assert!(t1 >= t0);
    }

    #[test]
    fn finalized_rank_rejects_communication() {
        let results = Universe::new(1).unwrap().launch(|mpi| {
            let world = mpi.world();
            assert!(!mpi.is_finalized());
            mpi.finalize()?;
            Ok(world.barrier().is_ok())
        });
        // A lone rank's barrier sends nothing, so it still succeeds.
        assert_eq!(results[0], Ok(true));

        let results = Universe::new(1).unwrap().launch(|mpi| {
            let world = mpi.world();
            mpi.finalize()?;
            let mut buf = [0u8];
            Ok(world.recv(&mut buf, 0, 0).err())
        });
        assert_eq!(results[0], Ok(Some(Error::AlreadyFinalized)));
    }

    #[test]
    fn version_names_the_crate() {
        assert!(Mpi::version().starts_with("ferrocomm "));
    }
}

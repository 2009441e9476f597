//! Token ring.
//!
//! Rank 0 originates a token and sends it to rank 1. Every other rank waits
//! for the token from its predecessor, adds one, and forwards it to
//! `(rank + 1) % size`. Rank 0 finishes when the token comes back from rank
//! `size - 1`, so its final token is `initial + (size - 1)`.
//!
//! Each rank follows a fixed role, described by [`RingRole`]:
//!
//! | Role         | Steps                                    |
//! |--------------|------------------------------------------|
//! | `Originator` | originate → await return → done          |
//! | `Relay`      | await token → increment and forward → done |

use tracing::debug;

use crate::comm::Communicator;
use crate::error::{Error, Result};

/// Token value rank 0 starts the ring with.
pub const INITIAL_TOKEN: i32 = 42;

const TOKEN_TAG: i32 = 0;

/// The part a rank plays in the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingRole {
    /// Starts the token and receives it back at the end.
    Originator,
    /// Increments the token and passes it on.
    Relay,
}

impl RingRole {
    /// Role of `rank`.
    pub fn of(rank: i32) -> Self {
        if rank == 0 {
            RingRole::Originator
        } else {
            RingRole::Relay
        }
    }
}

/// What a rank saw of the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingOutcome {
    /// This rank's role.
    pub role: RingRole,
    /// Value received. For the originator this is the final token.
    pub received: i32,
    /// Value sent on. For the originator this is the initial token.
    pub sent: i32,
}

impl RingOutcome {
    /// The line this rank reports.
    pub fn describe(&self, rank: i32) -> String {
        match self.role {
            RingRole::Originator => format!("Rank {rank} received final token={}", self.received),
            RingRole::Relay => format!("Rank {rank} forwarded token={}", self.sent),
        }
    }
}

/// Pass a token starting at `initial` once around the ring.
///
/// Collective over `comm`, which must have at least two ranks.
pub fn token_ring(comm: &Communicator, initial: i32) -> Result<RingOutcome> {
    let (rank, size) = (comm.rank(), comm.size());
    if size < 2 {
        return Err(Error::InsufficientRanks {
            required: 2,
            actual: size,
        });
    }
    let next = (rank + 1) % size;
    let prev = (rank + size - 1) % size;
    let mut token = [0i32];

    let outcome = match RingRole::of(rank) {
        RingRole::Originator => {
            comm.send(&[initial], next, TOKEN_TAG)?;
            comm.recv(&mut token, prev, TOKEN_TAG)?;
            RingOutcome {
                role: RingRole::Originator,
                received: token[0],
                sent: initial,
            }
        }
        RingRole::Relay => {
            comm.recv(&mut token, prev, TOKEN_TAG)?;
            let forwarded = token[0].wrapping_add(1);
            comm.send(&[forwarded], next, TOKEN_TAG)?;
            RingOutcome {
                role: RingRole::Relay,
                received: token[0],
                sent: forwarded,
            }
        }
    };
    debug!(rank, received = outcome.received, sent = outcome.sent, "token passed");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Universe;

    #[test]
    fn roles() {
        assert_eq!(RingRole::of(0), RingRole::Originator);
        assert_eq!(RingRole::of(3), RingRole::Relay);
    }

    #[test]
    fn token_comes_back_incremented() {
        let outcomes = Universe::new(4)
            .unwrap()
            .run(|mpi| token_ring(&mpi.world(), INITIAL_TOKEN))
            .unwrap();
        assert_eq!(outcomes[0].received, 45);
        assert_eq!(outcomes[0].describe(0), "Rank 0 received final token=45");
        for (rank, outcome) in outcomes.iter().enumerate().skip(1) {
            assert_eq!(outcome.role, RingRole::Relay);
            assert_eq!(outcome.sent, outcome.received + 1);
            assert_eq!(outcome.received, INITIAL_TOKEN + rank as i32 - 1);
        }
        assert_eq!(outcomes[1].describe(1), "Rank 1 forwarded token=43");
    }

    #[test]
    fn lone_rank_is_rejected() {
        let results = Universe::new(1)
            .unwrap()
            .launch(|mpi| token_ring(&mpi.world(), INITIAL_TOKEN));
        assert!(matches!(
            results[0],
            Err(Error::InsufficientRanks { required: 2, actual: 1 })
        ));
    }
}

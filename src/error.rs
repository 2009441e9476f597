//! Error types for ferrocomm

use std::time::Duration;
use thiserror::Error;

/// Result type for ferrocomm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for runtime and communication operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The world is too small for the requested program
    #[error("Need at least {required} ranks, got {actual}")]
    InsufficientRanks {
        /// Minimum number of ranks the program needs
        required: i32,
        /// Number of ranks actually launched
        actual: i32,
    },

    /// The program needs an exact world size
    #[error("This program requires exactly {required} ranks, got {actual}")]
    InvalidWorldSize {
        /// Exact number of ranks the program needs
        required: i32,
        /// Number of ranks actually launched
        actual: i32,
    },

    /// Invalid rank specified
    #[error("Invalid rank: {0}")]
    InvalidRank(i32),

    /// Invalid tag specified (user tags must be non-negative)
    #[error("Invalid tag: {0}")]
    InvalidTag(i32),

    /// Invalid buffer provided
    #[error("Invalid buffer")]
    InvalidBuffer,

    /// Displacement outside the target's exposed window region
    #[error("Invalid displacement {disp} (+{count}) for window region of {len} elements")]
    InvalidDisplacement {
        /// First element addressed
        disp: usize,
        /// Number of elements addressed
        count: usize,
        /// Length of the target region
        len: usize,
    },

    /// Incoming message does not fit into the receive buffer
    #[error("Message truncated: {count} elements into a buffer of {capacity}")]
    Truncated {
        /// Number of elements in the message
        count: i64,
        /// Capacity of the receive buffer
        capacity: i64,
    },

    /// Incoming message carries a different datatype than the receive buffer
    #[error("Datatype mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Datatype of the receive buffer
        expected: &'static str,
        /// Datatype of the message
        actual: &'static str,
    },

    /// A blocking operation did not complete within the deadlock timeout
    #[error("Rank {rank} blocked in {operation} for more than {waited:?}")]
    Timeout {
        /// Rank that gave up waiting
        rank: i32,
        /// Operation that was blocked
        operation: &'static str,
        /// How long the rank waited
        waited: Duration,
    },

    /// The peer rank has finalized or terminated
    #[error("Rank {0} is no longer reachable")]
    Disconnected(i32),

    /// A rank panicked while running its program
    #[error("Rank {rank} panicked")]
    RankPanicked {
        /// Rank whose thread panicked
        rank: i32,
    },

    /// The rank has already called finalize
    #[error("Runtime has already been finalized on this rank")]
    AlreadyFinalized,

    /// Invalid runtime configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is a configuration error detected before any
    /// communication took place.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::InsufficientRanks { .. } | Error::InvalidWorldSize { .. } | Error::Config(_)
        )
    }

    /// Process exit code for a run that ended with this error.
    ///
    /// Configuration errors exit with 1 before any communication, detected
    /// hangs with 2; anything else is a generic failure (1).
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Timeout { .. } => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_ranks_message() {
        let err = Error::InsufficientRanks {
            required: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "Need at least 2 ranks, got 1");
        assert!(err.is_config());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn timeout_is_not_a_config_error() {
        let err = Error::Timeout {
            rank: 1,
            operation: "send",
            waited: Duration::from_millis(50),
        };
        assert!(!err.is_config());
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().starts_with("Rank 1 blocked in send"));
    }
}

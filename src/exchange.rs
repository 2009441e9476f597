//! Two-rank exchange and the matched-blocking-send deadlock.
//!
//! Two ranks each want to send a message to the other and receive the
//! other's. If both send first with blocking sends and delivery is
//! unbuffered (rendezvous), each send waits for a receive the peer never
//! reaches: a deadlock. [`ExchangeOrder`] lists that ordering and three
//! ways to avoid it.
//!
//! With a deadlock timeout configured, the blocked sends fail with
//! [`Error::Timeout`] instead of hanging forever.
//!
//! ```
//! use ferrocomm::exchange::{exchange, ExchangeOrder};
//! use ferrocomm::Universe;
//!
//! let got = Universe::new(2).unwrap().run(|mpi| {
//!     exchange(&mpi.world(), ExchangeOrder::Alternating, 4)
//! }).unwrap();
//! assert_eq!(got[0], vec![1.0; 4]);
//! assert_eq!(got[1], vec![0.0; 4]);
//! ```

use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::comm::Communicator;
use crate::error::{Error, Result};

const EXCHANGE_TAG: i32 = 0;

/// How the two ranks order their send and receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOrder {
    /// Both ranks send, then receive. Deadlocks under rendezvous delivery.
    SendFirst,
    /// Rank 0 sends then receives; rank 1 receives then sends.
    Alternating,
    /// Both ranks use the combined `sendrecv`.
    SendRecv,
    /// Both ranks post a nonblocking send, receive, then wait on the send.
    Nonblocking,
}

impl ExchangeOrder {
    /// Every ordering, the deadlocking one first.
    pub const ALL: [ExchangeOrder; 4] = [
        ExchangeOrder::SendFirst,
        ExchangeOrder::Alternating,
        ExchangeOrder::SendRecv,
        ExchangeOrder::Nonblocking,
    ];

    /// Whether this ordering completes regardless of delivery mode.
    pub fn is_safe(self) -> bool {
        !matches!(self, ExchangeOrder::SendFirst)
    }

    fn name(self) -> &'static str {
        match self {
            ExchangeOrder::SendFirst => "send-first",
            ExchangeOrder::Alternating => "alternating",
            ExchangeOrder::SendRecv => "sendrecv",
            ExchangeOrder::Nonblocking => "nonblocking",
        }
    }
}

impl fmt::Display for ExchangeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExchangeOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ExchangeOrder::ALL
            .into_iter()
            .find(|order| order.name() == s)
            .ok_or_else(|| Error::Config(format!("unknown exchange order: {s}")))
    }
}

/// One step of an exchange, as seen by the rank taking it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeEvent {
    /// Rank taking the step.
    pub rank: i32,
    /// What happened.
    pub step: ExchangeStep,
}

/// Steps reported by [`exchange_traced`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExchangeStep {
    /// The rank entered the exchange.
    Starting,
    /// A send to `dest` is about to start.
    Sending {
        /// Peer rank.
        dest: i32,
    },
    /// The send has completed; `then_receive` if a receive comes next.
    SendCompleted {
        /// Whether the rank goes on to receive.
        then_receive: bool,
    },
    /// A receive from `source` is about to block.
    Receiving {
        /// Peer rank.
        source: i32,
    },
    /// The peer's message arrived; `first` is its first element.
    Received {
        /// First value received, if the message was not empty.
        first: Option<f64>,
    },
    /// The exchange finished on this rank.
    Finished,
}

impl fmt::Display for ExchangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rank = self.rank;
        match self.step {
            ExchangeStep::Starting => write!(f, "Process {rank} starting..."),
            ExchangeStep::Sending { dest } => {
                write!(f, "Process {rank}: Attempting to send to process {dest}...")
            }
            ExchangeStep::SendCompleted { then_receive: true } => {
                write!(f, "Process {rank}: Send completed, now receiving...")
            }
            ExchangeStep::SendCompleted { then_receive: false } => {
                write!(f, "Process {rank}: Send completed")
            }
            ExchangeStep::Receiving { source } => {
                write!(f, "Process {rank}: Waiting to receive from process {source}...")
            }
            ExchangeStep::Received { first: Some(value) } => {
                write!(f, "Process {rank}: Received {value}")
            }
            ExchangeStep::Received { first: None } => {
                write!(f, "Process {rank}: Received an empty message")
            }
            ExchangeStep::Finished => write!(f, "Process {rank}: Finalizing"),
        }
    }
}

/// Exchange `count` doubles between the two ranks of `comm`.
///
/// Each rank sends `count` copies of its own rank number and returns what it
/// received from the peer. `comm` must have exactly two ranks.
pub fn exchange(comm: &Communicator, order: ExchangeOrder, count: usize) -> Result<Vec<f64>> {
    exchange_traced(comm, order, count, |_| {})
}

/// [`exchange`], calling `on_event` before and after every blocking step.
///
/// A deadlocked run stops reporting at the step it is stuck in.
pub fn exchange_traced<F>(
    comm: &Communicator,
    order: ExchangeOrder,
    count: usize,
    mut on_event: F,
) -> Result<Vec<f64>>
where
    F: FnMut(ExchangeEvent),
{
    if comm.size() != 2 {
        return Err(Error::InvalidWorldSize {
            required: 2,
            actual: comm.size(),
        });
    }
    let rank = comm.rank();
    let peer = 1 - rank;
    let outgoing = vec![rank as f64; count];
    let mut incoming = vec![0.0f64; count];
    let sends_first = order == ExchangeOrder::SendFirst || rank == 0;
    let mut emit = |step| on_event(ExchangeEvent { rank, step });
    debug!(rank, %order, count, "exchanging");

    emit(ExchangeStep::Starting);
    let result = (|| -> Result<()> {
        match order {
            ExchangeOrder::SendFirst | ExchangeOrder::Alternating if sends_first => {
                emit(ExchangeStep::Sending { dest: peer });
                comm.send(&outgoing, peer, EXCHANGE_TAG)?;
                emit(ExchangeStep::SendCompleted { then_receive: true });
                comm.recv(&mut incoming, peer, EXCHANGE_TAG)?;
                emit(ExchangeStep::Received { first: incoming.first().copied() });
            }
            ExchangeOrder::SendFirst | ExchangeOrder::Alternating => {
                emit(ExchangeStep::Receiving { source: peer });
                comm.recv(&mut incoming, peer, EXCHANGE_TAG)?;
                emit(ExchangeStep::Received { first: incoming.first().copied() });
                emit(ExchangeStep::Sending { dest: peer });
                comm.send(&outgoing, peer, EXCHANGE_TAG)?;
                emit(ExchangeStep::SendCompleted { then_receive: false });
            }
            ExchangeOrder::SendRecv => {
                emit(ExchangeStep::Sending { dest: peer });
                comm.sendrecv(
                    &outgoing,
                    peer,
                    EXCHANGE_TAG,
                    &mut incoming,
                    peer,
                    EXCHANGE_TAG,
                )?;
                emit(ExchangeStep::Received { first: incoming.first().copied() });
            }
            ExchangeOrder::Nonblocking => {
                emit(ExchangeStep::Sending { dest: peer });
                let request = comm.isend(&outgoing, peer, EXCHANGE_TAG)?;
                emit(ExchangeStep::Receiving { source: peer });
                comm.recv(&mut incoming, peer, EXCHANGE_TAG)?;
                emit(ExchangeStep::Received { first: incoming.first().copied() });
                request.wait()?;
                emit(ExchangeStep::SendCompleted { then_receive: false });
            }
        }
        Ok(())
    })();

    if let Err(Error::Timeout { waited, .. }) = &result {
        warn!(rank, %order, ?waited, "exchange deadlocked");
    }
    result?;
    emit(ExchangeStep::Finished);
    Ok(incoming)
}

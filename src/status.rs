//! Message status information.
//!
//! This module provides the [`Status`] struct returned by receive and probe
//! operations, containing metadata about a message.

/// Information about a probed or received message.
///
/// Returned by [`Communicator::recv`](crate::Communicator::recv) and by
/// [`Communicator::probe`](crate::Communicator::probe) /
/// [`Communicator::iprobe`](crate::Communicator::iprobe), which describe an
/// incoming message without consuming it.
///
/// # Example
///
/// ```
/// # use ferrocomm::{Universe, ANY_SOURCE, ANY_TAG};
/// let sizes = Universe::new(2).unwrap().with_eager_limit(64).run(|mpi| {
///     let world = mpi.world();
///     if world.rank() == 1 {
///         world.send(&[1.0f64, 2.0, 3.0], 0, 5)?;
///         return Ok(0);
///     }
///     let status = world.probe::<f64>(ANY_SOURCE, ANY_TAG)?;
///     assert_eq!((status.source, status.tag), (1, 5));
///     let (_data, _) = world.recv_vec::<f64>(status.source, status.tag)?;
///     Ok(status.count)
/// }).unwrap();
/// assert_eq!(sizes[0], 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Source rank of the message.
    pub source: i32,
    /// Tag of the message.
    pub tag: i32,
    /// Number of elements in the message.
    pub count: i64,
}

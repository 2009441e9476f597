//! Communicators: point-to-point and collective operations.

use std::rc::Rc;

use tracing::debug;

use crate::datatype::{decode_into, decode_vec, encode_slice, Datatype, DatatypeTag};
use crate::error::{Error, Result};
use crate::fabric::{Completion, Endpoint, Envelope, COLLECTIVE_BIT, WORLD_CONTEXT};
use crate::request::{RecvRequest, Request};
use crate::status::Status;
use crate::{ReduceOp, ANY_SOURCE, ANY_TAG};

// Tags used on the hidden collective context.
const TAG_BARRIER_IN: i32 = 1;
const TAG_BARRIER_OUT: i32 = 2;
const TAG_BCAST: i32 = 3;
const TAG_REDUCE: i32 = 4;
const TAG_GATHER: i32 = 5;

/// Reject a payload whose datatype differs from the receive buffer's.
pub(crate) fn check_datatype<T: Datatype>(actual: DatatypeTag) -> Result<()> {
    if actual != T::TAG {
        return Err(Error::TypeMismatch {
            expected: T::TAG.name(),
            actual: actual.name(),
        });
    }
    Ok(())
}

/// Fold `other` into `acc` element by element.
pub(crate) fn combine_into<T: Datatype>(acc: &mut [T], other: &[T], op: ReduceOp) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a = a.combine(*b, op);
    }
}

/// A group of ranks with its own message space.
///
/// Messages sent on one communicator only match receives posted on the same
/// communicator; [`duplicate()`](Self::duplicate) gives a library or a window
/// a private space over the same ranks.
///
/// # Example
///
/// ```
/// use ferrocomm::Universe;
///
/// let ranks = Universe::new(3).unwrap().run(|mpi| {
///     let world = mpi.world();
///     Ok((world.rank(), world.size()))
/// }).unwrap();
/// assert_eq!(ranks, vec![(0, 3), (1, 3), (2, 3)]);
/// ```
#[derive(Clone)]
pub struct Communicator {
    endpoint: Rc<Endpoint>,
    context: u32,
}

impl Communicator {
    /// The communicator spanning every rank of the universe.
    pub(crate) fn world(endpoint: Rc<Endpoint>) -> Self {
        Communicator {
            endpoint,
            context: WORLD_CONTEXT,
        }
    }

    pub(crate) fn endpoint(&self) -> &Rc<Endpoint> {
        &self.endpoint
    }

    pub(crate) fn context(&self) -> u32 {
        self.context
    }

    /// Get the rank of the calling process in this communicator.
    pub fn rank(&self) -> i32 {
        self.endpoint.rank()
    }

    /// Get the number of processes in this communicator.
    pub fn size(&self) -> i32 {
        self.endpoint.size()
    }

    /// Get a name for the execution context running this rank.
    pub fn processor_name(&self) -> Result<String> {
        let thread = std::thread::current();
        Ok(thread
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("rank-{}", self.rank())))
    }

    /// Duplicate this communicator.
    ///
    /// Collective: every rank must call it. The duplicate spans the same
    /// ranks with an isolated message space.
    pub fn duplicate(&self) -> Result<Self> {
        let mut context = [0u32];
        if self.rank() == 0 {
            context[0] = self.endpoint.fabric().allocate_context()?;
        }
        self.broadcast(&mut context, 0)?;
        debug!(rank = self.rank(), context = context[0], "duplicated communicator");
        Ok(Communicator {
            endpoint: self.endpoint.clone(),
            context: context[0],
        })
    }

    fn check_source(&self, source: i32) -> Result<()> {
        if source == ANY_SOURCE {
            return Ok(());
        }
        self.endpoint.check_rank(source)
    }

    fn check_send_tag(tag: i32) -> Result<()> {
        if tag < 0 {
            return Err(Error::InvalidTag(tag));
        }
        Ok(())
    }

    fn check_recv_tag(tag: i32) -> Result<()> {
        if tag < 0 && tag != ANY_TAG {
            return Err(Error::InvalidTag(tag));
        }
        Ok(())
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Barrier synchronization.
    ///
    /// All processes in the communicator must call this function. No process
    /// will return until all processes have entered the barrier.
    pub fn barrier(&self) -> Result<()> {
        let rank = self.rank();
        if rank == 0 {
            for peer in 1..self.size() {
                self.collective_take(peer, TAG_BARRIER_IN, "barrier")?;
            }
            for peer in 1..self.size() {
                self.collective_post::<u8>(&[], peer, TAG_BARRIER_OUT)?;
            }
        } else {
            self.collective_post::<u8>(&[], 0, TAG_BARRIER_IN)?;
            self.collective_take(0, TAG_BARRIER_OUT, "barrier")?;
        }
        Ok(())
    }

    // ========================================================================
    // Point-to-Point Communication
    // ========================================================================

    /// Blocking send.
    ///
    /// Returns once `data` may be reused: immediately for buffered (eager)
    /// messages, after the destination has matched the message otherwise.
    pub fn send<T: Datatype>(&self, data: &[T], dest: i32, tag: i32) -> Result<()> {
        let completion = self.post(data, dest, tag)?;
        self.endpoint.complete(completion, "send")
    }

    fn post<T: Datatype>(
        &self,
        data: &[T],
        dest: i32,
        tag: i32,
    ) -> Result<Completion> {
        Self::check_send_tag(tag)?;
        self.endpoint.post(
            dest,
            tag,
            self.context,
            T::TAG,
            encode_slice(data),
            false,
        )
    }

    /// Blocking receive into `data`.
    ///
    /// Use [`ANY_SOURCE`] and [`ANY_TAG`] as wildcards. The message may be
    /// shorter than `data`; the returned [`Status`] carries its actual source,
    /// tag and element count.
    pub fn recv<T: Datatype>(&self, data: &mut [T], source: i32, tag: i32) -> Result<Status> {
        self.check_source(source)?;
        Self::check_recv_tag(tag)?;
        let envelope = self.endpoint.take(source, tag, self.context, "recv")?;
        Self::unpack(envelope, data)
    }

    fn unpack<T: Datatype>(envelope: Envelope, data: &mut [T]) -> Result<Status> {
        check_datatype::<T>(envelope.datatype)?;
        let count = envelope.payload.len() / T::WIDTH;
        if count > data.len() {
            return Err(Error::Truncated {
                count: count as i64,
                capacity: data.len() as i64,
            });
        }
        decode_into(&envelope.payload, &mut data[..count]);
        Ok(Status {
            source: envelope.source,
            tag: envelope.tag,
            count: count as i64,
        })
    }

    /// Blocking receive of a message of unknown length.
    pub fn recv_vec<T: Datatype>(&self, source: i32, tag: i32) -> Result<(Vec<T>, Status)> {
        self.check_source(source)?;
        Self::check_recv_tag(tag)?;
        let envelope = self.endpoint.take(source, tag, self.context, "recv")?;
        check_datatype::<T>(envelope.datatype)?;
        let data: Vec<T> = decode_vec(&envelope.payload);
        let status = Status {
            source: envelope.source,
            tag: envelope.tag,
            count: data.len() as i64,
        };
        Ok((data, status))
    }

    /// Combined send and receive.
    ///
    /// The send is started before the receive is posted, so two ranks that
    /// exchange with each other through `sendrecv` never deadlock.
    #[allow(clippy::too_many_arguments)]
    pub fn sendrecv<T: Datatype>(
        &self,
        send: &[T],
        dest: i32,
        sendtag: i32,
        recv: &mut [T],
        source: i32,
        recvtag: i32,
    ) -> Result<Status> {
        let request = self.isend(send, dest, sendtag)?;
        let status = self.recv(recv, source, recvtag)?;
        request.wait()?;
        Ok(status)
    }

    /// Nonblocking send.
    pub fn isend<T: Datatype>(&self, data: &[T], dest: i32, tag: i32) -> Result<Request> {
        let completion = self.post(data, dest, tag)?;
        Ok(Request::new(self.endpoint.clone(), completion))
    }

    /// Nonblocking receive.
    ///
    /// The receive is matched in posting order: it takes the oldest matching
    /// message that has already arrived, or the next one to arrive, before
    /// any receive posted after it.
    pub fn irecv<T: Datatype>(&self, source: i32, tag: i32) -> Result<RecvRequest<T>> {
        self.check_source(source)?;
        Self::check_recv_tag(tag)?;
        let id = self.endpoint.post_recv(source, tag, self.context)?;
        Ok(RecvRequest::new(self.endpoint.clone(), id, source))
    }

    /// Blocking probe: wait for a matching message without receiving it.
    pub fn probe<T: Datatype>(&self, source: i32, tag: i32) -> Result<Status> {
        self.iprobe_impl::<T>(source, tag, true)?
            .ok_or_else(|| Error::Internal("blocking probe returned without a message".into()))
    }

    /// Nonblocking probe.
    pub fn iprobe<T: Datatype>(&self, source: i32, tag: i32) -> Result<Option<Status>> {
        self.iprobe_impl::<T>(source, tag, false)
    }

    fn iprobe_impl<T: Datatype>(
        &self,
        source: i32,
        tag: i32,
        blocking: bool,
    ) -> Result<Option<Status>> {
        self.check_source(source)?;
        Self::check_recv_tag(tag)?;
        match self.endpoint.peek(source, tag, self.context, blocking)? {
            Some(header) => {
                check_datatype::<T>(header.datatype)?;
                Ok(Some(Status {
                    source: header.source,
                    tag: header.tag,
                    count: (header.bytes / T::WIDTH) as i64,
                }))
            }
            None => Ok(None),
        }
    }

    // ========================================================================
    // Blocking Collectives
    // ========================================================================

    fn collective_post<T: Datatype>(&self, data: &[T], dest: i32, tag: i32) -> Result<()> {
        self.endpoint.post(
            dest,
            tag,
            self.context | COLLECTIVE_BIT,
            T::TAG,
            encode_slice(data),
            true,
        )?;
        Ok(())
    }

    fn collective_take(&self, source: i32, tag: i32, operation: &'static str) -> Result<Envelope> {
        self.endpoint
            .take(source, tag, self.context | COLLECTIVE_BIT, operation)
    }

    fn collective_take_into<T: Datatype>(
        &self,
        data: &mut [T],
        source: i32,
        tag: i32,
        operation: &'static str,
    ) -> Result<()> {
        let envelope = self.collective_take(source, tag, operation)?;
        check_datatype::<T>(envelope.datatype)?;
        if envelope.payload.len() != data.len() * T::WIDTH {
            return Err(Error::InvalidBuffer);
        }
        decode_into(&envelope.payload, data);
        Ok(())
    }

    /// Broadcast a slice from root to all processes.
    ///
    /// Messages travel along a binomial tree rooted at `root`, so the root
    /// sends at most `ceil(log2(size))` messages.
    ///
    /// # Arguments
    ///
    /// * `data` - Buffer to broadcast (input at root, output at others)
    /// * `root` - Rank of the root process
    pub fn broadcast<T: Datatype>(&self, data: &mut [T], root: i32) -> Result<()> {
        self.endpoint.check_rank(root)?;
        let size = self.size();
        let relative = (self.rank() - root + size) % size;

        let mut mask = 1;
        while mask < size {
            if relative & mask != 0 {
                let parent = (relative - mask + root) % size;
                self.collective_take_into(data, parent, TAG_BCAST, "broadcast")?;
                break;
            }
            mask <<= 1;
        }
        mask >>= 1;
        while mask > 0 {
            if relative + mask < size {
                let child = (relative + mask + root) % size;
                self.collective_post(data, child, TAG_BCAST)?;
            }
            mask >>= 1;
        }
        Ok(())
    }

    /// Reduce values to the root process.
    ///
    /// # Arguments
    ///
    /// * `send` - Data to send from this process
    /// * `recv` - Buffer for result (only written at root)
    /// * `op` - Reduction operation
    /// * `root` - Rank of the root process
    pub fn reduce<T: Datatype>(
        &self,
        send: &[T],
        recv: &mut [T],
        op: ReduceOp,
        root: i32,
    ) -> Result<()> {
        if send.len() != recv.len() {
            return Err(Error::InvalidBuffer);
        }
        self.endpoint.check_rank(root)?;
        let size = self.size();
        let relative = (self.rank() - root + size) % size;
        let mut acc = send.to_vec();
        let mut incoming = send.to_vec();

        let mut mask = 1;
        while mask < size {
            if relative & mask == 0 {
                let child = relative | mask;
                if child < size {
                    let source = (child + root) % size;
                    self.collective_take_into(&mut incoming, source, TAG_REDUCE, "reduce")?;
                    combine_into(&mut acc, &incoming, op);
                }
            } else {
                let parent = ((relative & !mask) + root) % size;
                self.collective_post(&acc, parent, TAG_REDUCE)?;
                break;
            }
            mask <<= 1;
        }
        if relative == 0 {
            recv.copy_from_slice(&acc);
        }
        Ok(())
    }

    /// All-reduce values (reduce and broadcast result to all).
    pub fn allreduce<T: Datatype>(&self, send: &[T], recv: &mut [T], op: ReduceOp) -> Result<()> {
        self.reduce(send, recv, op, 0)?;
        self.broadcast(recv, 0)
    }

    /// All-reduce a single value.
    ///
    /// Convenience method for reducing a single scalar.
    pub fn allreduce_scalar<T: Datatype>(&self, value: T, op: ReduceOp) -> Result<T> {
        let send = [value];
        let mut recv = [value];
        self.allreduce(&send, &mut recv, op)?;
        Ok(recv[0])
    }

    /// Gather values to the root process, in rank order.
    ///
    /// # Arguments
    ///
    /// * `send` - Data to send from this process
    /// * `recv` - Buffer for received data (only significant at root, must be
    ///   `send.len() * size` elements there)
    /// * `root` - Rank of the root process
    pub fn gather<T: Datatype>(&self, send: &[T], recv: &mut [T], root: i32) -> Result<()> {
        self.endpoint.check_rank(root)?;
        if self.rank() != root {
            return self.collective_post(send, root, TAG_GATHER);
        }
        let chunk = send.len();
        if recv.len() != chunk * self.size() as usize {
            return Err(Error::InvalidBuffer);
        }
        for peer in 0..self.size() {
            let start = peer as usize * chunk;
            let slot = &mut recv[start..start + chunk];
            if peer == root {
                slot.copy_from_slice(send);
            } else {
                self.collective_take_into(slot, peer, TAG_GATHER, "gather")?;
            }
        }
        Ok(())
    }
}

// Communicators are not Send or Sync: each one belongs to its rank's thread.

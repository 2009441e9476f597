//! In-process transport shared by the ranks of a universe.
//!
//! Every rank owns a mailbox (the receiving end of an unbounded channel) and
//! every rank can post envelopes into any other rank's mailbox. Matching is
//! done by the receiving rank: envelopes that arrive while it is waiting for
//! something else are parked in an unexpected-message queue, in arrival
//! order, and are searched first on the next receive. Since every sender
//! feeds a single FIFO channel per destination, messages between one pair of
//! ranks on one tag are always matched in the order they were sent.
//!
//! Rendezvous delivery attaches a one-shot acknowledgement channel to the
//! envelope. The receiver fires it when the envelope is matched; the sender
//! blocks on it. If the receiver finalizes first, the envelope (and with it
//! the acknowledgement sender) is dropped, which the blocked sender observes
//! as a disconnect.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace, warn};

use crate::config::RuntimeConfig;
use crate::datatype::DatatypeTag;
use crate::error::{Error, Result};
use crate::{ANY_SOURCE, ANY_TAG};

/// High bit of a context id, set on the hidden context used by collectives.
pub(crate) const COLLECTIVE_BIT: u32 = 1 << 31;

/// Context id of the world communicator.
pub(crate) const WORLD_CONTEXT: u32 = 0;

/// How often blocked operations wake up to check deadlines and peer liveness.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// A message in flight between two ranks.
pub(crate) struct Envelope {
    pub source: i32,
    pub tag: i32,
    pub context: u32,
    pub datatype: DatatypeTag,
    pub payload: Vec<u8>,
    ack: Option<Sender<()>>,
}

impl Envelope {
    fn matches(&self, source: i32, tag: i32, context: u32) -> bool {
        self.context == context
            && (source == ANY_SOURCE || self.source == source)
            && (tag == ANY_TAG || self.tag == tag)
    }

    /// Tell a rendezvous sender that its message has been taken.
    fn acknowledge(mut self) -> Self {
        if let Some(ack) = self.ack.take() {
            // The sender may have timed out and gone away; nothing to do then.
            let _ = ack.send(());
        }
        self
    }
}

/// Outcome of posting an envelope.
pub(crate) enum Completion {
    /// The message was buffered; the send is complete.
    Immediate,
    /// The send completes once `dest` acknowledges the message.
    Pending { dest: i32, ack: Receiver<()> },
}

/// Envelope header seen by probes, without consuming the message.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub source: i32,
    pub tag: i32,
    pub datatype: DatatypeTag,
    pub bytes: usize,
}

/// State shared by all ranks of one universe.
pub(crate) struct Fabric {
    size: i32,
    config: RuntimeConfig,
    mailboxes: Vec<Sender<Envelope>>,
    alive: Vec<AtomicBool>,
    next_context: AtomicU32,
    windows: Mutex<HashMap<u32, Arc<dyn Any + Send + Sync>>>,
}

impl Fabric {
    /// Create the fabric for `size` ranks, returning the mailbox of each rank
    /// in rank order.
    pub(crate) fn new(size: i32, config: RuntimeConfig) -> (Arc<Self>, Vec<Receiver<Envelope>>) {
        let (mailboxes, inboxes): (Vec<_>, Vec<_>) = (0..size)
            .map(|_| crossbeam_channel::unbounded())
            .unzip();
        let fabric = Fabric {
            size,
            config,
            mailboxes,
            alive: (0..size).map(|_| AtomicBool::new(true)).collect(),
            next_context: AtomicU32::new(WORLD_CONTEXT + 1),
            windows: Mutex::new(HashMap::new()),
        };
        (Arc::new(fabric), inboxes)
    }

    pub(crate) fn size(&self) -> i32 {
        self.size
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn is_alive(&self, rank: i32) -> bool {
        self.alive
            .get(rank as usize)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Hand out a context id that no other communicator uses.
    pub(crate) fn allocate_context(&self) -> Result<u32> {
        let context = self.next_context.fetch_add(1, Ordering::SeqCst);
        if context & COLLECTIVE_BIT != 0 {
            return Err(Error::Internal("communicator context ids exhausted".into()));
        }
        Ok(context)
    }

    /// Find or create the shared memory of the window living on `context`.
    ///
    /// The first rank to arrive creates the memory with `make`; every other
    /// rank gets the same allocation.
    pub(crate) fn window_memory<M, F>(&self, context: u32, make: F) -> Result<Arc<M>>
    where
        M: Any + Send + Sync,
        F: FnOnce() -> M,
    {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| Error::Internal("window registry poisoned".into()))?;
        let slot = windows
            .entry(context)
            .or_insert_with(|| Arc::new(make()) as Arc<dyn Any + Send + Sync>)
            .clone();
        slot.downcast::<M>()
            .map_err(|_| Error::Internal("window memory has a different element type".into()))
    }

    /// Forget the registry entry of a window once every rank holds it.
    pub(crate) fn release_window_memory(&self, context: u32) -> Result<()> {
        self.windows
            .lock()
            .map_err(|_| Error::Internal("window registry poisoned".into()))?
            .remove(&context);
        Ok(())
    }
}

/// One rank's view of the fabric.
///
/// Not `Send`: the endpoint and everything built on it stay on the rank's
/// own thread.
pub(crate) struct Endpoint {
    rank: i32,
    fabric: Arc<Fabric>,
    inbox: RefCell<Option<Receiver<Envelope>>>,
    unexpected: RefCell<VecDeque<Envelope>>,
    posted: RefCell<VecDeque<PostedRecv>>,
    next_recv_id: Cell<u64>,
}

/// A nonblocking receive that has been posted but not yet completed.
struct PostedRecv {
    id: u64,
    source: i32,
    tag: i32,
    context: u32,
    matched: Option<Envelope>,
}

impl Endpoint {
    pub(crate) fn new(rank: i32, fabric: Arc<Fabric>, inbox: Receiver<Envelope>) -> Self {
        Endpoint {
            rank,
            fabric,
            inbox: RefCell::new(Some(inbox)),
            unexpected: RefCell::new(VecDeque::new()),
            posted: RefCell::new(VecDeque::new()),
            next_recv_id: Cell::new(0),
        }
    }

    pub(crate) fn rank(&self) -> i32 {
        self.rank
    }

    pub(crate) fn size(&self) -> i32 {
        self.fabric.size()
    }

    pub(crate) fn fabric(&self) -> &Fabric {
        &self.fabric
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.inbox.borrow().is_none()
    }

    pub(crate) fn check_rank(&self, rank: i32) -> Result<()> {
        if rank < 0 || rank >= self.size() {
            return Err(Error::InvalidRank(rank));
        }
        Ok(())
    }

    fn check_deadline(&self, start: Instant, operation: &'static str) -> Result<()> {
        if let Some(timeout) = self.fabric.config().deadlock_timeout {
            let waited = start.elapsed();
            if waited >= timeout {
                warn!(rank = self.rank, operation, ?waited, "blocking operation timed out");
                return Err(Error::Timeout {
                    rank: self.rank,
                    operation,
                    waited,
                });
            }
        }
        Ok(())
    }

    /// A receive from `source` can never complete once `source` is gone (or,
    /// for a wildcard, once every other rank is gone).
    fn check_source_alive(&self, source: i32) -> Result<()> {
        if source == ANY_SOURCE {
            let anyone = (0..self.size()).any(|r| r != self.rank && self.fabric.is_alive(r));
            if !anyone {
                return Err(Error::Disconnected(ANY_SOURCE));
            }
        } else if !self.fabric.is_alive(source) {
            return Err(Error::Disconnected(source));
        }
        Ok(())
    }

    /// Queue a message at `dest`.
    ///
    /// `eager` forces buffered delivery regardless of the configured limit;
    /// collectives use it so that their internal traffic never rendezvous.
    pub(crate) fn post(
        &self,
        dest: i32,
        tag: i32,
        context: u32,
        datatype: DatatypeTag,
        payload: Vec<u8>,
        eager: bool,
    ) -> Result<Completion> {
        if self.is_finalized() {
            return Err(Error::AlreadyFinalized);
        }
        self.check_rank(dest)?;
        let buffered = eager || self.fabric.config().is_eager(payload.len());
        let (ack, completion) = if buffered {
            (None, Completion::Immediate)
        } else {
            let (ack_s, ack_r) = crossbeam_channel::bounded(1);
            (Some(ack_s), Completion::Pending { dest, ack: ack_r })
        };
        trace!(
            source = self.rank,
            dest,
            tag,
            context,
            bytes = payload.len(),
            buffered,
            "post"
        );
        let envelope = Envelope {
            source: self.rank,
            tag,
            context,
            datatype,
            payload,
            ack,
        };
        self.fabric.mailboxes[dest as usize]
            .send(envelope)
            .map_err(|_| Error::Disconnected(dest))?;
        Ok(completion)
    }

    /// Block until a posted message has been delivered.
    pub(crate) fn complete(&self, completion: Completion, operation: &'static str) -> Result<()> {
        let (dest, ack) = match completion {
            Completion::Immediate => return Ok(()),
            Completion::Pending { dest, ack } => (dest, ack),
        };
        let start = Instant::now();
        loop {
            match ack.recv_timeout(POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(RecvTimeoutError::Disconnected) => return Err(Error::Disconnected(dest)),
                Err(RecvTimeoutError::Timeout) => self.check_deadline(start, operation)?,
            }
        }
    }

    /// Poll a pending completion without blocking.
    pub(crate) fn poll_completion(completion: &Completion) -> Result<bool> {
        match completion {
            Completion::Immediate => Ok(true),
            Completion::Pending { dest, ack } => match ack.try_recv() {
                Ok(()) => Ok(true),
                Err(crossbeam_channel::TryRecvError::Empty) => Ok(false),
                Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    Err(Error::Disconnected(*dest))
                }
            },
        }
    }

    fn take_unexpected(&self, source: i32, tag: i32, context: u32) -> Option<Envelope> {
        let mut unexpected = self.unexpected.borrow_mut();
        let index = unexpected
            .iter()
            .position(|env| env.matches(source, tag, context))?;
        unexpected.remove(index)
    }

    fn peek_unexpected(&self, source: i32, tag: i32, context: u32) -> Option<Header> {
        self.unexpected
            .borrow()
            .iter()
            .find(|env| env.matches(source, tag, context))
            .map(|env| Header {
                source: env.source,
                tag: env.tag,
                datatype: env.datatype,
                bytes: env.payload.len(),
            })
    }

    /// Hand `envelope` to the oldest posted receive that matches it and is
    /// still empty. Gives the envelope back if there is none.
    fn claim(&self, envelope: Envelope) -> Option<Envelope> {
        let mut posted = self.posted.borrow_mut();
        let slot = posted.iter_mut().find(|recv| {
            recv.matched.is_none() && envelope.matches(recv.source, recv.tag, recv.context)
        });
        match slot {
            Some(recv) => {
                recv.matched = Some(self.delivered(envelope));
                None
            }
            None => Some(envelope),
        }
    }

    /// Route an arrived envelope: posted receives first, then the unexpected
    /// queue.
    fn park(&self, envelope: Envelope) {
        if let Some(envelope) = self.claim(envelope) {
            self.unexpected.borrow_mut().push_back(envelope);
        }
    }

    /// Route everything that is already in the mailbox.
    fn drain_inbox(&self) -> Result<()> {
        let inbox = self.inbox.borrow();
        let inbox = inbox.as_ref().ok_or(Error::AlreadyFinalized)?;
        for envelope in inbox.try_iter() {
            self.park(envelope);
        }
        Ok(())
    }

    /// Route arriving envelopes until `found` yields a value.
    ///
    /// The deadline is checked after every envelope, so a stream of
    /// non-matching traffic cannot keep a blocked operation alive.
    fn wait_for<R, F>(&self, source: i32, operation: &'static str, mut found: F) -> Result<R>
    where
        F: FnMut(&Self) -> Option<R>,
    {
        let start = Instant::now();
        let inbox = self.inbox.borrow();
        let inbox = inbox.as_ref().ok_or(Error::AlreadyFinalized)?;
        loop {
            if let Some(value) = found(self) {
                return Ok(value);
            }
            match inbox.recv_timeout(POLL_INTERVAL) {
                Ok(envelope) => self.park(envelope),
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(err) = self.check_source_alive(source) {
                        // The source may have sent its last message just
                        // before leaving.
                        for envelope in inbox.try_iter() {
                            self.park(envelope);
                        }
                        return found(self).ok_or(err);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Internal(format!(
                        "mailbox closed during {operation}"
                    )));
                }
            }
            self.check_deadline(start, operation)?;
        }
    }

    /// Block until a message matching `(source, tag, context)` arrives, and
    /// take it. Posted nonblocking receives get first pick.
    pub(crate) fn take(
        &self,
        source: i32,
        tag: i32,
        context: u32,
        operation: &'static str,
    ) -> Result<Envelope> {
        self.wait_for(source, operation, |ep| {
            ep.take_unexpected(source, tag, context)
                .map(|envelope| ep.delivered(envelope))
        })
    }

    /// Look at the header of the next matching message without taking it.
    ///
    /// With `blocking` set this waits for such a message to arrive. Messages
    /// already claimed by a posted receive are not visible.
    pub(crate) fn peek(
        &self,
        source: i32,
        tag: i32,
        context: u32,
        blocking: bool,
    ) -> Result<Option<Header>> {
        self.drain_inbox()?;
        if let Some(header) = self.peek_unexpected(source, tag, context) {
            return Ok(Some(header));
        }
        if !blocking {
            return Ok(None);
        }
        self.wait_for(source, "probe", |ep| ep.peek_unexpected(source, tag, context))
            .map(Some)
    }

    /// Post a nonblocking receive and return its id.
    ///
    /// The receive claims the oldest matching message that has already
    /// arrived, or else the first matching one to arrive later, ahead of any
    /// receive posted after it.
    pub(crate) fn post_recv(&self, source: i32, tag: i32, context: u32) -> Result<u64> {
        self.drain_inbox()?;
        let id = self.next_recv_id.get();
        self.next_recv_id.set(id + 1);
        let matched = self
            .take_unexpected(source, tag, context)
            .map(|envelope| self.delivered(envelope));
        self.posted.borrow_mut().push_back(PostedRecv {
            id,
            source,
            tag,
            context,
            matched,
        });
        Ok(id)
    }

    fn take_posted(&self, id: u64) -> Option<Envelope> {
        let mut posted = self.posted.borrow_mut();
        let index = posted
            .iter()
            .position(|recv| recv.id == id && recv.matched.is_some())?;
        posted.remove(index).and_then(|recv| recv.matched)
    }

    /// Block until posted receive `id` has been matched, and take the message.
    pub(crate) fn wait_recv(
        &self,
        id: u64,
        source: i32,
        operation: &'static str,
    ) -> Result<Envelope> {
        self.wait_for(source, operation, |ep| ep.take_posted(id))
    }

    /// Take the message of posted receive `id` if it has been matched.
    pub(crate) fn test_recv(&self, id: u64) -> Result<Option<Envelope>> {
        self.drain_inbox()?;
        Ok(self.take_posted(id))
    }

    /// Withdraw posted receive `id`. A message it had already claimed goes
    /// back to the front of the unexpected queue.
    pub(crate) fn cancel_recv(&self, id: u64) {
        let removed = {
            let mut posted = self.posted.borrow_mut();
            posted
                .iter()
                .position(|recv| recv.id == id)
                .and_then(|index| posted.remove(index))
        };
        if let Some(envelope) = removed.and_then(|recv| recv.matched) {
            if let Some(envelope) = self.claim(envelope) {
                self.unexpected.borrow_mut().push_front(envelope);
            }
        }
    }

    fn delivered(&self, envelope: Envelope) -> Envelope {
        debug!(
            rank = self.rank,
            source = envelope.source,
            tag = envelope.tag,
            bytes = envelope.payload.len(),
            "matched"
        );
        envelope.acknowledge()
    }

    /// Finalize this rank: close the mailbox and drop every undelivered
    /// message. Idempotent.
    pub(crate) fn shutdown(&self) {
        if let Some(slot) = self.fabric.alive.get(self.rank as usize) {
            slot.store(false, Ordering::SeqCst);
        }
        let inbox = self.inbox.borrow_mut().take();
        let dropped = self.unexpected.borrow_mut().drain(..).count()
            + self
                .posted
                .borrow_mut()
                .drain(..)
                .filter(|recv| recv.matched.is_some())
                .count()
            + inbox.map(|inbox| inbox.try_iter().count()).unwrap_or(0);
        if dropped > 0 {
            warn!(rank = self.rank, dropped, "finalized with undelivered messages");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(size: i32, config: RuntimeConfig) -> Vec<Endpoint> {
        let (fabric, inboxes) = Fabric::new(size, config);
        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Endpoint::new(rank as i32, fabric.clone(), inbox))
            .collect()
    }

    #[test]
    fn eager_message_is_matched_out_of_order() {
        let eps = endpoints(2, RuntimeConfig::default().with_eager_limit(16));
        let c = eps[0]
            .post(1, 7, WORLD_CONTEXT, DatatypeTag::U8, vec![1], false)
            .unwrap();
        assert!(matches!(c, Completion::Immediate));
        eps[0]
            .post(1, 9, WORLD_CONTEXT, DatatypeTag::U8, vec![2], false)
            .unwrap();

        let second = eps[1].take(0, 9, WORLD_CONTEXT, "recv").unwrap();
        assert_eq!(second.payload, vec![2]);
        let first = eps[1].take(0, ANY_TAG, WORLD_CONTEXT, "recv").unwrap();
        assert_eq!(first.payload, vec![1]);
    }

    #[test]
    fn rendezvous_completes_when_taken() {
        let eps = endpoints(2, RuntimeConfig::default());
        let c = eps[0]
            .post(1, 0, WORLD_CONTEXT, DatatypeTag::U8, vec![5; 4], false)
            .unwrap();
        assert!(!Endpoint::poll_completion(&c).unwrap());
        let env = eps[1].take(0, 0, WORLD_CONTEXT, "recv").unwrap();
        assert_eq!(env.payload.len(), 4);
        assert!(Endpoint::poll_completion(&c).unwrap());
    }

    #[test]
    fn contexts_do_not_mix() {
        let eps = endpoints(2, RuntimeConfig::default().with_eager_limit(8));
        eps[0].post(1, 0, 3, DatatypeTag::U8, vec![3], false).unwrap();
        assert!(eps[1].peek(0, 0, WORLD_CONTEXT, false).unwrap().is_none());
        assert_eq!(eps[1].take(0, 0, 3, "recv").unwrap().payload, vec![3]);
    }

    #[test]
    fn rendezvous_sender_sees_receiver_shutdown() {
        let eps = endpoints(2, RuntimeConfig::default());
        let c = eps[0]
            .post(1, 0, WORLD_CONTEXT, DatatypeTag::U8, vec![1], false)
            .unwrap();
        eps[1].shutdown();
        assert_eq!(eps[0].complete(c, "send"), Err(Error::Disconnected(1)));
        assert_eq!(
            eps[0]
                .post(1, 0, WORLD_CONTEXT, DatatypeTag::U8, vec![1], true)
                .err(),
            Some(Error::Disconnected(1))
        );
    }

    #[test]
    fn receive_times_out() {
        let config = RuntimeConfig::default().with_deadlock_timeout(Duration::from_millis(20));
        let eps = endpoints(2, config);
        let err = eps[0].take(1, 0, WORLD_CONTEXT, "recv").err();
        assert!(matches!(
            err,
            Some(Error::Timeout {
                rank: 0,
                operation: "recv",
                ..
            })
        ));
    }

    #[test]
    fn peek_does_not_consume() {
        let eps = endpoints(2, RuntimeConfig::default().with_eager_limit(8));
        eps[1]
            .post(0, 4, WORLD_CONTEXT, DatatypeTag::U32, vec![0; 8], false)
            .unwrap();
        let header = eps[0].peek(ANY_SOURCE, ANY_TAG, WORLD_CONTEXT, true).unwrap();
        let header = header.expect("message should be visible");
        assert_eq!((header.source, header.tag, header.bytes), (1, 4, 8));
        assert_eq!(eps[0].take(1, 4, WORLD_CONTEXT, "recv").unwrap().tag, 4);
    }

    #[test]
    fn unrelated_traffic_does_not_hold_off_the_deadline() {
        let config = RuntimeConfig::default()
            .with_eager_limit(8)
            .with_deadlock_timeout(Duration::from_millis(50));
        let (fabric, inboxes) = Fabric::new(2, config);
        let mut inboxes = inboxes.into_iter();
        let receiver = Endpoint::new(0, fabric.clone(), inboxes.next().unwrap());
        let sender_inbox = inboxes.next().unwrap();

        let started = Instant::now();
        let stop = AtomicBool::new(false);
        let err = std::thread::scope(|scope| {
            scope.spawn(|| {
                let sender = Endpoint::new(1, fabric.clone(), sender_inbox);
                while !stop.load(Ordering::SeqCst) {
                    let _ = sender.post(0, 0, WORLD_CONTEXT, DatatypeTag::U8, vec![0], false);
                    std::thread::sleep(Duration::from_micros(500));
                }
            });
            let err = receiver.take(1, 9, WORLD_CONTEXT, "recv").err();
            stop.store(true, Ordering::SeqCst);
            err
        });
        assert!(matches!(err, Some(Error::Timeout { operation: "recv", .. })), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn posted_receive_matches_before_later_blocking_receive() {
        let eps = endpoints(2, RuntimeConfig::default().with_eager_limit(8));
        eps[0].post(1, 0, WORLD_CONTEXT, DatatypeTag::U8, vec![1], false).unwrap();
        let early = eps[1].post_recv(0, 0, WORLD_CONTEXT).unwrap();
        eps[0].post(1, 0, WORLD_CONTEXT, DatatypeTag::U8, vec![2], false).unwrap();
        let late = eps[1].post_recv(0, 0, WORLD_CONTEXT).unwrap();
        eps[0].post(1, 0, WORLD_CONTEXT, DatatypeTag::U8, vec![3], false).unwrap();

        assert_eq!(eps[1].take(0, 0, WORLD_CONTEXT, "recv").unwrap().payload, vec![3]);
        assert_eq!(eps[1].wait_recv(late, 0, "wait").unwrap().payload, vec![2]);
        assert_eq!(eps[1].test_recv(early).unwrap().unwrap().payload, vec![1]);
        assert!(eps[1].test_recv(early).unwrap().is_none());
    }

    #[test]
    fn cancelled_receive_gives_its_message_back() {
        let eps = endpoints(2, RuntimeConfig::default().with_eager_limit(8));
        eps[0].post(1, 5, WORLD_CONTEXT, DatatypeTag::U8, vec![7], false).unwrap();
        let id = eps[1].post_recv(0, 5, WORLD_CONTEXT).unwrap();
        assert!(eps[1].peek(0, 5, WORLD_CONTEXT, false).unwrap().is_none());
        eps[1].cancel_recv(id);
        assert_eq!(eps[1].take(0, 5, WORLD_CONTEXT, "recv").unwrap().payload, vec![7]);
    }

    #[test]
    fn window_memory_is_shared_per_context() {
        let (fabric, _inboxes) = Fabric::new(2, RuntimeConfig::default());
        let a = fabric.window_memory(5, || 10u32).unwrap();
        let b = fabric.window_memory(5, || 20u32).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*b, 10);
        assert!(fabric.window_memory::<u64, _>(5, || 0).is_err());
        fabric.release_window_memory(5).unwrap();
        assert_eq!(*fabric.window_memory(5, || 20u32).unwrap(), 20);
    }
}

//! Request handles for nonblocking point-to-point operations.

use std::marker::PhantomData;
use std::rc::Rc;

use crate::comm::check_datatype;
use crate::datatype::{decode_vec, Datatype};
use crate::error::Result;
use crate::fabric::{Completion, Endpoint, Envelope};
use crate::status::Status;

/// A handle to a nonblocking send.
///
/// The message is queued at the destination as soon as the request is
/// created, so the send buffer may be reused right away. Under rendezvous
/// delivery the request only completes once the destination has matched the
/// message; call [`wait()`](Self::wait) or [`test()`](Self::test) to find out.
///
/// # Example
///
/// ```
/// use ferrocomm::Universe;
///
/// // Both ranks send before receiving, which would deadlock with blocking
/// // sends under rendezvous delivery.
/// let got = Universe::new(2).unwrap().run(|mpi| {
///     let world = mpi.world();
///     let peer = 1 - world.rank();
///     let request = world.isend(&[world.rank()], peer, 0)?;
///     let mut value = [0i32];
///     world.recv(&mut value, peer, 0)?;
///     request.wait()?;
///     Ok(value[0])
/// }).unwrap();
/// assert_eq!(got, vec![1, 0]);
/// ```
#[must_use = "a send request must be waited on to observe delivery errors"]
pub struct Request {
    endpoint: Rc<Endpoint>,
    completion: Option<Completion>,
}

impl Request {
    pub(crate) fn new(endpoint: Rc<Endpoint>, completion: Completion) -> Self {
        Request {
            endpoint,
            completion: Some(completion),
        }
    }

    /// Check if this request has been completed.
    pub fn is_completed(&self) -> bool {
        self.completion.is_none()
    }

    /// Wait for this operation to complete.
    ///
    /// Blocks until the destination has taken the message.
    pub fn wait(mut self) -> Result<()> {
        match self.completion.take() {
            Some(completion) => self.endpoint.complete(completion, "wait"),
            None => Ok(()),
        }
    }

    /// Test if this operation has completed without blocking.
    ///
    /// Returns `true` if the operation is complete, `false` otherwise.
    pub fn test(&mut self) -> Result<bool> {
        let done = match &self.completion {
            Some(completion) => Endpoint::poll_completion(completion)?,
            None => true,
        };
        if done {
            self.completion = None;
        }
        Ok(done)
    }

    /// Wait for all requests in a collection to complete.
    pub fn wait_all(requests: Vec<Request>) -> Result<()> {
        for request in requests {
            request.wait()?;
        }
        Ok(())
    }
}

/// A handle to a nonblocking receive.
///
/// The receive is posted when the request is created, so it is matched
/// ahead of any receive the rank posts later. Dropping the request withdraws
/// it; a message it had already matched becomes available to other receives.
#[must_use = "a receive request does nothing unless waited on or tested"]
pub struct RecvRequest<T: Datatype> {
    endpoint: Rc<Endpoint>,
    id: u64,
    source: i32,
    _marker: PhantomData<T>,
}

impl<T: Datatype> RecvRequest<T> {
    pub(crate) fn new(endpoint: Rc<Endpoint>, id: u64, source: i32) -> Self {
        RecvRequest {
            endpoint,
            id,
            source,
            _marker: PhantomData,
        }
    }

    fn unpack(envelope: Envelope) -> Result<(Vec<T>, Status)> {
        check_datatype::<T>(envelope.datatype)?;
        let status = Status {
            source: envelope.source,
            tag: envelope.tag,
            count: (envelope.payload.len() / T::WIDTH) as i64,
        };
        Ok((decode_vec(&envelope.payload), status))
    }

    /// Block until a matching message arrives and return its contents.
    pub fn wait(self) -> Result<(Vec<T>, Status)> {
        let envelope = self.endpoint.wait_recv(self.id, self.source, "wait")?;
        Self::unpack(envelope)
    }

    /// Complete the receive if a matching message has already arrived.
    ///
    /// On success the request is consumed; otherwise it is handed back.
    pub fn test(self) -> Result<std::result::Result<(Vec<T>, Status), Self>> {
        match self.endpoint.test_recv(self.id)? {
            Some(envelope) => Self::unpack(envelope).map(Ok),
            None => Ok(Err(self)),
        }
    }
}

impl<T: Datatype> Drop for RecvRequest<T> {
    fn drop(&mut self) {
        // No-op once the message has been taken.
        self.endpoint.cancel_recv(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{Error, Universe};

    #[test]
    fn send_request_completes_on_match() {
        let results = Universe::new(2)
            .unwrap()
            .run(|mpi| {
                let world = mpi.world();
                if world.rank() == 0 {
                    let mut request = world.isend(&[3u32, 4], 1, 2)?;
                    assert!(!request.is_completed());
                    world.barrier()?;
                    // Rank 1 receives between the two barriers.
                    world.barrier()?;
                    while !request.test()? {
                        std::thread::yield_now();
                    }
                    assert!(request.is_completed());
                    request.wait()?;
                    Ok(Vec::new())
                } else {
                    world.barrier()?;
                    let (data, _) = world.recv_vec::<u32>(0, 2)?;
                    world.barrier()?;
                    Ok(data)
                }
            })
            .unwrap();
        assert_eq!(results[1], vec![3, 4]);
    }

    #[test]
    fn eager_send_request_is_complete_at_once() {
        let results = Universe::new(2).unwrap().with_eager_limit(64).launch(|mpi| {
            let world = mpi.world();
            if world.rank() == 0 {
                let mut request = world.isend(&[1.5f32], 1, 0)?;
                assert!(request.test()?);
                assert!(request.is_completed());
            } else {
                let mut value = [0.0f32];
                world.recv(&mut value, 0, 0)?;
                assert_eq!(value, [1.5]);
            }
            Ok(())
        });
        assert!(results.iter().all(Result::is_ok));
    }

    #[test]
    fn wait_all_completes_every_send() {
        let sums = Universe::new(3)
            .unwrap()
            .run(|mpi| {
                let world = mpi.world();
                if world.rank() == 0 {
                    let requests = (1..world.size())
                        .map(|peer| world.isend(&[peer * 10], peer, 0))
                        .collect::<crate::Result<Vec<_>>>()?;
                    crate::Request::wait_all(requests)?;
                    Ok(0)
                } else {
                    let mut value = [0i32];
                    world.recv(&mut value, 0, 0)?;
                    Ok(value[0])
                }
            })
            .unwrap();
        assert_eq!(sums, vec![0, 10, 20]);
    }

    #[test]
    fn irecv_keeps_posting_order() {
        let results = Universe::new(2)
            .unwrap()
            .with_eager_limit(64)
            .run(|mpi| {
                let world = mpi.world();
                if world.rank() == 0 {
                    world.send(&[1i32], 1, 0)?;
                    world.send(&[2i32], 1, 0)?;
                    return Ok((0, 0));
                }
                let pending = world.irecv::<i32>(0, 0)?;
                let mut later = [0i32];
                world.recv(&mut later, 0, 0)?;
                let (first, status) = pending.wait()?;
                assert_eq!((status.source, status.tag, status.count), (0, 0, 1));
                Ok((first[0], later[0]))
            })
            .unwrap();
        assert_eq!(results[1], (1, 2));
    }

    #[test]
    fn irecv_test_hands_the_request_back() {
        let results = Universe::new(2).unwrap().launch(|mpi| {
            let world = mpi.world();
            if world.rank() == 0 {
                world.barrier()?;
                world.send(&[9u64, 8, 7], 1, 4)?;
                return Ok(Vec::new());
            }
            let mut pending = world.irecv::<u64>(0, 4)?;
            pending = match pending.test()? {
                Ok(_) => panic!("nothing has been sent yet"),
                Err(pending) => pending,
            };
            world.barrier()?;
            loop {
                match pending.test()? {
                    Ok((data, _)) => return Ok(data),
                    Err(again) => pending = again,
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        assert_eq!(results[1], Ok(vec![9, 8, 7]));
    }

    #[test]
    fn irecv_wait_reports_type_mismatch() {
        let results = Universe::new(2).unwrap().with_eager_limit(64).launch(|mpi| {
            let world = mpi.world();
            if world.rank() == 0 {
                world.send(&[1u8], 1, 0)?;
                return Ok(());
            }
            world.irecv::<f64>(0, 0)?.wait().map(|_| ())
        });
        assert!(matches!(results[1], Err(Error::TypeMismatch { .. })));
    }
}

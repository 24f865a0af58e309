//! Thin façade over in-process (thread) or inter-process (MPI) message passing.
//!
//! Messages are contiguous byte payloads. Handles are waitable; the transfer
//! layer calls `.wait()` before it trusts a buffer. A receive handle returns the
//! whole message so the caller can check its size.

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Message tag shared by both sides of a processor patch pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CommTag(u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    pub const fn offset(self, by: u16) -> Self {
        Self(self.0.wrapping_add(by))
    }
}

/// Non-blocking point-to-point interface.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive for a message of `expected_len` bytes. The message is
    /// returned whole on `wait`, whatever its length.
    fn irecv(&self, peer: usize, tag: u16, expected_len: usize) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn is_parallel(&self) -> bool {
        self.size() > 1
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Bytes>;
}

impl Wait for () {
    fn wait(self) -> Option<Bytes> {
        None
    }
}

/// Serial communicator: one rank, no messages.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _expected_len: usize) {}
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
}

// --- LocalComm: ranks as threads of one process ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Mailbox {
    slots: DashMap<Key, VecDeque<Bytes>>,
    lock: Mutex<()>,
    arrived: Condvar,
}

impl Mailbox {
    fn post(&self, key: Key, payload: Bytes) {
        self.slots.entry(key).or_default().push_back(payload);
        let _guard = self.lock.lock();
        self.arrived.notify_all();
    }

    fn take(&self, key: &Key) -> Option<Bytes> {
        self.slots.get_mut(key).and_then(|mut q| q.pop_front())
    }

    fn take_blocking(&self, key: &Key, timeout: Option<Duration>) -> Option<Bytes> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.lock.lock();
        loop {
            if let Some(payload) = self.take(key) {
                return Some(payload);
            }
            match deadline {
                Some(d) => {
                    if self.arrived.wait_until(&mut guard, d).timed_out() {
                        return self.take(key);
                    }
                }
                None => self.arrived.wait(&mut guard),
            }
        }
    }
}

/// Communicator for ranks simulated by threads sharing one mailbox.
///
/// Sends are buffered and complete immediately. Messages between the same
/// (source, destination, tag) triple are delivered in order.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl LocalComm {
    /// One communicator per rank, all sharing a fresh mailbox.
    pub fn universe(size: usize) -> Vec<LocalComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| LocalComm {
                rank,
                size,
                mailbox: mailbox.clone(),
                timeout: None,
            })
            .collect()
    }

    /// Give up on a receive after `timeout`; the wait then yields `None`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub struct LocalRecvHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    timeout: Option<Duration>,
}

impl Wait for LocalRecvHandle {
    fn wait(self) -> Option<Bytes> {
        self.mailbox.take_blocking(&self.key, self.timeout)
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalRecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        self.mailbox
            .post((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, _expected_len: usize) -> LocalRecvHandle {
        LocalRecvHandle {
            mailbox: self.mailbox.clone(),
            key: (peer, self.rank, tag),
            timeout: self.timeout,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use bytes::Bytes;
    use mpi::environment::Universe;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, Destination as _, Source as _};
    use std::rc::Rc;

    /// MPI world communicator. Receives are matched when waited on, so every
    /// send posted before the first wait makes progress.
    pub struct MpiComm {
        world: Rc<SimpleCommunicator>,
        rank: usize,
        size: usize,
        _universe: Universe,
    }

    impl MpiComm {
        /// Initialise MPI; `None` if it was already initialised.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                world: Rc::new(world),
                rank,
                size,
                _universe: universe,
            })
        }
    }

    pub struct MpiSendHandle(Box<dyn FnOnce()>);

    impl Wait for MpiSendHandle {
        fn wait(self) -> Option<Bytes> {
            (self.0)();
            None
        }
    }

    pub struct MpiRecvHandle {
        world: Rc<SimpleCommunicator>,
        peer: i32,
        tag: i32,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Bytes> {
            let (data, _status) = self
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            Some(Bytes::from(data))
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            // The request needs a 'static buffer; reclaim it once the send completes.
            let leaked: &'static [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr = leaked as *const [u8] as *mut [u8];
            let req = self.world.process_at_rank(peer as i32).immediate_send_with_tag(
                StaticScope,
                leaked,
                i32::from(tag),
            );
            MpiSendHandle(Box::new(move || {
                req.wait();
                // SAFETY: the request has completed, nothing else references the buffer.
                drop(unsafe { Box::from_raw(ptr) });
            }))
        }

        fn irecv(&self, peer: usize, tag: u16, _expected_len: usize) -> MpiRecvHandle {
            MpiRecvHandle {
                world: self.world.clone(),
                peer: peer as i32,
                tag: i32::from(tag),
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

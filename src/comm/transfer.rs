//! Point-to-point transfer of per-face buffers across a processor patch.
//!
//! A transfer is split in two halves so callers can overlap communication with
//! work: [`ProcessorTransfer::init_send`] posts the outgoing buffer and
//! [`ProcessorTransfer::receive`] completes the exchange. Whatever happens on
//! the receive side, the send handle is always drained before returning.

use super::communicator::{CommTag, Communicator, Wait};
use super::wire;
use crate::coupling_error::CouplingError;
use crate::primitives::FieldValue;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Exchange discipline for a boundary update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommsType {
    /// Buffered send; the receive is posted only when the value is needed.
    Blocking,
    /// Pairwise ordered rounds from a precomputed schedule.
    Scheduled,
    /// Post all receives and sends up front, complete later.
    #[default]
    NonBlocking,
}

/// Outgoing payload, kept alive until its send completes.
#[derive(Debug, Clone)]
pub struct CommBuffer(Bytes);

impl CommBuffer {
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// In-flight half of an exchange, returned by `init_send`.
pub struct PendingTransfer<C: Communicator> {
    send: Option<C::SendHandle>,
    recv: Option<C::RecvHandle>,
    buffer: CommBuffer,
}

impl<C: Communicator> PendingTransfer<C> {
    pub fn buffer(&self) -> &CommBuffer {
        &self.buffer
    }

    /// The matching receive was posted together with the send.
    pub fn receive_posted(&self) -> bool {
        self.recv.is_some()
    }

    /// Complete the send without receiving. Used to unwind after an error elsewhere.
    pub fn drain(self) {
        if let Some(s) = self.send {
            let _ = s.wait();
        }
    }
}

impl<C: Communicator> std::fmt::Debug for PendingTransfer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTransfer")
            .field("bytes", &self.buffer.len())
            .field("recv_posted", &self.recv.is_some())
            .finish()
    }
}

/// Transfer endpoint of one processor patch.
#[derive(Debug)]
pub struct ProcessorTransfer {
    patch: String,
    my_rank: usize,
    neighb_rank: usize,
    tag: CommTag,
    float_transfer: bool,
}

impl ProcessorTransfer {
    pub fn new(
        patch: impl Into<String>,
        my_rank: usize,
        neighb_rank: usize,
        tag: CommTag,
        float_transfer: bool,
    ) -> Self {
        Self {
            patch: patch.into(),
            my_rank,
            neighb_rank,
            tag,
            float_transfer,
        }
    }

    pub fn my_rank(&self) -> usize {
        self.my_rank
    }

    pub fn neighb_rank(&self) -> usize {
        self.neighb_rank
    }

    pub fn tag(&self) -> CommTag {
        self.tag
    }

    /// Both ends on one rank. Such pairs couple through cyclic patches.
    fn same_rank_error(&self) -> CouplingError {
        CouplingError::PatchPairMismatch {
            patch: self.patch.clone(),
            neighbour: format!("rank {}", self.neighb_rank),
            reason: "processor transfer to its own rank".to_owned(),
        }
    }

    /// Post `values` to the neighbour rank.
    pub fn init_send<C, T>(
        &self,
        comm: &C,
        values: &[T],
        comms_type: CommsType,
    ) -> Result<PendingTransfer<C>, CouplingError>
    where
        C: Communicator,
        T: FieldValue,
    {
        if self.my_rank == self.neighb_rank {
            return Err(self.same_rank_error());
        }
        if comm.rank() != self.my_rank {
            return Err(CouplingError::comm(
                &self.patch,
                self.neighb_rank,
                format!(
                    "communicator rank {} does not own this patch (rank {})",
                    comm.rank(),
                    self.my_rank
                ),
            ));
        }
        let payload = wire::encode(values, self.float_transfer);
        let tag = self.tag.as_u16();
        let recv = match comms_type {
            CommsType::NonBlocking => Some(comm.irecv(self.neighb_rank, tag, payload.len())),
            CommsType::Blocking | CommsType::Scheduled => None,
        };
        let send = comm.isend(self.neighb_rank, tag, &payload);
        log::trace!(
            "[{}] posted {} bytes to rank {} (tag {tag}, {comms_type:?})",
            self.patch,
            payload.len(),
            self.neighb_rank
        );
        Ok(PendingTransfer {
            send: Some(send),
            recv,
            buffer: CommBuffer(payload),
        })
    }

    /// Receive exactly `expected` values from the neighbour.
    ///
    /// `pending` is this side's own `init_send`, if it came first; its send is
    /// completed here. In a scheduled round the lower rank receives before it
    /// sends and passes `None`.
    pub fn receive<C, T>(
        &self,
        comm: &C,
        pending: Option<PendingTransfer<C>>,
        expected: usize,
    ) -> Result<Vec<T>, CouplingError>
    where
        C: Communicator,
        T: FieldValue,
    {
        if self.my_rank == self.neighb_rank {
            if let Some(p) = pending {
                p.drain();
            }
            return Err(self.same_rank_error());
        }
        let (send, recv) = match pending {
            Some(p) => (p.send, p.recv),
            None => (None, None),
        };
        let recv = recv.unwrap_or_else(|| {
            comm.irecv(
                self.neighb_rank,
                self.tag.as_u16(),
                expected * wire::value_size::<T>(self.float_transfer),
            )
        });
        let data = recv.wait();
        if let Some(s) = send {
            let _ = s.wait();
        }
        let data = data.ok_or_else(|| {
            CouplingError::comm(&self.patch, self.neighb_rank, "neighbour rank did not deliver")
        })?;
        wire::decode(&data, expected, self.float_transfer, &self.patch)
    }

    /// `init_send` followed by `receive`.
    pub fn exchange<C, T>(
        &self,
        comm: &C,
        values: &[T],
        expected: usize,
        comms_type: CommsType,
    ) -> Result<Vec<T>, CouplingError>
    where
        C: Communicator,
        T: FieldValue,
    {
        let pending = self.init_send(comm, values, comms_type)?;
        self.receive(comm, Some(pending), expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::communicator::LocalComm;
    use std::time::Duration;

    #[test]
    fn same_rank_transfer_is_rejected() {
        let t = ProcessorTransfer::new("p", 0, 0, CommTag::new(1), false);
        let comms = LocalComm::universe(1);
        assert!(matches!(
            t.exchange::<_, f64>(&comms[0], &[1.0, 2.0], 2, CommsType::NonBlocking),
            Err(CouplingError::PatchPairMismatch { .. })
        ));
        assert!(t.receive::<_, f64>(&comms[0], None, 2).is_err());
    }

    #[test]
    fn only_non_blocking_posts_the_receive_early() {
        let comms = LocalComm::universe(2);
        let t = ProcessorTransfer::new("p", 0, 1, CommTag::new(5), false);
        let blocking = t.init_send(&comms[0], &[1.0f64], CommsType::Blocking).unwrap();
        assert!(!blocking.receive_posted());
        let scheduled = t.init_send(&comms[0], &[1.0f64], CommsType::Scheduled).unwrap();
        assert!(!scheduled.receive_posted());
        let non_blocking = t.init_send(&comms[0], &[1.0f64], CommsType::NonBlocking).unwrap();
        assert!(non_blocking.receive_posted());
        for p in [blocking, scheduled, non_blocking] {
            p.drain();
        }
    }

    #[test]
    fn pair_exchange_over_threads() {
        let comms = LocalComm::universe(2);
        std::thread::scope(|s| {
            for c in &comms {
                s.spawn(move || {
                    let me = c.rank();
                    let t = ProcessorTransfer::new("p", me, 1 - me, CommTag::new(9), false);
                    let got: Vec<f64> = t
                        .exchange(c, &[me as f64; 3], 3, CommsType::Blocking)
                        .unwrap();
                    assert_eq!(got, vec![(1 - me) as f64; 3]);
                });
            }
        });
    }

    #[test]
    fn missing_partner_is_a_comm_error() {
        let comms = LocalComm::universe(2);
        let c0 = comms[0].clone().with_timeout(Duration::from_millis(20));
        let t = ProcessorTransfer::new("p", 0, 1, CommTag::new(2), false);
        let err = t
            .exchange::<_, f64>(&c0, &[1.0], 1, CommsType::NonBlocking)
            .unwrap_err();
        assert!(matches!(err, CouplingError::Comm { neighbour: 1, .. }));
    }

    #[test]
    fn wrong_rank_is_rejected() {
        let comms = LocalComm::universe(2);
        let t = ProcessorTransfer::new("p", 1, 0, CommTag::new(2), false);
        assert!(t.init_send(&comms[0], &[1.0f64], CommsType::Blocking).is_err());
    }
}

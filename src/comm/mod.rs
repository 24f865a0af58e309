//! Inter-rank communication: backends, wire format, transfers and schedules.

pub mod communicator;
pub mod schedule;
pub mod transfer;
pub mod wire;

#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
pub use communicator::{CommTag, Communicator, LocalComm, NoComm, Wait};
pub use schedule::{CommSchedule, PatchRole, ProcessorTopology, ScheduleEntry, patch_schedule};
pub use transfer::{CommBuffer, CommsType, PendingTransfer, ProcessorTransfer};

#![cfg_attr(docsrs, feature(doc_cfg))]
//! # coupled-patch
//!
//! coupled-patch is the boundary-coupling layer of a finite-volume PDE code. It
//! carries field values and linear-system coefficients across the faces where
//! a mesh is glued to itself or to another partition:
//!
//! - processor patches, the cut between two ranks of a decomposed mesh
//! - cyclic patches, periodic pairs with a rotation or translation
//! - cyclic AMI and ACMI patches, where the two sides do not match face for face
//!
//! ## Layers
//! - [`comm`]: communicator backends ([`comm::NoComm`], the threaded
//!   [`comm::LocalComm`], MPI behind `mpi-support`), the byte wire format,
//!   blocking / non-blocking / scheduled transfers and communication schedules.
//! - [`ami`]: area-weighted overlap weights between non-conformal patches.
//! - [`mesh`] and [`patch`]: patch geometry, pair resolution and the patch
//!   variants behind [`patch::PatchInterface`] and [`patch::CoupledPatch`].
//! - [`fields`]: patch fields with gated `evaluate` and
//!   `update_interface_matrix`, and the [`fields::BoundaryField`] driving them
//!   in schedule order.
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! coupled-patch = "0.3"
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! Every fallible call returns [`CouplingError`](coupling_error::CouplingError).
//! Nothing is retried; a failed exchange drains its pending messages and
//! reports once.

pub mod ami;
pub mod comm;
pub mod config;
pub mod coupling_error;
pub mod debug_invariants;
pub mod fields;
pub mod geometry;
pub mod mesh;
pub mod patch;
pub mod primitives;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::ami::{AmiInterpolation, AmiMethod, AmiWeights};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{
        CommSchedule, CommTag, CommsType, Communicator, LocalComm, NoComm, ProcessorTopology,
    };
    pub use crate::config::{AmiConfig, CouplingConfig};
    pub use crate::coupling_error::CouplingError;
    pub use crate::fields::{
        BasicPatchField, BoundaryField, CoupledPatchField, CouplingInputs, ExchangeOptions,
        InterfaceInputs, InterfaceUpdate, Jump, UpdateState,
    };
    pub use crate::mesh::{BoundaryMesh, CouplingSpec, PatchDef, PatchGeometry, PatchId, PatchKind, ProcessorSpec};
    pub use crate::patch::{Capabilities, CoupledPatch, NeighbourGeometry, Patch, PatchInterface};
    pub use crate::primitives::{FieldValue, Tensor, TransformDescriptor, Vector};
}

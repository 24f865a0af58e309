//! Boundary patch types and the kind-keyed constructor registry.

pub mod cyclic;
pub mod cyclic_acmi;
pub mod cyclic_ami;
pub mod factory;
pub mod generic;
pub mod interface;
pub mod processor;

pub use cyclic::CyclicPatch;
pub use cyclic_acmi::CyclicAcmiPatch;
pub use cyclic_ami::CyclicAmiPatch;
pub use factory::{BuildContext, PatchConstructor};
pub use generic::GenericPatch;
pub use interface::{Capabilities, CoupledPatch, PatchInterface};
pub use processor::{NeighbourGeometry, ProcessorPatch};

use crate::coupling_error::CouplingError;
use crate::mesh::{PatchGeometry, PatchId, PatchKind};
use std::sync::Arc;

/// Any boundary patch.
#[derive(Debug)]
pub enum Patch {
    Generic(GenericPatch),
    Processor(ProcessorPatch),
    Cyclic(CyclicPatch),
    CyclicAmi(CyclicAmiPatch),
    CyclicAcmi(CyclicAcmiPatch),
}

macro_rules! each_patch {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            Patch::Generic($p) => $body,
            Patch::Processor($p) => $body,
            Patch::Cyclic($p) => $body,
            Patch::CyclicAmi($p) => $body,
            Patch::CyclicAcmi($p) => $body,
        }
    };
}

impl Patch {
    /// Coupling view, `None` for uncoupled patches.
    pub fn as_coupled(&self) -> Option<&dyn CoupledPatch> {
        match self {
            Patch::Generic(_) => None,
            Patch::Processor(p) => Some(p),
            Patch::Cyclic(p) => Some(p),
            Patch::CyclicAmi(p) => Some(p),
            Patch::CyclicAcmi(p) => Some(p),
        }
    }

    /// Coupling view, or `InvalidPatchKind` naming `operation`.
    pub fn coupled_or_err(&self, operation: &'static str) -> Result<&dyn CoupledPatch, CouplingError> {
        self.as_coupled().ok_or_else(|| CouplingError::InvalidPatchKind {
            patch: self.name().to_owned(),
            operation,
        })
    }

    pub fn as_processor(&self) -> Option<&ProcessorPatch> {
        match self {
            Patch::Processor(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_processor_mut(&mut self) -> Option<&mut ProcessorPatch> {
        match self {
            Patch::Processor(p) => Some(p),
            _ => None,
        }
    }

    /// Remote rank of a processor patch.
    pub fn remote_rank(&self) -> Option<usize> {
        self.as_processor().map(ProcessorPatch::neighb_rank)
    }

    pub(crate) fn update_geometry(&mut self, geometries: &[Arc<PatchGeometry>]) {
        each_patch!(self, p => p.update_geometry(geometries))
    }
}

impl PatchInterface for Patch {
    fn id(&self) -> PatchId {
        each_patch!(self, p => p.id())
    }
    fn kind(&self) -> PatchKind {
        each_patch!(self, p => p.kind())
    }
    fn geometry(&self) -> &PatchGeometry {
        each_patch!(self, p => p.geometry())
    }
    fn capabilities(&self) -> Capabilities {
        each_patch!(self, p => p.capabilities())
    }
    fn neighbour_patch_id(&self) -> Result<PatchId, CouplingError> {
        each_patch!(self, p => p.neighbour_patch_id())
    }
}

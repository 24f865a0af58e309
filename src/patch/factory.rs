//! Constructor registry keyed by [`PatchKind`].
//!
//! [`BoundaryMesh`](crate::mesh::BoundaryMesh) resolves neighbours and shared
//! AMIs first, then calls the constructor registered for each patch's kind
//! with a [`BuildContext`].

use super::{
    CyclicAcmiPatch, CyclicAmiPatch, CyclicPatch, GenericPatch, Patch, ProcessorPatch,
};
use crate::ami::AmiInterpolation;
use crate::config::CouplingConfig;
use crate::coupling_error::CouplingError;
use crate::mesh::{CouplingSpec, PatchDef, PatchGeometry, PatchId, PatchKind};
use std::sync::Arc;

/// Everything a constructor needs beyond the patch definition.
pub struct BuildContext<'a> {
    pub id: PatchId,
    /// Geometry of every patch in the mesh, indexed by [`PatchId`].
    pub geometries: &'a [Arc<PatchGeometry>],
    /// Same-rank partner of a cyclic-family patch.
    pub neighbour: Option<PatchId>,
    /// Non-overlap partner of a cyclic ACMI patch.
    pub non_overlap: Option<PatchId>,
    /// AMI shared by the pair, for AMI kinds.
    pub ami: Option<Arc<AmiInterpolation>>,
    pub config: &'a CouplingConfig,
}

impl BuildContext<'_> {
    fn require<T: Clone>(&self, def: &PatchDef, value: &Option<T>, what: &str) -> Result<T, CouplingError> {
        value.clone().ok_or_else(|| CouplingError::PatchPairMismatch {
            patch: def.name().to_owned(),
            neighbour: String::new(),
            reason: format!("{what} was not resolved"),
        })
    }
}

pub type PatchConstructor = fn(&PatchDef, &BuildContext<'_>) -> Result<Patch, CouplingError>;

impl PatchKind {
    /// Registered constructor for this kind.
    pub fn constructor(self) -> PatchConstructor {
        match self {
            PatchKind::Patch | PatchKind::Wall => build_generic,
            PatchKind::Processor | PatchKind::ProcessorCyclic => build_processor,
            PatchKind::Cyclic => build_cyclic,
            PatchKind::CyclicAmi => build_cyclic_ami,
            PatchKind::CyclicAcmi => build_cyclic_acmi,
        }
    }
}

/// Build `def` with the constructor registered for its kind.
pub fn build(def: &PatchDef, ctx: &BuildContext<'_>) -> Result<Patch, CouplingError> {
    (def.kind.constructor())(def, ctx)
}

fn mismatch(def: &PatchDef) -> CouplingError {
    CouplingError::PatchTypeMismatch {
        patch: def.name().to_owned(),
        expected: def.kind.type_name().to_owned(),
        found: def.coupling.describe().to_owned(),
    }
}

fn build_generic(def: &PatchDef, ctx: &BuildContext<'_>) -> Result<Patch, CouplingError> {
    match def.coupling {
        CouplingSpec::None => Ok(Patch::Generic(GenericPatch::new(
            ctx.id,
            def.kind,
            ctx.geometries[ctx.id.index()].clone(),
        ))),
        _ => Err(mismatch(def)),
    }
}

fn build_processor(def: &PatchDef, ctx: &BuildContext<'_>) -> Result<Patch, CouplingError> {
    let CouplingSpec::Processor(spec) = &def.coupling else {
        return Err(mismatch(def));
    };
    let cyclic = def.kind == PatchKind::ProcessorCyclic;
    if cyclic != spec.referred_patch.is_some() {
        return Err(mismatch(def));
    }
    // same-rank halves are cyclic patches, not processor patches
    if spec.my_rank == spec.neighb_rank {
        return Err(CouplingError::PatchPairMismatch {
            patch: def.name().to_owned(),
            neighbour: format!("rank {} patch {}", spec.neighb_rank, spec.neighb_patch),
            reason: "processor patch couples its own rank".to_owned(),
        });
    }
    Ok(Patch::Processor(ProcessorPatch::new(
        ctx.id,
        ctx.geometries[ctx.id.index()].clone(),
        spec,
        ctx.config.float_transfer,
    )))
}

fn build_cyclic(def: &PatchDef, ctx: &BuildContext<'_>) -> Result<Patch, CouplingError> {
    let CouplingSpec::Cyclic { transform, .. } = &def.coupling else {
        return Err(mismatch(def));
    };
    let nb = ctx.require(def, &ctx.neighbour, "neighbour patch")?;
    Ok(Patch::Cyclic(CyclicPatch::new(ctx.id, nb, ctx.geometries, *transform)?))
}

fn build_cyclic_ami(def: &PatchDef, ctx: &BuildContext<'_>) -> Result<Patch, CouplingError> {
    let CouplingSpec::CyclicAmi { transform, .. } = &def.coupling else {
        return Err(mismatch(def));
    };
    let nb = ctx.require(def, &ctx.neighbour, "neighbour patch")?;
    let ami = ctx.require(def, &ctx.ami, "AMI")?;
    Ok(Patch::CyclicAmi(CyclicAmiPatch::new(
        ctx.id,
        nb,
        ctx.geometries,
        *transform,
        ami,
    )))
}

fn build_cyclic_acmi(def: &PatchDef, ctx: &BuildContext<'_>) -> Result<Patch, CouplingError> {
    let CouplingSpec::CyclicAcmi { transform, .. } = &def.coupling else {
        return Err(mismatch(def));
    };
    let nb = ctx.require(def, &ctx.neighbour, "neighbour patch")?;
    let non_overlap = ctx.require(def, &ctx.non_overlap, "non-overlap patch")?;
    let ami = ctx.require(def, &ctx.ami, "AMI")?;
    let coupled = CyclicAmiPatch::new(ctx.id, nb, ctx.geometries, *transform, ami);
    Ok(Patch::CyclicAcmi(CyclicAcmiPatch::new(
        coupled,
        non_overlap,
        ctx.geometries,
        ctx.config.acmi_tolerance,
    )?))
}

//! The boundary of one partition: every patch, resolved and paired.
//!
//! Construction checks that coupled pairs reference each other, agree on face
//! counts and carry mutually inverse transforms. AMI pairs share one
//! [`AmiInterpolation`], built on the lower-id (owner) side.

use super::{CouplingSpec, PatchDef, PatchGeometry, PatchId, PatchKind};
use crate::ami::AmiInterpolation;
use crate::comm::{
    CommTag, CommsType, Communicator, PatchRole, ProcessorTopology, ScheduleEntry, patch_schedule,
};
use crate::config::CouplingConfig;
use crate::coupling_error::CouplingError;
use crate::debug_invariants::DebugInvariants;
use crate::patch::{NeighbourGeometry, Patch, PatchInterface, ProcessorPatch, factory};
use crate::primitives::Vector;
use hashbrown::HashMap;
use std::sync::Arc;

/// Two halves of a pair must invert each other to this tolerance.
const TRANSFORM_TOLERANCE: f64 = 1e-8;

#[derive(Debug)]
pub struct BoundaryMesh {
    n_cells: usize,
    config: CouplingConfig,
    geometries: Vec<Arc<PatchGeometry>>,
    patches: Vec<Patch>,
    names: HashMap<String, PatchId>,
    non_overlap: HashMap<PatchId, PatchId>,
}

impl BoundaryMesh {
    /// Assemble the boundary of a partition with `n_cells` cells.
    pub fn new(n_cells: usize, defs: Vec<PatchDef>, config: CouplingConfig) -> Result<Self, CouplingError> {
        config.validate()?;

        let mut names = HashMap::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            if names.insert(def.name().to_owned(), PatchId(i)).is_some() {
                return Err(CouplingError::InvalidConfig(format!(
                    "duplicate patch name `{}`",
                    def.name()
                )));
            }
        }
        let geometries: Vec<Arc<PatchGeometry>> = defs.iter().map(|d| Arc::new(d.geometry.clone())).collect();

        let lookup = |def: &PatchDef, name: &str| -> Result<PatchId, CouplingError> {
            names.get(name).copied().ok_or_else(|| CouplingError::PatchPairMismatch {
                patch: def.name().to_owned(),
                neighbour: name.to_owned(),
                reason: "no patch of that name".to_owned(),
            })
        };

        let mut neighbours = vec![None; defs.len()];
        let mut non_overlap = HashMap::new();
        for (i, def) in defs.iter().enumerate() {
            check_coupling_kind(def)?;
            if let Some(nb_name) = def.coupling.neighbour_name() {
                let nb = lookup(def, nb_name)?;
                check_pair(def, &defs[nb.index()], i == nb.index())?;
                neighbours[i] = Some(nb);
            }
            if let CouplingSpec::CyclicAcmi { non_overlap: no, .. } = &def.coupling {
                let no_id = lookup(def, no)?;
                if defs[no_id.index()].kind.coupled() {
                    return Err(CouplingError::PatchPairMismatch {
                        patch: def.name().to_owned(),
                        neighbour: no.clone(),
                        reason: "non-overlap patch must be uncoupled".to_owned(),
                    });
                }
                non_overlap.insert(PatchId(i), no_id);
            }
        }

        // One AMI per pair, keyed by both sides.
        let mut amis: HashMap<PatchId, Arc<AmiInterpolation>> = HashMap::new();
        for (i, def) in defs.iter().enumerate() {
            let Some(nb) = neighbours[i] else { continue };
            if !def.kind.uses_ami() || nb.index() < i {
                continue;
            }
            let mut ami_config = config.ami.clone();
            if def.kind == PatchKind::CyclicAcmi {
                // the non-overlap patch supplies the uncovered part
                ami_config.low_weight_correction = -1.0;
            }
            let ami = Arc::new(AmiInterpolation::new(
                geometries[i].clone(),
                geometries[nb.index()].clone(),
                def.coupling.transform(),
                ami_config,
            ));
            amis.insert(PatchId(i), ami.clone());
            amis.insert(nb, ami);
        }

        let patches = defs
            .iter()
            .enumerate()
            .map(|(i, def)| {
                let id = PatchId(i);
                let ctx = factory::BuildContext {
                    id,
                    geometries: &geometries,
                    neighbour: neighbours[i],
                    non_overlap: non_overlap.get(&id).copied(),
                    ami: amis.get(&id).cloned(),
                    config: &config,
                };
                factory::build(def, &ctx)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mesh = Self {
            n_cells,
            config,
            geometries,
            patches,
            names,
            non_overlap,
        };
        mesh.validate_invariants()?;
        log::debug!(
            "boundary mesh: {} patches ({} coupled), {} cells",
            mesh.patches.len(),
            mesh.patches.iter().filter(|p| p.coupled()).count(),
            n_cells
        );
        Ok(mesh)
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn config(&self) -> &CouplingConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn patch(&self, id: PatchId) -> Result<&Patch, CouplingError> {
        self.patches
            .get(id.index())
            .ok_or(CouplingError::UnknownPatch(id.index()))
    }

    pub fn find(&self, name: &str) -> Option<PatchId> {
        self.names.get(name).copied()
    }

    pub fn geometry(&self, id: PatchId) -> Result<&Arc<PatchGeometry>, CouplingError> {
        self.geometries
            .get(id.index())
            .ok_or(CouplingError::UnknownPatch(id.index()))
    }

    /// Non-overlap partner of a cyclic ACMI patch.
    pub fn non_overlap_of(&self, id: PatchId) -> Option<PatchId> {
        self.non_overlap.get(&id).copied()
    }

    /// Swap in neighbour geometry on every processor patch. A serial
    /// communicator marks them serial instead.
    ///
    /// All sends are posted before any receive completes; every pending
    /// exchange is drained even after the first failure.
    pub fn exchange_processor_geometry<C: Communicator>(&mut self, comm: &C) -> Result<(), CouplingError> {
        if !comm.is_parallel() {
            self.patches
                .iter_mut()
                .filter_map(Patch::as_processor_mut)
                .for_each(ProcessorPatch::mark_serial);
            return Ok(());
        }
        let mut pending = Vec::new();
        let mut maybe_err = None;
        for (i, patch) in self.patches.iter().enumerate() {
            let Some(p) = patch.as_processor() else { continue };
            match p.init_geometry_exchange(comm) {
                Ok(t) => pending.push((i, t)),
                Err(e) => {
                    maybe_err.get_or_insert(e);
                }
            }
        }
        for (i, t) in pending {
            let Some(p) = self.patches[i].as_processor_mut() else { continue };
            if maybe_err.is_some() {
                t.drain();
                continue;
            }
            if let Err(e) = p.finish_geometry_exchange(comm, t) {
                maybe_err = Some(e);
            }
        }
        maybe_err.map_or(Ok(()), Err)
    }

    /// Hand a processor patch its neighbour's geometry without an exchange.
    pub fn set_neighbour_geometry(&mut self, id: PatchId, nbr: NeighbourGeometry) -> Result<(), CouplingError> {
        let patch = self
            .patches
            .get_mut(id.index())
            .ok_or(CouplingError::UnknownPatch(id.index()))?;
        let name = patch.name().to_owned();
        patch
            .as_processor_mut()
            .ok_or(CouplingError::InvalidPatchKind {
                patch: name,
                operation: "set_neighbour_geometry",
            })?
            .set_neighbour_geometry(nbr)
    }

    /// Move the points of one patch. Patches coupled to it drop their cached
    /// weights, and the shared AMI is rebuilt on next use. A moved processor
    /// patch needs its neighbour geometry again.
    pub fn move_patch_points(
        &mut self,
        id: PatchId,
        points: Vec<Vector>,
        cell_centres: Vec<Vector>,
    ) -> Result<(), CouplingError> {
        let moved = self.geometry(id)?.with_points(points, cell_centres)?;
        self.geometries[id.index()] = Arc::new(moved);

        let affected: Vec<usize> = self
            .patches
            .iter()
            .enumerate()
            .filter(|(i, p)| {
                *i == id.index()
                    || (p.as_processor().is_none() && p.neighbour_patch_id().is_ok_and(|nb| nb == id))
                    || self.non_overlap.get(&PatchId(*i)) == Some(&id)
            })
            .map(|(i, _)| i)
            .collect();
        for i in affected {
            self.patches[i].update_geometry(&self.geometries);
        }
        self.debug_assert_invariants();
        log::debug!("moved points of patch `{}`", self.geometries[id.index()].name());
        Ok(())
    }

    /// Scheduling role of every patch.
    pub fn patch_roles(&self) -> Vec<PatchRole> {
        self.patches
            .iter()
            .map(|p| PatchRole {
                patch: p.id(),
                neighb_rank: p.remote_rank(),
            })
            .collect()
    }

    /// Distinct remote ranks this partition shares processor patches with.
    pub fn processor_neighbours(&self) -> Vec<usize> {
        let mut ranks: Vec<usize> = self.patches.iter().filter_map(Patch::remote_rank).collect();
        ranks.sort_unstable();
        ranks.dedup();
        ranks
    }

    /// Collective: every rank's processor neighbours.
    pub fn gather_topology<C: Communicator>(&self, comm: &C) -> Result<ProcessorTopology, CouplingError> {
        ProcessorTopology::gather(
            comm,
            &self.processor_neighbours(),
            CommTag::new(self.config.base_tag),
        )
    }

    /// Ordered init/evaluate steps for this partition.
    pub fn patch_schedule(
        &self,
        my_rank: usize,
        comms_type: CommsType,
        topology: Option<&ProcessorTopology>,
    ) -> Result<Vec<ScheduleEntry>, CouplingError> {
        patch_schedule(&self.patch_roles(), my_rank, comms_type, topology)
    }
}

impl DebugInvariants for BoundaryMesh {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "BoundaryMesh");
    }

    fn validate_invariants(&self) -> Result<(), CouplingError> {
        for g in &self.geometries {
            g.validate_invariants()?;
            if let Some(&c) = g.face_cells().iter().find(|&&c| c >= self.n_cells) {
                return Err(CouplingError::geometry(
                    g.name(),
                    format!("face cell {c} outside a mesh of {} cells", self.n_cells),
                ));
            }
        }
        Ok(())
    }
}

/// The coupling data must be the variant the kind expects.
fn check_coupling_kind(def: &PatchDef) -> Result<(), CouplingError> {
    let ok = match (&def.kind, &def.coupling) {
        (PatchKind::Patch | PatchKind::Wall, CouplingSpec::None) => true,
        (PatchKind::Processor, CouplingSpec::Processor(p)) => p.referred_patch.is_none(),
        (PatchKind::ProcessorCyclic, CouplingSpec::Processor(p)) => p.referred_patch.is_some(),
        (PatchKind::Cyclic, CouplingSpec::Cyclic { .. })
        | (PatchKind::CyclicAmi, CouplingSpec::CyclicAmi { .. })
        | (PatchKind::CyclicAcmi, CouplingSpec::CyclicAcmi { .. }) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(CouplingError::PatchTypeMismatch {
            patch: def.name().to_owned(),
            expected: def.kind.type_name().to_owned(),
            found: def.coupling.describe().to_owned(),
        })
    }
}

fn check_pair(def: &PatchDef, nb: &PatchDef, same: bool) -> Result<(), CouplingError> {
    let fail = |reason: String| CouplingError::PatchPairMismatch {
        patch: def.name().to_owned(),
        neighbour: nb.name().to_owned(),
        reason,
    };
    if same {
        return Err(fail("a patch cannot be its own neighbour".to_owned()));
    }
    if nb.kind != def.kind {
        return Err(fail(format!("kinds differ: {} vs {}", def.kind, nb.kind)));
    }
    if nb.coupling.neighbour_name() != Some(def.name()) {
        return Err(fail(format!(
            "neighbour refers back to `{}`",
            nb.coupling.neighbour_name().unwrap_or("")
        )));
    }
    if def.kind == PatchKind::Cyclic && def.geometry.size() != nb.geometry.size() {
        return Err(fail(format!(
            "{} faces vs {} faces",
            def.geometry.size(),
            nb.geometry.size()
        )));
    }
    if !def
        .coupling
        .transform()
        .inverse()
        .approx_eq(&nb.coupling.transform(), TRANSFORM_TOLERANCE)
    {
        return Err(fail("transforms are not mutual inverses".to_owned()));
    }
    Ok(())
}

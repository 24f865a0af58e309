//! All patch fields of one volume field, updated in schedule order.

use super::basic::BasicPatchField;
use super::coupled::{CoupledPatchField, CouplingInputs, InterfaceInputs, Jump, NonOverlap};
use crate::comm::{CommsType, Communicator, PendingTransfer, ProcessorTopology, ScheduleEntry};
use crate::coupling_error::{CouplingError, check_len};
use crate::mesh::{BoundaryMesh, PatchId};
use crate::patch::{Patch, PatchInterface};
use crate::primitives::FieldValue;
use hashbrown::HashMap;

#[derive(Debug, Clone)]
pub enum PatchField<T> {
    Basic(BasicPatchField<T>),
    Coupled(CoupledPatchField<T>),
}

impl<T: FieldValue> PatchField<T> {
    pub fn values(&self) -> &[T] {
        match self {
            PatchField::Basic(b) => b.values(),
            PatchField::Coupled(c) => c.values(),
        }
    }

    pub fn as_coupled(&self) -> Option<&CoupledPatchField<T>> {
        match self {
            PatchField::Coupled(c) => Some(c),
            PatchField::Basic(_) => None,
        }
    }
}

/// How a boundary update moves data between ranks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExchangeOptions<'a> {
    pub comms_type: CommsType,
    /// Needed for [`CommsType::Scheduled`].
    pub topology: Option<&'a ProcessorTopology>,
}

impl<'a> ExchangeOptions<'a> {
    pub fn new(comms_type: CommsType) -> Self {
        Self {
            comms_type,
            topology: None,
        }
    }

    pub fn with_topology(mut self, topology: &'a ProcessorTopology) -> Self {
        self.topology = Some(topology);
        self
    }
}

/// One matrix-coupling pass: a solved component and per-patch coefficients.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceUpdate<'a> {
    pub psi: &'a [f64],
    pub cmpt: usize,
    /// Neighbour coefficients indexed by patch id; empty for uncoupled patches.
    pub coeffs: &'a [Vec<f64>],
    pub solving_field: bool,
}

#[derive(Debug, Clone)]
pub struct BoundaryField<T> {
    name: String,
    fields: Vec<PatchField<T>>,
}

impl<T: FieldValue> BoundaryField<T> {
    /// Zero-valued fields: calculated on uncoupled patches, coupled elsewhere.
    pub fn new(name: impl Into<String>, mesh: &BoundaryMesh) -> Result<Self, CouplingError> {
        let name = name.into();
        let fields = mesh
            .patches()
            .iter()
            .map(|p| {
                let zeros = vec![T::zero(); p.size()];
                if p.coupled() {
                    CoupledPatchField::new(name.clone(), p, zeros).map(PatchField::Coupled)
                } else {
                    Ok(PatchField::Basic(BasicPatchField::calculated(zeros)))
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { name, fields })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, id: PatchId) -> Result<&PatchField<T>, CouplingError> {
        self.fields.get(id.index()).ok_or(CouplingError::UnknownPatch(id.index()))
    }

    pub fn values(&self, id: PatchId) -> Result<&[T], CouplingError> {
        Ok(self.get(id)?.values())
    }

    /// Replace the field of an uncoupled patch.
    pub fn set_basic(&mut self, mesh: &BoundaryMesh, id: PatchId, field: BasicPatchField<T>) -> Result<(), CouplingError> {
        let patch = mesh.patch(id)?;
        if patch.coupled() {
            return Err(CouplingError::PatchTypeMismatch {
                patch: patch.name().to_owned(),
                expected: "uncoupled".to_owned(),
                found: patch.kind().type_name().to_owned(),
            });
        }
        check_len(patch.name(), patch.size(), field.values().len()).map_err(|e| e.with_field(&self.name))?;
        self.fields[id.index()] = PatchField::Basic(field);
        Ok(())
    }

    /// Turn the pair around `owner` into a jump pair with `jump` on the owner side.
    pub fn set_jump(&mut self, mesh: &BoundaryMesh, owner: PatchId, jump: Vec<T>) -> Result<(), CouplingError> {
        let patch = mesh.patch(owner)?;
        if patch.as_processor().is_some() {
            return Err(CouplingError::InvalidPatchKind {
                patch: patch.name().to_owned(),
                operation: "set_jump (jump pairs are cyclic)",
            });
        }
        let nb = patch.neighbour_patch_id()?;
        let nb_patch = mesh.patch(nb)?;
        self.coupled_mut(owner)?.set_jump(patch, Jump::Owner(jump))?;
        self.coupled_mut(nb)?.set_jump(nb_patch, Jump::Neighbour)
    }

    fn coupled_mut(&mut self, id: PatchId) -> Result<&mut CoupledPatchField<T>, CouplingError> {
        match self.fields.get_mut(id.index()) {
            Some(PatchField::Coupled(c)) => Ok(c),
            Some(PatchField::Basic(b)) => Err(CouplingError::PatchTypeMismatch {
                patch: id.to_string(),
                expected: "coupled".to_owned(),
                found: b.type_name().to_owned(),
            }),
            None => Err(CouplingError::UnknownPatch(id.index())),
        }
    }

    /// Start a new gating cycle on every coupled field.
    pub fn reset(&mut self) {
        for f in &mut self.fields {
            if let PatchField::Coupled(c) = f {
                c.reset();
            }
        }
    }

    /// Start a new matrix-coupling pass on every coupled field.
    pub fn reset_interfaces(&mut self) {
        for f in &mut self.fields {
            if let PatchField::Coupled(c) = f {
                c.reset_interface();
            }
        }
    }

    fn check_sizes(&self, mesh: &BoundaryMesh, field: &str, n: usize) -> Result<(), CouplingError> {
        check_len("boundary mesh patches", mesh.len(), self.fields.len()).map_err(|e| e.with_field(&self.name))?;
        check_len("internal field", mesh.n_cells(), n).map_err(|e| e.with_field(field))
    }

    /// Jump seen by the neighbour side of a jump pair: the owner jump negated,
    /// interpolated first across an AMI.
    fn neighbour_jump(&self, mesh: &BoundaryMesh, id: PatchId) -> Result<Option<Vec<T>>, CouplingError> {
        let Some(PatchField::Coupled(f)) = self.fields.get(id.index()) else {
            return Ok(None);
        };
        if !matches!(f.jump(), Jump::Neighbour) {
            return Ok(None);
        }
        let patch = mesh.patch(id)?;
        let nb = patch.neighbour_patch_id()?;
        let owner_jump = match self.fields.get(nb.index()).and_then(PatchField::as_coupled).map(CoupledPatchField::jump) {
            Some(Jump::Owner(v)) => v,
            _ => {
                return Err(CouplingError::PatchPairMismatch {
                    patch: patch.name().to_owned(),
                    neighbour: mesh.patch(nb)?.name().to_owned(),
                    reason: format!("owner side of `{}` carries no jump", self.name),
                });
            }
        };
        let jump = match patch {
            Patch::CyclicAmi(p) => p.interpolate(owner_jump, None)?,
            _ => owner_jump.clone(),
        };
        Ok(Some(jump.into_iter().map(|v| -v).collect()))
    }

    /// Values and fixes-value flag of the non-overlap field of an ACMI patch.
    fn non_overlap_values(&self, mesh: &BoundaryMesh, id: PatchId) -> Option<(PatchId, Vec<T>, bool)> {
        let no = mesh.non_overlap_of(id)?;
        match self.fields.get(no.index())? {
            PatchField::Basic(b) => Some((no, b.values().to_vec(), b.fixes_value())),
            PatchField::Coupled(_) => None,
        }
    }

    /// Evaluate every patch field against `internal`.
    ///
    /// Uncoupled fields go first, then coupled fields in schedule order. On
    /// failure every transfer still in flight is drained before returning.
    pub fn evaluate<C: Communicator>(
        &mut self,
        mesh: &BoundaryMesh,
        comm: &C,
        internal: &[T],
        opts: ExchangeOptions<'_>,
    ) -> Result<(), CouplingError> {
        self.check_sizes(mesh, &self.name, internal.len())?;
        for (i, f) in self.fields.iter_mut().enumerate() {
            if let PatchField::Basic(b) = f {
                b.evaluate(mesh.geometry(PatchId(i))?, internal)
                    .map_err(|e| e.with_field(&self.name))?;
            }
        }

        let schedule = mesh.patch_schedule(comm.rank(), opts.comms_type, opts.topology)?;
        let mut pending = HashMap::new();
        let mut result = Ok(());
        for entry in schedule {
            if let Err(e) = self.evaluate_step(mesh, comm, internal, entry, &mut pending, opts.comms_type) {
                result = Err(e);
                break;
            }
        }
        for (_, p) in pending.drain() {
            p.drain();
        }
        result
    }

    fn evaluate_step<C: Communicator>(
        &mut self,
        mesh: &BoundaryMesh,
        comm: &C,
        internal: &[T],
        entry: ScheduleEntry,
        pending: &mut HashMap<PatchId, PendingTransfer<C>>,
        comms_type: CommsType,
    ) -> Result<(), CouplingError> {
        let id = entry.patch;
        let patch = mesh.patch(id)?;
        if !matches!(self.fields.get(id.index()), Some(PatchField::Coupled(_))) {
            return Ok(());
        }
        if entry.init {
            if let Some(p) = self.coupled_mut(id)?.init_evaluate(comm, patch, internal, comms_type)? {
                pending.insert(id, p);
            }
            return Ok(());
        }

        let jump = self.neighbour_jump(mesh, id)?;
        let non_overlap = self.non_overlap_values(mesh, id);
        let non_overlap = match &non_overlap {
            Some((no, values, fixes_value)) => Some(NonOverlap {
                geometry: &**mesh.geometry(*no)?,
                values,
                fixes_value: *fixes_value,
            }),
            None => None,
        };
        let inputs = CouplingInputs {
            internal,
            jump: jump.as_deref(),
            non_overlap,
        };
        self.coupled_mut(id)?
            .complete_evaluate(comm, patch, inputs, pending.remove(&id))
    }

    /// Add every coupled patch's neighbour contribution to `result`.
    pub fn update_interface_matrices<C: Communicator>(
        &mut self,
        mesh: &BoundaryMesh,
        comm: &C,
        update: InterfaceUpdate<'_>,
        result: &mut [f64],
        opts: ExchangeOptions<'_>,
    ) -> Result<(), CouplingError> {
        self.check_sizes(mesh, "psi", update.psi.len())?;
        check_len("result", mesh.n_cells(), result.len()).map_err(|e| e.with_field(&self.name))?;
        check_len("interface coefficients", mesh.len(), update.coeffs.len())
            .map_err(|e| e.with_field(&self.name))?;

        let schedule = mesh.patch_schedule(comm.rank(), opts.comms_type, opts.topology)?;
        let mut pending = HashMap::new();
        let mut outcome = Ok(());
        for entry in schedule {
            if let Err(e) = self.interface_step(mesh, comm, update, entry, result, &mut pending, opts.comms_type) {
                outcome = Err(e);
                break;
            }
        }
        for (_, p) in pending.drain() {
            p.drain();
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn interface_step<C: Communicator>(
        &mut self,
        mesh: &BoundaryMesh,
        comm: &C,
        update: InterfaceUpdate<'_>,
        entry: ScheduleEntry,
        result: &mut [f64],
        pending: &mut HashMap<PatchId, PendingTransfer<C>>,
        comms_type: CommsType,
    ) -> Result<(), CouplingError> {
        let id = entry.patch;
        let patch = mesh.patch(id)?;
        if !matches!(self.fields.get(id.index()), Some(PatchField::Coupled(_))) {
            return Ok(());
        }
        if entry.init {
            if let Some(p) = self.coupled_mut(id)?.init_interface(comm, patch, update.psi, comms_type)? {
                pending.insert(id, p);
            }
            return Ok(());
        }
        let jump = if update.solving_field {
            self.neighbour_jump(mesh, id)?
        } else {
            None
        };
        let inputs = InterfaceInputs {
            psi: update.psi,
            coeffs: &update.coeffs[id.index()],
            cmpt: update.cmpt,
            solving_field: update.solving_field,
            jump: jump.as_deref(),
        };
        self.coupled_mut(id)?
            .complete_interface(comm, patch, inputs, result, pending.remove(&id))
            .map(|_| ())
    }

    pub fn fixes_value(&self, mesh: &BoundaryMesh, id: PatchId) -> Result<bool, CouplingError> {
        match self.get(id)? {
            PatchField::Basic(b) => Ok(b.fixes_value()),
            PatchField::Coupled(c) => {
                let non_overlap_fixes = self
                    .non_overlap_values(mesh, id)
                    .is_some_and(|(_, _, fixes)| fixes);
                c.fixes_value(mesh.patch(id)?, non_overlap_fixes)
            }
        }
    }

    /// No patch fixes the value, so the solve needs a reference level.
    pub fn needs_reference_level(&self, mesh: &BoundaryMesh) -> Result<bool, CouplingError> {
        for i in 0..self.fields.len() {
            if self.fixes_value(mesh, PatchId(i))? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

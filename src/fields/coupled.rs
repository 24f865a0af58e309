//! Patch field on a coupled patch.
//!
//! Evaluation and matrix coupling are each split into an init half, which
//! posts the outgoing transfer on processor patches, and a complete half,
//! which receives, transforms and blends. Each half is gated: once a cycle is
//! [`UpdateState::Updated`], further calls do nothing until [`reset`] is
//! called, so one cycle moves at most one message each way.
//!
//! Processor and jump fields keep their own state, and pending transfers are
//! owned by the caller between the two halves.
//!
//! [`reset`]: CoupledPatchField::reset

use crate::comm::{CommsType, Communicator, PendingTransfer};
use crate::coupling_error::{CouplingError, check_len};
use crate::mesh::{PatchGeometry, PatchId};
use crate::patch::{Capabilities, Patch, PatchInterface, ProcessorPatch};
use crate::primitives::FieldValue;

/// Gating state of one update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateState {
    #[default]
    NeedsUpdate,
    Updated,
}

/// Jump across a jump-cyclic pair. The owner side holds the values; the
/// neighbour side derives the negated (and, for AMI, interpolated) jump.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Jump<T> {
    #[default]
    None,
    Owner(Vec<T>),
    Neighbour,
}

impl<T> Jump<T> {
    pub fn is_none(&self) -> bool {
        matches!(self, Jump::None)
    }
}

/// Non-overlap partner of a cyclic ACMI patch.
#[derive(Debug, Clone, Copy)]
pub struct NonOverlap<'a, T> {
    pub geometry: &'a PatchGeometry,
    /// Current face values of the non-overlap patch field.
    pub values: &'a [T],
    pub fixes_value: bool,
}

/// What an evaluation reads besides the patch itself.
#[derive(Debug, Clone, Copy)]
pub struct CouplingInputs<'a, T> {
    pub internal: &'a [T],
    /// Jump seen from the neighbour side of a jump pair, already negated.
    pub jump: Option<&'a [T]>,
    pub non_overlap: Option<NonOverlap<'a, T>>,
}

impl<'a, T> CouplingInputs<'a, T> {
    pub fn new(internal: &'a [T]) -> Self {
        Self {
            internal,
            jump: None,
            non_overlap: None,
        }
    }
}

/// What a matrix-coupling pass reads besides the patch itself.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceInputs<'a, T> {
    /// One component of the field being solved, per cell.
    pub psi: &'a [f64],
    /// Neighbour coefficient of every face.
    pub coeffs: &'a [f64],
    pub cmpt: usize,
    /// `psi` is this field itself; only then does a jump enter the coupling.
    pub solving_field: bool,
    /// As in [`CouplingInputs::jump`].
    pub jump: Option<&'a [T]>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Gate {
    state: UpdateState,
    sent: bool,
    done: bool,
}

impl Gate {
    fn skip_send(&self) -> bool {
        self.state == UpdateState::Updated || self.sent
    }

    fn skip_complete(&self) -> bool {
        self.state == UpdateState::Updated || self.done
    }

    fn mark_sent(&mut self) {
        self.sent = true;
        if self.done {
            self.state = UpdateState::Updated;
        }
    }

    fn mark_done(&mut self, active: bool) {
        self.done = true;
        if self.sent || !active {
            self.state = UpdateState::Updated;
        }
    }
}

/// Processor patch of `patch` when it has a transfer to run on `comm`.
fn active_processor<'p, C: Communicator>(comm: &C, patch: &'p Patch) -> Option<&'p ProcessorPatch> {
    patch.as_processor().filter(|_| comm.is_parallel())
}

fn drained<C: Communicator>(pending: Option<PendingTransfer<C>>, err: CouplingError) -> CouplingError {
    if let Some(p) = pending {
        p.drain();
    }
    err
}

#[derive(Debug, Clone)]
pub struct CoupledPatchField<T> {
    field: String,
    patch: PatchId,
    value: Vec<T>,
    neighbour: Option<Vec<T>>,
    jump: Jump<T>,
    evaluate: Gate,
    interface: Gate,
}

impl<T: FieldValue> CoupledPatchField<T> {
    pub fn new(field: impl Into<String>, patch: &Patch, value: Vec<T>) -> Result<Self, CouplingError> {
        let field = field.into();
        patch.coupled_or_err("coupled patch field")?;
        check_len(patch.name(), patch.size(), value.len()).map_err(|e| e.with_field(&field))?;
        Ok(Self {
            field,
            patch: patch.id(),
            value,
            neighbour: None,
            jump: Jump::None,
            evaluate: Gate::default(),
            interface: Gate::default(),
        })
    }

    pub fn field_name(&self) -> &str {
        &self.field
    }

    pub fn patch_id(&self) -> PatchId {
        self.patch
    }

    pub fn values(&self) -> &[T] {
        &self.value
    }

    /// Neighbour field used by the last evaluation.
    pub fn neighbour_values(&self) -> Option<&[T]> {
        self.neighbour.as_deref()
    }

    pub fn state(&self) -> UpdateState {
        self.evaluate.state
    }

    pub fn interface_state(&self) -> UpdateState {
        self.interface.state
    }

    pub fn jump(&self) -> &Jump<T> {
        &self.jump
    }

    /// Make this a jump field. Only exact and AMI cyclics carry jumps, the
    /// owner side holds the values and the neighbour side is [`Jump::Neighbour`].
    pub fn set_jump(&mut self, patch: &Patch, jump: Jump<T>) -> Result<(), CouplingError> {
        self.check_patch(patch)?;
        if !matches!(patch, Patch::Cyclic(_) | Patch::CyclicAmi(_)) && !jump.is_none() {
            return Err(CouplingError::UnsupportedCapability {
                patch: patch.name().to_owned(),
                capability: "jump conditions",
            });
        }
        let owner = patch.coupled_or_err("jump")?.owner();
        match &jump {
            Jump::Owner(v) if owner => {
                check_len(patch.name(), patch.size(), v.len()).map_err(|e| e.with_field(&self.field))?
            }
            Jump::Neighbour if !owner => {}
            Jump::None => {}
            _ => {
                return Err(CouplingError::PatchPairMismatch {
                    patch: patch.name().to_owned(),
                    neighbour: String::new(),
                    reason: "jump values belong on the owner side".to_owned(),
                });
            }
        }
        self.jump = jump;
        Ok(())
    }

    /// Jump subtracted from the neighbour field on this side.
    fn resolved_jump<'s>(&'s self, patch: &Patch, given: Option<&'s [T]>) -> Result<Option<&'s [T]>, CouplingError> {
        match &self.jump {
            Jump::None => Ok(None),
            Jump::Owner(v) => Ok(Some(v)),
            Jump::Neighbour => given.map(Some).ok_or_else(|| CouplingError::PatchPairMismatch {
                patch: patch.name().to_owned(),
                neighbour: String::new(),
                reason: format!("owner jump of `{}` was not supplied", self.field),
            }),
        }
    }

    /// Start a new gating cycle for both evaluation and matrix coupling.
    pub fn reset(&mut self) {
        self.evaluate = Gate::default();
        self.interface = Gate::default();
    }

    /// Start a new matrix-coupling cycle only.
    pub fn reset_interface(&mut self) {
        self.interface = Gate::default();
    }

    fn check_patch(&self, patch: &Patch) -> Result<(), CouplingError> {
        if patch.id() == self.patch {
            Ok(())
        } else {
            Err(CouplingError::PatchTypeMismatch {
                patch: patch.name().to_owned(),
                expected: format!("patch {}", self.patch),
                found: format!("patch {}", patch.id()),
            })
        }
    }

    pub fn capabilities(&self, patch: &Patch) -> Capabilities {
        let mut caps = patch.capabilities();
        if !self.jump.is_none() && T::RANK > 0 {
            caps.matrix_coupled = false;
        }
        caps
    }

    pub fn fixes_value(&self, patch: &Patch, non_overlap_fixes_value: bool) -> Result<bool, CouplingError> {
        match patch {
            Patch::CyclicAcmi(p) => p.fixes_value(non_overlap_fixes_value),
            _ => Ok(false),
        }
    }

    /// Post this side's patch-internal values on a processor patch.
    pub fn init_evaluate<C: Communicator>(
        &mut self,
        comm: &C,
        patch: &Patch,
        internal: &[T],
        comms_type: CommsType,
    ) -> Result<Option<PendingTransfer<C>>, CouplingError> {
        self.check_patch(patch)?;
        if self.evaluate.skip_send() {
            return Ok(None);
        }
        let Some(p) = active_processor(comm, patch) else {
            return Ok(None);
        };
        let pending = p
            .init_send(comm, internal, comms_type)
            .map_err(|e| e.with_field(&self.field))?;
        self.evaluate.mark_sent();
        Ok(Some(pending))
    }

    /// Obtain the neighbour field and update the face values.
    pub fn complete_evaluate<C: Communicator>(
        &mut self,
        comm: &C,
        patch: &Patch,
        inputs: CouplingInputs<'_, T>,
        pending: Option<PendingTransfer<C>>,
    ) -> Result<(), CouplingError> {
        if let Err(e) = self.check_patch(patch) {
            return Err(drained(pending, e));
        }
        if self.evaluate.skip_complete() {
            if let Some(p) = pending {
                p.drain();
            }
            return Ok(());
        }
        let active = active_processor(comm, patch).is_some();
        let pnf = self
            .patch_neighbour_field(comm, patch, inputs, pending)
            .map_err(|e| e.with_field(&self.field))?;

        let value = match patch {
            Patch::Generic(_) | Patch::Processor(_) => pnf.clone(),
            Patch::Cyclic(_) | Patch::CyclicAmi(_) => self.blend(patch, inputs.internal, &pnf)?,
            Patch::CyclicAcmi(p) => {
                let coupled = self.blend(patch, inputs.internal, &pnf)?;
                let no = self.non_overlap(patch, inputs)?;
                coupled
                    .into_iter()
                    .zip(no.values)
                    .zip(p.mask()?)
                    .map(|((c, &n), &m)| c * m + n * (1.0 - m))
                    .collect()
            }
        };
        self.value = value;
        self.neighbour = Some(pnf);
        self.evaluate.mark_done(active);
        Ok(())
    }

    /// Both halves back to back.
    pub fn evaluate<C: Communicator>(
        &mut self,
        comm: &C,
        patch: &Patch,
        inputs: CouplingInputs<'_, T>,
        comms_type: CommsType,
    ) -> Result<(), CouplingError> {
        let pending = self.init_evaluate(comm, patch, inputs.internal, comms_type)?;
        self.complete_evaluate(comm, patch, inputs, pending)
    }

    /// `w * own + (1 - w) * neighbour`.
    fn blend(&self, patch: &Patch, internal: &[T], pnf: &[T]) -> Result<Vec<T>, CouplingError> {
        let w = patch.coupled_or_err("evaluate")?.weights()?;
        let pif = patch.geometry().patch_internal_field(internal)?;
        Ok(pif
            .into_iter()
            .zip(pnf)
            .zip(w)
            .map(|((i, &n), &w)| i * w + n * (1.0 - w))
            .collect())
    }

    fn non_overlap<'i>(&self, patch: &Patch, inputs: CouplingInputs<'i, T>) -> Result<NonOverlap<'i, T>, CouplingError> {
        let no = inputs.non_overlap.ok_or_else(|| CouplingError::PatchPairMismatch {
            patch: patch.name().to_owned(),
            neighbour: String::new(),
            reason: format!("non-overlap values of `{}` were not supplied", self.field),
        })?;
        check_len(no.geometry.name(), patch.size(), no.values.len())?;
        Ok(no)
    }

    fn patch_neighbour_field<C: Communicator>(
        &self,
        comm: &C,
        patch: &Patch,
        inputs: CouplingInputs<'_, T>,
        pending: Option<PendingTransfer<C>>,
    ) -> Result<Vec<T>, CouplingError> {
        let internal = inputs.internal;
        let jump = match self.resolved_jump(patch, inputs.jump) {
            Ok(j) => j,
            Err(e) => return Err(drained(pending, e)),
        };
        let mut pnf = match patch {
            Patch::Generic(_) => {
                return Err(drained(
                    pending,
                    CouplingError::InvalidPatchKind {
                        patch: patch.name().to_owned(),
                        operation: "evaluate",
                    },
                ));
            }
            Patch::Processor(p) => match active_processor(comm, patch) {
                Some(_) => p.receive(comm, pending)?,
                None => {
                    if let Some(pending) = pending {
                        pending.drain();
                    }
                    self.value.clone()
                }
            },
            Patch::Cyclic(p) => p.neighbour_internal(internal)?,
            Patch::CyclicAmi(p) => {
                let defaults = p.geometry().patch_internal_field(internal)?;
                p.neighbour_internal(internal, Some(&defaults))?
            }
            Patch::CyclicAcmi(p) => {
                let no = self.non_overlap(patch, inputs)?;
                p.neighbour_internal(internal, no.geometry)?
            }
        };
        if let Some(jump) = jump {
            check_len(patch.name(), pnf.len(), jump.len()).map_err(|e| e.with_field("jump"))?;
            for (v, &j) in pnf.iter_mut().zip(jump) {
                *v = *v - j;
            }
        }
        Ok(pnf)
    }

    /// Post this side's `psi` values on a processor patch.
    pub fn init_interface<C: Communicator>(
        &mut self,
        comm: &C,
        patch: &Patch,
        psi: &[f64],
        comms_type: CommsType,
    ) -> Result<Option<PendingTransfer<C>>, CouplingError> {
        self.check_patch(patch)?;
        if self.interface.skip_send() {
            return Ok(None);
        }
        let Some(p) = active_processor(comm, patch) else {
            return Ok(None);
        };
        let pending = p
            .init_send(comm, psi, comms_type)
            .map_err(|e| e.with_field(&self.field))?;
        self.interface.mark_sent();
        Ok(Some(pending))
    }

    /// Subtract `coeff * neighbour psi` from `result` at every face cell.
    /// Returns `false` when the cycle was already complete.
    pub fn complete_interface<C: Communicator>(
        &mut self,
        comm: &C,
        patch: &Patch,
        inputs: InterfaceInputs<'_, T>,
        result: &mut [f64],
        pending: Option<PendingTransfer<C>>,
    ) -> Result<bool, CouplingError> {
        if let Err(e) = self.check_patch(patch) {
            return Err(drained(pending, e));
        }
        if self.interface.skip_complete() {
            if let Some(p) = pending {
                p.drain();
            }
            return Ok(false);
        }
        let active = active_processor(comm, patch).is_some();
        let applied = self
            .interface_contribution(comm, patch, inputs, result, pending, active)
            .map_err(|e| e.with_field(&self.field))?;
        self.interface.mark_done(active);
        Ok(applied)
    }

    fn interface_contribution<C: Communicator>(
        &self,
        comm: &C,
        patch: &Patch,
        inputs: InterfaceInputs<'_, T>,
        result: &mut [f64],
        pending: Option<PendingTransfer<C>>,
        active: bool,
    ) -> Result<bool, CouplingError> {
        let coupled = match patch.coupled_or_err("update_interface_matrix") {
            Ok(c) => c,
            Err(e) => return Err(drained(pending, e)),
        };
        if let Err(e) = check_len(patch.name(), patch.size(), inputs.coeffs.len()) {
            return Err(drained(pending, e.with_field("interface coefficients")));
        }
        let jump = if inputs.solving_field {
            match self.resolved_jump(patch, inputs.jump) {
                Ok(j) => j,
                Err(e) => return Err(drained(pending, e)),
            }
        } else {
            None
        };
        if jump.is_some() && T::RANK > 0 {
            return Err(drained(
                pending,
                CouplingError::UnsupportedCapability {
                    patch: patch.name().to_owned(),
                    capability: "matrix coupling of a non-scalar jump",
                },
            ));
        }

        let psi = inputs.psi;
        let mut pnf: Vec<f64> = match patch {
            Patch::Generic(_) => return Ok(false),
            Patch::Processor(p) => {
                if !active {
                    if let Some(pending) = pending {
                        pending.drain();
                    }
                    return Ok(false);
                }
                p.receive(comm, pending)?
            }
            Patch::Cyclic(p) => p.neighbour_internal(psi)?,
            Patch::CyclicAmi(p) => {
                let defaults = p.geometry().patch_internal_field(psi)?;
                p.neighbour_internal(psi, Some(&defaults))?
            }
            Patch::CyclicAcmi(p) => p.coupled_neighbour_internal(psi)?,
        };
        if let Some(jump) = jump {
            check_len(patch.name(), pnf.len(), jump.len()).map_err(|e| e.with_field("jump"))?;
            for (v, j) in pnf.iter_mut().zip(jump) {
                *v -= j.component(inputs.cmpt);
            }
        }

        let factor = coupled.transform().couple_factor(inputs.cmpt, T::RANK);
        let n_cells = result.len();
        for ((&cell, &coeff), v) in patch.face_cells().iter().zip(inputs.coeffs).zip(pnf) {
            let slot = result.get_mut(cell).ok_or_else(|| CouplingError::FieldSizeMismatch {
                field: "result".to_owned(),
                context: format!("matrix coupling on patch `{}`", patch.name()),
                expected: cell + 1,
                found: n_cells,
            })?;
            *slot -= coeff * factor * v;
        }
        Ok(true)
    }

    /// Face-normal gradient `dc * (neighbour - own)` from the last evaluation.
    pub fn sn_grad(&self, patch: &Patch, internal: &[T]) -> Result<Vec<T>, CouplingError> {
        let pnf = self.neighbour.as_ref().ok_or_else(|| CouplingError::NotEvaluated {
            patch: patch.name().to_owned(),
            field: self.field.clone(),
        })?;
        let dc = patch.coupled_or_err("sn_grad")?.delta_coeffs()?;
        let pif = patch.geometry().patch_internal_field(internal)?;
        Ok(pnf
            .iter()
            .zip(pif)
            .zip(dc)
            .map(|((&n, i), d)| (n - i) * d)
            .collect())
    }

    /// Implicit coefficient of the owner cell in the face value: `w`.
    pub fn value_internal_coeffs(&self, patch: &Patch) -> Result<Vec<f64>, CouplingError> {
        Ok(patch.coupled_or_err("value_internal_coeffs")?.weights()?.to_vec())
    }

    /// Coefficient of the neighbour cell in the face value: `1 - w`.
    pub fn value_boundary_coeffs(&self, patch: &Patch) -> Result<Vec<f64>, CouplingError> {
        Ok(patch
            .coupled_or_err("value_boundary_coeffs")?
            .weights()?
            .iter()
            .map(|w| 1.0 - w)
            .collect())
    }

    pub fn gradient_internal_coeffs(&self, patch: &Patch) -> Result<Vec<f64>, CouplingError> {
        Ok(patch
            .coupled_or_err("gradient_internal_coeffs")?
            .delta_coeffs()?
            .into_iter()
            .map(|d| -d)
            .collect())
    }

    pub fn gradient_boundary_coeffs(&self, patch: &Patch) -> Result<Vec<f64>, CouplingError> {
        patch.coupled_or_err("gradient_boundary_coeffs")?.delta_coeffs()
    }
}

//! Cyclic ACMI patches: a cyclic AMI pair whose faces may be only partly
//! covered. Each face blends the coupled value with the value on a paired
//! non-overlap patch, using a coverage mask derived from the AMI weight sums.

use super::cyclic_ami::CyclicAmiPatch;
use super::interface::{CoupledPatch, PatchInterface};
use crate::ami::AmiInterpolation;
use crate::coupling_error::CouplingError;
use crate::mesh::{PatchGeometry, PatchId, PatchKind};
use crate::primitives::{FieldValue, TransformDescriptor, Vector};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Mask maximum below which the non-overlap patch is taken to fix the value.
pub const FIXES_VALUE_MASK_TOLERANCE: f64 = 1e-5;

#[derive(Debug)]
pub struct CyclicAcmiPatch {
    coupled: CyclicAmiPatch,
    non_overlap_id: PatchId,
    tolerance: f64,
    mask: OnceCell<Vec<f64>>,
}

impl CyclicAcmiPatch {
    pub fn new(
        coupled: CyclicAmiPatch,
        non_overlap_id: PatchId,
        geometries: &[Arc<PatchGeometry>],
        tolerance: f64,
    ) -> Result<Self, CouplingError> {
        let non_overlap = &geometries[non_overlap_id.index()];
        if non_overlap.size() != coupled.size() {
            return Err(CouplingError::PatchPairMismatch {
                patch: coupled.name().to_owned(),
                neighbour: non_overlap.name().to_owned(),
                reason: format!(
                    "non-overlap patch has {} faces, coupled patch {}",
                    non_overlap.size(),
                    coupled.size()
                ),
            });
        }
        Ok(Self {
            coupled,
            non_overlap_id,
            tolerance,
            mask: OnceCell::new(),
        })
    }

    pub fn non_overlap_patch_id(&self) -> PatchId {
        self.non_overlap_id
    }

    pub fn ami(&self) -> &Arc<AmiInterpolation> {
        self.coupled.ami()
    }

    /// Coupled fraction of every face in [0, 1]. Values within the tolerance of
    /// 0 or 1 are snapped.
    pub fn mask(&self) -> Result<&[f64], CouplingError> {
        self.mask
            .get_or_try_init(|| {
                let tol = self.tolerance;
                Ok::<_, CouplingError>(
                    self.coupled
                        .weights_sum()?
                        .into_iter()
                        .map(|m| {
                            if m < tol {
                                0.0
                            } else if m > 1.0 - tol {
                                1.0
                            } else {
                                m
                            }
                        })
                        .collect(),
                )
            })
            .map(Vec::as_slice)
    }

    /// `AMI(coupled) + (1 - mask) * non_overlap`, face by face.
    pub fn interpolate<T: FieldValue>(
        &self,
        coupled: &[T],
        non_overlap: &[T],
    ) -> Result<Vec<T>, CouplingError> {
        let mask = self.mask()?;
        crate::coupling_error::check_len(self.name(), mask.len(), non_overlap.len())
            .map_err(|e| e.with_field("non-overlap values"))?;
        let interp = self.coupled.interpolate(coupled, None)?;
        Ok(interp
            .into_iter()
            .zip(non_overlap)
            .zip(mask)
            .map(|((c, &n), &m)| c + n * (1.0 - m))
            .collect())
    }

    /// Neighbour-cell values blended with this side's non-overlap cell values.
    pub fn neighbour_internal<T: FieldValue>(
        &self,
        internal: &[T],
        non_overlap_geometry: &PatchGeometry,
    ) -> Result<Vec<T>, CouplingError> {
        let nbr = self.coupled.neighbour_geometry().patch_internal_field(internal)?;
        let own = non_overlap_geometry.patch_internal_field(internal)?;
        let mut values = self.interpolate(&nbr, &own)?;
        self.transform().transform_field(&mut values);
        Ok(values)
    }

    /// Neighbour-cell values from the coupled part only, used in matrix coupling.
    pub fn coupled_neighbour_internal<T: FieldValue>(&self, internal: &[T]) -> Result<Vec<T>, CouplingError> {
        self.coupled.neighbour_internal(internal, None)
    }

    /// The non-overlap side fixes the value only when nothing is coupled.
    pub fn fixes_value(&self, non_overlap_fixes_value: bool) -> Result<bool, CouplingError> {
        let max = self.mask()?.iter().copied().fold(0.0, f64::max);
        Ok(max <= FIXES_VALUE_MASK_TOLERANCE && non_overlap_fixes_value)
    }

    pub(crate) fn update_geometry(&mut self, geometries: &[Arc<PatchGeometry>]) {
        self.coupled.update_geometry(geometries);
        self.mask = OnceCell::new();
    }
}

impl PatchInterface for CyclicAcmiPatch {
    fn id(&self) -> PatchId {
        self.coupled.id()
    }
    fn kind(&self) -> PatchKind {
        PatchKind::CyclicAcmi
    }
    fn geometry(&self) -> &PatchGeometry {
        self.coupled.geometry()
    }
    fn neighbour_patch_id(&self) -> Result<PatchId, CouplingError> {
        self.coupled.neighbour_patch_id()
    }
}

impl CoupledPatch for CyclicAcmiPatch {
    fn transform(&self) -> &TransformDescriptor {
        self.coupled.transform()
    }
    fn owner(&self) -> bool {
        self.coupled.owner()
    }
    fn weights(&self) -> Result<&[f64], CouplingError> {
        self.coupled.weights()
    }
    fn delta(&self) -> Result<Vec<Vector>, CouplingError> {
        self.coupled.delta()
    }
}

//! Cyclic AMI patches: non-conformal same-rank pairs coupled through a shared
//! [`AmiInterpolation`]. The owner side is the AMI source.

use super::interface::{CoupledPatch, PatchInterface, distance_weights};
use crate::ami::AmiInterpolation;
use crate::coupling_error::CouplingError;
use crate::mesh::{PatchGeometry, PatchId, PatchKind};
use crate::primitives::{FieldValue, TransformDescriptor, Vector};
use once_cell::sync::OnceCell;
use std::sync::Arc;

#[derive(Debug)]
pub struct CyclicAmiPatch {
    id: PatchId,
    neighbour_id: PatchId,
    geometry: Arc<PatchGeometry>,
    neighbour_geometry: Arc<PatchGeometry>,
    transform: TransformDescriptor,
    ami: Arc<AmiInterpolation>,
    weights: OnceCell<Vec<f64>>,
}

impl CyclicAmiPatch {
    pub fn new(
        id: PatchId,
        neighbour_id: PatchId,
        geometries: &[Arc<PatchGeometry>],
        transform: TransformDescriptor,
        ami: Arc<AmiInterpolation>,
    ) -> Self {
        Self {
            id,
            neighbour_id,
            geometry: geometries[id.index()].clone(),
            neighbour_geometry: geometries[neighbour_id.index()].clone(),
            transform,
            ami,
            weights: OnceCell::new(),
        }
    }

    pub fn ami(&self) -> &Arc<AmiInterpolation> {
        &self.ami
    }

    pub fn neighbour_geometry(&self) -> &PatchGeometry {
        &self.neighbour_geometry
    }

    /// Map values given on the neighbour's faces onto this patch's faces.
    pub fn interpolate<T: FieldValue>(
        &self,
        neighbour_values: &[T],
        defaults: Option<&[T]>,
    ) -> Result<Vec<T>, CouplingError> {
        if self.owner() {
            self.ami.interpolate_to_source(neighbour_values, defaults)
        } else {
            self.ami.interpolate_to_target(neighbour_values, defaults)
        }
    }

    /// Weight sum of every face of this patch. 1 when fully covered.
    pub fn weights_sum(&self) -> Result<Vec<f64>, CouplingError> {
        let w = self.ami.weights()?;
        Ok(if self.owner() {
            w.src.weights_sum.clone()
        } else {
            w.tgt.weights_sum.clone()
        })
    }

    /// Neighbour-cell values of `internal`, interpolated and rotated into this frame.
    /// `defaults` (this side's own values) feed the low-weight correction.
    pub fn neighbour_internal<T: FieldValue>(
        &self,
        internal: &[T],
        defaults: Option<&[T]>,
    ) -> Result<Vec<T>, CouplingError> {
        let nbr = self.neighbour_geometry.patch_internal_field(internal)?;
        let mut values = self.interpolate(&nbr, defaults)?;
        self.transform.transform_field(&mut values);
        Ok(values)
    }

    pub(crate) fn update_geometry(&mut self, geometries: &[Arc<PatchGeometry>]) {
        self.geometry = geometries[self.id.index()].clone();
        self.neighbour_geometry = geometries[self.neighbour_id.index()].clone();
        self.weights = OnceCell::new();
        if self.owner() {
            self.ami
                .update_geometry(self.geometry.clone(), self.neighbour_geometry.clone());
        }
    }
}

impl PatchInterface for CyclicAmiPatch {
    fn id(&self) -> PatchId {
        self.id
    }
    fn kind(&self) -> PatchKind {
        PatchKind::CyclicAmi
    }
    fn geometry(&self) -> &PatchGeometry {
        &self.geometry
    }
    fn neighbour_patch_id(&self) -> Result<PatchId, CouplingError> {
        Ok(self.neighbour_id)
    }
}

impl CoupledPatch for CyclicAmiPatch {
    fn transform(&self) -> &TransformDescriptor {
        &self.transform
    }

    fn owner(&self) -> bool {
        self.id < self.neighbour_id
    }

    fn weights(&self) -> Result<&[f64], CouplingError> {
        self.weights
            .get_or_try_init(|| {
                let own = self.geometry.normal_deltas();
                let nbr = self.interpolate(&self.neighbour_geometry.normal_deltas(), None)?;
                Ok(distance_weights(&own, &nbr))
            })
            .map(Vec::as_slice)
    }

    fn delta(&self) -> Result<Vec<Vector>, CouplingError> {
        let nbr = self.interpolate(&self.neighbour_geometry.delta(), None)?;
        let t = self.transform.forward_t();
        Ok(self
            .geometry
            .delta()
            .into_iter()
            .zip(nbr)
            .map(|(d, nd)| d - t.dot_vector(nd))
            .collect())
    }
}

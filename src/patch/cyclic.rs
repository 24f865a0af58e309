//! Exact cyclic patches: face `i` of one side matches face `i` of the other,
//! both on the same rank.

use super::interface::{CoupledPatch, PatchInterface, distance_weights};
use crate::coupling_error::CouplingError;
use crate::mesh::{PatchGeometry, PatchId, PatchKind};
use crate::primitives::{FieldValue, TransformDescriptor, Vector};
use once_cell::sync::OnceCell;
use std::sync::Arc;

#[derive(Debug)]
pub struct CyclicPatch {
    id: PatchId,
    neighbour_id: PatchId,
    geometry: Arc<PatchGeometry>,
    neighbour_geometry: Arc<PatchGeometry>,
    transform: TransformDescriptor,
    weights: OnceCell<Vec<f64>>,
}

impl CyclicPatch {
    pub fn new(
        id: PatchId,
        neighbour_id: PatchId,
        geometries: &[Arc<PatchGeometry>],
        transform: TransformDescriptor,
    ) -> Result<Self, CouplingError> {
        let geometry = geometries[id.index()].clone();
        let neighbour_geometry = geometries[neighbour_id.index()].clone();
        if geometry.size() != neighbour_geometry.size() {
            return Err(CouplingError::PatchPairMismatch {
                patch: geometry.name().to_owned(),
                neighbour: neighbour_geometry.name().to_owned(),
                reason: format!(
                    "{} faces vs {} faces",
                    geometry.size(),
                    neighbour_geometry.size()
                ),
            });
        }
        Ok(Self {
            id,
            neighbour_id,
            geometry,
            neighbour_geometry,
            transform,
            weights: OnceCell::new(),
        })
    }

    pub fn neighbour_geometry(&self) -> &PatchGeometry {
        &self.neighbour_geometry
    }

    /// Owner cells of the neighbour patch, face by face.
    pub fn neighbour_face_cells(&self) -> &[usize] {
        self.neighbour_geometry.face_cells()
    }

    /// `internal` gathered at the neighbour's owner cells, rotated into this frame.
    pub fn neighbour_internal<T: FieldValue>(&self, internal: &[T]) -> Result<Vec<T>, CouplingError> {
        let mut values = self.neighbour_geometry.patch_internal_field(internal)?;
        self.transform.transform_field(&mut values);
        Ok(values)
    }

    pub(crate) fn update_geometry(&mut self, geometries: &[Arc<PatchGeometry>]) {
        self.geometry = geometries[self.id.index()].clone();
        self.neighbour_geometry = geometries[self.neighbour_id.index()].clone();
        self.weights = OnceCell::new();
    }
}

impl PatchInterface for CyclicPatch {
    fn id(&self) -> PatchId {
        self.id
    }
    fn kind(&self) -> PatchKind {
        PatchKind::Cyclic
    }
    fn geometry(&self) -> &PatchGeometry {
        &self.geometry
    }
    fn neighbour_patch_id(&self) -> Result<PatchId, CouplingError> {
        Ok(self.neighbour_id)
    }
}

impl CoupledPatch for CyclicPatch {
    fn transform(&self) -> &TransformDescriptor {
        &self.transform
    }

    fn owner(&self) -> bool {
        self.id < self.neighbour_id
    }

    fn weights(&self) -> Result<&[f64], CouplingError> {
        self.weights
            .get_or_try_init(|| {
                Ok::<_, CouplingError>(distance_weights(
                    &self.geometry.normal_deltas(),
                    &self.neighbour_geometry.normal_deltas(),
                ))
            })
            .map(Vec::as_slice)
    }

    fn delta(&self) -> Result<Vec<Vector>, CouplingError> {
        let t = self.transform.forward_t();
        Ok(self
            .geometry
            .delta()
            .into_iter()
            .zip(self.neighbour_geometry.delta())
            .map(|(d, nd)| d - t.dot_vector(nd))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Periodic pair along x: faces at x = 0 (normal -x) and x = 3 (normal +x).
    fn pair() -> Vec<Arc<PatchGeometry>> {
        let left = PatchGeometry::from_centroids(
            "left",
            vec![Vector::new(0.0, 0.5, 0.0), Vector::new(0.0, 1.5, 0.0)],
            vec![-Vector::X, -Vector::X],
            vec![0, 1],
            vec![Vector::new(0.5, 0.5, 0.0), Vector::new(0.5, 1.5, 0.0)],
        )
        .unwrap();
        let right = PatchGeometry::from_centroids(
            "right",
            vec![Vector::new(3.0, 0.5, 0.0), Vector::new(3.0, 1.5, 0.0)],
            vec![Vector::X, Vector::X],
            vec![4, 5],
            vec![Vector::new(2.5, 0.5, 0.0), Vector::new(2.5, 1.5, 0.0)],
        )
        .unwrap();
        vec![Arc::new(left), Arc::new(right)]
    }

    #[test]
    fn neighbour_values_come_from_partner_cells() {
        let g = pair();
        let p = CyclicPatch::new(PatchId(0), PatchId(1), &g, TransformDescriptor::identity()).unwrap();
        let internal = [0.0, 1.0, 2.0, 3.0, 40.0, 50.0];
        assert_eq!(p.neighbour_internal(&internal).unwrap(), vec![40.0, 50.0]);
        assert_eq!(p.neighbour_patch_id().unwrap(), PatchId(1));
        assert!(p.owner());
    }

    #[test]
    fn translational_delta_spans_the_gap() {
        let g = pair();
        let p = CyclicPatch::new(PatchId(0), PatchId(1), &g, TransformDescriptor::identity()).unwrap();
        let d = p.delta().unwrap();
        assert!(d[0].approx_eq(Vector::new(-1.0, 0.0, 0.0), 1e-12));
        assert_eq!(p.weights().unwrap(), &[0.5, 0.5]);
        assert!((p.delta_coeffs().unwrap()[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn face_count_mismatch_is_rejected() {
        let mut g = pair();
        g[1] = Arc::new(
            PatchGeometry::from_centroids("right", vec![Vector::ZERO], vec![Vector::X], vec![0], vec![-Vector::X])
                .unwrap(),
        );
        assert!(matches!(
            CyclicPatch::new(PatchId(0), PatchId(1), &g, TransformDescriptor::identity()),
            Err(CouplingError::PatchPairMismatch { .. })
        ));
    }
}

//! Face-level geometry of one boundary patch.

use crate::coupling_error::{CouplingError, check_len};
use crate::debug_invariants::DebugInvariants;
use crate::geometry::{self, BoundBox};
use crate::primitives::{FieldValue, Vector};

/// Geometry of a boundary patch as seen by its owner cells.
///
/// Face polygons are optional: processor and exact-cyclic coupling only need
/// centroids and area vectors, AMI overlap construction needs polygons.
#[derive(Debug, Clone)]
pub struct PatchGeometry {
    name: String,
    points: Vec<Vector>,
    faces: Vec<Vec<usize>>,
    face_centres: Vec<Vector>,
    face_areas: Vec<Vector>,
    face_cells: Vec<usize>,
    /// Centre of the owner cell of each face.
    cell_centres: Vec<Vector>,
}

impl PatchGeometry {
    /// Build from polygons; centroids and area vectors are derived.
    pub fn from_polygons(
        name: impl Into<String>,
        points: Vec<Vector>,
        faces: Vec<Vec<usize>>,
        face_cells: Vec<usize>,
        cell_centres: Vec<Vector>,
    ) -> Result<Self, CouplingError> {
        let name = name.into();
        for (f, face) in faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(CouplingError::geometry(
                    &name,
                    format!("face {f} has {} vertices", face.len()),
                ));
            }
            if let Some(&p) = face.iter().find(|&&p| p >= points.len()) {
                return Err(CouplingError::geometry(
                    &name,
                    format!("face {f} references point {p} of {}", points.len()),
                ));
            }
        }
        let (face_centres, face_areas) = face_metrics(&points, &faces);
        let geom = Self {
            name,
            points,
            faces,
            face_centres,
            face_areas,
            face_cells,
            cell_centres,
        };
        geom.validate_invariants()?;
        Ok(geom)
    }

    /// Build from precomputed centroids and area vectors, without polygons.
    pub fn from_centroids(
        name: impl Into<String>,
        face_centres: Vec<Vector>,
        face_areas: Vec<Vector>,
        face_cells: Vec<usize>,
        cell_centres: Vec<Vector>,
    ) -> Result<Self, CouplingError> {
        let geom = Self {
            name: name.into(),
            points: Vec::new(),
            faces: Vec::new(),
            face_centres,
            face_areas,
            face_cells,
            cell_centres,
        };
        geom.validate_invariants()?;
        Ok(geom)
    }

    /// Same topology with moved points. Only valid for polygon-backed geometry.
    pub fn with_points(&self, points: Vec<Vector>, cell_centres: Vec<Vector>) -> Result<Self, CouplingError> {
        if !self.has_polygons() {
            return Err(CouplingError::geometry(
                &self.name,
                "cannot move points of a patch built without polygons",
            ));
        }
        check_len(&self.name, self.points.len(), points.len())
            .map_err(|e| e.with_field("points"))?;
        Self::from_polygons(
            self.name.clone(),
            points,
            self.faces.clone(),
            self.face_cells.clone(),
            cell_centres,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.face_centres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn has_polygons(&self) -> bool {
        !self.faces.is_empty() || self.is_empty()
    }

    pub fn points(&self) -> &[Vector] {
        &self.points
    }

    pub fn faces(&self) -> &[Vec<usize>] {
        &self.faces
    }

    /// Vertices of face `i`, or `None` without polygons.
    pub fn face_polygon(&self, i: usize) -> Option<Vec<Vector>> {
        self.faces
            .get(i)
            .map(|f| f.iter().map(|&p| self.points[p]).collect())
    }

    pub fn face_bound_box(&self, i: usize) -> Option<BoundBox> {
        BoundBox::from_points(self.faces.get(i)?.iter().map(|&p| self.points[p]))
    }

    /// Face centroids `Cf`.
    pub fn face_centres(&self) -> &[Vector] {
        &self.face_centres
    }

    /// Face area vectors `Sf`, pointing out of the domain.
    pub fn face_areas(&self) -> &[Vector] {
        &self.face_areas
    }

    pub fn mag_sf(&self) -> Vec<f64> {
        self.face_areas.iter().map(|s| s.mag()).collect()
    }

    /// Unit face normals.
    pub fn nf(&self) -> Vec<Vector> {
        self.face_areas
            .iter()
            .map(|s| s.normalized().unwrap_or(Vector::ZERO))
            .collect()
    }

    pub fn total_area(&self) -> f64 {
        self.face_areas.iter().map(|s| s.mag()).sum()
    }

    /// Owner cell of each face.
    pub fn face_cells(&self) -> &[usize] {
        &self.face_cells
    }

    /// Owner-cell centres `Cn`, one per face.
    pub fn cell_centres(&self) -> &[Vector] {
        &self.cell_centres
    }

    /// `Cf - Cn` for every face.
    pub fn delta(&self) -> Vec<Vector> {
        self.face_centres
            .iter()
            .zip(&self.cell_centres)
            .map(|(&cf, &cn)| cf - cn)
            .collect()
    }

    /// Normal distance from owner cell centre to face, `nf . (Cf - Cn)`.
    pub fn normal_deltas(&self) -> Vec<f64> {
        self.nf()
            .into_iter()
            .zip(self.delta())
            .map(|(n, d)| n.dot(d))
            .collect()
    }

    /// Gather `internal` at the owner cells of this patch.
    pub fn patch_internal_field<T: FieldValue>(&self, internal: &[T]) -> Result<Vec<T>, CouplingError> {
        self.face_cells
            .iter()
            .map(|&c| {
                internal.get(c).copied().ok_or_else(|| CouplingError::FieldSizeMismatch {
                    field: String::new(),
                    context: format!("internal field gathered by patch `{}`", self.name),
                    expected: c + 1,
                    found: internal.len(),
                })
            })
            .collect()
    }
}

fn face_metrics(points: &[Vector], faces: &[Vec<usize>]) -> (Vec<Vector>, Vec<Vector>) {
    faces
        .iter()
        .map(|f| {
            let poly: Vec<Vector> = f.iter().map(|&p| points[p]).collect();
            (geometry::centre(&poly), geometry::area_vector(&poly))
        })
        .unzip()
}

impl DebugInvariants for PatchGeometry {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "PatchGeometry");
    }

    fn validate_invariants(&self) -> Result<(), CouplingError> {
        let n = self.face_centres.len();
        check_len(&self.name, n, self.face_areas.len()).map_err(|e| e.with_field("face areas"))?;
        check_len(&self.name, n, self.face_cells.len()).map_err(|e| e.with_field("face cells"))?;
        check_len(&self.name, n, self.cell_centres.len())
            .map_err(|e| e.with_field("cell centres"))?;
        if let Some(f) = self.face_areas.iter().position(|s| s.mag() <= f64::MIN_POSITIVE) {
            return Err(CouplingError::geometry(&self.name, format!("face {f} has zero area")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn unit_strip(name: &str, n: usize) -> PatchGeometry {
        let mut points = Vec::new();
        for i in 0..=n {
            points.push(Vector::new(i as f64, 0.0, 0.0));
            points.push(Vector::new(i as f64, 1.0, 0.0));
        }
        let faces = (0..n)
            .map(|i| vec![2 * i, 2 * i + 2, 2 * i + 3, 2 * i + 1])
            .collect();
        let cells = (0..n).collect();
        let centres = (0..n)
            .map(|i| Vector::new(i as f64 + 0.5, 0.5, -0.5))
            .collect();
        PatchGeometry::from_polygons(name, points, faces, cells, centres).unwrap()
    }

    #[test]
    fn strip_metrics() {
        let g = unit_strip("bottom", 3);
        assert_eq!(g.size(), 3);
        assert!((g.total_area() - 3.0).abs() < 1e-12);
        assert!(g.nf().iter().all(|n| n.approx_eq(Vector::Z, 1e-12)));
        assert!(g.normal_deltas().iter().all(|d| (d - 0.5).abs() < 1e-12));
    }

    #[test]
    fn patch_internal_field_reports_short_field() {
        let g = unit_strip("bottom", 3);
        assert_eq!(g.patch_internal_field(&[1.0, 2.0, 3.0]).unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            g.patch_internal_field(&[1.0, 2.0]),
            Err(CouplingError::FieldSizeMismatch { .. })
        ));
    }

    #[test]
    fn zero_area_face_is_rejected() {
        let err = PatchGeometry::from_centroids(
            "bad",
            vec![Vector::ZERO],
            vec![Vector::ZERO],
            vec![0],
            vec![Vector::ZERO],
        )
        .unwrap_err();
        assert!(matches!(err, CouplingError::InvalidGeometry { .. }));
    }

    #[test]
    fn bad_point_index_is_rejected() {
        let err = PatchGeometry::from_polygons(
            "bad",
            vec![Vector::ZERO; 3],
            vec![vec![0, 1, 7]],
            vec![0],
            vec![Vector::ZERO],
        )
        .unwrap_err();
        assert!(matches!(err, CouplingError::InvalidGeometry { .. }));
    }
}

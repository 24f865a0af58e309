//! Overlap construction for the AMI methods.

use super::weights::{AmiSide, AmiWeights};
use crate::coupling_error::CouplingError;
use crate::geometry::{BoundBox, PlaneBasis, overlap_area};
use crate::mesh::PatchGeometry;
use crate::primitives::{TransformDescriptor, Vector};
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Candidate boxes are grown by this fraction of the source face diagonal.
const BOX_INFLATE: f64 = 0.1;
/// Faces whose normals are closer to perpendicular than this are not paired.
const MIN_NORMAL_ALIGNMENT: f64 = 0.1;
/// Overlaps smaller than this fraction of the source face area are dropped.
const AREA_CUTOFF: f64 = 1e-12;

/// How face-to-face weights are constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AmiMethod {
    /// Weights are intersection areas of projected face polygons.
    #[default]
    FaceAreaWeight,
    /// Each face maps to the face with the nearest centroid.
    NearestFace,
}

impl AmiMethod {
    /// Conformal methods normalise by the weight sum rather than the face area.
    pub fn conformal(self) -> bool {
        matches!(self, AmiMethod::NearestFace)
    }

    /// Raw (unnormalised) weights between `src` and `tgt`. `transform` maps
    /// target positions into the source frame.
    pub fn calculate(
        self,
        src: &PatchGeometry,
        tgt: &PatchGeometry,
        transform: &TransformDescriptor,
    ) -> Result<AmiWeights, CouplingError> {
        match self {
            AmiMethod::FaceAreaWeight => face_area_weights(src, tgt, transform),
            AmiMethod::NearestFace => Ok(nearest_face_weights(src, tgt, transform)),
        }
    }
}

struct TargetFace {
    polygon: Vec<Vector>,
    bound_box: Option<BoundBox>,
    normal: Vector,
}

fn face_area_weights(
    src: &PatchGeometry,
    tgt: &PatchGeometry,
    transform: &TransformDescriptor,
) -> Result<AmiWeights, CouplingError> {
    for g in [src, tgt] {
        if !g.has_polygons() {
            return Err(CouplingError::geometry(
                g.name(),
                "face-area-weighted AMI needs face polygons",
            ));
        }
    }

    let targets: Vec<TargetFace> = (0..tgt.size())
        .map(|j| {
            let polygon: Vec<Vector> = tgt
                .face_polygon(j)
                .unwrap_or_default()
                .into_iter()
                .map(|p| transform.transform_position(p))
                .collect();
            TargetFace {
                bound_box: BoundBox::from_points(polygon.iter().copied()),
                normal: transform
                    .forward_t()
                    .dot_vector(tgt.face_areas()[j])
                    .normalized()
                    .unwrap_or(Vector::ZERO),
                polygon,
            }
        })
        .collect();

    let src_mag_sf = src.mag_sf();
    let row = |i: usize| -> Vec<(usize, f64)> {
        let (Some(poly), Some(bb)) = (src.face_polygon(i), src.face_bound_box(i)) else {
            return Vec::new();
        };
        let normal = src.face_areas()[i];
        let Some(basis) = PlaneBasis::from_normal(src.face_centres()[i], normal) else {
            return Vec::new();
        };
        let n_hat = normal.normalized().unwrap_or(Vector::ZERO);
        let bb = bb.inflate(BOX_INFLATE, 0.0);
        targets
            .iter()
            .enumerate()
            .filter(|(_, t)| t.bound_box.is_some_and(|tb| tb.overlaps(&bb)))
            .filter(|(_, t)| n_hat.dot(t.normal).abs() >= MIN_NORMAL_ALIGNMENT)
            .filter_map(|(j, t)| {
                let a = overlap_area(&basis, &poly, &t.polygon);
                (a > AREA_CUTOFF * src_mag_sf[i]).then_some((j, a))
            })
            .collect()
    };

    #[cfg(feature = "rayon")]
    let src_rows: Vec<Vec<(usize, f64)>> = (0..src.size()).into_par_iter().map(row).collect();
    #[cfg(not(feature = "rayon"))]
    let src_rows: Vec<Vec<(usize, f64)>> = (0..src.size()).map(row).collect();

    Ok(AmiWeights::from_src_overlaps(
        src_rows,
        src_mag_sf,
        tgt.mag_sf(),
    ))
}

fn nearest(to: Vector, candidates: &[Vector]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (**a - to).mag_sqr().total_cmp(&(**b - to).mag_sqr()))
        .map(|(j, _)| j)
}

fn nearest_face_weights(
    src: &PatchGeometry,
    tgt: &PatchGeometry,
    transform: &TransformDescriptor,
) -> AmiWeights {
    let tgt_centres: Vec<Vector> = tgt
        .face_centres()
        .iter()
        .map(|&c| transform.transform_position(c))
        .collect();
    let src_centres = src.face_centres();

    let src_rows = src_centres
        .iter()
        .map(|&c| nearest(c, &tgt_centres).map(|j| (j, 1.0)).into_iter().collect())
        .collect();
    let tgt_rows = tgt_centres
        .iter()
        .map(|&c| nearest(c, src_centres).map(|i| (i, 1.0)).into_iter().collect())
        .collect();

    AmiWeights {
        src: AmiSide::from_overlaps(src_rows, src.mag_sf()),
        tgt: AmiSide::from_overlaps(tgt_rows, tgt.mag_sf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(name: &str, xs: &[f64], z: f64, flip: bool) -> PatchGeometry {
        let mut points = Vec::new();
        for &x in xs {
            points.push(Vector::new(x, 0.0, z));
            points.push(Vector::new(x, 1.0, z));
        }
        let faces: Vec<Vec<usize>> = (0..xs.len() - 1)
            .map(|i| {
                let f = vec![2 * i, 2 * i + 2, 2 * i + 3, 2 * i + 1];
                if flip { f.into_iter().rev().collect() } else { f }
            })
            .collect();
        let n = faces.len();
        let dz = if flip { 0.5 } else { -0.5 };
        let centres = (0..n)
            .map(|i| Vector::new(0.5 * (xs[i] + xs[i + 1]), 0.5, z + dz))
            .collect();
        PatchGeometry::from_polygons(name, points, faces, (0..n).collect(), centres).unwrap()
    }

    #[test]
    fn two_faces_onto_one() {
        let src = strip("a", &[0.0, 1.0, 2.0], 0.0, false);
        let tgt = strip("b", &[0.0, 2.0], 0.0, true);
        let w = AmiMethod::FaceAreaWeight
            .calculate(&src, &tgt, &TransformDescriptor::identity())
            .unwrap();
        assert_eq!(w.src.address, vec![vec![0], vec![0]]);
        assert_eq!(w.tgt.address, vec![vec![0, 1]]);
        assert!((w.src.weights[0][0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn translated_target_is_mapped_back() {
        let src = strip("a", &[0.0, 1.0], 0.0, false);
        let tgt = strip("b", &[0.0, 1.0], 3.0, true);
        let t = TransformDescriptor::translational(Vector::new(0.0, 0.0, -3.0));
        let w = AmiMethod::FaceAreaWeight.calculate(&src, &tgt, &t).unwrap();
        assert!((w.src.weights[0][0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn nearest_face_picks_closest_centroid() {
        let src = strip("a", &[0.0, 1.0, 2.0, 3.0], 0.0, false);
        let tgt = strip("b", &[0.0, 1.5, 3.0], 0.0, true);
        let w = AmiMethod::NearestFace
            .calculate(&src, &tgt, &TransformDescriptor::identity())
            .unwrap();
        assert_eq!(w.src.address[0], vec![0]);
        assert_eq!(w.src.address[2], vec![1]);
        assert_eq!(w.tgt.address, vec![vec![0], vec![2]]);
    }

    #[test]
    fn centroid_only_geometry_is_rejected() {
        let g = PatchGeometry::from_centroids(
            "c",
            vec![Vector::ZERO],
            vec![Vector::Z],
            vec![0],
            vec![Vector::new(0.0, 0.0, -1.0)],
        )
        .unwrap();
        assert!(
            AmiMethod::FaceAreaWeight
                .calculate(&g, &g, &TransformDescriptor::identity())
                .is_err()
        );
    }
}

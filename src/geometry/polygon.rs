//! Planar polygon helpers: area vectors, centroids, projection and clipping.

use crate::primitives::Vector;

/// 2-D point in a [`PlaneBasis`].
pub type Point2 = (f64, f64);

const EDGE_TOL: f64 = 1e-12;

/// Orthonormal basis for projecting 3-D points onto a plane and back.
#[derive(Debug, Clone, Copy)]
pub struct PlaneBasis {
    pub origin: Vector,
    pub u: Vector,
    pub v: Vector,
}

impl PlaneBasis {
    /// Basis for the plane through `origin` with the given normal. `None` for a zero normal.
    pub fn from_normal(origin: Vector, normal: Vector) -> Option<Self> {
        let n = normal.normalized()?;
        let helper = if n.z.abs() < 0.9 { Vector::Z } else { Vector::Y };
        let u = helper.cross(n).normalized()?;
        let v = n.cross(u).normalized()?;
        Some(Self { origin, u, v })
    }

    pub fn project(&self, p: Vector) -> Point2 {
        let r = p - self.origin;
        (r.dot(self.u), r.dot(self.v))
    }

    pub fn unproject(&self, (x, y): Point2) -> Vector {
        self.origin + self.u * x + self.v * y
    }
}

/// Area vector of a (possibly non-planar) polygon. Points along the right-hand normal.
pub fn area_vector(points: &[Vector]) -> Vector {
    match points.len() {
        0..=2 => Vector::ZERO,
        n => {
            let c = points.iter().copied().sum::<Vector>() / n as f64;
            (0..n)
                .map(|i| (points[i] - c).cross(points[(i + 1) % n] - c))
                .sum::<Vector>()
                * 0.5
        }
    }
}

/// Area-weighted centroid via a triangle fan about the vertex average.
pub fn centre(points: &[Vector]) -> Vector {
    let n = points.len();
    if n == 0 {
        return Vector::ZERO;
    }
    let c = points.iter().copied().sum::<Vector>() / n as f64;
    if n < 3 {
        return c;
    }
    let sa = area_vector(points);
    let Some(nhat) = sa.normalized() else {
        return c;
    };
    let mut weighted = Vector::ZERO;
    let mut total = 0.0;
    for i in 0..n {
        let (a, b) = (points[i], points[(i + 1) % n]);
        let tri = (a - c).cross(b - c).dot(nhat) * 0.5;
        weighted += (a + b + c) / 3.0 * tri;
        total += tri;
    }
    if total.abs() > f64::MIN_POSITIVE { weighted / total } else { c }
}

/// Signed area of a 2-D ring (positive when counter-clockwise).
pub fn signed_area_2d(ring: &[Point2]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    0.5 * (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a.0 * b.1 - b.0 * a.1
        })
        .sum::<f64>()
}

/// Ensure counter-clockwise winding.
pub fn make_ccw(ring: &mut [Point2]) {
    if signed_area_2d(ring) < 0.0 {
        ring.reverse();
    }
}

fn is_inside_edge(p: Point2, a: Point2, b: Point2) -> bool {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0) >= -EDGE_TOL
}

fn line_intersection(p1: Point2, p2: Point2, p3: Point2, p4: Point2) -> Option<Point2> {
    let d1 = (p2.0 - p1.0, p2.1 - p1.1);
    let d2 = (p4.0 - p3.0, p4.1 - p3.1);
    let cross = d1.0 * d2.1 - d1.1 * d2.0;
    if cross.abs() < EDGE_TOL {
        return None;
    }
    let t = ((p3.0 - p1.0) * d2.1 - (p3.1 - p1.1) * d2.0) / cross;
    let t = t.clamp(0.0, 1.0);
    Some((p1.0 + t * d1.0, p1.1 + t * d1.1))
}

/// Sutherland-Hodgman clip of `subject` against the convex CCW polygon `clip`.
pub fn clip_convex(subject: &[Point2], clip: &[Point2]) -> Vec<Point2> {
    let mut output = subject.to_vec();
    for i in 0..clip.len() {
        if output.is_empty() {
            break;
        }
        let (a, b) = (clip[i], clip[(i + 1) % clip.len()]);
        let input = std::mem::take(&mut output);
        for j in 0..input.len() {
            let cur = input[j];
            let prev = input[(j + input.len() - 1) % input.len()];
            let cur_in = is_inside_edge(cur, a, b);
            let prev_in = is_inside_edge(prev, a, b);
            if cur_in {
                if !prev_in {
                    output.extend(line_intersection(prev, cur, a, b));
                }
                output.push(cur);
            } else if prev_in {
                output.extend(line_intersection(prev, cur, a, b));
            }
        }
    }
    output
}

/// Area of the intersection of two faces after projection onto the plane of `basis`.
///
/// `clip_face` is split into a triangle fan about its vertex average so that
/// star-shaped faces clip correctly.
pub fn overlap_area(basis: &PlaneBasis, subject_face: &[Vector], clip_face: &[Vector]) -> f64 {
    if subject_face.len() < 3 || clip_face.len() < 3 {
        return 0.0;
    }
    let mut subject: Vec<Point2> = subject_face.iter().map(|&p| basis.project(p)).collect();
    make_ccw(&mut subject);
    let clip: Vec<Point2> = clip_face.iter().map(|&p| basis.project(p)).collect();
    let n = clip.len() as f64;
    let c = clip
        .iter()
        .fold((0.0, 0.0), |acc, p| (acc.0 + p.0 / n, acc.1 + p.1 / n));

    let mut area = 0.0;
    for i in 0..clip.len() {
        let mut tri = [clip[i], clip[(i + 1) % clip.len()], c];
        if signed_area_2d(&tri).abs() <= EDGE_TOL {
            continue;
        }
        make_ccw(&mut tri);
        area += signed_area_2d(&clip_convex(&subject, &tri)).abs();
    }
    area
}

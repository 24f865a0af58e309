use crate::primitives::Vector;

/// Axis-aligned bounding box used to prune AMI candidate pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundBox {
    pub min: Vector,
    pub max: Vector,
}

impl BoundBox {
    /// Box around `points`; `None` when empty.
    pub fn from_points<I: IntoIterator<Item = Vector>>(points: I) -> Option<Self> {
        let mut it = points.into_iter();
        let first = it.next()?;
        Some(it.fold(
            BoundBox {
                min: first,
                max: first,
            },
            |b, p| BoundBox {
                min: b.min.min(p),
                max: b.max.max(p),
            },
        ))
    }

    pub fn span(&self) -> Vector {
        self.max - self.min
    }

    /// Grow in every direction by `rel` times the diagonal plus `abs`.
    pub fn inflate(&self, rel: f64, abs: f64) -> BoundBox {
        let d = self.span().mag() * rel + abs;
        let pad = Vector::new(d, d, d);
        BoundBox {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    pub fn overlaps(&self, other: &BoundBox) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
            && self.min.z <= other.max.z
            && other.min.z <= self.max.z
    }
}

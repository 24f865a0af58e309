//! Frame transforms between the two sides of a coupled pair.
//!
//! A descriptor maps quantities expressed in the *neighbour's* frame into this
//! patch's frame. `forward` rotates neighbour vectors into this frame and
//! `reverse` is its inverse. Positions additionally pick up the rotation centre
//! and the separation vector.

use super::{FieldValue, Tensor, Vector};
use crate::coupling_error::CouplingError;
use serde::{Deserialize, Serialize};

/// Tolerance under which a rotation tensor is treated as the identity.
pub const PARALLEL_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformDescriptor {
    forward: Tensor,
    reverse: Tensor,
    /// Rotation centre for positions.
    centre: Vector,
    /// Translation applied to positions after rotation.
    separation: Vector,
}

impl Default for TransformDescriptor {
    fn default() -> Self {
        Self::identity()
    }
}

impl TransformDescriptor {
    pub const fn identity() -> Self {
        Self {
            forward: Tensor::IDENTITY,
            reverse: Tensor::IDENTITY,
            centre: Vector::ZERO,
            separation: Vector::ZERO,
        }
    }

    /// Pure translation: a neighbour position `p` maps to `p + separation`.
    pub fn translational(separation: Vector) -> Self {
        Self {
            separation,
            ..Self::identity()
        }
    }

    /// Rotation by `angle` radians about `axis` through `centre`.
    pub fn rotational(axis: Vector, centre: Vector, angle: f64) -> Result<Self, CouplingError> {
        let axis = axis.normalized().ok_or_else(|| {
            CouplingError::InvalidConfig("rotation axis must be non-zero".to_owned())
        })?;
        let forward = Tensor::rotation(axis, angle);
        Ok(Self {
            forward,
            reverse: forward.transpose(),
            centre,
            separation: Vector::ZERO,
        })
    }

    /// Build from an explicit forward tensor, which must be orthogonal.
    pub fn from_tensor(forward: Tensor, centre: Vector, separation: Vector) -> Result<Self, CouplingError> {
        let reverse = forward.transpose();
        if !(forward * reverse).is_identity(1e-9) {
            return Err(CouplingError::InvalidConfig(
                "transform tensor is not orthogonal".to_owned(),
            ));
        }
        Ok(Self {
            forward,
            reverse,
            centre,
            separation,
        })
    }

    /// The descriptor the other side of the pair uses.
    pub fn inverse(&self) -> Self {
        Self {
            forward: self.reverse,
            reverse: self.forward,
            centre: self.centre,
            separation: -self.reverse.dot_vector(self.separation),
        }
    }

    pub fn forward_t(&self) -> &Tensor {
        &self.forward
    }

    pub fn reverse_t(&self) -> &Tensor {
        &self.reverse
    }

    pub fn separation(&self) -> Vector {
        self.separation
    }

    /// True when no rotation is involved.
    pub fn parallel(&self) -> bool {
        self.forward.is_identity(PARALLEL_TOLERANCE)
    }

    pub fn separated(&self) -> bool {
        self.separation.mag_sqr() > 0.0
    }

    /// Whether values of type `T` need rotating when crossing this interface.
    pub fn do_transform<T: FieldValue>(&self) -> bool {
        T::RANK > 0 && !self.parallel()
    }

    /// Rotate a neighbour-frame value into this frame.
    pub fn transform<T: FieldValue>(&self, v: T) -> T {
        if self.do_transform::<T>() { v.transform(&self.forward) } else { v }
    }

    pub fn transform_field<T: FieldValue>(&self, values: &mut [T]) {
        if self.do_transform::<T>() {
            values.iter_mut().for_each(|v| *v = v.transform(&self.forward));
        }
    }

    /// Map a neighbour-frame position into this frame.
    pub fn transform_position(&self, p: Vector) -> Vector {
        self.forward.dot_vector(p - self.centre) + self.centre + self.separation
    }

    /// Per-component scaling applied to neighbour coefficients in a segregated solve:
    /// `diag(forward)[cmpt]^rank`.
    pub fn couple_factor(&self, cmpt: usize, rank: u32) -> f64 {
        if rank == 0 || self.parallel() {
            1.0
        } else {
            self.forward.diag()[cmpt % 3].powi(rank as i32)
        }
    }

    pub fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.forward.max_abs_diff(&other.forward) <= tol
            && self.centre.approx_eq(other.centre, tol)
            && self.separation.approx_eq(other.separation, tol)
    }
}

//! Value types a patch field can carry.

use super::{Tensor, Vector};
use bytemuck::Pod;
use num_traits::Zero;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// A field value that can be exchanged, interpolated and rotated.
///
/// Every implementor is a flat run of `f64` components, so the wire layout is
/// `bytemuck`'s view of the slice.
pub trait FieldValue:
    Pod
    + Zero
    + Default
    + PartialEq
    + Debug
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + Mul<f64, Output = Self>
    + AddAssign
    + 'static
{
    /// Tensor rank: 0 scalar, 1 vector, 2 tensor.
    const RANK: u32;
    const N_COMPONENTS: usize;

    fn component(&self, i: usize) -> f64;
    fn set_component(&mut self, i: usize, v: f64);

    /// Apply the rotation `t` to this value. Scalars are invariant.
    fn transform(&self, t: &Tensor) -> Self;

    fn from_components(c: &[f64]) -> Self {
        let mut v = Self::zero();
        for (i, &x) in c.iter().enumerate().take(Self::N_COMPONENTS) {
            v.set_component(i, x);
        }
        v
    }

    /// Largest absolute component, used for tolerance checks.
    fn max_abs(&self) -> f64 {
        (0..Self::N_COMPONENTS)
            .map(|i| self.component(i).abs())
            .fold(0.0, f64::max)
    }
}

impl FieldValue for f64 {
    const RANK: u32 = 0;
    const N_COMPONENTS: usize = 1;

    fn component(&self, _i: usize) -> f64 {
        *self
    }
    fn set_component(&mut self, _i: usize, v: f64) {
        *self = v;
    }
    fn transform(&self, _t: &Tensor) -> Self {
        *self
    }
}

impl FieldValue for Vector {
    const RANK: u32 = 1;
    const N_COMPONENTS: usize = 3;

    fn component(&self, i: usize) -> f64 {
        self[i]
    }
    fn set_component(&mut self, i: usize, v: f64) {
        *self.component_mut(i) = v;
    }
    fn transform(&self, t: &Tensor) -> Self {
        t.dot_vector(*self)
    }
}

impl FieldValue for Tensor {
    const RANK: u32 = 2;
    const N_COMPONENTS: usize = 9;

    fn component(&self, i: usize) -> f64 {
        Tensor::component(self, i)
    }
    fn set_component(&mut self, i: usize, v: f64) {
        *self.component_mut(i) = v;
    }
    /// `T . A . T^T`
    fn transform(&self, t: &Tensor) -> Self {
        *t * *self * t.transpose()
    }
}

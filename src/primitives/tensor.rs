//! Second-rank 3x3 tensor, stored row-major.

use super::vector::Vector;
use bytemuck::{Pod, Zeroable};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Tensor {
    pub rows: [[f64; 3]; 3],
}

const_assert_eq!(std::mem::size_of::<Tensor>(), 72);

impl Tensor {
    pub const ZERO: Tensor = Tensor { rows: [[0.0; 3]; 3] };
    pub const IDENTITY: Tensor = Tensor {
        rows: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    pub const fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        Self { rows }
    }

    /// Rotation by `angle` radians about the unit `axis` (Rodrigues form
    /// `I + sin(phi) W + 2 sin^2(phi/2) W^2`, with `W` the cross-product matrix of the axis).
    pub fn rotation(axis: Vector, angle: f64) -> Tensor {
        let u = axis;
        let w = Tensor::from_rows([[0.0, -u.z, u.y], [u.z, 0.0, -u.x], [-u.y, u.x, 0.0]]);
        Tensor::IDENTITY + w * angle.sin() + (w * w) * (2.0 * (angle / 2.0).sin().powi(2))
    }

    pub fn transpose(&self) -> Tensor {
        let r = &self.rows;
        Tensor::from_rows([
            [r[0][0], r[1][0], r[2][0]],
            [r[0][1], r[1][1], r[2][1]],
            [r[0][2], r[1][2], r[2][2]],
        ])
    }

    pub fn det(&self) -> f64 {
        let r = &self.rows;
        r[0][0] * (r[1][1] * r[2][2] - r[1][2] * r[2][1])
            - r[0][1] * (r[1][0] * r[2][2] - r[1][2] * r[2][0])
            + r[0][2] * (r[1][0] * r[2][1] - r[1][1] * r[2][0])
    }

    pub fn diag(&self) -> Vector {
        Vector::new(self.rows[0][0], self.rows[1][1], self.rows[2][2])
    }

    /// `T . v`
    pub fn dot_vector(&self, v: Vector) -> Vector {
        let r = &self.rows;
        Vector::new(
            r[0][0] * v.x + r[0][1] * v.y + r[0][2] * v.z,
            r[1][0] * v.x + r[1][1] * v.y + r[1][2] * v.z,
            r[2][0] * v.x + r[2][1] * v.y + r[2][2] * v.z,
        )
    }

    /// Largest absolute component difference from `other`.
    pub fn max_abs_diff(&self, other: &Tensor) -> f64 {
        self.rows
            .iter()
            .flatten()
            .zip(other.rows.iter().flatten())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    pub fn is_identity(&self, tol: f64) -> bool {
        self.max_abs_diff(&Tensor::IDENTITY) <= tol
    }

    pub fn component(&self, i: usize) -> f64 {
        self.rows[i / 3][i % 3]
    }

    pub fn component_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.rows[i / 3][i % 3]
    }
}

impl Mul for Tensor {
    type Output = Tensor;
    fn mul(self, o: Tensor) -> Tensor {
        let mut out = Tensor::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                out.rows[i][j] = (0..3).map(|k| self.rows[i][k] * o.rows[k][j]).sum();
            }
        }
        out
    }
}

impl Mul<Vector> for Tensor {
    type Output = Vector;
    fn mul(self, v: Vector) -> Vector {
        self.dot_vector(v)
    }
}

impl Mul<f64> for Tensor {
    type Output = Tensor;
    fn mul(mut self, s: f64) -> Tensor {
        self.rows.iter_mut().flatten().for_each(|c| *c *= s);
        self
    }
}

impl Add for Tensor {
    type Output = Tensor;
    fn add(mut self, o: Tensor) -> Tensor {
        self.rows
            .iter_mut()
            .flatten()
            .zip(o.rows.iter().flatten())
            .for_each(|(a, b)| *a += b);
        self
    }
}

impl Sub for Tensor {
    type Output = Tensor;
    fn sub(self, o: Tensor) -> Tensor {
        self + (-o)
    }
}

impl Neg for Tensor {
    type Output = Tensor;
    fn neg(self) -> Tensor {
        self * -1.0
    }
}

impl AddAssign for Tensor {
    fn add_assign(&mut self, o: Tensor) {
        *self = *self + o;
    }
}

impl Zero for Tensor {
    fn zero() -> Self {
        Tensor::ZERO
    }
    fn is_zero(&self) -> bool {
        *self == Tensor::ZERO
    }
}

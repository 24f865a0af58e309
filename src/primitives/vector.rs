//! Three-component vector with a fixed `#[repr(C)]` layout.

use bytemuck::{Pod, Zeroable};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;
use std::ops::{Add, AddAssign, Div, Index, Mul, Neg, Sub, SubAssign};

/// Cartesian vector. Also the on-the-wire layout for vector fields.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

const_assert_eq!(std::mem::size_of::<Vector>(), 24);

impl Vector {
    pub const ZERO: Vector = Vector::new(0.0, 0.0, 0.0);
    pub const X: Vector = Vector::new(1.0, 0.0, 0.0);
    pub const Y: Vector = Vector::new(0.0, 1.0, 0.0);
    pub const Z: Vector = Vector::new(0.0, 0.0, 1.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn dot(self, o: Vector) -> f64 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    #[inline]
    pub fn cross(self, o: Vector) -> Vector {
        Vector::new(
            self.y * o.z - self.z * o.y,
            self.z * o.x - self.x * o.z,
            self.x * o.y - self.y * o.x,
        )
    }

    #[inline]
    pub fn mag_sqr(self) -> f64 {
        self.dot(self)
    }

    #[inline]
    pub fn mag(self) -> f64 {
        self.mag_sqr().sqrt()
    }

    /// Unit vector, or `None` for a (near) zero vector.
    pub fn normalized(self) -> Option<Vector> {
        let m = self.mag();
        if m > f64::EPSILON { Some(self / m) } else { None }
    }

    pub fn min(self, o: Vector) -> Vector {
        Vector::new(self.x.min(o.x), self.y.min(o.y), self.z.min(o.z))
    }

    pub fn max(self, o: Vector) -> Vector {
        Vector::new(self.x.max(o.x), self.y.max(o.y), self.z.max(o.z))
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn component_mut(&mut self, i: usize) -> &mut f64 {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("vector component {i} out of range"),
        }
    }

    pub fn approx_eq(self, o: Vector, tol: f64) -> bool {
        (self - o).mag() <= tol
    }
}

impl Index<usize> for Vector {
    type Output = f64;
    fn index(&self, i: usize) -> &f64 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("vector component {i} out of range"),
        }
    }
}

impl Add for Vector {
    type Output = Vector;
    fn add(self, o: Vector) -> Vector {
        Vector::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl Sub for Vector {
    type Output = Vector;
    fn sub(self, o: Vector) -> Vector {
        Vector::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl Neg for Vector {
    type Output = Vector;
    fn neg(self) -> Vector {
        Vector::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f64> for Vector {
    type Output = Vector;
    fn mul(self, s: f64) -> Vector {
        Vector::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Mul<Vector> for f64 {
    type Output = Vector;
    fn mul(self, v: Vector) -> Vector {
        v * self
    }
}

impl Div<f64> for Vector {
    type Output = Vector;
    fn div(self, s: f64) -> Vector {
        Vector::new(self.x / s, self.y / s, self.z / s)
    }
}

impl AddAssign for Vector {
    fn add_assign(&mut self, o: Vector) {
        *self = *self + o;
    }
}

impl SubAssign for Vector {
    fn sub_assign(&mut self, o: Vector) {
        *self = *self - o;
    }
}

impl Zero for Vector {
    fn zero() -> Self {
        Vector::ZERO
    }
    fn is_zero(&self) -> bool {
        *self == Vector::ZERO
    }
}

impl std::iter::Sum for Vector {
    fn sum<I: Iterator<Item = Vector>>(iter: I) -> Vector {
        iter.fold(Vector::ZERO, |a, b| a + b)
    }
}

impl From<[f64; 3]> for Vector {
    fn from(a: [f64; 3]) -> Self {
        Vector::new(a[0], a[1], a[2])
    }
}

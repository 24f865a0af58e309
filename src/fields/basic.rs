//! Uncoupled patch fields. They serve as ACMI non-overlap fields and as the
//! value-fixing reference for a solve.

use crate::coupling_error::{CouplingError, check_len};
use crate::mesh::PatchGeometry;
use crate::primitives::FieldValue;

#[derive(Debug, Clone, PartialEq)]
pub enum BasicPatchField<T> {
    /// Face values are prescribed.
    FixedValue(Vec<T>),
    /// Face values copy the owner cell values.
    ZeroGradient(Vec<T>),
    /// Face values are set by the caller and never evaluated.
    Calculated(Vec<T>),
}

impl<T: FieldValue> BasicPatchField<T> {
    pub fn fixed_value(values: Vec<T>) -> Self {
        BasicPatchField::FixedValue(values)
    }

    pub fn uniform_fixed_value(value: T, size: usize) -> Self {
        BasicPatchField::FixedValue(vec![value; size])
    }

    pub fn zero_gradient(size: usize) -> Self {
        BasicPatchField::ZeroGradient(vec![T::zero(); size])
    }

    pub fn calculated(values: Vec<T>) -> Self {
        BasicPatchField::Calculated(values)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            BasicPatchField::FixedValue(_) => "fixedValue",
            BasicPatchField::ZeroGradient(_) => "zeroGradient",
            BasicPatchField::Calculated(_) => "calculated",
        }
    }

    pub fn values(&self) -> &[T] {
        match self {
            BasicPatchField::FixedValue(v) | BasicPatchField::ZeroGradient(v) | BasicPatchField::Calculated(v) => v,
        }
    }

    pub fn fixes_value(&self) -> bool {
        matches!(self, BasicPatchField::FixedValue(_))
    }

    pub fn evaluate(&mut self, geometry: &PatchGeometry, internal: &[T]) -> Result<(), CouplingError> {
        check_len(geometry.name(), geometry.size(), self.values().len())?;
        if let BasicPatchField::ZeroGradient(v) = self {
            *v = geometry.patch_internal_field(internal)?;
        }
        Ok(())
    }

    /// Face-normal gradient, `(value - owner) / (nf . d)`.
    pub fn sn_grad(&self, geometry: &PatchGeometry, internal: &[T]) -> Result<Vec<T>, CouplingError> {
        match self {
            BasicPatchField::ZeroGradient(v) => Ok(vec![T::zero(); v.len()]),
            BasicPatchField::FixedValue(v) | BasicPatchField::Calculated(v) => {
                let pif = geometry.patch_internal_field(internal)?;
                Ok(v.iter()
                    .zip(pif)
                    .zip(geometry.normal_deltas())
                    .map(|((&b, i), d)| if d.abs() > f64::MIN_POSITIVE { (b - i) * (1.0 / d) } else { T::zero() })
                    .collect())
            }
        }
    }
}

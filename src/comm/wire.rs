//! Byte layout of field values on the wire.
//!
//! Full precision sends the `bytemuck` view of the slice. Float transfer sends
//! every component as `f32` and widens on receipt; both sides of a pair must
//! agree on the mode.

use crate::coupling_error::CouplingError;
use crate::primitives::FieldValue;
use bytes::Bytes;

/// Bytes per value on the wire.
pub fn value_size<T: FieldValue>(float_transfer: bool) -> usize {
    if float_transfer {
        T::N_COMPONENTS * std::mem::size_of::<f32>()
    } else {
        std::mem::size_of::<T>()
    }
}

pub fn encode<T: FieldValue>(values: &[T], float_transfer: bool) -> Bytes {
    if float_transfer {
        let narrow: Vec<f32> = values
            .iter()
            .flat_map(|v| (0..T::N_COMPONENTS).map(move |i| v.component(i) as f32))
            .collect();
        Bytes::copy_from_slice(bytemuck::cast_slice(&narrow))
    } else {
        Bytes::copy_from_slice(bytemuck::cast_slice(values))
    }
}

/// Decode exactly `expected` values, or fail with a size mismatch naming `patch`.
pub fn decode<T: FieldValue>(
    raw: &[u8],
    expected: usize,
    float_transfer: bool,
    patch: &str,
) -> Result<Vec<T>, CouplingError> {
    let width = value_size::<T>(float_transfer);
    if raw.len() != expected * width {
        return Err(CouplingError::BufferSizeMismatch {
            patch: patch.to_owned(),
            field: String::new(),
            expected,
            received: raw.len() / width,
        });
    }
    if float_transfer {
        let mut narrow = vec![0f32; expected * T::N_COMPONENTS];
        bytemuck::cast_slice_mut::<f32, u8>(&mut narrow).copy_from_slice(raw);
        Ok(narrow
            .chunks_exact(T::N_COMPONENTS)
            .map(|c| {
                let wide: Vec<f64> = c.iter().map(|&x| f64::from(x)).collect();
                T::from_components(&wide)
            })
            .collect())
    } else {
        let mut out = vec![T::zeroed(); expected];
        bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(raw);
        Ok(out)
    }
}

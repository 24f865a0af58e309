//! Value types: vectors, tensors, the [`FieldValue`] trait and frame transforms.

pub mod field_value;
pub mod tensor;
pub mod transform;
pub mod vector;

pub use field_value::FieldValue;
pub use tensor::Tensor;
pub use transform::TransformDescriptor;
pub use vector::Vector;

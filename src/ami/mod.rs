//! Arbitrary mesh interface: weighted mapping between non-conformal patches.

pub mod interpolation;
pub mod method;
pub mod weights;

pub use interpolation::{AmiInterpolation, AmiReport};
pub use method::AmiMethod;
pub use weights::{AmiSide, AmiWeights};

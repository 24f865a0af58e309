//! Patch fields: uncoupled, coupled, and the boundary field that drives them.

pub mod basic;
pub mod boundary;
pub mod coupled;

pub use basic::BasicPatchField;
pub use boundary::{BoundaryField, ExchangeOptions, InterfaceUpdate, PatchField};
pub use coupled::{CoupledPatchField, CouplingInputs, InterfaceInputs, Jump, NonOverlap, UpdateState};

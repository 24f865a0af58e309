//! Computational geometry for patch faces.

pub mod bound_box;
pub mod polygon;

pub use bound_box::BoundBox;
pub use polygon::{PlaneBasis, area_vector, centre, overlap_area};

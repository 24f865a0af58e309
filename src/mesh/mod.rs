//! Boundary mesh: patch geometry, patch definitions and the assembled boundary.

pub mod boundary_mesh;
pub mod patch_def;
pub mod patch_geometry;

pub use boundary_mesh::BoundaryMesh;
pub use patch_def::{CouplingSpec, PatchDef, PatchKind, ProcessorSpec};
pub use patch_geometry::PatchGeometry;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a patch within its [`BoundaryMesh`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchId(pub usize);

impl PatchId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

use super::interface::PatchInterface;
use crate::mesh::{PatchGeometry, PatchId, PatchKind};
use std::sync::Arc;

/// An uncoupled patch (`patch` or `wall`).
#[derive(Debug, Clone)]
pub struct GenericPatch {
    id: PatchId,
    kind: PatchKind,
    geometry: Arc<PatchGeometry>,
}

impl GenericPatch {
    pub fn new(id: PatchId, kind: PatchKind, geometry: Arc<PatchGeometry>) -> Self {
        Self { id, kind, geometry }
    }

    pub(crate) fn update_geometry(&mut self, geometries: &[Arc<PatchGeometry>]) {
        self.geometry = geometries[self.id.index()].clone();
    }
}

impl PatchInterface for GenericPatch {
    fn id(&self) -> PatchId {
        self.id
    }
    fn kind(&self) -> PatchKind {
        self.kind
    }
    fn geometry(&self) -> &PatchGeometry {
        &self.geometry
    }
}

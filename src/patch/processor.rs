//! Processor and processor-cyclic patches: the two sides of a coupled
//! interface live on different ranks.
//!
//! A processor patch composes a [`ProcessorTransfer`] (how data moves) with a
//! [`TransformDescriptor`] (how it is rotated). Plain processor patches carry
//! the identity; processor-cyclic patches carry the transform of the cyclic
//! patch they were split from.

use super::interface::{Capabilities, CoupledPatch, PatchInterface, distance_weights};
use crate::comm::{CommsType, Communicator, PendingTransfer, ProcessorTransfer};
use crate::coupling_error::CouplingError;
use crate::mesh::{PatchGeometry, PatchId, PatchKind, ProcessorSpec};
use crate::primitives::{FieldValue, TransformDescriptor, Vector};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Face data of the remote side, in the remote frame.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighbourGeometry {
    pub face_centres: Vec<Vector>,
    pub face_areas: Vec<Vector>,
    pub cell_centres: Vec<Vector>,
}

impl NeighbourGeometry {
    fn normal_deltas(&self) -> Vec<f64> {
        self.face_areas
            .iter()
            .zip(&self.face_centres)
            .zip(&self.cell_centres)
            .map(|((sf, &cf), &cc)| sf.normalized().unwrap_or(Vector::ZERO).dot(cf - cc))
            .collect()
    }
}

/// What a processor patch knows about its remote side.
#[derive(Debug, Clone, PartialEq)]
enum Neighbour {
    /// Not exchanged yet, or dropped by mesh motion.
    Missing,
    /// Serial run: the remote rank does not take part.
    Serial,
    Known(NeighbourGeometry),
}

#[derive(Debug)]
pub struct ProcessorPatch {
    id: PatchId,
    geometry: Arc<PatchGeometry>,
    transfer: ProcessorTransfer,
    /// Full-precision channel for geometry, independent of float transfer.
    geometry_transfer: ProcessorTransfer,
    transform: TransformDescriptor,
    referred_patch: Option<String>,
    neighb_patch: PatchId,
    neighbour: Neighbour,
    weights: OnceCell<Vec<f64>>,
}

impl ProcessorPatch {
    pub fn new(id: PatchId, geometry: Arc<PatchGeometry>, spec: &ProcessorSpec, float_transfer: bool) -> Self {
        let name = geometry.name().to_owned();
        Self {
            id,
            transfer: ProcessorTransfer::new(
                name.clone(),
                spec.my_rank,
                spec.neighb_rank,
                spec.tag,
                float_transfer,
            ),
            geometry_transfer: ProcessorTransfer::new(
                name,
                spec.my_rank,
                spec.neighb_rank,
                spec.tag,
                false,
            ),
            geometry,
            transform: spec.transform,
            referred_patch: spec.referred_patch.clone(),
            neighb_patch: spec.neighb_patch,
            neighbour: Neighbour::Missing,
            weights: OnceCell::new(),
        }
    }

    pub fn transfer(&self) -> &ProcessorTransfer {
        &self.transfer
    }

    pub fn my_rank(&self) -> usize {
        self.transfer.my_rank()
    }

    pub fn neighb_rank(&self) -> usize {
        self.transfer.neighb_rank()
    }

    /// Lower rank of the pair owns it.
    pub fn is_owner(&self) -> bool {
        self.my_rank() < self.neighb_rank()
    }

    pub fn referred_patch(&self) -> Option<&str> {
        self.referred_patch.as_deref()
    }

    /// Remote geometry has been exchanged; weights and deltas use it.
    pub fn parallel_run(&self) -> bool {
        matches!(self.neighbour, Neighbour::Known(_))
    }

    pub fn neighbour_geometry(&self) -> Option<&NeighbourGeometry> {
        match &self.neighbour {
            Neighbour::Known(g) => Some(g),
            Neighbour::Missing | Neighbour::Serial => None,
        }
    }

    /// No remote side in this run: weights fall back to `1.0` and deltas to
    /// the owner face-to-cell vectors.
    pub fn mark_serial(&mut self) {
        self.neighbour = Neighbour::Serial;
        self.weights = OnceCell::new();
    }

    /// Install the remote side's geometry directly, in the remote frame.
    pub fn set_neighbour_geometry(&mut self, nbr: NeighbourGeometry) -> Result<(), CouplingError> {
        let n = self.size();
        for (what, len) in [
            ("face centres", nbr.face_centres.len()),
            ("face areas", nbr.face_areas.len()),
            ("cell centres", nbr.cell_centres.len()),
        ] {
            if len != n {
                return Err(CouplingError::geometry(
                    self.name(),
                    format!("neighbour {what}: {len} entries for {n} faces"),
                ));
            }
        }
        self.neighbour = Neighbour::Known(nbr);
        self.weights = OnceCell::new();
        Ok(())
    }

    /// Post this side's face centres, area vectors and cell centres.
    pub fn init_geometry_exchange<C: Communicator>(
        &self,
        comm: &C,
    ) -> Result<PendingTransfer<C>, CouplingError> {
        let g = &self.geometry;
        let packed: Vec<Vector> = g
            .face_centres()
            .iter()
            .chain(g.face_areas())
            .chain(g.cell_centres())
            .copied()
            .collect();
        self.geometry_transfer
            .init_send(comm, &packed, CommsType::NonBlocking)
    }

    /// Receive and store the neighbour's geometry.
    pub fn finish_geometry_exchange<C: Communicator>(
        &mut self,
        comm: &C,
        pending: PendingTransfer<C>,
    ) -> Result<(), CouplingError> {
        let n = self.geometry.size();
        let mut packed: Vec<Vector> = self
            .geometry_transfer
            .receive(comm, Some(pending), 3 * n)
            .map_err(|e| e.with_field("geometry"))?;
        let cell_centres = packed.split_off(2 * n);
        let face_areas = packed.split_off(n);
        self.set_neighbour_geometry(NeighbourGeometry {
            face_centres: packed,
            face_areas,
            cell_centres,
        })?;
        log::debug!(
            "[{}] neighbour geometry received from rank {}",
            self.name(),
            self.neighb_rank()
        );
        Ok(())
    }

    /// Blocking geometry exchange for this patch alone. A serial
    /// communicator marks the patch serial instead.
    pub fn exchange_geometry<C: Communicator>(&mut self, comm: &C) -> Result<(), CouplingError> {
        if !comm.is_parallel() {
            self.mark_serial();
            return Ok(());
        }
        let pending = self.init_geometry_exchange(comm)?;
        self.finish_geometry_exchange(comm, pending)
    }

    /// Post the patch-internal values of `internal`.
    pub fn init_send<C, T>(
        &self,
        comm: &C,
        internal: &[T],
        comms_type: CommsType,
    ) -> Result<PendingTransfer<C>, CouplingError>
    where
        C: Communicator,
        T: FieldValue,
    {
        let values = self.geometry.patch_internal_field(internal)?;
        self.transfer.init_send(comm, &values, comms_type)
    }

    /// Receive the neighbour's patch-internal values, rotated into this frame.
    pub fn receive<C, T>(
        &self,
        comm: &C,
        pending: Option<PendingTransfer<C>>,
    ) -> Result<Vec<T>, CouplingError>
    where
        C: Communicator,
        T: FieldValue,
    {
        let mut values = self.transfer.receive(comm, pending, self.size())?;
        self.transform.transform_field(&mut values);
        Ok(values)
    }

    pub(crate) fn update_geometry(&mut self, geometries: &[Arc<PatchGeometry>]) {
        self.geometry = geometries[self.id.index()].clone();
        if let Neighbour::Known(_) = self.neighbour {
            self.neighbour = Neighbour::Missing;
        }
        self.weights = OnceCell::new();
    }
}

impl PatchInterface for ProcessorPatch {
    fn id(&self) -> PatchId {
        self.id
    }

    fn kind(&self) -> PatchKind {
        if self.referred_patch.is_some() {
            PatchKind::ProcessorCyclic
        } else {
            PatchKind::Processor
        }
    }

    fn geometry(&self) -> &PatchGeometry {
        &self.geometry
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    /// Id of the partner in the neighbour rank's boundary mesh.
    fn neighbour_patch_id(&self) -> Result<PatchId, CouplingError> {
        Ok(self.neighb_patch)
    }
}

impl CoupledPatch for ProcessorPatch {
    fn transform(&self) -> &TransformDescriptor {
        &self.transform
    }

    fn owner(&self) -> bool {
        self.is_owner()
    }

    /// `1.0` everywhere in a serial run.
    fn weights(&self) -> Result<&[f64], CouplingError> {
        self.weights
            .get_or_try_init(|| match &self.neighbour {
                Neighbour::Missing => Err(CouplingError::MissingNeighbourGeometry(self.name().to_owned())),
                Neighbour::Serial => Ok(vec![1.0; self.size()]),
                Neighbour::Known(nbr) => Ok(distance_weights(
                    &self.geometry.normal_deltas(),
                    &nbr.normal_deltas(),
                )),
            })
            .map(Vec::as_slice)
    }

    fn delta(&self) -> Result<Vec<Vector>, CouplingError> {
        let own = self.geometry.delta();
        let nbr = match &self.neighbour {
            Neighbour::Missing => return Err(CouplingError::MissingNeighbourGeometry(self.name().to_owned())),
            Neighbour::Serial => return Ok(own),
            Neighbour::Known(nbr) => nbr,
        };
        Ok(own
            .into_iter()
            .zip(nbr.face_centres.iter().zip(&nbr.cell_centres))
            .map(|(d, (&cf, &cc))| d - self.transform.forward_t().dot_vector(cf - cc))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{CommTag, LocalComm, NoComm};

    /// Face at x = 0 between a cell centred at x = -0.5 (rank 0) and x = +1.5 (rank 1).
    fn side(rank: usize) -> Arc<PatchGeometry> {
        let (normal, cell) = if rank == 0 {
            (Vector::X, Vector::new(-0.5, 0.0, 0.0))
        } else {
            (-Vector::X, Vector::new(1.5, 0.0, 0.0))
        };
        Arc::new(
            PatchGeometry::from_centroids(
                format!("procBoundary{rank}to{}", 1 - rank),
                vec![Vector::ZERO],
                vec![normal],
                vec![0],
                vec![cell],
            )
            .unwrap(),
        )
    }

    fn patch(rank: usize) -> ProcessorPatch {
        let spec = ProcessorSpec::new(rank, 1 - rank, PatchId(3), CommTag::new(4));
        ProcessorPatch::new(PatchId(0), side(rank), &spec, false)
    }

    #[test]
    fn geometry_is_required_before_weights() {
        let mut p = patch(0);
        assert!(matches!(p.weights(), Err(CouplingError::MissingNeighbourGeometry(n)) if n == "procBoundary0to1"));
        assert!(matches!(p.delta(), Err(CouplingError::MissingNeighbourGeometry(_))));
        assert_eq!(p.neighbour_patch_id().unwrap(), PatchId(3));

        p.exchange_geometry(&NoComm).unwrap();
        assert!(!p.parallel_run());
        assert_eq!(p.weights().unwrap(), &[1.0]);
        assert_eq!(p.delta().unwrap(), vec![Vector::new(0.5, 0.0, 0.0)]);
    }

    #[test]
    fn neighbour_geometry_can_be_given_directly() {
        let mut p = patch(0);
        let nbr = NeighbourGeometry {
            face_centres: vec![Vector::ZERO],
            face_areas: vec![-Vector::X],
            cell_centres: vec![Vector::new(1.5, 0.0, 0.0)],
        };
        let short = NeighbourGeometry {
            cell_centres: vec![],
            ..nbr.clone()
        };
        assert!(matches!(
            p.set_neighbour_geometry(short),
            Err(CouplingError::InvalidGeometry { .. })
        ));
        p.set_neighbour_geometry(nbr).unwrap();
        assert!(p.parallel_run());
        assert!((p.weights().unwrap()[0] - 0.75).abs() < 1e-12);
        assert!(p.delta().unwrap()[0].approx_eq(Vector::new(2.0, 0.0, 0.0), 1e-12));

        // motion drops the remote side until it is exchanged again
        p.update_geometry(&[side(0)]);
        assert!(matches!(p.weights(), Err(CouplingError::MissingNeighbourGeometry(_))));
    }

    #[test]
    fn weights_and_delta_after_exchange() {
        let comms = LocalComm::universe(2);
        let results: Vec<(f64, Vector)> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let r = c.rank();
                        let spec = ProcessorSpec::new(r, 1 - r, PatchId(0), CommTag::new(4));
                        let mut p = ProcessorPatch::new(PatchId(0), side(r), &spec, true);
                        p.exchange_geometry(c).unwrap();
                        (p.weights().unwrap()[0], p.delta().unwrap()[0])
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        // own distance 0.5, neighbour 1.5
        assert!((results[0].0 - 0.75).abs() < 1e-12);
        assert!((results[1].0 - 0.25).abs() < 1e-12);
        assert!(results[0].1.approx_eq(Vector::new(2.0, 0.0, 0.0), 1e-12));
        assert!(results[1].1.approx_eq(Vector::new(-2.0, 0.0, 0.0), 1e-12));
    }
}

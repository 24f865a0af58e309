#![allow(dead_code)]
use coupled_patch::comm::communicator::LocalRecvHandle;
use coupled_patch::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Unit-height strip of quads in the plane `z`, cut at `xs`. Face `i` is owned
/// by cell `first_cell + i`, whose centre sits at `z + cell_dz`.
pub fn strip(name: &str, xs: &[f64], z: f64, flip: bool, first_cell: usize, cell_dz: f64) -> PatchGeometry {
    let mut points = Vec::new();
    for &x in xs {
        points.push(Vector::new(x, 0.0, z));
        points.push(Vector::new(x, 1.0, z));
    }
    let faces: Vec<Vec<usize>> = (0..xs.len() - 1)
        .map(|i| {
            let f = vec![2 * i, 2 * i + 2, 2 * i + 3, 2 * i + 1];
            if flip { f.into_iter().rev().collect() } else { f }
        })
        .collect();
    let n = faces.len();
    let cells = (first_cell..first_cell + n).collect();
    let centres = (0..n)
        .map(|i| Vector::new(0.5 * (xs[i] + xs[i + 1]), 0.5, z + cell_dz))
        .collect();
    PatchGeometry::from_polygons(name, points, faces, cells, centres).unwrap()
}

/// `n` faces on the plane x = 0, one cell per face, seen from `rank`.
pub fn processor_faces(name: &str, rank: usize, n: usize) -> PatchGeometry {
    let side = if rank % 2 == 0 { 1.0 } else { -1.0 };
    PatchGeometry::from_centroids(
        name,
        (0..n).map(|i| Vector::new(0.0, i as f64 + 0.5, 0.0)).collect(),
        vec![Vector::X * side; n],
        (0..n).collect(),
        (0..n).map(|i| Vector::new(-0.5 * side, i as f64 + 0.5, 0.0)).collect(),
    )
    .unwrap()
}

/// A processor patch definition from `me` to `nb`, whose partner is the
/// first patch on `nb`.
pub fn processor_def(me: usize, nb: usize, n_faces: usize) -> PatchDef {
    processor_def_to(me, nb, PatchId(0), n_faces)
}

/// A processor patch definition from `me` to patch `nb_patch` on `nb`, tagged per pair.
pub fn processor_def_to(me: usize, nb: usize, nb_patch: PatchId, n_faces: usize) -> PatchDef {
    let tag = CommTag::new(1 + 16 * me.min(nb) as u16 + me.max(nb) as u16);
    let name = format!("procBoundary{me}to{nb}");
    PatchDef::new(
        "processor",
        processor_faces(&name, me, n_faces),
        CouplingSpec::Processor(ProcessorSpec::new(me, nb, nb_patch, tag)),
    )
    .unwrap()
}

/// Run `f` once per rank on scoped threads sharing one in-process mailbox.
pub fn on_ranks<R, F>(n: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&LocalComm) -> R + Sync,
{
    let comms = LocalComm::universe(n);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = comms.iter().map(|c| s.spawn(move || f(c))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Wraps a [`LocalComm`] and counts posted messages.
pub struct CountingComm {
    pub inner: LocalComm,
    pub sends: AtomicUsize,
    pub recvs: AtomicUsize,
}

impl CountingComm {
    pub fn new(inner: LocalComm) -> Self {
        Self {
            inner,
            sends: AtomicUsize::new(0),
            recvs: AtomicUsize::new(0),
        }
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn recvs(&self) -> usize {
        self.recvs.load(Ordering::SeqCst)
    }
}

impl Communicator for CountingComm {
    type SendHandle = ();
    type RecvHandle = LocalRecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.inner.isend(peer, tag, buf)
    }

    fn irecv(&self, peer: usize, tag: u16, expected_len: usize) -> LocalRecvHandle {
        self.recvs.fetch_add(1, Ordering::SeqCst);
        self.inner.irecv(peer, tag, expected_len)
    }

    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-10 * (1.0 + a.abs().max(b.abs()))
}

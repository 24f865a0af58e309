mod util;

use coupled_patch::prelude::*;
use std::f64::consts::FRAC_PI_2;
use util::*;

#[test]
fn ring_of_four_exchanges_in_every_discipline() {
    let results = on_ranks(4, |comm| {
        let me = comm.rank();
        let (next, prev) = ((me + 1) % 4, (me + 3) % 4);
        let mesh = BoundaryMesh::new(
            1,
            // on every rank patch 0 faces the next rank and patch 1 the previous one
            vec![
                processor_def_to(me, next, PatchId(1), 1),
                processor_def_to(me, prev, PatchId(0), 1),
            ],
            CouplingConfig::default(),
        )
        .unwrap();
        let topo = mesh.gather_topology(comm).unwrap();
        assert_eq!(topo.neighbours(me), {
            let mut n = vec![next, prev];
            n.sort_unstable();
            n
        });

        let internal = [10.0 * me as f64];
        let mut bf = BoundaryField::<f64>::new("T", &mesh).unwrap();
        let mut seen = Vec::new();
        for ct in [CommsType::Scheduled, CommsType::NonBlocking, CommsType::Blocking] {
            bf.reset();
            bf.evaluate(&mesh, comm, &internal, ExchangeOptions::new(ct).with_topology(&topo))
                .unwrap();
            seen.push((bf.values(PatchId(0)).unwrap()[0], bf.values(PatchId(1)).unwrap()[0]));
        }
        (next, prev, seen)
    });
    for (next, prev, seen) in results {
        for (to_next, to_prev) in seen {
            assert_eq!(to_next, 10.0 * next as f64);
            assert_eq!(to_prev, 10.0 * prev as f64);
        }
    }
}

#[test]
fn gathered_topology_matches_the_lists() {
    let topos = on_ranks(3, |comm| {
        let me = comm.rank();
        let defs = (0..3)
            .filter(|&q| q != me)
            .map(|q| processor_def_to(me, q, PatchId(if me < q { me } else { me - 1 }), 2))
            .collect();
        let mesh = BoundaryMesh::new(2, defs, CouplingConfig::default()).unwrap();
        mesh.gather_topology(comm).unwrap()
    });
    let expected = ProcessorTopology::from_lists(vec![vec![1, 2], vec![0, 2], vec![0, 1]]).unwrap();
    for t in topos {
        assert_eq!(t, expected);
    }
    let sched = CommSchedule::new(&expected);
    assert_eq!(sched.comms().to_vec(), vec![(0usize, 1usize), (0, 2), (1, 2)]);
    assert_eq!(sched.rounds().iter().map(Vec::len).sum::<usize>(), 3);
}

#[test]
fn scheduled_without_topology_is_a_config_error() {
    let mesh = BoundaryMesh::new(1, vec![processor_def(0, 1, 1)], CouplingConfig::default()).unwrap();
    let mut bf = BoundaryField::<f64>::new("T", &mesh).unwrap();
    let err = bf
        .evaluate(&mesh, &NoComm, &[0.0], ExchangeOptions::new(CommsType::Scheduled))
        .unwrap_err();
    assert!(matches!(err, CouplingError::InvalidConfig(_)));
}

#[test]
fn processor_cyclic_rotates_received_vectors() {
    let t = TransformDescriptor::rotational(Vector::Z, Vector::ZERO, -FRAC_PI_2).unwrap();
    let values = on_ranks(2, |comm| {
        let me = comm.rank();
        let transform = if me == 0 { t } else { t.inverse() };
        let spec = ProcessorSpec::new(me, 1 - me, PatchId(0), CommTag::new(40)).cyclic("periodic", transform);
        let def = PatchDef::new(
            "processorCyclic",
            processor_faces(&format!("procBoundary{me}to{}throughperiodic", 1 - me), me, 1),
            CouplingSpec::Processor(spec),
        )
        .unwrap();
        let mesh = BoundaryMesh::new(1, vec![def], CouplingConfig::default()).unwrap();
        assert_eq!(mesh.patch(PatchId(0)).unwrap().kind(), PatchKind::ProcessorCyclic);

        let internal = if me == 0 { [Vector::X] } else { [Vector::Y * 2.0] };
        let mut bf = BoundaryField::<Vector>::new("U", &mesh).unwrap();
        bf.evaluate(&mesh, comm, &internal, ExchangeOptions::default())
            .unwrap();
        bf.values(PatchId(0)).unwrap()[0]
    });
    assert!(values[0].approx_eq(Vector::new(2.0, 0.0, 0.0), 1e-12));
    assert!(values[1].approx_eq(Vector::new(0.0, 1.0, 0.0), 1e-12));
}

#[test]
fn processor_kind_must_match_its_coupling() {
    let spec = ProcessorSpec::new(0, 1, PatchId(0), CommTag::new(3));
    let def = PatchDef::new(
        "processorCyclic",
        processor_faces("procBoundary0to1", 0, 1),
        CouplingSpec::Processor(spec),
    )
    .unwrap();
    assert!(matches!(
        BoundaryMesh::new(1, vec![def], CouplingConfig::default()),
        Err(CouplingError::PatchTypeMismatch { .. })
    ));
}

#[test]
fn processor_geometry_must_be_exchanged_in_parallel() {
    let results = on_ranks(2, |comm| {
        let me = comm.rank();
        let mut mesh =
            BoundaryMesh::new(1, vec![processor_def(me, 1 - me, 1)], CouplingConfig::default()).unwrap();
        let missing = matches!(
            mesh.patch(PatchId(0)).unwrap().coupled_or_err("delta").unwrap().delta(),
            Err(CouplingError::MissingNeighbourGeometry(_))
        );
        mesh.exchange_processor_geometry(comm).unwrap();
        let p = mesh.patch(PatchId(0)).unwrap().coupled_or_err("delta").unwrap();
        let exchanged = (p.weights().unwrap()[0], p.delta().unwrap()[0], p.delta_coeffs().unwrap()[0]);
        (missing, exchanged)
    });
    for (rank, (missing, (w, delta, dc))) in results.into_iter().enumerate() {
        assert!(missing);
        assert!(approx(w, 0.5));
        let sign = if rank == 0 { 1.0 } else { -1.0 };
        assert!(delta.approx_eq(Vector::new(sign, 0.0, 0.0), 1e-12));
        assert!(approx(dc, 1.0));
    }
}

#[test]
fn processor_patch_names_its_remote_partner() {
    let mesh = BoundaryMesh::new(
        1,
        vec![processor_def_to(0, 1, PatchId(2), 1)],
        CouplingConfig::default(),
    )
    .unwrap();
    let p = mesh.patch(PatchId(0)).unwrap();
    assert!(p.coupled());
    assert_eq!(p.neighbour_patch_id().unwrap(), PatchId(2));
    assert_eq!(mesh.processor_neighbours(), vec![1]);
}

#[test]
fn processor_patch_cannot_couple_its_own_rank() {
    let err = BoundaryMesh::new(1, vec![processor_def(0, 0, 1)], CouplingConfig::default()).unwrap_err();
    assert!(matches!(err, CouplingError::PatchPairMismatch { .. }));
}

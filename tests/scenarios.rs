mod util;

use coupled_patch::prelude::*;
use std::sync::Arc;
use util::*;

/// One partition of a two-rank split: `n_faces` cells, all on the processor patch.
fn partition(rank: usize, n_faces: usize, config: CouplingConfig) -> BoundaryMesh {
    BoundaryMesh::new(n_faces, vec![processor_def(rank, 1 - rank, n_faces)], config).unwrap()
}

fn two_partition_exchange(comms_type: CommsType) {
    let results = on_ranks(2, |comm| {
        let rank = comm.rank();
        let mut mesh = partition(rank, 1, CouplingConfig::default());
        mesh.exchange_processor_geometry(comm).unwrap();
        let topo = mesh.gather_topology(comm).unwrap();
        let opts = ExchangeOptions::new(comms_type).with_topology(&topo);

        let internal = if rank == 1 { vec![5.0] } else { vec![1.0] };
        let mut bf = BoundaryField::<f64>::new("p", &mesh).unwrap();
        bf.evaluate(&mesh, comm, &internal, opts).unwrap();
        let value = bf.values(PatchId(0)).unwrap().to_vec();

        let coeffs = vec![vec![2.0]];
        let update = InterfaceUpdate {
            psi: &internal,
            cmpt: 0,
            coeffs: &coeffs,
            solving_field: true,
        };
        let mut result = vec![0.0];
        bf.update_interface_matrices(&mesh, comm, update, &mut result, opts)
            .unwrap();
        (value, result)
    });

    assert_eq!(results[0].0, vec![5.0]);
    assert_eq!(results[0].1, vec![-10.0]);
    assert_eq!(results[1].0, vec![1.0]);
    assert_eq!(results[1].1, vec![-2.0]);
}

#[test]
fn two_partition_exchange_blocking() {
    two_partition_exchange(CommsType::Blocking);
}

#[test]
fn two_partition_exchange_non_blocking() {
    two_partition_exchange(CommsType::NonBlocking);
}

#[test]
fn two_partition_exchange_scheduled() {
    two_partition_exchange(CommsType::Scheduled);
}

#[test]
fn float_transfer_rounds_to_single_precision() {
    let config = CouplingConfig {
        float_transfer: true,
        ..CouplingConfig::default()
    };
    let values = on_ranks(2, |comm| {
        let mesh = partition(comm.rank(), 3, config.clone());
        let internal: Vec<f64> = (0..3).map(|i| 0.1 * (i + 1) as f64 + comm.rank() as f64).collect();
        let mut bf = BoundaryField::<f64>::new("T", &mesh).unwrap();
        bf.evaluate(&mesh, comm, &internal, ExchangeOptions::default())
            .unwrap();
        bf.values(PatchId(0)).unwrap().to_vec()
    });
    for (i, v) in values[0].iter().enumerate() {
        let sent = 0.1 * (i + 1) as f64 + 1.0;
        assert!((v - sent).abs() < 1e-6);
        assert_eq!(*v, f64::from(sent as f32));
    }
}

#[test]
fn size_mismatch_aborts_on_both_sides() {
    let errors = on_ranks(2, |comm| {
        let n = if comm.rank() == 0 { 10 } else { 12 };
        let mesh = partition(comm.rank(), n, CouplingConfig::default());
        let mut bf = BoundaryField::<f64>::new("U", &mesh).unwrap();
        bf.evaluate(&mesh, comm, &vec![1.0; n], ExchangeOptions::default())
            .unwrap_err()
    });
    match &errors[0] {
        CouplingError::BufferSizeMismatch {
            expected, received, field, ..
        } => {
            assert_eq!((*expected, *received), (10, 12));
            assert_eq!(field, "U");
        }
        e => panic!("unexpected error: {e}"),
    }
    assert!(matches!(
        errors[1],
        CouplingError::BufferSizeMismatch {
            expected: 12,
            received: 10,
            ..
        }
    ));
}

#[test]
fn non_conforming_pair_preserves_uniform_field() {
    let a = Arc::new(strip("A", &[0.0, 1.0, 2.0], 0.0, false, 0, -0.5));
    let b = Arc::new(strip("B", &[0.0, 2.0], 0.0, true, 0, 0.5));
    let ami = AmiInterpolation::new(a, b, TransformDescriptor::identity(), AmiConfig::default());

    let on_a = ami.interpolate_to_source(&[3.0], None).unwrap();
    assert_eq!(on_a.len(), 2);
    assert!(on_a.iter().all(|&v| approx(v, 3.0)));
    let back = ami.interpolate_to_target(&[3.0, 3.0], None).unwrap();
    assert!(approx(back[0], 3.0));

    let w = ami.weights().unwrap();
    assert!(w.src.weights_sum.iter().all(|&s| approx(s, 1.0)));
    assert!(w.tgt.weights_sum.iter().all(|&s| approx(s, 1.0)));
    assert!(ami.report().area_mismatch.is_none());
}

/// A cyclic AMI pair: `a` on z = 0 with cells above it, `b` on z = 1 with
/// cells below it, separated by one unit along z.
fn ami_pair(a: &[f64], b: &[f64], config: CouplingConfig) -> BoundaryMesh {
    let na = a.len() - 1;
    let nb = b.len() - 1;
    let t = TransformDescriptor::translational(Vector::new(0.0, 0.0, -1.0));
    let defs = vec![
        PatchDef::new(
            "cyclicAMI",
            strip("A", a, 0.0, true, 0, 0.5),
            CouplingSpec::CyclicAmi {
                neighbour: "B".into(),
                transform: t,
            },
        )
        .unwrap(),
        PatchDef::new(
            "cyclicAMI",
            strip("B", b, 1.0, false, na, -0.5),
            CouplingSpec::CyclicAmi {
                neighbour: "A".into(),
                transform: t.inverse(),
            },
        )
        .unwrap(),
    ];
    BoundaryMesh::new(na + nb, defs, config).unwrap()
}

#[test]
fn cyclic_ami_field_sees_neighbour_cells() {
    let mesh = ami_pair(&[0.0, 1.0, 2.0], &[0.0, 2.0], CouplingConfig::default());
    let mut bf = BoundaryField::<f64>::new("T", &mesh).unwrap();
    bf.evaluate(&mesh, &NoComm, &[7.0, 7.0, 3.0], ExchangeOptions::default())
        .unwrap();

    let a = bf.get(PatchId(0)).unwrap().as_coupled().unwrap();
    let b = bf.get(PatchId(1)).unwrap().as_coupled().unwrap();
    let pa = a.neighbour_values().unwrap();
    assert!(approx(pa[0], 3.0) && approx(pa[1], 3.0));
    assert!(approx(b.neighbour_values().unwrap()[0], 7.0));

    let Patch::CyclicAmi(p) = mesh.patch(PatchId(0)).unwrap() else {
        panic!("A should be a cyclic AMI patch");
    };
    assert!(p.weights_sum().unwrap().iter().all(|&s| approx(s, 1.0)));
}

#[test]
fn low_weight_face_leans_on_local_value() {
    let mut config = CouplingConfig::default();
    config.ami.low_weight_correction = 0.1;
    let mesh = ami_pair(&[0.0, 1.0], &[0.99, 1.99], config);
    let mut bf = BoundaryField::<f64>::new("T", &mesh).unwrap();
    bf.evaluate(&mesh, &NoComm, &[10.0, 100.0], ExchangeOptions::default())
        .unwrap();

    let a = bf.get(PatchId(0)).unwrap().as_coupled().unwrap();
    let v = a.neighbour_values().unwrap()[0];
    assert!(v > 10.0 && v < 100.0);
    assert!(v - 10.0 < 100.0 - v);
    assert!((v - 10.9).abs() < 1e-9, "got {v}");

    let b = bf.get(PatchId(1)).unwrap().as_coupled().unwrap();
    assert!((b.neighbour_values().unwrap()[0] - 99.1).abs() < 1e-9);

    let Patch::CyclicAmi(p) = mesh.patch(PatchId(0)).unwrap() else {
        panic!("A should be a cyclic AMI patch");
    };
    let report = p.ami().report();
    assert_eq!(report.n_low_weight_src, 1);
    assert_eq!(report.n_low_weight_tgt, 1);
}

#[test]
fn rotational_cyclic_rotates_vectors() {
    use std::f64::consts::FRAC_PI_2;

    let face = |name: &str, centre: Vector, normal: Vector, cell: usize| {
        PatchGeometry::from_centroids(name, vec![centre], vec![normal], vec![cell], vec![centre - normal * 0.5])
            .unwrap()
    };
    // maps the y-facing side onto the x-facing side
    let t = TransformDescriptor::rotational(Vector::Z, Vector::ZERO, -FRAC_PI_2).unwrap();
    let defs = vec![
        PatchDef::new(
            "cyclic",
            face("east", Vector::X, Vector::X, 0),
            CouplingSpec::Cyclic {
                neighbour: "north".into(),
                transform: t,
            },
        )
        .unwrap(),
        PatchDef::new(
            "cyclic",
            face("north", Vector::Y, Vector::Y, 1),
            CouplingSpec::Cyclic {
                neighbour: "east".into(),
                transform: t.inverse(),
            },
        )
        .unwrap(),
    ];
    let mesh = BoundaryMesh::new(2, defs, CouplingConfig::default()).unwrap();
    let mut bf = BoundaryField::<Vector>::new("U", &mesh).unwrap();
    let internal = [Vector::new(1.0, 0.0, 0.0), Vector::new(0.0, 2.0, 0.0)];
    bf.evaluate(&mesh, &NoComm, &internal, ExchangeOptions::default())
        .unwrap();

    let east = bf.get(PatchId(0)).unwrap().as_coupled().unwrap();
    let north = bf.get(PatchId(1)).unwrap().as_coupled().unwrap();
    assert!(east.neighbour_values().unwrap()[0].approx_eq(Vector::new(2.0, 0.0, 0.0), 1e-12));
    assert!(north.neighbour_values().unwrap()[0].approx_eq(Vector::new(0.0, 1.0, 0.0), 1e-12));

    // both cells push outward at the same rate, so the face value is normal to the face
    let east_value = east.values()[0];
    assert!(east_value.approx_eq(Vector::new(1.5, 0.0, 0.0), 1e-12));

    let coeffs = vec![vec![1.0], vec![1.0]];
    let psi = [0.0, 2.0];
    let mut result = vec![0.0; 2];
    let update = InterfaceUpdate {
        psi: &psi,
        cmpt: 0,
        coeffs: &coeffs,
        solving_field: true,
    };
    bf.update_interface_matrices(&mesh, &NoComm, update, &mut result, ExchangeOptions::default())
        .unwrap();
    // the x-component couples through diag(R)[0] = 0
    assert!(result[0].abs() < 1e-12);
}

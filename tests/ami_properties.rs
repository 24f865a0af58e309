mod util;

use coupled_patch::prelude::*;
use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use util::*;

/// Cut positions from positive widths, rescaled to end exactly at `length`.
fn cuts(widths: &[f64], length: f64) -> Vec<f64> {
    let total: f64 = widths.iter().sum();
    let mut xs = vec![0.0];
    let mut x = 0.0;
    for w in &widths[..widths.len() - 1] {
        x += w / total * length;
        xs.push(x);
    }
    xs.push(length);
    xs
}

fn random_cuts(rng: &mut SmallRng, n: usize, length: f64) -> Vec<f64> {
    let widths: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..1.0)).collect();
    cuts(&widths, length)
}

fn ami(src: &[f64], tgt: &[f64]) -> AmiInterpolation {
    AmiInterpolation::new(
        Arc::new(strip("src", src, 0.0, false, 0, -0.5)),
        Arc::new(strip("tgt", tgt, 0.0, true, 0, 0.5)),
        TransformDescriptor::identity(),
        AmiConfig::default(),
    )
}

fn area_weighted(values: &[f64], xs: &[f64]) -> f64 {
    values.iter().zip(xs.windows(2)).map(|(v, w)| v * (w[1] - w[0])).sum()
}

#[test]
fn interpolation_conserves_area_weighted_sums() {
    let mut rng = SmallRng::seed_from_u64(42);
    for _ in 0..20 {
        let n_src = rng.gen_range(1..12);
        let n_tgt = rng.gen_range(1..12);
        let src = random_cuts(&mut rng, n_src, 3.0);
        let tgt = random_cuts(&mut rng, n_tgt, 3.0);
        let a = ami(&src, &tgt);

        let f_tgt: Vec<f64> = (0..n_tgt).map(|_| rng.gen_range(-5.0..5.0)).collect();
        let on_src = a.interpolate_to_source(&f_tgt, None).unwrap();
        let lhs = area_weighted(&on_src, &src);
        let rhs = area_weighted(&f_tgt, &tgt);
        assert!((lhs - rhs).abs() < 1e-9 * (1.0 + rhs.abs()), "{lhs} vs {rhs}");

        let f_src: Vec<f64> = (0..n_src).map(|_| rng.gen_range(-5.0..5.0)).collect();
        let on_tgt = a.interpolate_to_target(&f_src, None).unwrap();
        let lhs = area_weighted(&on_tgt, &tgt);
        let rhs = area_weighted(&f_src, &src);
        assert!((lhs - rhs).abs() < 1e-9 * (1.0 + rhs.abs()), "{lhs} vs {rhs}");

        let (src_total, tgt_total) = a.weights().unwrap().overlap_totals();
        assert!((src_total - tgt_total).abs() < 1e-9);
        assert!((src_total - 3.0).abs() < 1e-9);
    }
}

#[test]
fn nearest_face_is_conformal() {
    let config = AmiConfig {
        method: AmiMethod::NearestFace,
        ..AmiConfig::default()
    };
    let a = AmiInterpolation::new(
        Arc::new(strip("src", &[0.0, 1.0, 2.0, 3.0], 0.0, false, 0, -0.5)),
        Arc::new(strip("tgt", &[0.0, 1.4, 3.0], 0.0, true, 0, 0.5)),
        TransformDescriptor::identity(),
        config,
    );
    let w = a.weights().unwrap();
    assert!(w.src.weights_sum.iter().all(|&s| approx(s, 1.0)));
    assert_eq!(a.interpolate_to_source(&[4.0, 8.0], None).unwrap(), vec![4.0, 8.0, 8.0]);
}

proptest! {
    #[test]
    fn fully_covered_faces_sum_to_one(
        src_widths in prop::collection::vec(0.05f64..1.0, 1..10),
        tgt_widths in prop::collection::vec(0.05f64..1.0, 1..10),
    ) {
        let src = cuts(&src_widths, 2.0);
        let tgt = cuts(&tgt_widths, 2.0);
        let a = ami(&src, &tgt);
        let w = a.weights().unwrap();
        for s in w.src.weights_sum.iter().chain(&w.tgt.weights_sum) {
            prop_assert!((s - 1.0).abs() < 1e-9, "weight sum {}", s);
        }
        for row in w.src.weights.iter().chain(&w.tgt.weights) {
            prop_assert!(row.iter().all(|&x| x >= 0.0));
        }
    }

    #[test]
    fn inverse_undoes_transform(
        axis in (-1.0f64..1.0, -1.0f64..1.0, -1.0f64..1.0),
        angle in -3.0f64..3.0,
        centre in (-5.0f64..5.0, -5.0f64..5.0, -5.0f64..5.0),
        p in (-5.0f64..5.0, -5.0f64..5.0, -5.0f64..5.0),
        u in (-5.0f64..5.0, -5.0f64..5.0, -5.0f64..5.0),
    ) {
        let axis = Vector::new(axis.0, axis.1, axis.2);
        prop_assume!(axis.mag() > 0.1);
        let t = TransformDescriptor::rotational(axis, Vector::new(centre.0, centre.1, centre.2), angle).unwrap();
        let inv = t.inverse();

        let p = Vector::new(p.0, p.1, p.2);
        prop_assert!(inv.transform_position(t.transform_position(p)).approx_eq(p, 1e-9));

        let u = Vector::new(u.0, u.1, u.2);
        prop_assert!(inv.transform(t.transform(u)).approx_eq(u, 1e-9));
        prop_assert!((t.transform(u).mag() - u.mag()).abs() < 1e-9);
        prop_assert!(inv.inverse().approx_eq(&t, 1e-12));
    }

    #[test]
    fn translation_round_trips(sep in (-5.0f64..5.0, -5.0f64..5.0, -5.0f64..5.0)) {
        let t = TransformDescriptor::translational(Vector::new(sep.0, sep.1, sep.2));
        let p = Vector::new(1.0, -2.0, 0.5);
        prop_assert!(t.inverse().transform_position(t.transform_position(p)).approx_eq(p, 1e-12));
        prop_assert!(t.parallel());
    }
}

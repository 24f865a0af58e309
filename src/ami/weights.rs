//! Sparse overlap weights between the two sides of an AMI pair.

use crate::coupling_error::CouplingError;
use crate::debug_invariants::DebugInvariants;

/// Slack allowed on a weight sum above 1 before it is reported as broken.
pub const WEIGHT_SUM_SLACK: f64 = 1e-6;

/// One direction of the mapping: for every face, the faces it draws from and
/// their normalised weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmiSide {
    pub address: Vec<Vec<usize>>,
    pub weights: Vec<Vec<f64>>,
    /// Sum of each face's weights. 1 for a fully covered face.
    pub weights_sum: Vec<f64>,
    pub mag_sf: Vec<f64>,
}

impl AmiSide {
    /// Build from raw overlap areas per face.
    pub fn from_overlaps(rows: Vec<Vec<(usize, f64)>>, mag_sf: Vec<f64>) -> Self {
        let (address, weights) = rows
            .into_iter()
            .map(|row| row.into_iter().unzip::<usize, f64, Vec<_>, Vec<_>>())
            .unzip();
        Self {
            address,
            weights,
            weights_sum: Vec::new(),
            mag_sf,
        }
    }

    pub fn len(&self) -> usize {
        self.address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }

    /// Divide each face's weights by its area (or by their sum when `conformal`)
    /// and record the weight sums. Returns the number of faces whose sum falls
    /// below `low_weight_tol`.
    pub fn normalise(&mut self, conformal: bool, low_weight_tol: f64) -> usize {
        self.weights_sum = Vec::with_capacity(self.weights.len());
        let mut n_low = 0;
        for (face, w) in self.weights.iter_mut().enumerate() {
            let s: f64 = w.iter().sum();
            let area = self.mag_sf.get(face).copied().unwrap_or(0.0);
            let denom = if conformal { s } else { area };
            if denom > f64::MIN_POSITIVE {
                w.iter_mut().for_each(|x| *x /= denom);
            }
            let sum = if area > f64::MIN_POSITIVE { s / area } else { 0.0 };
            let sum = if conformal && s > 0.0 { 1.0 } else { sum };
            if sum < low_weight_tol {
                n_low += 1;
            }
            self.weights_sum.push(sum);
        }
        n_low
    }

    /// (min, max, mean) of the weight sums.
    pub fn sum_stats(&self) -> (f64, f64, f64) {
        if self.weights_sum.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        let min = self.weights_sum.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.weights_sum.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = self.weights_sum.iter().sum::<f64>() / self.weights_sum.len() as f64;
        (min, max, mean)
    }

    fn validate(&self, side: &str, other_len: usize) -> Result<(), CouplingError> {
        let broken = |reason: String| CouplingError::InvalidGeometry {
            patch: format!("AMI {side}"),
            reason,
        };
        if self.weights.len() != self.address.len() || self.weights_sum.len() != self.address.len()
        {
            return Err(broken("address, weight and sum lists differ in length".into()));
        }
        for (f, (a, w)) in self.address.iter().zip(&self.weights).enumerate() {
            if a.len() != w.len() {
                return Err(broken(format!("face {f}: {} addresses, {} weights", a.len(), w.len())));
            }
            if let Some(&j) = a.iter().find(|&&j| j >= other_len) {
                return Err(broken(format!("face {f} addresses face {j} of {other_len}")));
            }
            if w.iter().any(|&x| x < 0.0) {
                return Err(broken(format!("face {f} has a negative weight")));
            }
        }
        if let Some(f) = self.weights_sum.iter().position(|&s| s > 1.0 + WEIGHT_SUM_SLACK) {
            return Err(broken(format!(
                "face {f} weight sum {} exceeds 1",
                self.weights_sum[f]
            )));
        }
        Ok(())
    }
}

/// Both directions of an AMI mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmiWeights {
    pub src: AmiSide,
    pub tgt: AmiSide,
}

impl AmiWeights {
    /// Build both sides from overlap areas listed per source face.
    pub fn from_src_overlaps(
        src_rows: Vec<Vec<(usize, f64)>>,
        src_mag_sf: Vec<f64>,
        tgt_mag_sf: Vec<f64>,
    ) -> Self {
        let mut tgt_rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); tgt_mag_sf.len()];
        for (i, row) in src_rows.iter().enumerate() {
            for &(j, a) in row {
                tgt_rows[j].push((i, a));
            }
        }
        Self {
            src: AmiSide::from_overlaps(src_rows, src_mag_sf),
            tgt: AmiSide::from_overlaps(tgt_rows, tgt_mag_sf),
        }
    }

    /// Total overlap area seen from each side; equal up to round-off.
    pub fn overlap_totals(&self) -> (f64, f64) {
        let total = |s: &AmiSide| -> f64 {
            s.weights
                .iter()
                .zip(&s.mag_sf)
                .map(|(w, a)| w.iter().sum::<f64>() * a)
                .sum()
        };
        (total(&self.src), total(&self.tgt))
    }
}

impl DebugInvariants for AmiWeights {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "AmiWeights");
    }

    fn validate_invariants(&self) -> Result<(), CouplingError> {
        self.src.validate("source", self.tgt.len())?;
        self.tgt.validate("target", self.src.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_to_one() -> AmiWeights {
        // two unit source faces both lying on one target face of area 2
        let mut w = AmiWeights::from_src_overlaps(
            vec![vec![(0, 1.0)], vec![(0, 1.0)]],
            vec![1.0, 1.0],
            vec![2.0],
        );
        w.src.normalise(false, 0.0);
        w.tgt.normalise(false, 0.0);
        w
    }

    #[test]
    fn partition_of_unity_when_covered() {
        let w = two_to_one();
        assert_eq!(w.src.weights_sum, vec![1.0, 1.0]);
        assert_eq!(w.tgt.weights, vec![vec![0.5, 0.5]]);
        assert!((w.tgt.weights_sum[0] - 1.0).abs() < 1e-15);
        assert!(w.validate_invariants().is_ok());
    }

    #[test]
    fn uncovered_face_counts_as_low_weight() {
        let mut w = AmiWeights::from_src_overlaps(
            vec![vec![(0, 0.25)], vec![]],
            vec![1.0, 1.0],
            vec![1.0],
        );
        assert_eq!(w.src.normalise(false, 0.5), 2);
        assert_eq!(w.src.weights_sum, vec![0.25, 0.0]);
        assert_eq!(w.src.sum_stats(), (0.0, 0.25, 0.125));
    }

    #[test]
    fn overlap_totals_agree() {
        let w = two_to_one();
        let (a, b) = w.overlap_totals();
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn sum_above_one_is_invalid() {
        let mut w = two_to_one();
        w.src.weights_sum[0] = 1.5;
        assert!(w.validate_invariants().is_err());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "[invariants] AmiWeights")]
    fn debug_builds_assert_weight_invariants() {
        let mut w = two_to_one();
        w.src.weights_sum[0] = 1.5;
        w.debug_assert_invariants();
    }
}

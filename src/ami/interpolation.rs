//! Lazily built AMI mapping shared by both patches of a pair.
//!
//! The source side is the owner patch, the target side its neighbour. Weights
//! are computed on first use and reused until the geometry changes.

use super::weights::AmiWeights;
use crate::config::AmiConfig;
use crate::coupling_error::CouplingError;
use crate::debug_invariants::DebugInvariants;
use crate::mesh::PatchGeometry;
use crate::primitives::{FieldValue, TransformDescriptor};
use parking_lot::RwLock;
use std::sync::Arc;

/// Diagnostics recorded when the weights were last built.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AmiReport {
    pub src_area: f64,
    pub tgt_area: f64,
    /// Relative total-area mismatch, when above the configured tolerance.
    pub area_mismatch: Option<f64>,
    pub n_low_weight_src: usize,
    pub n_low_weight_tgt: usize,
}

struct AmiState {
    src: Arc<PatchGeometry>,
    tgt: Arc<PatchGeometry>,
    weights: Option<Arc<AmiWeights>>,
    report: AmiReport,
}

pub struct AmiInterpolation {
    name: String,
    config: AmiConfig,
    transform: TransformDescriptor,
    state: RwLock<AmiState>,
}

impl std::fmt::Debug for AmiInterpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiInterpolation")
            .field("name", &self.name)
            .field("method", &self.config.method)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl AmiInterpolation {
    /// `transform` maps target positions into the source frame (the owner's descriptor).
    pub fn new(
        src: Arc<PatchGeometry>,
        tgt: Arc<PatchGeometry>,
        transform: TransformDescriptor,
        config: AmiConfig,
    ) -> Self {
        Self {
            name: format!("{} -> {}", src.name(), tgt.name()),
            config,
            transform,
            state: RwLock::new(AmiState {
                src,
                tgt,
                weights: None,
                report: AmiReport::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AmiConfig {
        &self.config
    }

    pub fn is_valid(&self) -> bool {
        self.state.read().weights.is_some()
    }

    /// Drop cached weights; the next use rebuilds them.
    pub fn invalidate(&self) {
        self.state.write().weights = None;
    }

    /// Swap in moved geometry and invalidate.
    pub fn update_geometry(&self, src: Arc<PatchGeometry>, tgt: Arc<PatchGeometry>) {
        src.debug_assert_invariants();
        tgt.debug_assert_invariants();
        let mut st = self.state.write();
        st.src = src;
        st.tgt = tgt;
        st.weights = None;
        log::debug!("AMI {}: geometry changed, weights invalidated", self.name);
    }

    /// Current weights, building them if needed.
    pub fn weights(&self) -> Result<Arc<AmiWeights>, CouplingError> {
        if let Some(w) = self.state.read().weights.clone() {
            return Ok(w);
        }
        let mut st = self.state.write();
        if let Some(w) = st.weights.clone() {
            return Ok(w);
        }
        let (weights, report) = self.build(&st.src, &st.tgt)?;
        let weights = Arc::new(weights);
        st.weights = Some(weights.clone());
        st.report = report;
        Ok(weights)
    }

    pub fn report(&self) -> AmiReport {
        self.state.read().report
    }

    fn build(
        &self,
        src: &PatchGeometry,
        tgt: &PatchGeometry,
    ) -> Result<(AmiWeights, AmiReport), CouplingError> {
        let method = self.config.method;
        let mut w = method.calculate(src, tgt, &self.transform)?;

        let no_overlap = w.src.address.iter().all(Vec::is_empty);
        if self.config.require_match && no_overlap && !(src.is_empty() && tgt.is_empty()) {
            return Err(CouplingError::PatchPairMismatch {
                patch: src.name().to_owned(),
                neighbour: tgt.name().to_owned(),
                reason: "AMI found no overlapping faces".to_owned(),
            });
        }

        let lwc = self.config.low_weight_correction;
        let mut report = AmiReport {
            src_area: src.total_area(),
            tgt_area: tgt.total_area(),
            n_low_weight_src: w.src.normalise(method.conformal(), lwc),
            n_low_weight_tgt: w.tgt.normalise(method.conformal(), lwc),
            ..AmiReport::default()
        };

        let larger = report.src_area.max(report.tgt_area);
        if larger > 0.0 {
            let rel = (report.src_area - report.tgt_area).abs() / larger;
            if rel > self.config.area_mismatch_tolerance {
                report.area_mismatch = Some(rel);
                log::warn!(
                    "AMI {}: patch areas differ by {:.3}% (source {}, target {})",
                    self.name,
                    rel * 100.0,
                    report.src_area,
                    report.tgt_area
                );
            }
        }

        let (smin, smax, savg) = w.src.sum_stats();
        let (tmin, tmax, tavg) = w.tgt.sum_stats();
        log::debug!(
            "AMI {}: source weight sum min/max/avg {smin:.6}/{smax:.6}/{savg:.6}, \
             target {tmin:.6}/{tmax:.6}/{tavg:.6}",
            self.name
        );
        if self.config.low_weight_correction_active()
            && report.n_low_weight_src + report.n_low_weight_tgt > 0
        {
            log::debug!(
                "AMI {}: {} source and {} target faces below weight {lwc}",
                self.name,
                report.n_low_weight_src,
                report.n_low_weight_tgt
            );
        }

        w.validate_invariants()?;
        Ok((w, report))
    }

    /// Map a target-side field onto the source faces.
    ///
    /// With low-weight correction enabled, faces whose weight sum falls below
    /// the threshold blend in `defaults` by the uncovered fraction:
    /// `sum(w_i v_i) + (1 - sum(w_i)) * default`. Without defaults the raw
    /// weighted sum is returned.
    pub fn interpolate_to_source<T: FieldValue>(
        &self,
        tgt_field: &[T],
        defaults: Option<&[T]>,
    ) -> Result<Vec<T>, CouplingError> {
        let w = self.weights()?;
        w.debug_assert_invariants();
        self.interpolate(&w.src, w.tgt.len(), tgt_field, defaults)
    }

    /// Map a source-side field onto the target faces.
    pub fn interpolate_to_target<T: FieldValue>(
        &self,
        src_field: &[T],
        defaults: Option<&[T]>,
    ) -> Result<Vec<T>, CouplingError> {
        let w = self.weights()?;
        w.debug_assert_invariants();
        self.interpolate(&w.tgt, w.src.len(), src_field, defaults)
    }

    fn interpolate<T: FieldValue>(
        &self,
        side: &super::weights::AmiSide,
        from_len: usize,
        field: &[T],
        defaults: Option<&[T]>,
    ) -> Result<Vec<T>, CouplingError> {
        if field.len() != from_len {
            return Err(CouplingError::FieldSizeMismatch {
                field: String::new(),
                context: format!("AMI {}", self.name),
                expected: from_len,
                found: field.len(),
            });
        }
        let threshold = self.config.low_weight_correction;
        let correct = self.config.low_weight_correction_active();
        let defaults = match (correct, defaults) {
            (true, Some(d)) if d.len() == side.len() => Some(d),
            (true, Some(d)) => {
                return Err(CouplingError::FieldSizeMismatch {
                    field: "defaults".to_owned(),
                    context: format!("AMI {}", self.name),
                    expected: side.len(),
                    found: d.len(),
                });
            }
            (true, None) | (false, _) => None,
        };

        Ok((0..side.len())
            .map(|face| {
                let mut v = T::zero();
                for (&j, &wt) in side.address[face].iter().zip(&side.weights[face]) {
                    v += field[j] * wt;
                }
                let sum = side.weights_sum[face];
                match defaults {
                    Some(d) if sum < threshold => v + d[face] * (1.0 - sum),
                    _ => v,
                }
            })
            .collect())
    }
}

//! Run-wide coupling settings.
//!
//! All fields have defaults, so an empty JSON object deserializes to
//! [`CouplingConfig::default`]. Call [`CouplingConfig::validate`] after loading.

use crate::ami::AmiMethod;
use crate::comm::CommsType;
use crate::coupling_error::CouplingError;
use serde::{Deserialize, Serialize};

/// AMI construction and interpolation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AmiConfig {
    /// Face-overlap construction method.
    pub method: AmiMethod,
    /// Weight-sum threshold below which the local value is blended in.
    /// Non-positive disables the correction.
    pub low_weight_correction: f64,
    /// Relative total-area mismatch between the two sides above which a warning is logged.
    pub area_mismatch_tolerance: f64,
    /// Fail construction if the two sides do not overlap at all.
    pub require_match: bool,
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            method: AmiMethod::FaceAreaWeight,
            low_weight_correction: -1.0,
            area_mismatch_tolerance: 1e-3,
            require_match: true,
        }
    }
}

impl AmiConfig {
    pub fn low_weight_correction_active(&self) -> bool {
        self.low_weight_correction > 0.0
    }
}

/// Settings shared by every coupled patch in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CouplingConfig {
    /// Default exchange discipline for boundary evaluation.
    pub comms_type: CommsType,
    /// Send processor-patch values in single precision.
    pub float_transfer: bool,
    pub ami: AmiConfig,
    /// Mask values closer than this to 0 or 1 are snapped.
    pub acmi_tolerance: f64,
    /// Tag for run-level exchanges such as the processor topology gather.
    /// Must differ from every processor patch tag.
    pub base_tag: u16,
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            comms_type: CommsType::NonBlocking,
            float_transfer: false,
            ami: AmiConfig::default(),
            acmi_tolerance: 1e-6,
            base_tag: 0x7f00,
        }
    }
}

impl CouplingConfig {
    /// Reject settings outside their meaningful range.
    pub fn validate(&self) -> Result<(), CouplingError> {
        if self.ami.low_weight_correction >= 1.0 {
            return Err(CouplingError::InvalidConfig(format!(
                "ami.lowWeightCorrection must be < 1, got {}",
                self.ami.low_weight_correction
            )));
        }
        if !(self.ami.area_mismatch_tolerance >= 0.0) {
            return Err(CouplingError::InvalidConfig(format!(
                "ami.areaMismatchTolerance must be >= 0, got {}",
                self.ami.area_mismatch_tolerance
            )));
        }
        if !(0.0..0.5).contains(&self.acmi_tolerance) {
            return Err(CouplingError::InvalidConfig(format!(
                "acmiTolerance must lie in [0, 0.5), got {}",
                self.acmi_tolerance
            )));
        }
        Ok(())
    }
}

//! Capability traits shared by all boundary patches.

use crate::coupling_error::CouplingError;
use crate::mesh::{PatchGeometry, PatchId, PatchKind};
use crate::primitives::{TransformDescriptor, Vector};

/// What a patch field on this patch can take part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Boundary values come from the neighbour side.
    pub value_coupled: bool,
    /// Neighbour cells enter the linear system through interface coefficients.
    pub matrix_coupled: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        value_coupled: false,
        matrix_coupled: false,
    };
    pub const FULL: Capabilities = Capabilities {
        value_coupled: true,
        matrix_coupled: true,
    };
}

/// Queries every boundary patch answers.
pub trait PatchInterface {
    fn id(&self) -> PatchId;
    fn kind(&self) -> PatchKind;
    fn geometry(&self) -> &PatchGeometry;

    fn name(&self) -> &str {
        self.geometry().name()
    }

    fn size(&self) -> usize {
        self.geometry().size()
    }

    fn face_cells(&self) -> &[usize] {
        self.geometry().face_cells()
    }

    fn coupled(&self) -> bool {
        self.kind().coupled()
    }

    fn capabilities(&self) -> Capabilities {
        if self.coupled() { Capabilities::FULL } else { Capabilities::NONE }
    }

    /// The partner patch on this rank. Only defined for same-rank coupled patches.
    fn neighbour_patch_id(&self) -> Result<PatchId, CouplingError> {
        Err(CouplingError::InvalidPatchKind {
            patch: self.name().to_owned(),
            operation: "neighbour_patch_id",
        })
    }
}

/// Geometric coupling data of a coupled patch.
pub trait CoupledPatch: PatchInterface {
    /// Maps the neighbour's frame into this patch's frame.
    fn transform(&self) -> &TransformDescriptor;

    /// The owner side of a pair holds shared data such as jumps and AMI sources.
    fn owner(&self) -> bool;

    /// Interpolation factor `w`: face value is `w * own + (1 - w) * neighbour`.
    fn weights(&self) -> Result<&[f64], CouplingError>;

    /// Vector from this patch's owner cell centre to the neighbour cell centre.
    fn delta(&self) -> Result<Vec<Vector>, CouplingError>;

    /// `1 / (nf . delta)`, the coefficient of a two-point normal gradient.
    fn delta_coeffs(&self) -> Result<Vec<f64>, CouplingError> {
        let nf = self.geometry().nf();
        self.delta()?
            .into_iter()
            .zip(nf)
            .enumerate()
            .map(|(face, (d, n))| {
                let dn = n.dot(d);
                if dn.abs() > f64::MIN_POSITIVE {
                    Ok(1.0 / dn)
                } else {
                    Err(CouplingError::geometry(
                        self.name(),
                        format!("face {face} has zero normal distance to its neighbour cell"),
                    ))
                }
            })
            .collect()
    }
}

/// `w = nd / (d + nd)` for own and neighbour normal distances, `1.0` where both vanish.
pub(crate) fn distance_weights(own: &[f64], nbr: &[f64]) -> Vec<f64> {
    own.iter()
        .zip(nbr)
        .map(|(&d, &nd)| {
            let sum = d + nd;
            if sum.abs() > f64::MIN_POSITIVE { nd / sum } else { 1.0 }
        })
        .collect()
}

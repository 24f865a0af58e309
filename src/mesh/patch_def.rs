//! What the mesh provider hands over for each boundary patch.

use super::{PatchGeometry, PatchId};
use crate::comm::CommTag;
use crate::coupling_error::CouplingError;
use crate::primitives::TransformDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registered patch types. The string form is the key used in case files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatchKind {
    #[serde(rename = "patch")]
    Patch,
    #[serde(rename = "wall")]
    Wall,
    #[serde(rename = "processor")]
    Processor,
    #[serde(rename = "processorCyclic")]
    ProcessorCyclic,
    #[serde(rename = "cyclic")]
    Cyclic,
    #[serde(rename = "cyclicAMI")]
    CyclicAmi,
    #[serde(rename = "cyclicACMI")]
    CyclicAcmi,
}

impl PatchKind {
    pub const ALL: [PatchKind; 7] = [
        PatchKind::Patch,
        PatchKind::Wall,
        PatchKind::Processor,
        PatchKind::ProcessorCyclic,
        PatchKind::Cyclic,
        PatchKind::CyclicAmi,
        PatchKind::CyclicAcmi,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            PatchKind::Patch => "patch",
            PatchKind::Wall => "wall",
            PatchKind::Processor => "processor",
            PatchKind::ProcessorCyclic => "processorCyclic",
            PatchKind::Cyclic => "cyclic",
            PatchKind::CyclicAmi => "cyclicAMI",
            PatchKind::CyclicAcmi => "cyclicACMI",
        }
    }

    pub fn coupled(self) -> bool {
        !matches!(self, PatchKind::Patch | PatchKind::Wall)
    }

    /// Processor kinds exchange data with another rank.
    pub fn is_processor(self) -> bool {
        matches!(self, PatchKind::Processor | PatchKind::ProcessorCyclic)
    }

    /// Kinds that interpolate through an AMI.
    pub fn uses_ami(self) -> bool {
        matches!(self, PatchKind::CyclicAmi | PatchKind::CyclicAcmi)
    }
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for PatchKind {
    type Err = CouplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatchKind::ALL
            .into_iter()
            .find(|k| k.type_name() == s)
            .ok_or_else(|| CouplingError::UnknownPatchType(s.to_owned()))
    }
}

/// Processor patch connection data.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorSpec {
    pub my_rank: usize,
    pub neighb_rank: usize,
    /// Id of the partner patch in the neighbour rank's boundary mesh.
    pub neighb_patch: PatchId,
    /// Message tag; both sides of the pair must use the same value.
    pub tag: CommTag,
    /// Non-identity only for processor-cyclic patches.
    pub transform: TransformDescriptor,
    /// Cyclic patch a processor-cyclic patch was split from.
    pub referred_patch: Option<String>,
}

impl ProcessorSpec {
    pub fn new(my_rank: usize, neighb_rank: usize, neighb_patch: PatchId, tag: CommTag) -> Self {
        Self {
            my_rank,
            neighb_rank,
            neighb_patch,
            tag,
            transform: TransformDescriptor::identity(),
            referred_patch: None,
        }
    }

    pub fn cyclic(mut self, referred_patch: impl Into<String>, transform: TransformDescriptor) -> Self {
        self.referred_patch = Some(referred_patch.into());
        self.transform = transform;
        self
    }
}

/// Coupling data per kind. `transform` maps the neighbour's frame into this patch's frame.
#[derive(Debug, Clone, PartialEq)]
pub enum CouplingSpec {
    None,
    Processor(ProcessorSpec),
    Cyclic {
        neighbour: String,
        transform: TransformDescriptor,
    },
    CyclicAmi {
        neighbour: String,
        transform: TransformDescriptor,
    },
    CyclicAcmi {
        neighbour: String,
        non_overlap: String,
        transform: TransformDescriptor,
    },
}

impl CouplingSpec {
    pub fn describe(&self) -> &'static str {
        match self {
            CouplingSpec::None => "uncoupled",
            CouplingSpec::Processor(p) if p.referred_patch.is_some() => "processorCyclic",
            CouplingSpec::Processor(_) => "processor",
            CouplingSpec::Cyclic { .. } => "cyclic",
            CouplingSpec::CyclicAmi { .. } => "cyclicAMI",
            CouplingSpec::CyclicAcmi { .. } => "cyclicACMI",
        }
    }

    /// Name of the coupled neighbour patch on this rank, if any.
    pub fn neighbour_name(&self) -> Option<&str> {
        match self {
            CouplingSpec::Cyclic { neighbour, .. }
            | CouplingSpec::CyclicAmi { neighbour, .. }
            | CouplingSpec::CyclicAcmi { neighbour, .. } => Some(neighbour),
            CouplingSpec::None | CouplingSpec::Processor(_) => None,
        }
    }

    pub fn transform(&self) -> TransformDescriptor {
        match self {
            CouplingSpec::None => TransformDescriptor::identity(),
            CouplingSpec::Processor(p) => p.transform,
            CouplingSpec::Cyclic { transform, .. }
            | CouplingSpec::CyclicAmi { transform, .. }
            | CouplingSpec::CyclicAcmi { transform, .. } => *transform,
        }
    }
}

/// One boundary patch as read from the mesh.
#[derive(Debug, Clone)]
pub struct PatchDef {
    pub kind: PatchKind,
    pub geometry: PatchGeometry,
    pub coupling: CouplingSpec,
}

impl PatchDef {
    /// Look up `type_name` in the patch-kind registry.
    pub fn new(type_name: &str, geometry: PatchGeometry, coupling: CouplingSpec) -> Result<Self, CouplingError> {
        Ok(Self {
            kind: type_name.parse()?,
            geometry,
            coupling,
        })
    }

    pub fn wall(geometry: PatchGeometry) -> Self {
        Self {
            kind: PatchKind::Wall,
            geometry,
            coupling: CouplingSpec::None,
        }
    }

    pub fn name(&self) -> &str {
        self.geometry.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_round_trip() {
        for k in PatchKind::ALL {
            assert_eq!(k.type_name().parse::<PatchKind>().unwrap(), k);
            let json = serde_json::to_string(&k).unwrap();
            assert_eq!(json, format!("\"{}\"", k.type_name()));
        }
    }

    #[test]
    fn unknown_type_is_reported() {
        assert!(matches!(
            "cyclicSlip".parse::<PatchKind>(),
            Err(CouplingError::UnknownPatchType(s)) if s == "cyclicSlip"
        ));
    }

    #[test]
    fn processor_cyclic_spec_describes_itself() {
        let spec = ProcessorSpec::new(0, 1, PatchId(0), CommTag::new(3))
            .cyclic("periodic", TransformDescriptor::identity());
        assert_eq!(CouplingSpec::Processor(spec).describe(), "processorCyclic");
    }
}

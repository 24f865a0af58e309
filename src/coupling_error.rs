//! CouplingError: unified error type for the coupled-patch public APIs.
//!
//! Every fallible operation in this crate returns `Result<_, CouplingError>`.
//! Nothing is retried internally; a failed exchange is reported once and the
//! caller decides whether to abort the run.

use thiserror::Error;

/// Unified error type for coupled-patch operations.
#[derive(Debug, Error)]
pub enum CouplingError {
    /// A coupling-only query was made on a patch that is not coupled.
    #[error("patch `{patch}` is not coupled; `{operation}` is only defined for coupled patches")]
    InvalidPatchKind {
        patch: String,
        operation: &'static str,
    },
    /// A patch was constructed or bound with a kind that does not match its definition.
    #[error("patch `{patch}`: expected a `{expected}` patch, found `{found}`")]
    PatchTypeMismatch {
        patch: String,
        expected: String,
        found: String,
    },
    /// Two sides of a coupled pair disagree (face counts, back-references, transforms).
    #[error("patch pair `{patch}` <-> `{neighbour}` is inconsistent: {reason}")]
    PatchPairMismatch {
        patch: String,
        neighbour: String,
        reason: String,
    },
    /// A received buffer does not hold the number of elements the receiver expects.
    #[error(
        "buffer size mismatch on patch `{patch}` (field `{field}`): expected {expected} values, received {received}"
    )]
    BufferSizeMismatch {
        patch: String,
        field: String,
        expected: usize,
        received: usize,
    },
    /// A transfer with a neighbouring rank failed.
    #[error("communication with rank {neighbour} on patch `{patch}` failed: {source}")]
    Comm {
        patch: String,
        neighbour: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Patch geometry is degenerate or malformed.
    #[error("invalid geometry on patch `{patch}`: {reason}")]
    InvalidGeometry { patch: String, reason: String },
    /// A field slice has the wrong length for the patch or mesh it is bound to.
    #[error("field `{field}` on `{context}`: expected {expected} values, found {found}")]
    FieldSizeMismatch {
        field: String,
        context: String,
        expected: usize,
        found: usize,
    },
    /// The patch field does not support the requested operation for this value rank.
    #[error("patch `{patch}` does not support {capability}")]
    UnsupportedCapability {
        patch: String,
        capability: &'static str,
    },
    /// A quantity derived from the neighbour field was requested before any evaluation.
    #[error("field `{field}` on patch `{patch}` has not been evaluated")]
    NotEvaluated { patch: String, field: String },
    /// A patch type key did not name any registered patch kind.
    #[error("unknown patch type `{0}`")]
    UnknownPatchType(String),
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A processor patch was asked for neighbour-dependent geometry before it was exchanged.
    #[error("processor patch `{0}` has no neighbour geometry; exchange it first")]
    MissingNeighbourGeometry(String),
    /// A patch id is outside the boundary mesh.
    #[error("patch id {0} is out of range")]
    UnknownPatch(usize),
}

impl CouplingError {
    /// Attach a field name to errors that carry one and do not have it yet.
    pub fn with_field(self, name: &str) -> Self {
        match self {
            CouplingError::BufferSizeMismatch {
                patch,
                field,
                expected,
                received,
            } if field.is_empty() => CouplingError::BufferSizeMismatch {
                patch,
                field: name.to_owned(),
                expected,
                received,
            },
            CouplingError::FieldSizeMismatch {
                field,
                context,
                expected,
                found,
            } if field.is_empty() => CouplingError::FieldSizeMismatch {
                field: name.to_owned(),
                context,
                expected,
                found,
            },
            other => other,
        }
    }

    pub(crate) fn comm(patch: &str, neighbour: usize, msg: impl Into<String>) -> Self {
        CouplingError::Comm {
            patch: patch.to_owned(),
            neighbour,
            source: msg.into().into(),
        }
    }

    pub(crate) fn geometry(patch: &str, reason: impl Into<String>) -> Self {
        CouplingError::InvalidGeometry {
            patch: patch.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Check a slice length, producing a [`CouplingError::FieldSizeMismatch`] without a field name.
pub(crate) fn check_len(context: &str, expected: usize, found: usize) -> Result<(), CouplingError> {
    if expected == found {
        Ok(())
    } else {
        Err(CouplingError::FieldSizeMismatch {
            field: String::new(),
            context: context.to_owned(),
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_field_fills_empty_name_only() {
        let e = CouplingError::BufferSizeMismatch {
            patch: "procBoundary0to1".into(),
            field: String::new(),
            expected: 12,
            received: 10,
        }
        .with_field("p");
        match e {
            CouplingError::BufferSizeMismatch { field, .. } => assert_eq!(field, "p"),
            other => panic!("unexpected {other:?}"),
        }

        let e = CouplingError::BufferSizeMismatch {
            patch: "a".into(),
            field: "U".into(),
            expected: 1,
            received: 2,
        }
        .with_field("p");
        assert!(e.to_string().contains("field `U`"));
    }

    #[test]
    fn comm_error_keeps_source() {
        let e = CouplingError::comm("procBoundary1to0", 0, "peer hung up");
        assert!(std::error::Error::source(&e).is_some());
        assert!(e.to_string().contains("rank 0"));
    }
}

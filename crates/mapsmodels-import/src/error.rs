use mapsmodels_capture::CaptureError;
use mapsmodels_core::ResourceId;
use serde::Serialize;

/// Coarse category of an [`ImportError`], for callers that only branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportErrorKind {
    Format,
    Io,
    EmptyCapture,
    UnresolvedBinding,
    UnsupportedFormat,
    CorruptResource,
    /// Only produced by verification builds.
    StrategyDivergence,
}

/// Errors that can occur while importing a capture.
///
/// Container-level errors abort the import. Resource-level errors only cost
/// the draw call (or texture) they occurred in.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ImportError {
    #[error("capture format error: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("the capture contains no draw calls to import")]
    EmptyCapture,

    #[error("draw call {draw}: {what} {resource} is not defined in the capture")]
    UnresolvedBinding {
        draw: usize,
        what: &'static str,
        resource: ResourceId,
    },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt resource: {0}")]
    CorruptResource(String),

    /// Only produced by verification builds (`cfg(test)` or the `verify` feature).
    #[error("legacy and experimental resolvers disagree on draw call {draw}: {legacy} vs {experimental}")]
    StrategyDivergence {
        draw: usize,
        legacy: String,
        experimental: String,
    },
}

impl ImportError {
    pub fn kind(&self) -> ImportErrorKind {
        match self {
            Self::Format(_) => ImportErrorKind::Format,
            Self::Io(_) => ImportErrorKind::Io,
            Self::EmptyCapture => ImportErrorKind::EmptyCapture,
            Self::UnresolvedBinding { .. } => ImportErrorKind::UnresolvedBinding,
            Self::UnsupportedFormat(_) => ImportErrorKind::UnsupportedFormat,
            Self::CorruptResource(_) => ImportErrorKind::CorruptResource,
            Self::StrategyDivergence { .. } => ImportErrorKind::StrategyDivergence,
        }
    }

    /// Whether the caller should report a failed import rather than an empty
    /// or partial one.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.kind(),
            ImportErrorKind::EmptyCapture
                | ImportErrorKind::UnresolvedBinding
                | ImportErrorKind::UnsupportedFormat
                | ImportErrorKind::CorruptResource
        )
    }

    /// Errors hit while reading one resource payload for one draw call.
    /// A malformed payload there is the resource's problem, not the container's.
    pub(crate) fn from_resource_read(err: CaptureError) -> Self {
        match err {
            CaptureError::MalformedChunk { .. } => Self::CorruptResource(err.to_string()),
            other => other.into(),
        }
    }
}

impl From<CaptureError> for ImportError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Open(..) | CaptureError::Io(_) => ImportError::Io(err.to_string()),
            other => ImportError::Format(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapsmodels_capture::ChunkKind;

    #[test]
    fn container_errors_are_fatal() {
        let err: ImportError = CaptureError::InvalidMagic.into();
        assert_eq!(err.kind(), ImportErrorKind::Format);
        assert!(err.is_fatal());
    }

    #[test]
    fn resource_errors_are_not_fatal() {
        assert!(!ImportError::UnsupportedFormat("bc1".into()).is_fatal());
        assert!(!ImportError::EmptyCapture.is_fatal());
        let err = ImportError::UnresolvedBinding {
            draw: 2,
            what: "texture",
            resource: ResourceId(5),
        };
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "draw call 2: texture #5 is not defined in the capture"
        );
    }

    #[test]
    fn malformed_resource_payload_is_corrupt_resource() {
        let err = ImportError::from_resource_read(CaptureError::MalformedChunk {
            index: 4,
            kind: ChunkKind::CreateTexture,
            reason: "payload ends at byte 3".into(),
        });
        assert_eq!(err.kind(), ImportErrorKind::CorruptResource);
    }
}

use std::path::PathBuf;

use crate::format::ChunkKind;

/// Errors that can occur while reading a capture container.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to open capture '{0}': {1}")]
    Open(PathBuf, #[source] std::io::Error),

    #[error("I/O error reading capture: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a capture file (bad magic)")]
    InvalidMagic,

    #[error("unsupported capture header size {0}")]
    UnsupportedHeaderSize(u32),

    #[error("unsupported capture version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown graphics api code {0}")]
    UnknownApi(u32),

    #[error("capture is truncated: {0}")]
    Truncated(String),

    #[error("chunk {index} ({kind:?}) is malformed: {reason}")]
    MalformedChunk {
        index: usize,
        kind: ChunkKind,
        reason: String,
    },

    #[error("chunk index {0} is out of range")]
    ChunkOutOfRange(usize),
}

impl CaptureError {
    pub(crate) fn malformed(index: usize, kind: ChunkKind, reason: impl Into<String>) -> Self {
        Self::MalformedChunk {
            index,
            kind,
            reason: reason.into(),
        }
    }
}

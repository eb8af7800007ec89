//! On-disk constants of the capture container

use mapsmodels_core::GraphicsApi;

pub const CAPTURE_MAGIC: [u8; 8] = *b"MMCAPTUR";
pub const CAPTURE_VERSION: u32 = 1;
pub const HEADER_SIZE: u32 = 32;
pub const CHUNK_HEADER_SIZE: u32 = 16;

/// Decoded file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureHeader {
    pub version: u32,
    pub api: GraphicsApi,
    pub flags: u32,
    pub chunk_count: u32,
}

/// Tag of a chunk record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    FrameBegin,
    FrameEnd,
    Marker,
    CreateBuffer,
    CreateTexture,
    CreateProgram,
    BindVertexBuffer,
    BindIndexBuffer,
    BindTexture,
    BindProgram,
    SetMatrix,
    SetVector,
    Draw,
    DrawIndexed,
    /// A chunk this reader does not interpret; kept so indices stay stable.
    Unknown(u16),
}

impl ChunkKind {
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::FrameBegin,
            2 => Self::FrameEnd,
            3 => Self::Marker,
            16 => Self::CreateBuffer,
            17 => Self::CreateTexture,
            18 => Self::CreateProgram,
            32 => Self::BindVertexBuffer,
            33 => Self::BindIndexBuffer,
            34 => Self::BindTexture,
            35 => Self::BindProgram,
            36 => Self::SetMatrix,
            37 => Self::SetVector,
            48 => Self::Draw,
            49 => Self::DrawIndexed,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Self::FrameBegin => 1,
            Self::FrameEnd => 2,
            Self::Marker => 3,
            Self::CreateBuffer => 16,
            Self::CreateTexture => 17,
            Self::CreateProgram => 18,
            Self::BindVertexBuffer => 32,
            Self::BindIndexBuffer => 33,
            Self::BindTexture => 34,
            Self::BindProgram => 35,
            Self::SetMatrix => 36,
            Self::SetVector => 37,
            Self::Draw => 48,
            Self::DrawIndexed => 49,
            Self::Unknown(code) => code,
        }
    }

    /// Chunks that define a resource other chunks refer to by id
    pub fn is_creation(self) -> bool {
        matches!(
            self,
            Self::CreateBuffer | Self::CreateTexture | Self::CreateProgram
        )
    }

    pub fn is_draw(self) -> bool {
        matches!(self, Self::Draw | Self::DrawIndexed)
    }

    /// Chunks that change the bound pipeline state
    pub fn is_state_change(self) -> bool {
        matches!(
            self,
            Self::BindVertexBuffer
                | Self::BindIndexBuffer
                | Self::BindTexture
                | Self::BindProgram
                | Self::SetMatrix
                | Self::SetVector
        )
    }

    /// Exact payload size for fixed-layout chunks
    pub(crate) fn fixed_payload_len(self) -> Option<usize> {
        match self {
            Self::FrameBegin | Self::FrameEnd => Some(4),
            Self::BindVertexBuffer | Self::BindIndexBuffer | Self::BindTexture => Some(16),
            Self::BindProgram => Some(8),
            Self::SetMatrix => Some(4 + 64),
            Self::SetVector => Some(4 + 16),
            Self::Draw => Some(12),
            Self::DrawIndexed => Some(16),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_round_trip() {
        for code in 0u16..64 {
            assert_eq!(ChunkKind::from_code(code).code(), code);
        }
    }

    #[test]
    fn unknown_kinds_are_preserved() {
        assert_eq!(ChunkKind::from_code(999), ChunkKind::Unknown(999));
        assert!(!ChunkKind::Unknown(999).is_draw());
    }
}

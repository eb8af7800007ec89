//! Typed chunk payloads

use mapsmodels_core::ResourceId;

use crate::error::CaptureError;
use crate::format::ChunkKind;

/// Primitive topology of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    Other(u32),
}

impl Topology {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::PointList,
            1 => Self::LineList,
            2 => Self::LineStrip,
            3 => Self::TriangleList,
            4 => Self::TriangleStrip,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::PointList => 0,
            Self::LineList => 1,
            Self::LineStrip => 2,
            Self::TriangleList => 3,
            Self::TriangleStrip => 4,
            Self::Other(code) => code,
        }
    }

    pub fn is_triangles(self) -> bool {
        matches!(self, Self::TriangleList | Self::TriangleStrip)
    }
}

/// Width of the indices in an index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            _ => None,
        }
    }

    /// Size of one index in bytes, which is also its code
    pub fn size(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Index value that restarts a strip
    pub fn restart_value(self) -> u32 {
        match self {
            Self::U16 => 0xFFFF,
            Self::U32 => 0xFFFF_FFFF,
        }
    }
}

/// Declared usage of a buffer resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    Other(u32),
}

impl BufferUsage {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Vertex,
            2 => Self::Index,
            3 => Self::Uniform,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Vertex => 1,
            Self::Index => 2,
            Self::Uniform => 3,
            Self::Other(code) => code,
        }
    }
}

/// Dimensions and raw format code of a texture resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: u32,
}

/// One vertex attribute as declared by a program. Codes are kept raw; the
/// importer decides which semantics and component types it understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeRecord {
    pub semantic: u8,
    pub component_type: u8,
    pub components: u8,
    pub offset: u32,
}

pub(crate) const ATTRIBUTE_RECORD_SIZE: usize = 8;

/// Vertex input description of a shader program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramDesc {
    pub stride: u32,
    pub attributes: Vec<AttributeRecord>,
    pub name: Option<String>,
}

/// Parameters of a draw or indexed draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub topology: Topology,
    /// Vertex count for plain draws, index count for indexed draws
    pub count: u32,
    /// First vertex for plain draws, first index for indexed draws
    pub first: u32,
    pub base_vertex: i32,
    pub indexed: bool,
}

/// Decoded payload of a chunk
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkBody {
    FrameBegin { frame: u32 },
    FrameEnd { frame: u32 },
    Marker { label: String },
    CreateBuffer { usage: BufferUsage, data: Vec<u8> },
    CreateTexture { desc: TextureDesc, data: Vec<u8> },
    CreateProgram(ProgramDesc),
    BindVertexBuffer { slot: u32, offset: u32, buffer: ResourceId },
    BindIndexBuffer { format: IndexFormat, offset: u32, buffer: ResourceId },
    BindTexture { slot: u32, texture: ResourceId },
    BindProgram { program: ResourceId },
    SetMatrix { slot: u32, value: [f32; 16] },
    SetVector { slot: u32, value: [f32; 4] },
    Draw(DrawParams),
    Unknown { payload: Vec<u8> },
}

/// A chunk with its position in the capture
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub kind: ChunkKind,
    pub resource_id: ResourceId,
    pub body: ChunkBody,
}

impl ChunkBody {
    pub(crate) fn decode(
        index: usize,
        kind: ChunkKind,
        payload: Vec<u8>,
    ) -> Result<Self, CaptureError> {
        if let Some(expected) = kind.fixed_payload_len() {
            if payload.len() != expected {
                return Err(CaptureError::malformed(
                    index,
                    kind,
                    format!("payload is {} bytes, expected {}", payload.len(), expected),
                ));
            }
        }

        let mut p = Payload::new(&payload, index, kind);
        let body = match kind {
            ChunkKind::FrameBegin => ChunkBody::FrameBegin { frame: p.u32()? },
            ChunkKind::FrameEnd => ChunkBody::FrameEnd { frame: p.u32()? },
            ChunkKind::Marker => ChunkBody::Marker {
                label: String::from_utf8_lossy(&payload).into_owned(),
            },
            ChunkKind::CreateBuffer => {
                let usage = BufferUsage::from_code(p.u32()?);
                ChunkBody::CreateBuffer {
                    usage,
                    data: p.rest().to_vec(),
                }
            }
            ChunkKind::CreateTexture => {
                let desc = TextureDesc {
                    width: p.u32()?,
                    height: p.u32()?,
                    format: p.u32()?,
                };
                ChunkBody::CreateTexture {
                    desc,
                    data: p.rest().to_vec(),
                }
            }
            ChunkKind::CreateProgram => ChunkBody::CreateProgram(decode_program(&mut p)?),
            ChunkKind::BindVertexBuffer => ChunkBody::BindVertexBuffer {
                slot: p.u32()?,
                offset: p.u32()?,
                buffer: ResourceId(p.u64()?),
            },
            ChunkKind::BindIndexBuffer => {
                let code = p.u32()?;
                let format = IndexFormat::from_code(code).ok_or_else(|| {
                    CaptureError::malformed(index, kind, format!("index format {code}"))
                })?;
                ChunkBody::BindIndexBuffer {
                    format,
                    offset: p.u32()?,
                    buffer: ResourceId(p.u64()?),
                }
            }
            ChunkKind::BindTexture => {
                let slot = p.u32()?;
                let _reserved = p.u32()?;
                ChunkBody::BindTexture {
                    slot,
                    texture: ResourceId(p.u64()?),
                }
            }
            ChunkKind::BindProgram => ChunkBody::BindProgram {
                program: ResourceId(p.u64()?),
            },
            ChunkKind::SetMatrix => {
                let slot = p.u32()?;
                let mut value = [0.0f32; 16];
                for v in &mut value {
                    *v = p.f32()?;
                }
                ChunkBody::SetMatrix { slot, value }
            }
            ChunkKind::SetVector => {
                let slot = p.u32()?;
                let mut value = [0.0f32; 4];
                for v in &mut value {
                    *v = p.f32()?;
                }
                ChunkBody::SetVector { slot, value }
            }
            ChunkKind::Draw => ChunkBody::Draw(DrawParams {
                topology: Topology::from_code(p.u32()?),
                count: p.u32()?,
                first: p.u32()?,
                base_vertex: 0,
                indexed: false,
            }),
            ChunkKind::DrawIndexed => ChunkBody::Draw(DrawParams {
                topology: Topology::from_code(p.u32()?),
                count: p.u32()?,
                first: p.u32()?,
                base_vertex: p.i32()?,
                indexed: true,
            }),
            ChunkKind::Unknown(_) => ChunkBody::Unknown {
                payload: payload.clone(),
            },
        };
        Ok(body)
    }
}

fn decode_program(p: &mut Payload<'_>) -> Result<ProgramDesc, CaptureError> {
    let stride = p.u32()?;
    let count = p.u32()? as usize;
    if count.saturating_mul(ATTRIBUTE_RECORD_SIZE) > p.remaining() {
        return Err(p.error(format!("{count} attribute records do not fit the payload")));
    }

    let mut attributes = Vec::with_capacity(count);
    for _ in 0..count {
        let semantic = p.u8()?;
        let component_type = p.u8()?;
        let components = p.u8()?;
        let _reserved = p.u8()?;
        let offset = p.u32()?;
        attributes.push(AttributeRecord {
            semantic,
            component_type,
            components,
            offset,
        });
    }

    let name = p.rest();
    let name = (!name.is_empty()).then(|| String::from_utf8_lossy(name).into_owned());

    Ok(ProgramDesc {
        stride,
        attributes,
        name,
    })
}

/// Little-endian cursor over one chunk payload
struct Payload<'a> {
    bytes: &'a [u8],
    pos: usize,
    index: usize,
    kind: ChunkKind,
}

impl<'a> Payload<'a> {
    fn new(bytes: &'a [u8], index: usize, kind: ChunkKind) -> Self {
        Self {
            bytes,
            pos: 0,
            index,
            kind,
        }
    }

    fn error(&self, reason: String) -> CaptureError {
        CaptureError::malformed(self.index, self.kind, reason)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CaptureError> {
        if self.remaining() < N {
            return Err(self.error(format!("payload ends at byte {}", self.bytes.len())));
        }
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, CaptureError> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, CaptureError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32, CaptureError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64, CaptureError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    fn f32(&mut self) -> Result<f32, CaptureError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_fixed_payload_is_malformed() {
        let err = ChunkBody::decode(3, ChunkKind::BindProgram, vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, CaptureError::MalformedChunk { index: 3, .. }));
    }

    #[test]
    fn bad_index_format_is_malformed() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&3u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&9u64.to_le_bytes());
        let err = ChunkBody::decode(0, ChunkKind::BindIndexBuffer, payload).unwrap_err();
        assert!(matches!(err, CaptureError::MalformedChunk { .. }));
    }

    #[test]
    fn program_attribute_count_is_bounded() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&12u32.to_le_bytes());
        payload.extend_from_slice(&1000u32.to_le_bytes());
        let err = ChunkBody::decode(0, ChunkKind::CreateProgram, payload).unwrap_err();
        assert!(matches!(err, CaptureError::MalformedChunk { .. }));
    }

    #[test]
    fn program_without_name() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&12u32.to_le_bytes());
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&[0, 0, 3, 0]);
        payload.extend_from_slice(&0u32.to_le_bytes());
        let body = ChunkBody::decode(0, ChunkKind::CreateProgram, payload).unwrap();
        let ChunkBody::CreateProgram(desc) = body else {
            panic!("expected a program");
        };
        assert_eq!(desc.stride, 12);
        assert_eq!(desc.attributes.len(), 1);
        assert_eq!(desc.attributes[0].components, 3);
        assert_eq!(desc.name, None);
    }

    #[test]
    fn topology_helpers() {
        assert!(Topology::TriangleStrip.is_triangles());
        assert!(!Topology::LineList.is_triangles());
        assert_eq!(Topology::from_code(77), Topology::Other(77));
        assert_eq!(IndexFormat::U16.restart_value(), 0xFFFF);
    }
}

use std::fs;
use std::path::Path;

use mapsmodels_core::{GraphicsApi, ResourceId};

use crate::chunk::{BufferUsage, IndexFormat, ProgramDesc, TextureDesc, Topology};
use crate::error::CaptureError;
use crate::format::{ChunkKind, CAPTURE_MAGIC, CAPTURE_VERSION, HEADER_SIZE};

/// Builds a capture container in memory, one chunk per call.
pub struct CaptureWriter {
    api: GraphicsApi,
    chunk_count: u32,
    body: Vec<u8>,
}

impl CaptureWriter {
    pub fn new(api: GraphicsApi) -> Self {
        Self {
            api,
            chunk_count: 0,
            body: Vec::new(),
        }
    }

    /// Number of chunks written so far; also the index of the next chunk.
    pub fn chunk_count(&self) -> usize {
        self.chunk_count as usize
    }

    /// Append a chunk with an arbitrary kind code and payload.
    pub fn raw_chunk(&mut self, kind: u16, resource_id: ResourceId, payload: &[u8]) -> &mut Self {
        self.body.extend_from_slice(&kind.to_le_bytes());
        self.body.extend_from_slice(&0u16.to_le_bytes());
        self.body
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.body.extend_from_slice(&resource_id.0.to_le_bytes());
        self.body.extend_from_slice(payload);
        self.chunk_count += 1;
        self
    }

    fn chunk(&mut self, kind: ChunkKind, resource_id: ResourceId, payload: &[u8]) -> &mut Self {
        self.raw_chunk(kind.code(), resource_id, payload)
    }

    pub fn frame_begin(&mut self, frame: u32) -> &mut Self {
        self.chunk(ChunkKind::FrameBegin, ResourceId::NONE, &frame.to_le_bytes())
    }

    pub fn frame_end(&mut self, frame: u32) -> &mut Self {
        self.chunk(ChunkKind::FrameEnd, ResourceId::NONE, &frame.to_le_bytes())
    }

    pub fn marker(&mut self, label: &str) -> &mut Self {
        self.chunk(ChunkKind::Marker, ResourceId::NONE, label.as_bytes())
    }

    pub fn create_buffer(&mut self, id: ResourceId, usage: BufferUsage, data: &[u8]) -> &mut Self {
        let mut payload = Vec::with_capacity(4 + data.len());
        payload.extend_from_slice(&usage.code().to_le_bytes());
        payload.extend_from_slice(data);
        self.chunk(ChunkKind::CreateBuffer, id, &payload)
    }

    /// Create a vertex buffer from plain `f32` data.
    pub fn create_vertex_buffer_f32(&mut self, id: ResourceId, data: &[f32]) -> &mut Self {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.create_buffer(id, BufferUsage::Vertex, &bytes)
    }

    /// Create an index buffer holding `u16` indices.
    pub fn create_index_buffer_u16(&mut self, id: ResourceId, indices: &[u16]) -> &mut Self {
        let bytes: Vec<u8> = indices.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.create_buffer(id, BufferUsage::Index, &bytes)
    }

    /// Create an index buffer holding `u32` indices.
    pub fn create_index_buffer_u32(&mut self, id: ResourceId, indices: &[u32]) -> &mut Self {
        let bytes: Vec<u8> = indices.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.create_buffer(id, BufferUsage::Index, &bytes)
    }

    pub fn create_texture(&mut self, id: ResourceId, desc: TextureDesc, data: &[u8]) -> &mut Self {
        let mut payload = Vec::with_capacity(12 + data.len());
        payload.extend_from_slice(&desc.width.to_le_bytes());
        payload.extend_from_slice(&desc.height.to_le_bytes());
        payload.extend_from_slice(&desc.format.to_le_bytes());
        payload.extend_from_slice(data);
        self.chunk(ChunkKind::CreateTexture, id, &payload)
    }

    pub fn create_program(&mut self, id: ResourceId, desc: &ProgramDesc) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&desc.stride.to_le_bytes());
        payload.extend_from_slice(&(desc.attributes.len() as u32).to_le_bytes());
        for attr in &desc.attributes {
            payload.extend_from_slice(&[attr.semantic, attr.component_type, attr.components, 0]);
            payload.extend_from_slice(&attr.offset.to_le_bytes());
        }
        if let Some(name) = &desc.name {
            payload.extend_from_slice(name.as_bytes());
        }
        self.chunk(ChunkKind::CreateProgram, id, &payload)
    }

    pub fn bind_vertex_buffer(&mut self, slot: u32, buffer: ResourceId, offset: u32) -> &mut Self {
        let mut payload = Vec::with_capacity(16);
        payload.extend_from_slice(&slot.to_le_bytes());
        payload.extend_from_slice(&offset.to_le_bytes());
        payload.extend_from_slice(&buffer.0.to_le_bytes());
        self.chunk(ChunkKind::BindVertexBuffer, ResourceId::NONE, &payload)
    }

    pub fn bind_index_buffer(
        &mut self,
        buffer: ResourceId,
        format: IndexFormat,
        offset: u32,
    ) -> &mut Self {
        let mut payload = Vec::with_capacity(16);
        payload.extend_from_slice(&(format.size() as u32).to_le_bytes());
        payload.extend_from_slice(&offset.to_le_bytes());
        payload.extend_from_slice(&buffer.0.to_le_bytes());
        self.chunk(ChunkKind::BindIndexBuffer, ResourceId::NONE, &payload)
    }

    pub fn bind_texture(&mut self, slot: u32, texture: ResourceId) -> &mut Self {
        let mut payload = Vec::with_capacity(16);
        payload.extend_from_slice(&slot.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&texture.0.to_le_bytes());
        self.chunk(ChunkKind::BindTexture, ResourceId::NONE, &payload)
    }

    pub fn bind_program(&mut self, program: ResourceId) -> &mut Self {
        self.chunk(ChunkKind::BindProgram, ResourceId::NONE, &program.0.to_le_bytes())
    }

    /// Set a matrix uniform; `value` is column-major.
    pub fn set_matrix(&mut self, slot: u32, value: [f32; 16]) -> &mut Self {
        let mut payload = Vec::with_capacity(68);
        payload.extend_from_slice(&slot.to_le_bytes());
        payload.extend_from_slice(bytemuck::cast_slice(&value.map(f32::to_bits).map(u32::to_le)));
        self.chunk(ChunkKind::SetMatrix, ResourceId::NONE, &payload)
    }

    pub fn set_vector(&mut self, slot: u32, value: [f32; 4]) -> &mut Self {
        let mut payload = Vec::with_capacity(20);
        payload.extend_from_slice(&slot.to_le_bytes());
        payload.extend_from_slice(bytemuck::cast_slice(&value.map(f32::to_bits).map(u32::to_le)));
        self.chunk(ChunkKind::SetVector, ResourceId::NONE, &payload)
    }

    pub fn draw(&mut self, topology: Topology, vertex_count: u32, first_vertex: u32) -> &mut Self {
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&topology.code().to_le_bytes());
        payload.extend_from_slice(&vertex_count.to_le_bytes());
        payload.extend_from_slice(&first_vertex.to_le_bytes());
        self.chunk(ChunkKind::Draw, ResourceId::NONE, &payload)
    }

    pub fn draw_indexed(
        &mut self,
        topology: Topology,
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
    ) -> &mut Self {
        let mut payload = Vec::with_capacity(16);
        payload.extend_from_slice(&topology.code().to_le_bytes());
        payload.extend_from_slice(&index_count.to_le_bytes());
        payload.extend_from_slice(&first_index.to_le_bytes());
        payload.extend_from_slice(&base_vertex.to_le_bytes());
        self.chunk(ChunkKind::DrawIndexed, ResourceId::NONE, &payload)
    }

    /// Produce the finished container.
    pub fn finish(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE as usize + self.body.len());
        out.extend_from_slice(&CAPTURE_MAGIC);
        out.extend_from_slice(&HEADER_SIZE.to_le_bytes());
        out.extend_from_slice(&CAPTURE_VERSION.to_le_bytes());
        out.extend_from_slice(&self.api.code().to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&self.chunk_count.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<(), CaptureError> {
        fs::write(path, self.finish())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::chunk::{AttributeRecord, ChunkBody};
    use crate::reader::CaptureReader;

    #[test]
    fn header_layout() {
        let bytes = CaptureWriter::new(GraphicsApi::Vulkan).finish();
        assert_eq!(bytes.len(), HEADER_SIZE as usize);
        assert_eq!(&bytes[..8], b"MMCAPTUR");
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 1);
    }

    #[test]
    fn state_chunks_decode_back() {
        let mut w = CaptureWriter::new(GraphicsApi::OpenGl);
        let mut model = [0.0f32; 16];
        model[0] = 2.0;
        model[12] = -3.5;
        w.set_matrix(0, model)
            .set_vector(0, [0.25, 0.5, 2.0, 4.0])
            .bind_index_buffer(ResourceId(4), IndexFormat::U32, 8)
            .draw_indexed(Topology::TriangleStrip, 6, 2, -1)
            .create_program(
                ResourceId(9),
                &ProgramDesc {
                    stride: 20,
                    attributes: vec![AttributeRecord {
                        semantic: 2,
                        component_type: 0,
                        components: 2,
                        offset: 12,
                    }],
                    name: Some("tile".into()),
                },
            );

        let capture = CaptureReader::open(Cursor::new(w.finish())).unwrap();
        assert_eq!(
            capture.chunk(0).unwrap().body,
            ChunkBody::SetMatrix { slot: 0, value: model }
        );
        assert_eq!(
            capture.chunk(1).unwrap().body,
            ChunkBody::SetVector {
                slot: 0,
                value: [0.25, 0.5, 2.0, 4.0]
            }
        );
        assert_eq!(
            capture.chunk(2).unwrap().body,
            ChunkBody::BindIndexBuffer {
                format: IndexFormat::U32,
                offset: 8,
                buffer: ResourceId(4)
            }
        );
        match capture.chunk(3).unwrap().body {
            ChunkBody::Draw(params) => {
                assert!(params.indexed);
                assert_eq!(params.base_vertex, -1);
                assert_eq!(params.topology, Topology::TriangleStrip);
            }
            other => panic!("unexpected body: {other:?}"),
        }
        match capture.chunk(4).unwrap().body {
            ChunkBody::CreateProgram(desc) => {
                assert_eq!(desc.name.as_deref(), Some("tile"));
                assert_eq!(desc.attributes[0].offset, 12);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn unknown_chunks_are_kept() {
        let mut w = CaptureWriter::new(GraphicsApi::OpenGl);
        w.raw_chunk(0x7777, ResourceId::NONE, &[1, 2, 3]);
        let capture = CaptureReader::open(Cursor::new(w.finish())).unwrap();
        assert_eq!(capture.entry(0).unwrap().kind, ChunkKind::Unknown(0x7777));
        assert_eq!(
            capture.chunk(0).unwrap().body,
            ChunkBody::Unknown {
                payload: vec![1, 2, 3]
            }
        );
    }
}

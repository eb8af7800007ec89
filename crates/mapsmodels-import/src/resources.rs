use std::collections::HashMap;
use std::io::{Read, Seek};
use std::sync::Arc;

use mapsmodels_capture::{CaptureReader, ChunkBody};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::ImportError;
use crate::layout::VertexLayout;
use crate::state::ResourceRef;

type Cached<T> = Result<Arc<T>, ImportError>;

/// Buffer payloads and vertex layouts decoded during one import.
///
/// Lookups of the same [`ResourceRef`] return the same `Arc`. Failures are
/// cached as well so a broken resource is read once.
#[derive(Default)]
pub struct ResourceCache {
    buffers: Mutex<HashMap<ResourceRef, Cached<Vec<u8>>>>,
    layouts: Mutex<HashMap<ResourceRef, Cached<VertexLayout>>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data of the buffer created at `buffer.chunk`.
    pub fn buffer<R: Read + Seek>(
        &self,
        capture: &CaptureReader<R>,
        buffer: ResourceRef,
    ) -> Cached<Vec<u8>> {
        if let Some(cached) = self.buffers.lock().get(&buffer) {
            return cached.clone();
        }

        let loaded = load_buffer(capture, buffer);
        // keep whatever a concurrent decoder stored first
        self.buffers
            .lock()
            .entry(buffer)
            .or_insert(loaded)
            .clone()
    }

    /// Vertex layout of the program created at `program.chunk`.
    pub fn layout<R: Read + Seek>(
        &self,
        capture: &CaptureReader<R>,
        program: ResourceRef,
    ) -> Cached<VertexLayout> {
        if let Some(cached) = self.layouts.lock().get(&program) {
            return cached.clone();
        }

        let loaded = load_layout(capture, program);
        self.layouts
            .lock()
            .entry(program)
            .or_insert(loaded)
            .clone()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }
}

fn load_buffer<R: Read + Seek>(
    capture: &CaptureReader<R>,
    buffer: ResourceRef,
) -> Cached<Vec<u8>> {
    let chunk = capture
        .chunk(buffer.chunk)
        .map_err(ImportError::from_resource_read)?;
    let ChunkBody::CreateBuffer { data, .. } = chunk.body else {
        return Err(ImportError::CorruptResource(format!(
            "chunk {} for buffer {} is {:?}",
            buffer.chunk, buffer.id, chunk.kind
        )));
    };
    debug!("Loaded buffer {} ({} bytes)", buffer.id, data.len());
    Ok(Arc::new(data))
}

fn load_layout<R: Read + Seek>(
    capture: &CaptureReader<R>,
    program: ResourceRef,
) -> Cached<VertexLayout> {
    let chunk = capture
        .chunk(program.chunk)
        .map_err(ImportError::from_resource_read)?;
    let ChunkBody::CreateProgram(desc) = chunk.body else {
        return Err(ImportError::CorruptResource(format!(
            "chunk {} for program {} is {:?}",
            program.chunk, program.id, chunk.kind
        )));
    };
    let layout = VertexLayout::from_program(&desc)?;
    debug!(
        "Program {} ({}): stride {}",
        program.id,
        desc.name.as_deref().unwrap_or("unnamed"),
        layout.stride
    );
    Ok(Arc::new(layout))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use mapsmodels_capture::{AttributeRecord, BufferUsage, CaptureWriter, ProgramDesc};
    use mapsmodels_core::{GraphicsApi, ResourceId};

    use super::*;

    fn capture() -> CaptureReader<Cursor<Vec<u8>>> {
        let mut w = CaptureWriter::new(GraphicsApi::OpenGl);
        w.create_buffer(ResourceId(1), BufferUsage::Vertex, &[1, 2, 3, 4])
            .create_program(
                ResourceId(2),
                &ProgramDesc {
                    stride: 12,
                    attributes: vec![AttributeRecord {
                        semantic: 0,
                        component_type: 0,
                        components: 3,
                        offset: 0,
                    }],
                    name: Some("tile".into()),
                },
            )
            .create_program(
                ResourceId(3),
                &ProgramDesc {
                    stride: 12,
                    attributes: vec![AttributeRecord {
                        semantic: 0,
                        component_type: 200,
                        components: 3,
                        offset: 0,
                    }],
                    name: None,
                },
            );
        CaptureReader::open(Cursor::new(w.finish())).unwrap()
    }

    #[test]
    fn buffers_are_shared() {
        let capture = capture();
        let cache = ResourceCache::new();
        let r = ResourceRef {
            id: ResourceId(1),
            chunk: 0,
        };
        let a = cache.buffer(&capture, r).unwrap();
        let b = cache.buffer(&capture, r).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a, vec![1, 2, 3, 4]);
        assert_eq!(cache.buffer_count(), 1);
    }

    #[test]
    fn wrong_chunk_is_corrupt() {
        let capture = capture();
        let cache = ResourceCache::new();
        let r = ResourceRef {
            id: ResourceId(1),
            chunk: 1,
        };
        assert!(matches!(
            cache.buffer(&capture, r),
            Err(ImportError::CorruptResource(_))
        ));
    }

    #[test]
    fn layout_failures_are_cached() {
        let capture = capture();
        let cache = ResourceCache::new();
        let good = ResourceRef {
            id: ResourceId(2),
            chunk: 1,
        };
        let bad = ResourceRef {
            id: ResourceId(3),
            chunk: 2,
        };
        assert_eq!(cache.layout(&capture, good).unwrap().stride, 12);
        let first = cache.layout(&capture, bad).unwrap_err();
        assert_eq!(cache.layout(&capture, bad).unwrap_err(), first);
        assert!(matches!(first, ImportError::UnsupportedFormat(_)));
    }
}

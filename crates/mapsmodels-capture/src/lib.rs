//! MapsModels Capture - GPU capture container
//!
//! A capture is a header followed by a flat sequence of tagged chunks: resource
//! creations, state changes, draws and frame markers. [`CaptureReader`] indexes
//! the chunk headers on open and decodes payloads on demand; [`CaptureWriter`]
//! produces the same container.

mod chunk;
mod error;
mod format;
mod reader;
mod writer;

pub use chunk::{
    AttributeRecord, BufferUsage, Chunk, ChunkBody, DrawParams, IndexFormat, ProgramDesc,
    TextureDesc, Topology,
};
pub use error::CaptureError;
pub use format::{
    CaptureHeader, ChunkKind, CAPTURE_MAGIC, CAPTURE_VERSION, CHUNK_HEADER_SIZE, HEADER_SIZE,
};
pub use reader::{CaptureReader, ChunkEntry};
pub use writer::CaptureWriter;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use mapsmodels_core::{GraphicsApi, ResourceId};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::chunk::{Chunk, ChunkBody};
use crate::error::CaptureError;
use crate::format::{
    CaptureHeader, ChunkKind, CAPTURE_MAGIC, CAPTURE_VERSION, CHUNK_HEADER_SIZE, HEADER_SIZE,
};

/// Index entry for one chunk; the payload itself stays on disk until asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEntry {
    pub kind: ChunkKind,
    pub resource_id: ResourceId,
    pub payload_offset: u64,
    pub payload_len: u32,
}

/// An opened capture.
///
/// Opening validates the header and walks every chunk header once, seeking over
/// payloads, so a truncated file is rejected up front. Payload reads go through
/// a mutex around the underlying handle, which makes `&CaptureReader` usable
/// from several worker threads. The handle is released when the reader drops.
pub struct CaptureReader<R = BufReader<File>> {
    reader: Mutex<R>,
    header: CaptureHeader,
    entries: Vec<ChunkEntry>,
    creations: HashMap<ResourceId, Vec<usize>>,
}

impl CaptureReader<BufReader<File>> {
    /// Open a capture file from disk.
    pub fn open_path(path: &Path) -> Result<Self, CaptureError> {
        let file = File::open(path).map_err(|e| CaptureError::Open(path.to_path_buf(), e))?;
        debug!("Opened capture {}", path.display());
        Self::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> CaptureReader<R> {
    pub fn open(mut reader: R) -> Result<Self, CaptureError> {
        // Lengths in the file are untrusted; check them against the real size.
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        if file_len < HEADER_SIZE as u64 {
            return Err(CaptureError::Truncated(format!(
                "file is {file_len} bytes, header needs {HEADER_SIZE}"
            )));
        }
        let header = read_header(&mut reader)?;

        let mut entries = Vec::with_capacity(header.chunk_count.min(1 << 20) as usize);
        let mut creations: HashMap<ResourceId, Vec<usize>> = HashMap::new();
        let mut pos = HEADER_SIZE as u64;
        for index in 0..header.chunk_count as usize {
            if pos + CHUNK_HEADER_SIZE as u64 > file_len {
                return Err(CaptureError::Truncated(format!(
                    "chunk {index} header at byte {pos} is past end of file ({file_len} bytes)"
                )));
            }
            reader.seek(SeekFrom::Start(pos))?;
            let kind = ChunkKind::from_code(read_u16(&mut reader)?);
            let _flags = read_u16(&mut reader)?;
            let payload_len = read_u32(&mut reader)?;
            let resource_id = ResourceId(read_u64(&mut reader)?);

            let payload_offset = pos + CHUNK_HEADER_SIZE as u64;
            let payload_end = payload_offset + payload_len as u64;
            if payload_end > file_len {
                return Err(CaptureError::Truncated(format!(
                    "chunk {index} ({kind:?}) payload ends at byte {payload_end}, file has {file_len}"
                )));
            }

            if kind.is_creation() {
                creations.entry(resource_id).or_default().push(index);
            }
            entries.push(ChunkEntry {
                kind,
                resource_id,
                payload_offset,
                payload_len,
            });
            pos = payload_end;
        }

        if pos < file_len {
            warn!(
                "Ignoring {} trailing bytes after the last chunk",
                file_len - pos
            );
        }
        debug!(
            "Indexed {} chunks ({} api, version {})",
            entries.len(),
            header.api,
            header.version
        );

        Ok(Self {
            reader: Mutex::new(reader),
            header,
            entries,
            creations,
        })
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    pub fn chunk_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, index: usize) -> Option<&ChunkEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[ChunkEntry] {
        &self.entries
    }

    /// Read the raw payload bytes of a chunk.
    pub fn read_payload(&self, index: usize) -> Result<Vec<u8>, CaptureError> {
        let entry = self
            .entries
            .get(index)
            .ok_or(CaptureError::ChunkOutOfRange(index))?;
        let mut payload = vec![0u8; entry.payload_len as usize];
        let mut reader = self.reader.lock();
        reader.seek(SeekFrom::Start(entry.payload_offset))?;
        reader.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Read and decode one chunk.
    pub fn chunk(&self, index: usize) -> Result<Chunk, CaptureError> {
        let entry = *self
            .entries
            .get(index)
            .ok_or(CaptureError::ChunkOutOfRange(index))?;
        let payload = self.read_payload(index)?;
        Ok(Chunk {
            index,
            kind: entry.kind,
            resource_id: entry.resource_id,
            body: ChunkBody::decode(index, entry.kind, payload)?,
        })
    }

    /// Lazily decode the chunks whose kind is in `kinds`, in capture order.
    /// Payloads of other chunks are never read.
    pub fn chunks_of_kind<'a>(
        &'a self,
        kinds: &'a [ChunkKind],
    ) -> impl Iterator<Item = Result<Chunk, CaptureError>> + 'a {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, entry)| kinds.contains(&entry.kind))
            .map(move |(index, _)| self.chunk(index))
    }

    /// Chunk indices of every creation of `id`, in capture order.
    pub fn resource_chunks(&self, id: ResourceId) -> &[usize] {
        self.creations.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The creation of `id` in effect just before chunk `before`.
    pub fn latest_creation(&self, id: ResourceId, before: usize) -> Option<usize> {
        let chunks = self.resource_chunks(id);
        let n = chunks.partition_point(|&c| c < before);
        n.checked_sub(1).map(|i| chunks[i])
    }
}

fn read_header<R: Read>(reader: &mut R) -> Result<CaptureHeader, CaptureError> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if magic != CAPTURE_MAGIC {
        return Err(CaptureError::InvalidMagic);
    }

    let header_size = read_u32(reader)?;
    if header_size != HEADER_SIZE {
        return Err(CaptureError::UnsupportedHeaderSize(header_size));
    }
    let version = read_u32(reader)?;
    if version == 0 || version > CAPTURE_VERSION {
        return Err(CaptureError::UnsupportedVersion(version));
    }
    let api_code = read_u32(reader)?;
    let api = GraphicsApi::from_code(api_code).ok_or(CaptureError::UnknownApi(api_code))?;
    let flags = read_u32(reader)?;
    let chunk_count = read_u32(reader)?;
    let _reserved = read_u32(reader)?;

    Ok(CaptureHeader {
        version,
        api,
        flags,
        chunk_count,
    })
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16, CaptureError> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, CaptureError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64, CaptureError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

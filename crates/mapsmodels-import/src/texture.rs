//! Texture decoding and deduplication
//!
//! Every bound texture is decoded to RGBA8 once per import. Requests for the
//! same resource share one [`Texture`] through an `Arc`.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use mapsmodels_capture::{CaptureReader, ChunkBody, TextureDesc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::ImportError;
use crate::state::ResourceRef;

/// Codes from this one up are block-compressed formats.
pub const FIRST_COMPRESSED_FORMAT: u32 = 100;

/// Pixel format of a texture payload in the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
    Rgb8,
    /// Single channel, expanded to grey
    R8,
    Rgb565,
    Rgba4444,
}

impl PixelFormat {
    pub fn from_code(code: u32) -> Result<Self, ImportError> {
        match code {
            1 => Ok(Self::Rgba8),
            2 => Ok(Self::Bgra8),
            3 => Ok(Self::Rgb8),
            4 => Ok(Self::R8),
            5 => Ok(Self::Rgb565),
            6 => Ok(Self::Rgba4444),
            c if c >= FIRST_COMPRESSED_FORMAT => Err(ImportError::UnsupportedFormat(format!(
                "compressed texture format {c}"
            ))),
            c => Err(ImportError::UnsupportedFormat(format!(
                "unknown texture format {c}"
            ))),
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 => 4,
            Self::Rgb8 => 3,
            Self::R8 => 1,
            Self::Rgb565 | Self::Rgba4444 => 2,
        }
    }
}

/// A decoded texture, always RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub source: ResourceRef,
    pub width: u32,
    pub height: u32,
    pub source_format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl Texture {
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
    }
}

/// Decode a texture payload to RGBA8. Bytes past the base level are ignored.
pub fn decode_texture(
    source: ResourceRef,
    desc: TextureDesc,
    data: &[u8],
) -> Result<Texture, ImportError> {
    let format = PixelFormat::from_code(desc.format)?;
    if desc.width == 0 || desc.height == 0 {
        return Err(ImportError::CorruptResource(format!(
            "texture {} is {}x{}",
            source.id, desc.width, desc.height
        )));
    }

    let needed = (desc.width as u64)
        .checked_mul(desc.height as u64)
        .and_then(|n| n.checked_mul(format.bytes_per_pixel() as u64))
        .and_then(|n| usize::try_from(n).ok())
        .filter(|&n| n <= data.len())
        .ok_or_else(|| {
            ImportError::CorruptResource(format!(
                "texture {} ({}x{} {:?}) has only {} bytes",
                source.id,
                desc.width,
                desc.height,
                format,
                data.len()
            ))
        })?;
    let data = &data[..needed];
    let (w, h) = (desc.width, desc.height);

    let pixels = match format {
        PixelFormat::Rgba8 => data.to_vec(),
        PixelFormat::Rgb8 => RgbImage::from_raw(w, h, data.to_vec())
            .map(|img| DynamicImage::ImageRgb8(img).to_rgba8().into_raw())
            .ok_or_else(|| ImportError::CorruptResource("RGB8 payload size".into()))?,
        PixelFormat::R8 => GrayImage::from_raw(w, h, data.to_vec())
            .map(|img| DynamicImage::ImageLuma8(img).to_rgba8().into_raw())
            .ok_or_else(|| ImportError::CorruptResource("R8 payload size".into()))?,
        PixelFormat::Bgra8 => data
            .chunks_exact(4)
            .flat_map(|p| [p[2], p[1], p[0], p[3]])
            .collect(),
        PixelFormat::Rgb565 => data
            .chunks_exact(2)
            .flat_map(|p| {
                let v = u16::from_le_bytes([p[0], p[1]]);
                let r = (v >> 11) as u8 & 0x1F;
                let g = (v >> 5) as u8 & 0x3F;
                let b = v as u8 & 0x1F;
                [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2), 255]
            })
            .collect(),
        PixelFormat::Rgba4444 => data
            .chunks_exact(2)
            .flat_map(|p| {
                let v = u16::from_le_bytes([p[0], p[1]]);
                [12, 8, 4, 0].map(|shift| ((v >> shift) as u8 & 0x0F) * 17)
            })
            .collect(),
    };

    Ok(Texture {
        source,
        width: w,
        height: h,
        source_format: format,
        pixels,
    })
}

/// Decoded textures of one import, keyed by the creation they came from.
#[derive(Default)]
pub struct TextureCache {
    textures: Mutex<HashMap<ResourceRef, Result<Arc<Texture>, ImportError>>>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The texture created at `texture.chunk`, decoded on first request.
    pub fn get_or_decode<R: Read + Seek>(
        &self,
        capture: &CaptureReader<R>,
        texture: ResourceRef,
    ) -> Result<Arc<Texture>, ImportError> {
        if let Some(cached) = self.textures.lock().get(&texture) {
            return cached.clone();
        }

        let decoded = load_texture(capture, texture);
        match &decoded {
            Ok(t) => debug!(
                "Decoded texture {} ({}x{} {:?})",
                texture.id, t.width, t.height, t.source_format
            ),
            Err(e) => debug!("Texture {} failed to decode: {}", texture.id, e),
        }
        // a concurrent decoder may have stored the same texture meanwhile;
        // the first stored instance is the shared one
        self.textures
            .lock()
            .entry(texture)
            .or_insert(decoded)
            .clone()
    }

    /// Number of distinct texture resources requested so far.
    pub fn len(&self) -> usize {
        self.textures.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn load_texture<R: Read + Seek>(
    capture: &CaptureReader<R>,
    texture: ResourceRef,
) -> Result<Arc<Texture>, ImportError> {
    let chunk = capture
        .chunk(texture.chunk)
        .map_err(ImportError::from_resource_read)?;
    let ChunkBody::CreateTexture { desc, data } = chunk.body else {
        return Err(ImportError::CorruptResource(format!(
            "chunk {} for texture {} is {:?}",
            texture.chunk, texture.id, chunk.kind
        )));
    };
    decode_texture(texture, desc, &data).map(Arc::new)
}

/// Write each texture once as `texture_<id>.png` under `dir`. A resource id
/// created more than once gets its creation chunk appended. Failures are
/// logged and skipped; the written paths are returned.
pub fn export_textures(textures: &[Arc<Texture>], dir: &Path) -> Vec<PathBuf> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Cannot create texture directory {}: {}", dir.display(), e);
        return Vec::new();
    }

    let mut used = HashSet::new();
    let mut written = Vec::new();
    for texture in textures {
        let id = texture.source.id.0;
        let name = if used.insert(id) {
            format!("texture_{id}.png")
        } else {
            format!("texture_{id}_{}.png", texture.source.chunk)
        };
        let path = dir.join(name);

        let Some(image) = texture.to_image() else {
            warn!("Texture {} has an inconsistent pixel buffer", texture.source.id);
            continue;
        };
        match image.save(&path) {
            Ok(()) => written.push(path),
            Err(e) => warn!("Failed to write {}: {}", path.display(), e),
        }
    }

    debug!("Exported {} textures to {}", written.len(), dir.display());
    written
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use mapsmodels_capture::CaptureWriter;
    use mapsmodels_core::{GraphicsApi, ResourceId};

    use super::*;

    fn source(id: u64) -> ResourceRef {
        ResourceRef {
            id: ResourceId(id),
            chunk: 0,
        }
    }

    fn desc(width: u32, height: u32, format: u32) -> TextureDesc {
        TextureDesc {
            width,
            height,
            format,
        }
    }

    #[test]
    fn decode_formats() {
        let t = decode_texture(source(1), desc(1, 1, 2), &[1, 2, 3, 4]).unwrap();
        assert_eq!(t.pixels, vec![3, 2, 1, 4]);

        let t = decode_texture(source(1), desc(2, 1, 3), &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(t.pixels, vec![1, 2, 3, 255, 4, 5, 6, 255]);

        let t = decode_texture(source(1), desc(1, 1, 4), &[77]).unwrap();
        assert_eq!(t.pixels, vec![77, 77, 77, 255]);

        let red = 0xF800u16.to_le_bytes();
        let t = decode_texture(source(1), desc(1, 1, 5), &red).unwrap();
        assert_eq!(t.pixels, vec![255, 0, 0, 255]);

        let v = 0x1F0Fu16.to_le_bytes();
        let t = decode_texture(source(1), desc(1, 1, 6), &v).unwrap();
        assert_eq!(t.pixels, vec![17, 255, 0, 255]);
    }

    #[test]
    fn trailing_mip_bytes_are_ignored() {
        let t = decode_texture(source(1), desc(1, 1, 1), &[9, 8, 7, 6, 0, 0]).unwrap();
        assert_eq!(t.pixels, vec![9, 8, 7, 6]);
    }

    #[test]
    fn compressed_and_unknown_formats_are_unsupported() {
        for code in [0, 7, 100, 131] {
            let err = decode_texture(source(1), desc(4, 4, code), &[0; 64]).unwrap_err();
            assert!(matches!(err, ImportError::UnsupportedFormat(_)));
        }
    }

    #[test]
    fn short_or_empty_payload_is_corrupt() {
        let err = decode_texture(source(1), desc(2, 2, 1), &[0; 15]).unwrap_err();
        assert!(matches!(err, ImportError::CorruptResource(_)));
        let err = decode_texture(source(1), desc(0, 2, 1), &[]).unwrap_err();
        assert!(matches!(err, ImportError::CorruptResource(_)));
    }

    #[test]
    fn cache_shares_one_instance() {
        let mut w = CaptureWriter::new(GraphicsApi::OpenGl);
        w.create_texture(ResourceId(5), desc(1, 1, 1), &[1, 2, 3, 4])
            .create_texture(ResourceId(6), desc(1, 1, 120), &[0; 8]);
        let capture = CaptureReader::open(Cursor::new(w.finish())).unwrap();
        let cache = TextureCache::new();
        let r = ResourceRef {
            id: ResourceId(5),
            chunk: 0,
        };

        let copies: Vec<_> = (0..4)
            .map(|_| cache.get_or_decode(&capture, r).unwrap())
            .collect();
        assert!(copies.iter().all(|t| Arc::ptr_eq(t, &copies[0])));
        assert_eq!(cache.len(), 1);

        let bad = ResourceRef {
            id: ResourceId(6),
            chunk: 1,
        };
        assert!(cache.get_or_decode(&capture, bad).is_err());
        assert!(cache.get_or_decode(&capture, bad).is_err());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn export_writes_png_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = Arc::new(decode_texture(source(3), desc(1, 1, 1), &[1, 2, 3, 4]).unwrap());
        let mut b_source = source(3);
        b_source.chunk = 9;
        let b = Arc::new(decode_texture(b_source, desc(1, 1, 1), &[5, 6, 7, 8]).unwrap());

        let written = export_textures(&[a, b], &dir.path().join("textures"));
        assert_eq!(written.len(), 2);
        assert!(written[0].ends_with("texture_3.png"));
        assert!(written[1].ends_with("texture_3_9.png"));

        let reloaded = image::open(&written[1]).unwrap().to_rgba8();
        assert_eq!(reloaded.into_raw(), vec![5, 6, 7, 8]);
    }
}

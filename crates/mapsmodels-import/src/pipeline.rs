//! The capture import pipeline
//!
//! select draws -> read state log -> resolve bindings -> decode geometry and
//! textures per draw (optionally on the rayon pool) -> assemble the scene.

use std::io::{Read, Seek};
use std::path::Path;

use mapsmodels_capture::CaptureReader;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ImportError;
use crate::geometry::{build_mesh, GeometryInput, IndexInput};
use crate::preferences::ImportPreferences;
use crate::resources::ResourceCache;
use crate::scene::{DegradedTexture, DrawGeometry, ImportedScene, SceneAssembler};
use crate::selector::select_draw_calls;
use crate::state::{ExtractionStrategy, ResolvedBindings, StateLog};
use crate::texture::{export_textures, TextureCache};

/// What to import from a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    /// Number of draw calls to import; `<= 0` imports all of them
    pub max_blocks: i64,
    pub strategy: ExtractionStrategy,
    /// Frame marker to import instead of the first frame with draws
    pub frame: Option<u32>,
}

impl ImportRequest {
    pub fn new(max_blocks: i64, use_experimental: bool) -> Self {
        Self {
            max_blocks,
            strategy: ExtractionStrategy::from_flag(use_experimental),
            frame: None,
        }
    }

    pub fn with_frame(mut self, frame: u32) -> Self {
        self.frame = Some(frame);
        self
    }
}

impl Default for ImportRequest {
    fn default() -> Self {
        Self::new(-1, false)
    }
}

/// Import the capture at `path`.
pub fn import_capture(
    path: &Path,
    max_blocks: i64,
    use_experimental: bool,
    prefs: &ImportPreferences,
) -> Result<ImportedScene, ImportError> {
    import_with_request(path, &ImportRequest::new(max_blocks, use_experimental), prefs)
}

pub fn import_with_request(
    path: &Path,
    request: &ImportRequest,
    prefs: &ImportPreferences,
) -> Result<ImportedScene, ImportError> {
    info!("Importing capture {}", path.display());
    let capture = CaptureReader::open_path(path)?;
    import_from_capture(&capture, request, prefs)
}

/// Import from an already opened capture.
pub fn import_from_capture<R: Read + Seek + Send>(
    capture: &CaptureReader<R>,
    request: &ImportRequest,
    prefs: &ImportPreferences,
) -> Result<ImportedScene, ImportError> {
    let header = capture.header();
    if let Some(expected) = prefs.expected_api {
        if header.api != expected {
            return Err(ImportError::Format(format!(
                "capture was recorded with {} but {} is expected",
                header.api, expected
            )));
        }
    }

    let selection = select_draw_calls(capture, request.max_blocks, request.frame)?;
    let log = match selection.last_chunk() {
        Some(last) => StateLog::read(capture, last)?,
        None => StateLog::default(),
    };

    let resolver = request.strategy.resolver();
    let resolved = resolver.resolve_all(&log, &selection.draws);
    info!(
        "Resolved pipeline state for {} draw calls ({})",
        resolved.len(),
        resolver.name()
    );

    #[cfg(feature = "verify")]
    crate::verify::verify_strategies(&log, &selection.draws)?;

    let resources = ResourceCache::new();
    let textures = TextureCache::new();
    let decode = |bindings: Result<ResolvedBindings, ImportError>| {
        bindings.and_then(|b| decode_draw(capture, &resources, &textures, &b))
    };
    let outputs: Vec<Result<DrawGeometry, ImportError>> = if prefs.parallel {
        resolved.into_par_iter().map(decode).collect()
    } else {
        resolved.into_iter().map(decode).collect()
    };

    debug!(
        "Decoded {} buffers and {} textures",
        resources.buffer_count(),
        textures.len()
    );

    let mut assembler = SceneAssembler::new(request.strategy);
    for (draw, output) in selection.draws.iter().zip(outputs) {
        match output {
            Ok(geometry) => assembler.add_draw(geometry),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => assembler.skip(draw.sequence, &e),
        }
    }

    let mut scene = assembler.finish(selection.frame, selection.filtered);
    if let Some(dir) = &prefs.texture_cache_dir {
        scene.texture_files = export_textures(&scene.textures, dir);
    }

    info!("{}", scene.summary());
    Ok(scene)
}

/// Decode mesh and textures of one resolved draw.
fn decode_draw<R: Read + Seek>(
    capture: &CaptureReader<R>,
    resources: &ResourceCache,
    textures: &TextureCache,
    bindings: &ResolvedBindings,
) -> Result<DrawGeometry, ImportError> {
    let draw = bindings.draw;
    let layout = resources.layout(capture, bindings.program)?;
    let vertex = bindings
        .vertex_buffers
        .get(&0)
        .ok_or(ImportError::UnresolvedBinding {
            draw: draw.sequence,
            what: "vertex buffer",
            resource: mapsmodels_core::ResourceId::NONE,
        })?;
    let vertex_data = resources.buffer(capture, vertex.buffer)?;
    let index_data = match bindings.index_buffer {
        Some(index) => Some((resources.buffer(capture, index.buffer)?, index)),
        None => None,
    };

    let mesh = build_mesh(&GeometryInput {
        params: draw.params,
        layout: &layout,
        vertex_data: &vertex_data,
        vertex_offset: vertex.offset,
        index: index_data.as_ref().map(|(data, binding)| IndexInput {
            data: data.as_slice(),
            format: binding.format,
            offset: binding.offset,
        }),
        uv_transform: bindings.uv_transform,
    })?;

    let mut bound = Vec::with_capacity(bindings.textures.len());
    let mut degraded = Vec::new();
    for (&slot, &texture) in &bindings.textures {
        match textures.get_or_decode(capture, texture) {
            Ok(decoded) => bound.push((slot, decoded)),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => degraded.push(DegradedTexture {
                draw: draw.sequence,
                slot,
                texture: texture.id,
                kind: e.kind(),
                message: e.to_string(),
            }),
        }
    }

    Ok(DrawGeometry {
        draw,
        program: bindings.program,
        transforms: bindings.transforms,
        mesh,
        textures: bound,
        degraded,
    })
}

//! Draw call selection
//!
//! Walks the capture once, in order, and picks the draw calls of the frame of
//! interest that look like tile geometry. `max_blocks` turns the walk into a
//! deterministic prefix: the walk stops as soon as enough draws are selected.

use std::io::{Read, Seek};

use mapsmodels_capture::{CaptureReader, ChunkBody, ChunkKind, DrawParams};
use tracing::{debug, info};

use crate::error::ImportError;

/// One draw call picked for import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCallEvent {
    /// Position among all draw calls of the capture
    pub sequence: usize,
    /// Index of the draw chunk
    pub chunk: usize,
    /// Frame the draw belongs to, if the capture has frame markers
    pub frame: Option<u32>,
    pub params: DrawParams,
}

/// Ordered result of the selection pass.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub draws: Vec<DrawCallEvent>,
    pub frame: Option<u32>,
    /// Draws of the imported frame rejected by [`is_geometry_draw`]
    pub filtered: usize,
    /// Whether `max_blocks` cut the walk short
    pub truncated: bool,
}

impl Selection {
    /// Chunk index of the last selected draw. Later stages never need to read
    /// past it.
    pub fn last_chunk(&self) -> Option<usize> {
        self.draws.last().map(|d| d.chunk)
    }
}

/// Fixed predicate for draws that carry tile geometry: triangles sourced from
/// a vertex buffer in slot 0. Points and lines are labels and outlines;
/// triangles without a vertex buffer are procedural full-screen passes.
pub fn is_geometry_draw(params: &DrawParams, vertex_slot0_bound: bool) -> bool {
    params.topology.is_triangles() && vertex_slot0_bound
}

const SELECTION_KINDS: [ChunkKind; 5] = [
    ChunkKind::FrameBegin,
    ChunkKind::FrameEnd,
    ChunkKind::BindVertexBuffer,
    ChunkKind::Draw,
    ChunkKind::DrawIndexed,
];

/// Select the draw calls to import.
///
/// `max_blocks <= 0` selects everything. `frame` picks a frame by its marker
/// number; by default the first frame containing a geometry draw is used.
/// Captures without frame markers are one implicit frame.
pub fn select_draw_calls<R: Read + Seek>(
    capture: &CaptureReader<R>,
    max_blocks: i64,
    frame: Option<u32>,
) -> Result<Selection, ImportError> {
    let has_frames = capture
        .entries()
        .iter()
        .any(|e| e.kind == ChunkKind::FrameBegin);
    let limit = usize::try_from(max_blocks).ok().filter(|&m| m > 0);

    let mut selection = Selection {
        frame,
        ..Default::default()
    };
    let mut current_frame: Option<u32> = None;
    let mut slot0_bound = false;
    let mut sequence = 0usize;

    for chunk in capture.chunks_of_kind(&SELECTION_KINDS) {
        let chunk = chunk?;
        match chunk.body {
            ChunkBody::FrameBegin { frame } => {
                current_frame = Some(frame);
                if selection.frame.is_none() {
                    selection.filtered = 0;
                }
            }
            ChunkBody::FrameEnd { frame } => {
                let done = selection.frame == Some(frame) && current_frame == Some(frame);
                current_frame = None;
                if done {
                    debug!("Reached end of frame {}", frame);
                    break;
                }
            }
            ChunkBody::BindVertexBuffer { slot: 0, buffer, .. } => {
                slot0_bound = buffer.is_some();
            }
            ChunkBody::Draw(params) => {
                let seq = sequence;
                sequence += 1;

                if has_frames {
                    let Some(current) = current_frame else {
                        debug!("Draw {} is outside any frame, ignored", seq);
                        continue;
                    };
                    if selection.frame.is_some_and(|wanted| wanted != current) {
                        continue;
                    }
                }

                if !is_geometry_draw(&params, slot0_bound) {
                    debug!("Draw {} filtered ({:?})", seq, params.topology);
                    selection.filtered += 1;
                    continue;
                }
                if has_frames && selection.frame.is_none() {
                    selection.frame = current_frame;
                }

                selection.draws.push(DrawCallEvent {
                    sequence: seq,
                    chunk: chunk.index,
                    frame: current_frame,
                    params,
                });

                if limit.is_some_and(|m| selection.draws.len() >= m) {
                    selection.truncated = true;
                    break;
                }
            }
            _ => {}
        }
    }

    if selection.draws.is_empty() {
        return Err(ImportError::EmptyCapture);
    }

    info!(
        "Selected {} draw calls ({} filtered{})",
        selection.draws.len(),
        selection.filtered,
        if selection.truncated {
            ", truncated by max blocks"
        } else {
            ""
        }
    );
    Ok(selection)
}

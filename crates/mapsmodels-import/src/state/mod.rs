//! Pipeline state at the time of a draw call
//!
//! The state-changing chunks of a capture are decoded once into an immutable
//! [`StateLog`]. A [`StateResolver`] folds that log into a raw
//! [`BindingState`] per draw; [`BindingState::resolve`] then turns the raw ids
//! into references to the creation chunks they name. Two resolvers exist and
//! must agree on every draw: [`legacy::LegacyResolver`] rescans the log for
//! each draw, [`experimental::ExperimentalResolver`] walks it once.

pub mod experimental;
pub mod legacy;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{Read, Seek};

use glam::{Mat4, Vec4};
use mapsmodels_capture::{CaptureReader, ChunkBody, ChunkKind, IndexFormat};
use mapsmodels_core::ResourceId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ImportError;
use crate::selector::DrawCallEvent;

pub use experimental::ExperimentalResolver;
pub use legacy::LegacyResolver;

/// What a creation chunk defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Program,
}

impl ResourceKind {
    pub fn from_chunk_kind(kind: ChunkKind) -> Option<Self> {
        match kind {
            ChunkKind::CreateBuffer => Some(Self::Buffer),
            ChunkKind::CreateTexture => Some(Self::Texture),
            ChunkKind::CreateProgram => Some(Self::Program),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buffer => "buffer",
            Self::Texture => "texture",
            Self::Program => "program",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixSlot {
    Model,
    View,
    Projection,
}

impl MatrixSlot {
    pub fn from_slot(slot: u32) -> Option<Self> {
        match slot {
            0 => Some(Self::Model),
            1 => Some(Self::View),
            2 => Some(Self::Projection),
            _ => None,
        }
    }
}

/// Vector uniform slot holding the UV transform `[offset_u, offset_v, scale_u, scale_v]`
pub const UV_TRANSFORM_SLOT: u32 = 0;

/// One entry of the state log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateEvent {
    Created { id: ResourceId, kind: ResourceKind },
    VertexBuffer { slot: u32, buffer: ResourceId, offset: u32 },
    IndexBuffer { buffer: ResourceId, format: IndexFormat, offset: u32 },
    Texture { slot: u32, texture: ResourceId },
    Program { program: ResourceId },
    Matrix { slot: MatrixSlot, value: Mat4 },
    Vector { slot: u32, value: Vec4 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoggedEvent {
    pub chunk: usize,
    pub event: StateEvent,
}

/// Immutable, chunk-ordered log of resource creations and state changes.
#[derive(Debug, Clone, Default)]
pub struct StateLog {
    events: Vec<LoggedEvent>,
    creations: HashMap<ResourceId, Vec<(usize, ResourceKind)>>,
}

impl StateLog {
    /// Decode the log for chunks `0..=end_chunk`. Creation events come from
    /// the chunk index alone; their payloads are not read here.
    pub fn read<R: Read + Seek>(
        capture: &CaptureReader<R>,
        end_chunk: usize,
    ) -> Result<Self, ImportError> {
        let mut events = Vec::new();
        let end = capture.chunk_count().min(end_chunk.saturating_add(1));

        for (index, entry) in capture.entries()[..end].iter().enumerate() {
            if let Some(kind) = ResourceKind::from_chunk_kind(entry.kind) {
                events.push(LoggedEvent {
                    chunk: index,
                    event: StateEvent::Created {
                        id: entry.resource_id,
                        kind,
                    },
                });
                continue;
            }
            if !entry.kind.is_state_change() {
                continue;
            }

            let event = match capture.chunk(index)?.body {
                ChunkBody::BindVertexBuffer {
                    slot,
                    offset,
                    buffer,
                } => StateEvent::VertexBuffer {
                    slot,
                    buffer,
                    offset,
                },
                ChunkBody::BindIndexBuffer {
                    format,
                    offset,
                    buffer,
                } => StateEvent::IndexBuffer {
                    buffer,
                    format,
                    offset,
                },
                ChunkBody::BindTexture { slot, texture } => StateEvent::Texture { slot, texture },
                ChunkBody::BindProgram { program } => StateEvent::Program { program },
                ChunkBody::SetMatrix { slot, value } => match MatrixSlot::from_slot(slot) {
                    Some(slot) => StateEvent::Matrix {
                        slot,
                        value: Mat4::from_cols_array(&value),
                    },
                    None => {
                        debug!("Chunk {}: ignoring matrix slot {}", index, slot);
                        continue;
                    }
                },
                ChunkBody::SetVector { slot, value } => StateEvent::Vector {
                    slot,
                    value: Vec4::from_array(value),
                },
                _ => continue,
            };
            events.push(LoggedEvent {
                chunk: index,
                event,
            });
        }

        debug!("State log holds {} events", events.len());
        Ok(Self::from_events(events))
    }

    /// Build a log from events already in chunk order.
    pub fn from_events(events: Vec<LoggedEvent>) -> Self {
        let mut creations: HashMap<ResourceId, Vec<(usize, ResourceKind)>> = HashMap::new();
        for logged in &events {
            if let StateEvent::Created { id, kind } = logged.event {
                creations.entry(id).or_default().push((logged.chunk, kind));
            }
        }
        Self { events, creations }
    }

    pub fn events(&self) -> &[LoggedEvent] {
        &self.events
    }

    /// Number of events recorded strictly before `chunk`.
    pub fn prefix_len(&self, chunk: usize) -> usize {
        self.events.partition_point(|e| e.chunk < chunk)
    }

    /// The creation of `id` in effect just before `chunk`.
    pub fn creation_before(&self, id: ResourceId, chunk: usize) -> Option<(usize, ResourceKind)> {
        let created = self.creations.get(&id)?;
        let n = created.partition_point(|&(c, _)| c < chunk);
        n.checked_sub(1).map(|i| created[i])
    }
}

/// Model, view and projection matrices of a draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transforms {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Default for Transforms {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

impl Transforms {
    /// Raw bit patterns of all three matrices, so NaN payloads compare equal.
    pub fn to_bits(&self) -> [[u32; 16]; 3] {
        [self.model, self.view, self.projection].map(|m| m.to_cols_array().map(f32::to_bits))
    }
}

/// A resource id together with the chunk that created the version in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub id: ResourceId,
    pub chunk: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub buffer: ResourceRef,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferBinding {
    pub buffer: ResourceRef,
    pub format: IndexFormat,
    pub offset: u32,
}

pub const DEFAULT_UV_TRANSFORM: Vec4 = Vec4::new(0.0, 0.0, 1.0, 1.0);

/// Everything a draw call needs, resolved to creation chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBindings {
    pub draw: DrawCallEvent,
    pub vertex_buffers: BTreeMap<u32, VertexBufferBinding>,
    /// Only set for indexed draws
    pub index_buffer: Option<IndexBufferBinding>,
    pub program: ResourceRef,
    pub textures: BTreeMap<u32, ResourceRef>,
    pub transforms: Transforms,
    pub uv_transform: Vec4,
}

impl ResolvedBindings {
    /// Equality with floats compared by bit pattern.
    pub fn bit_identical(&self, other: &Self) -> bool {
        self.draw == other.draw
            && self.vertex_buffers == other.vertex_buffers
            && self.index_buffer == other.index_buffer
            && self.program == other.program
            && self.textures == other.textures
            && self.transforms.to_bits() == other.transforms.to_bits()
            && self.uv_transform.to_array().map(f32::to_bits)
                == other.uv_transform.to_array().map(f32::to_bits)
    }
}

/// Raw bound ids per slot. An explicit unbind is kept as [`ResourceId::NONE`]
/// so it shadows older bindings of the same slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingState {
    pub vertex_buffers: BTreeMap<u32, (ResourceId, u32)>,
    pub index_buffer: Option<(ResourceId, IndexFormat, u32)>,
    pub textures: BTreeMap<u32, ResourceId>,
    pub program: Option<ResourceId>,
    pub model: Option<Mat4>,
    pub view: Option<Mat4>,
    pub projection: Option<Mat4>,
    pub uv_transform: Option<Vec4>,
}

impl BindingState {
    /// Apply an event in capture order: the newer value wins.
    pub fn apply(&mut self, event: &StateEvent) {
        match *event {
            StateEvent::Created { .. } => {}
            StateEvent::VertexBuffer {
                slot,
                buffer,
                offset,
            } => {
                self.vertex_buffers.insert(slot, (buffer, offset));
            }
            StateEvent::IndexBuffer {
                buffer,
                format,
                offset,
            } => self.index_buffer = Some((buffer, format, offset)),
            StateEvent::Texture { slot, texture } => {
                self.textures.insert(slot, texture);
            }
            StateEvent::Program { program } => self.program = Some(program),
            StateEvent::Matrix { slot, value } => *self.matrix_mut(slot) = Some(value),
            StateEvent::Vector { slot, value } => {
                if slot == UV_TRANSFORM_SLOT {
                    self.uv_transform = Some(value);
                }
            }
        }
    }

    /// Apply an event while walking backward: the first value seen for a slot
    /// wins and older ones are ignored.
    pub fn fill(&mut self, event: &StateEvent) {
        match *event {
            StateEvent::Created { .. } => {}
            StateEvent::VertexBuffer {
                slot,
                buffer,
                offset,
            } => {
                self.vertex_buffers.entry(slot).or_insert((buffer, offset));
            }
            StateEvent::IndexBuffer {
                buffer,
                format,
                offset,
            } => {
                self.index_buffer.get_or_insert((buffer, format, offset));
            }
            StateEvent::Texture { slot, texture } => {
                self.textures.entry(slot).or_insert(texture);
            }
            StateEvent::Program { program } => {
                self.program.get_or_insert(program);
            }
            StateEvent::Matrix { slot, value } => {
                self.matrix_mut(slot).get_or_insert(value);
            }
            StateEvent::Vector { slot, value } => {
                if slot == UV_TRANSFORM_SLOT {
                    self.uv_transform.get_or_insert(value);
                }
            }
        }
    }

    fn matrix_mut(&mut self, slot: MatrixSlot) -> &mut Option<Mat4> {
        match slot {
            MatrixSlot::Model => &mut self.model,
            MatrixSlot::View => &mut self.view,
            MatrixSlot::Projection => &mut self.projection,
        }
    }

    /// Turn the raw ids into creation references for `draw`.
    ///
    /// A program and a vertex buffer in slot 0 are required, and an index
    /// buffer for indexed draws. Every other bound id must resolve as well.
    pub fn resolve(
        &self,
        log: &StateLog,
        draw: &DrawCallEvent,
    ) -> Result<ResolvedBindings, ImportError> {
        let lookup = |id: ResourceId, kind: ResourceKind, what: &'static str| {
            match log.creation_before(id, draw.chunk) {
                Some((chunk, found)) if found == kind && id.is_some() => {
                    Ok(ResourceRef { id, chunk })
                }
                _ => Err(ImportError::UnresolvedBinding {
                    draw: draw.sequence,
                    what,
                    resource: id,
                }),
            }
        };

        let program = lookup(
            self.program.unwrap_or(ResourceId::NONE),
            ResourceKind::Program,
            "program",
        )?;

        let mut vertex_buffers = BTreeMap::new();
        for (&slot, &(buffer, offset)) in &self.vertex_buffers {
            if let Some(buffer) = buffer.non_null() {
                let buffer = lookup(buffer, ResourceKind::Buffer, "vertex buffer")?;
                vertex_buffers.insert(slot, VertexBufferBinding { buffer, offset });
            }
        }
        if !vertex_buffers.contains_key(&0) {
            return Err(ImportError::UnresolvedBinding {
                draw: draw.sequence,
                what: "vertex buffer",
                resource: ResourceId::NONE,
            });
        }

        let index_buffer = if draw.params.indexed {
            let (buffer, format, offset) =
                self.index_buffer
                    .unwrap_or((ResourceId::NONE, IndexFormat::U16, 0));
            let buffer = lookup(buffer, ResourceKind::Buffer, "index buffer")?;
            Some(IndexBufferBinding {
                buffer,
                format,
                offset,
            })
        } else {
            None
        };

        let mut textures = BTreeMap::new();
        for (&slot, &texture) in &self.textures {
            if let Some(texture) = texture.non_null() {
                textures.insert(slot, lookup(texture, ResourceKind::Texture, "texture")?);
            }
        }

        let defaults = Transforms::default();
        Ok(ResolvedBindings {
            draw: *draw,
            vertex_buffers,
            index_buffer,
            program,
            textures,
            transforms: Transforms {
                model: self.model.unwrap_or(defaults.model),
                view: self.view.unwrap_or(defaults.view),
                projection: self.projection.unwrap_or(defaults.projection),
            },
            uv_transform: self.uv_transform.unwrap_or(DEFAULT_UV_TRANSFORM),
        })
    }
}

/// Resolves the pipeline state of every selected draw call.
pub trait StateResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// One result per draw, in the order of `draws`.
    fn resolve_all(
        &self,
        log: &StateLog,
        draws: &[DrawCallEvent],
    ) -> Vec<Result<ResolvedBindings, ImportError>>;
}

/// Which state resolver (and scene assembly flavour) an import uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    #[default]
    Legacy,
    Experimental,
}

impl ExtractionStrategy {
    pub fn from_flag(use_experimental: bool) -> Self {
        if use_experimental {
            Self::Experimental
        } else {
            Self::Legacy
        }
    }

    pub fn resolver(self) -> &'static dyn StateResolver {
        match self {
            Self::Legacy => &LegacyResolver,
            Self::Experimental => &ExperimentalResolver,
        }
    }

    /// Whether nodes sharing a material are merged after assembly.
    pub fn merges_materials(self) -> bool {
        matches!(self, Self::Experimental)
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resolver().name())
    }
}

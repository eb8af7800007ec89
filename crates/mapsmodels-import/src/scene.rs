//! Scene assembly
//!
//! Places every decoded mesh in host world space, shares materials between
//! nodes and collects what was skipped or degraded on the way.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use glam::Mat4;
use mapsmodels_core::{coords, ResourceId};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ImportError, ImportErrorKind};
use crate::geometry::Mesh;
use crate::material::{Material, MaterialLibrary};
use crate::selector::DrawCallEvent;
use crate::state::{ExtractionStrategy, ResourceRef, Transforms};
use crate::texture::Texture;

/// A mesh placed in the host scene.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub mesh: Mesh,
    pub material: Arc<Material>,
    /// Object to host world
    pub transform: Mat4,
    /// Sequence numbers of the draw calls baked into this node
    pub draws: Vec<usize>,
}

/// A draw call that produced no node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedDraw {
    pub draw: usize,
    pub kind: ImportErrorKind,
    pub message: String,
}

/// A texture binding dropped from a material because it failed to decode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedTexture {
    pub draw: usize,
    pub slot: u32,
    pub texture: ResourceId,
    pub kind: ImportErrorKind,
    pub message: String,
}

/// Per-draw output of the decoding stage.
#[derive(Debug, Clone)]
pub struct DrawGeometry {
    pub draw: DrawCallEvent,
    pub program: ResourceRef,
    pub transforms: Transforms,
    pub mesh: Mesh,
    pub textures: Vec<(u32, Arc<Texture>)>,
    pub degraded: Vec<DegradedTexture>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportStats {
    pub strategy: ExtractionStrategy,
    pub frame: Option<u32>,
    pub nodes: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub materials: usize,
    pub textures: usize,
    pub filtered_draws: usize,
    pub skipped_draws: usize,
    pub degraded_textures: usize,
    pub texture_files: usize,
}

/// Result of one import, handed to the caller as a whole.
#[derive(Debug, Clone)]
pub struct ImportedScene {
    pub strategy: ExtractionStrategy,
    pub frame: Option<u32>,
    pub nodes: Vec<SceneNode>,
    pub materials: Vec<Arc<Material>>,
    pub textures: Vec<Arc<Texture>>,
    pub skipped: Vec<SkippedDraw>,
    pub degraded_textures: Vec<DegradedTexture>,
    pub filtered_draws: usize,
    pub texture_files: Vec<PathBuf>,
}

impl ImportedScene {
    pub fn vertex_count(&self) -> usize {
        self.nodes.iter().map(|n| n.mesh.vertex_count()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.nodes.iter().map(|n| n.mesh.triangle_count()).sum()
    }

    pub fn stats(&self) -> ImportStats {
        ImportStats {
            strategy: self.strategy,
            frame: self.frame,
            nodes: self.nodes.len(),
            vertices: self.vertex_count(),
            triangles: self.triangle_count(),
            materials: self.materials.len(),
            textures: self.textures.len(),
            filtered_draws: self.filtered_draws,
            skipped_draws: self.skipped.len(),
            degraded_textures: self.degraded_textures.len(),
            texture_files: self.texture_files.len(),
        }
    }

    /// The one message reported to the user for this import.
    pub fn summary(&self) -> String {
        let mut msg = format!(
            "Imported {} objects ({} vertices, {} triangles) with {} materials and {} textures",
            self.nodes.len(),
            self.vertex_count(),
            self.triangle_count(),
            self.materials.len(),
            self.textures.len()
        );
        if !self.skipped.is_empty() {
            msg.push_str(&format!("; skipped {} draw calls", self.skipped.len()));
        }
        if !self.degraded_textures.is_empty() {
            msg.push_str(&format!(
                "; {} textures could not be decoded",
                self.degraded_textures.len()
            ));
        }
        msg
    }
}

/// Object-to-host-world matrix of a draw: `C · V_ref⁻¹ · V · M`.
///
/// `reference_inverse` undoes the camera of the reference draw so every node
/// lands in one shared world frame.
pub fn world_transform(reference_inverse: Mat4, transforms: &Transforms) -> Mat4 {
    coords::to_host(reference_inverse * transforms.view * transforms.model)
}

/// Collects draw outputs in selection order and builds the scene.
pub struct SceneAssembler {
    strategy: ExtractionStrategy,
    materials: MaterialLibrary,
    nodes: Vec<SceneNode>,
    skipped: Vec<SkippedDraw>,
    degraded: Vec<DegradedTexture>,
    reference_inverse: Option<Mat4>,
}

impl SceneAssembler {
    pub fn new(strategy: ExtractionStrategy) -> Self {
        Self {
            strategy,
            materials: MaterialLibrary::new(),
            nodes: Vec::new(),
            skipped: Vec::new(),
            degraded: Vec::new(),
            reference_inverse: None,
        }
    }

    pub fn add_draw(&mut self, geometry: DrawGeometry) {
        let reference_inverse = *self.reference_inverse.get_or_insert_with(|| {
            coords::try_inverse(geometry.transforms.view).unwrap_or_else(|| {
                warn!("Reference view matrix is singular, using identity");
                Mat4::IDENTITY
            })
        });

        let degraded = !geometry.degraded.is_empty();
        let material =
            self.materials
                .get_or_create(geometry.program, geometry.textures, degraded);
        self.degraded.extend(geometry.degraded);

        let sequence = geometry.draw.sequence;
        self.nodes.push(SceneNode {
            name: format!("draw_{sequence:04}"),
            mesh: geometry.mesh,
            material,
            transform: world_transform(reference_inverse, &geometry.transforms),
            draws: vec![sequence],
        });
    }

    pub fn skip(&mut self, draw: usize, error: &ImportError) {
        warn!("Skipping draw call {}: {}", draw, error);
        self.skipped.push(SkippedDraw {
            draw,
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    pub fn finish(self, frame: Option<u32>, filtered_draws: usize) -> ImportedScene {
        let nodes = if self.strategy.merges_materials() {
            merge_by_material(self.nodes)
        } else {
            self.nodes
        };
        let materials = self.materials.into_materials();

        let mut seen = HashSet::new();
        let textures = materials
            .iter()
            .flat_map(|m| m.textures.iter().map(|(_, t)| t))
            .filter(|t| seen.insert(t.source))
            .cloned()
            .collect();

        ImportedScene {
            strategy: self.strategy,
            frame,
            nodes,
            materials,
            textures,
            skipped: self.skipped,
            degraded_textures: self.degraded,
            filtered_draws,
            texture_files: Vec::new(),
        }
    }
}

/// Merge nodes that share a material into the first node of each group. The
/// other members are baked into that node's local space. Groups keep the
/// order of their first node.
pub fn merge_by_material(nodes: Vec<SceneNode>) -> Vec<SceneNode> {
    let before = nodes.len();
    let mut merged: Vec<SceneNode> = Vec::new();

    for node in nodes {
        let target = merged
            .iter_mut()
            .filter(|m| Arc::ptr_eq(&m.material, &node.material))
            .find_map(|m| coords::try_inverse(m.transform).map(|inv| (m, inv)));

        match target {
            Some((group, inverse)) => {
                group.mesh.append(&node.mesh, inverse * node.transform);
                group.draws.extend(node.draws);
            }
            None => merged.push(node),
        }
    }

    debug!("Merged {} nodes into {}", before, merged.len());
    merged
}

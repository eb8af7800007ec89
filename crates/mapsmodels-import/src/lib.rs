//! MapsModels Import - capture to scene pipeline
//!
//! Reads a GPU capture of a 3D map view and rebuilds what was drawn: one mesh
//! per geometry draw call, placed in host world space, with shared materials
//! and deduplicated textures. Entry points are [`import_capture`] and
//! [`import_from_capture`].

pub mod error;
pub mod geometry;
pub mod layout;
pub mod material;
pub mod pipeline;
pub mod preferences;
pub mod resources;
pub mod scene;
pub mod selector;
pub mod state;
pub mod texture;
#[cfg(any(test, feature = "verify"))]
pub mod verify;

#[cfg(test)]
mod proptests;
#[cfg(test)]
mod testing;

pub use error::{ImportError, ImportErrorKind};
pub use geometry::Mesh;
pub use material::Material;
pub use pipeline::{import_capture, import_from_capture, import_with_request, ImportRequest};
pub use preferences::ImportPreferences;
pub use scene::{ImportStats, ImportedScene, SceneNode, SkippedDraw};
pub use selector::{DrawCallEvent, Selection};
pub use state::{ExtractionStrategy, ResolvedBindings, StateResolver};
pub use texture::Texture;

//! Core types used throughout the import pipeline

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a GPU resource (buffer, texture, program) inside one capture.
///
/// Id `0` is reserved: binding it means "nothing bound".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl ResourceId {
    /// The reserved "no resource" id
    pub const NONE: ResourceId = ResourceId(0);

    /// Whether this id refers to an actual resource
    pub fn is_some(self) -> bool {
        self.0 != 0
    }

    /// Convert to `None` for the reserved id
    pub fn non_null(self) -> Option<ResourceId> {
        self.is_some().then_some(self)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Graphics API a capture was recorded against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphicsApi {
    OpenGl,
    Vulkan,
    D3D11,
}

impl GraphicsApi {
    /// Decode the api code stored in a capture header
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::OpenGl),
            1 => Some(Self::Vulkan),
            2 => Some(Self::D3D11),
            _ => None,
        }
    }

    /// The api code stored in a capture header
    pub fn code(self) -> u32 {
        match self {
            Self::OpenGl => 0,
            Self::Vulkan => 1,
            Self::D3D11 => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::OpenGl => "OpenGL",
            Self::Vulkan => "Vulkan",
            Self::D3D11 => "Direct3D 11",
        }
    }
}

impl fmt::Display for GraphicsApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// RGBA color with floating point components (0.0 to 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    /// Shown on materials whose texture could not be decoded
    pub const MISSING: Color = Color::rgb(1.0, 0.0, 1.0);

    /// Create a color from RGB values (alpha = 1.0)
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

//! MapsModels Core - Shared types for the capture import pipeline
//!
//! This crate provides the small value types every other crate agrees on:
//! - Resource identifiers as recorded in a capture
//! - The graphics API a capture was recorded against
//! - RGBA colors for material parameters
//! - The fixed source-to-host coordinate conversion

pub mod coords;
pub mod types;

pub use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
pub use types::{Color, GraphicsApi, ResourceId};

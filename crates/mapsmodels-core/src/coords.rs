//! Source-to-host coordinate conversion
//!
//! Captured geometry lives in the source API's convention: Y up, right-handed,
//! camera looking down -Z. The host scene is Z up, right-handed. The whole
//! pipeline converts between the two in exactly one place, [`to_host`].

use glam::{Mat4, Vec4};

/// Matrices with a determinant below this are treated as singular
pub const SINGULAR_EPSILON: f32 = 1e-12;

/// The fixed axis remap `(x, y, z) -> (x, -z, y)`.
pub fn source_to_host() -> Mat4 {
    Mat4::from_cols(
        Vec4::new(1.0, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(0.0, -1.0, 0.0, 0.0),
        Vec4::W,
    )
}

/// Convert a source-space object-to-world matrix into host world space.
pub fn to_host(source_world: Mat4) -> Mat4 {
    source_to_host() * source_world
}

/// Inverse of `m`, or `None` if `m` is singular.
pub fn try_inverse(m: Mat4) -> Option<Mat4> {
    (m.determinant().abs() > SINGULAR_EPSILON).then(|| m.inverse())
}

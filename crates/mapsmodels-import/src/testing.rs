//! Synthetic captures shared by the unit tests

use std::io::Cursor;

use glam::{Mat4, Vec3};
use mapsmodels_capture::{
    AttributeRecord, CaptureReader, CaptureWriter, ProgramDesc, TextureDesc, Topology,
};
use mapsmodels_core::{GraphicsApi, ResourceId};

pub(crate) const TILE_TEXTURE: ResourceId = ResourceId(10);

pub(crate) fn open(writer: &CaptureWriter) -> CaptureReader<Cursor<Vec<u8>>> {
    CaptureReader::open(Cursor::new(writer.finish())).unwrap()
}

fn attribute(semantic: u8, components: u8, offset: u32) -> AttributeRecord {
    AttributeRecord {
        semantic,
        component_type: 0,
        components,
        offset,
    }
}

/// Positions only, three `f32` per vertex.
pub(crate) fn position_program() -> ProgramDesc {
    ProgramDesc {
        stride: 12,
        attributes: vec![attribute(0, 3, 0)],
        name: Some("untextured".into()),
    }
}

/// Three `f32` position components followed by two `f32` UVs.
pub(crate) fn textured_program() -> ProgramDesc {
    ProgramDesc {
        stride: 20,
        attributes: vec![attribute(0, 3, 0), attribute(2, 2, 12)],
        name: Some("tile".into()),
    }
}

/// One untextured triangle: buffer 1, program 2, a single draw at chunk 4.
/// There are no frame markers, so draws appended later are selected too.
pub(crate) fn triangle_capture() -> CaptureWriter {
    let mut w = CaptureWriter::new(GraphicsApi::OpenGl);
    w.create_vertex_buffer_f32(
        ResourceId(1),
        &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
    )
    .create_program(ResourceId(2), &position_program())
    .bind_vertex_buffer(0, ResourceId(1), 0)
    .bind_program(ResourceId(2))
    .draw(Topology::TriangleList, 3, 0);
    w
}

/// `draws` textured triangles sharing one program and [`TILE_TEXTURE`], each
/// moved 10 units further along X by its model matrix, seen through one
/// camera.
pub(crate) fn tile_capture(draws: usize) -> CaptureWriter {
    let mut w = CaptureWriter::new(GraphicsApi::OpenGl);
    w.create_vertex_buffer_f32(
        ResourceId(1),
        &[
            0.0, 0.0, 0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, -1.0, 0.0, 1.0,
        ],
    )
    .create_program(ResourceId(2), &textured_program())
    .create_texture(
        TILE_TEXTURE,
        TextureDesc {
            width: 2,
            height: 2,
            format: 1,
        },
        &[200; 16],
    )
    .bind_vertex_buffer(0, ResourceId(1), 0)
    .bind_program(ResourceId(2))
    .bind_texture(0, TILE_TEXTURE)
    .set_matrix(
        1,
        Mat4::from_translation(Vec3::new(0.0, -20.0, -100.0)).to_cols_array(),
    );

    for i in 0..draws {
        let model = Mat4::from_translation(Vec3::new(i as f32 * 10.0, 0.0, 0.0));
        w.set_matrix(0, model.to_cols_array())
            .draw(Topology::TriangleList, 3, 0);
    }
    w
}

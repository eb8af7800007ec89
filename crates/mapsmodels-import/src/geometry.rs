//! Mesh decoding from raw vertex and index buffers

use std::collections::HashMap;

use glam::{Mat3, Mat4, Vec3, Vec4};
use mapsmodels_capture::{DrawParams, IndexFormat, Topology};

use crate::error::ImportError;
use crate::layout::VertexLayout;

/// Triangle mesh in the source API's object space.
///
/// Every index is smaller than [`Mesh::vertex_count`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub tex_coords: Option<Vec<[f32; 2]>>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Append `other`, moving its vertices by `transform`. Attributes present
    /// on only one side are zero-filled on the other.
    pub fn append(&mut self, other: &Mesh, transform: Mat4) {
        let base = self.positions.len();
        let added = other.positions.len();
        let normal_matrix = Mat3::from_mat4(transform).inverse().transpose();

        self.positions.extend(
            other
                .positions
                .iter()
                .map(|&p| transform.transform_point3(Vec3::from(p)).to_array()),
        );

        if self.normals.is_none() && other.normals.is_some() {
            self.normals = Some(vec![[0.0; 3]; base]);
        }
        if let Some(normals) = &mut self.normals {
            match &other.normals {
                Some(theirs) => normals.extend(
                    theirs
                        .iter()
                        .map(|&n| (normal_matrix * Vec3::from(n)).normalize_or_zero().to_array()),
                ),
                None => normals.resize(base + added, [0.0; 3]),
            }
        }

        if self.tex_coords.is_none() && other.tex_coords.is_some() {
            self.tex_coords = Some(vec![[0.0; 2]; base]);
        }
        if let Some(uvs) = &mut self.tex_coords {
            match &other.tex_coords {
                Some(theirs) => uvs.extend_from_slice(theirs),
                None => uvs.resize(base + added, [0.0; 2]),
            }
        }

        self.indices
            .extend(other.indices.iter().map(|&i| i + base as u32));
    }
}

/// Index buffer bytes of an indexed draw, starting at the bound offset.
#[derive(Debug, Clone, Copy)]
pub struct IndexInput<'a> {
    pub data: &'a [u8],
    pub format: IndexFormat,
    pub offset: u32,
}

/// Everything [`build_mesh`] needs for one draw.
#[derive(Debug, Clone, Copy)]
pub struct GeometryInput<'a> {
    pub params: DrawParams,
    pub layout: &'a VertexLayout,
    pub vertex_data: &'a [u8],
    pub vertex_offset: u32,
    pub index: Option<IndexInput<'a>>,
    /// `[offset_u, offset_v, scale_u, scale_v]`
    pub uv_transform: Vec4,
}

fn corrupt(msg: String) -> ImportError {
    ImportError::CorruptResource(msg)
}

/// Decode the geometry of one draw. A draw with a zero count yields an empty
/// mesh.
pub fn build_mesh(input: &GeometryInput<'_>) -> Result<Mesh, ImportError> {
    let params = &input.params;
    if params.count == 0 {
        return Ok(Mesh::empty());
    }

    let sequence = vertex_sequence(input)?;
    let triangles = match params.topology {
        Topology::TriangleList => list_triangles(&sequence),
        Topology::TriangleStrip => strip_triangles(&sequence),
        other => {
            return Err(ImportError::UnsupportedFormat(format!(
                "topology {other:?} is not triangles"
            )))
        }
    };

    let layout = input.layout;
    let stride = layout.stride as usize;
    let record_len = layout.record_len();
    let data = input.vertex_data;

    let mut mesh = Mesh {
        normals: layout.normal.map(|_| Vec::new()),
        tex_coords: layout.tex_coord.map(|_| Vec::new()),
        ..Mesh::default()
    };
    let mut remap: HashMap<u32, u32> = HashMap::new();
    let uv = input.uv_transform;

    for source in triangles.into_iter().flatten() {
        if let Some(&index) = remap.get(&source) {
            mesh.indices.push(index);
            continue;
        }

        let start = input.vertex_offset as usize + source as usize * stride;
        let record = data
            .get(start..start + record_len)
            .ok_or_else(|| {
                corrupt(format!(
                    "vertex {} ends past the {} byte vertex buffer",
                    source,
                    data.len()
                ))
            })?;

        let [x, y, z] = layout.position.read::<3>(record);
        mesh.positions.push([x, y, z]);
        if let (Some(normals), Some(attr)) = (&mut mesh.normals, layout.normal) {
            normals.push(attr.read::<3>(record));
        }
        if let (Some(uvs), Some(attr)) = (&mut mesh.tex_coords, layout.tex_coord) {
            let [u, v] = attr.read::<2>(record);
            uvs.push([u * uv.z + uv.x, v * uv.w + uv.y]);
        }

        let index = remap.len() as u32;
        remap.insert(source, index);
        mesh.indices.push(index);
    }

    Ok(mesh)
}

/// Source vertex numbers in draw order; `None` marks a primitive restart.
fn vertex_sequence(input: &GeometryInput<'_>) -> Result<Vec<Option<u32>>, ImportError> {
    let params = &input.params;
    let count = params.count as usize;

    let Some(index) = input.index.filter(|_| params.indexed) else {
        let last = params.first.checked_add(params.count - 1).ok_or_else(|| {
            corrupt(format!(
                "draw range {}+{} overflows",
                params.first, params.count
            ))
        })?;
        let layout = input.layout;
        let end = (last as u64)
            .checked_mul(layout.stride as u64)
            .and_then(|n| n.checked_add(input.vertex_offset as u64))
            .and_then(|n| n.checked_add(layout.record_len() as u64));
        if end.map_or(true, |end| end > input.vertex_data.len() as u64) {
            return Err(corrupt(format!(
                "vertices {}..={} end past the {} byte vertex buffer",
                params.first,
                last,
                input.vertex_data.len()
            )));
        }
        return Ok((params.first..=last).map(Some).collect());
    };

    let size = index.format.size();
    let start = index.offset as usize + params.first as usize * size;
    let bytes = count
        .checked_mul(size)
        .and_then(|len| index.data.get(start..start.checked_add(len)?))
        .ok_or_else(|| {
            corrupt(format!(
                "{} indices from index {} overrun the {} byte index buffer",
                count,
                params.first,
                index.data.len()
            ))
        })?;

    let restart = index.format.restart_value();
    bytes
        .chunks_exact(size)
        .map(|raw| {
            let raw = match index.format {
                IndexFormat::U16 => u16::from_le_bytes([raw[0], raw[1]]) as u32,
                IndexFormat::U32 => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            };
            if raw == restart {
                return Ok(None);
            }
            let vertex = raw as i64 + params.base_vertex as i64;
            u32::try_from(vertex)
                .map(Some)
                .map_err(|_| corrupt(format!("index {raw} + base vertex {} is out of range", params.base_vertex)))
        })
        .collect()
}

fn is_degenerate([a, b, c]: [u32; 3]) -> bool {
    a == b || b == c || a == c
}

fn list_triangles(sequence: &[Option<u32>]) -> Vec<[u32; 3]> {
    sequence
        .chunks_exact(3)
        .filter_map(|t| Some([t[0]?, t[1]?, t[2]?]))
        .filter(|&t| !is_degenerate(t))
        .collect()
}

fn strip_triangles(sequence: &[Option<u32>]) -> Vec<[u32; 3]> {
    let mut triangles = Vec::new();
    for strip in sequence.split(Option::is_none) {
        for (i, w) in strip.windows(3).enumerate() {
            let (Some(a), Some(b), Some(c)) = (w[0], w[1], w[2]) else {
                continue;
            };
            let triangle = if i % 2 == 0 { [a, b, c] } else { [b, a, c] };
            if !is_degenerate(triangle) {
                triangles.push(triangle);
            }
        }
    }
    triangles
}

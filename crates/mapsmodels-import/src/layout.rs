//! Vertex layouts derived from program attribute records

use half::f16;
use mapsmodels_capture::{AttributeRecord, ProgramDesc};
use tracing::debug;

use crate::error::ImportError;

/// Attribute meaning the importer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semantic {
    Position,
    Normal,
    TexCoord,
}

impl Semantic {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Position),
            1 => Some(Self::Normal),
            2 => Some(Self::TexCoord),
            _ => None,
        }
    }
}

/// Storage type of one attribute component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    F32,
    F16,
    U8Norm,
    U16Norm,
    I8Norm,
    I16Norm,
    U8,
    U16,
}

impl ComponentType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::F32),
            1 => Some(Self::F16),
            2 => Some(Self::U8Norm),
            3 => Some(Self::U16Norm),
            4 => Some(Self::I8Norm),
            5 => Some(Self::I16Norm),
            6 => Some(Self::U8),
            7 => Some(Self::U16),
            _ => None,
        }
    }

    pub fn size(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F16 | Self::U16Norm | Self::I16Norm | Self::U16 => 2,
            Self::U8Norm | Self::I8Norm | Self::U8 => 1,
        }
    }

    /// Decode one component. `bytes` holds exactly [`Self::size`] bytes.
    fn read(self, bytes: &[u8]) -> f32 {
        match self {
            Self::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::F16 => f16::from_le_bytes([bytes[0], bytes[1]]).to_f32(),
            Self::U8Norm => bytes[0] as f32 / u8::MAX as f32,
            Self::U16Norm => u16::from_le_bytes([bytes[0], bytes[1]]) as f32 / u16::MAX as f32,
            Self::I8Norm => (bytes[0] as i8 as f32 / i8::MAX as f32).max(-1.0),
            Self::I16Norm => {
                (i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / i16::MAX as f32).max(-1.0)
            }
            Self::U8 => bytes[0] as f32,
            Self::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub component_type: ComponentType,
    pub components: u8,
    pub offset: u32,
}

impl VertexAttribute {
    pub fn byte_len(&self) -> usize {
        self.component_type.size() * self.components as usize
    }

    pub fn end(&self) -> usize {
        self.offset as usize + self.byte_len()
    }

    /// Read up to `N` components from a vertex record; missing ones are zero.
    pub fn read<const N: usize>(&self, record: &[u8]) -> [f32; N] {
        let size = self.component_type.size();
        let mut out = [0.0; N];
        for (i, value) in out.iter_mut().enumerate().take(self.components as usize) {
            let start = self.offset as usize + i * size;
            *value = self.component_type.read(&record[start..start + size]);
        }
        out
    }
}

/// Byte-level schema of one vertex record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u32,
    pub position: VertexAttribute,
    pub normal: Option<VertexAttribute>,
    pub tex_coord: Option<VertexAttribute>,
}

impl VertexLayout {
    /// Build the layout from a program's attribute records.
    ///
    /// A stride of zero means tightly packed records. Attributes with an
    /// unknown semantic are ignored.
    pub fn from_program(desc: &ProgramDesc) -> Result<Self, ImportError> {
        let mut position = None;
        let mut normal = None;
        let mut tex_coord = None;

        for record in &desc.attributes {
            let Some(semantic) = Semantic::from_code(record.semantic) else {
                debug!("Ignoring vertex attribute semantic {}", record.semantic);
                continue;
            };
            let attribute = parse_attribute(semantic, record)?;
            let slot = match semantic {
                Semantic::Position => &mut position,
                Semantic::Normal => &mut normal,
                Semantic::TexCoord => &mut tex_coord,
            };
            // the first record of a semantic is the one the shader reads
            slot.get_or_insert(attribute);
        }

        let position = position.ok_or_else(|| {
            ImportError::UnsupportedFormat("vertex layout has no position attribute".into())
        })?;

        let mut layout = Self {
            stride: desc.stride,
            position,
            normal,
            tex_coord,
        };
        let record_len = layout.record_len();
        if desc.stride == 0 {
            layout.stride = u32::try_from(record_len).map_err(|_| {
                ImportError::UnsupportedFormat(format!(
                    "packed vertex record of {record_len} bytes is too long"
                ))
            })?;
        } else if (desc.stride as usize) < record_len {
            return Err(ImportError::UnsupportedFormat(format!(
                "vertex stride {} is shorter than its attributes ({} bytes)",
                desc.stride, record_len
            )));
        }

        Ok(layout)
    }

    /// Bytes of a record that attributes actually read.
    pub fn record_len(&self) -> usize {
        [Some(self.position), self.normal, self.tex_coord]
            .into_iter()
            .flatten()
            .map(|a| a.end())
            .max()
            .unwrap_or(0)
    }
}

fn parse_attribute(
    semantic: Semantic,
    record: &AttributeRecord,
) -> Result<VertexAttribute, ImportError> {
    let component_type = ComponentType::from_code(record.component_type).ok_or_else(|| {
        ImportError::UnsupportedFormat(format!(
            "{:?} attribute has component type {}",
            semantic, record.component_type
        ))
    })?;

    let valid = match semantic {
        Semantic::Position => (2..=4).contains(&record.components),
        Semantic::Normal => (3..=4).contains(&record.components),
        Semantic::TexCoord => (2..=4).contains(&record.components),
    };
    if !valid {
        return Err(ImportError::UnsupportedFormat(format!(
            "{:?} attribute has {} components",
            semantic, record.components
        )));
    }

    Ok(VertexAttribute {
        component_type,
        components: record.components,
        offset: record.offset,
    })
}

use std::collections::HashMap;
use std::sync::Arc;

use mapsmodels_core::Color;

use crate::state::ResourceRef;
use crate::texture::Texture;

/// Shading description shared by every node drawn with the same program and
/// textures.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub program: ResourceRef,
    pub base_color: Color,
    /// Successfully decoded textures by binding slot
    pub textures: Vec<(u32, Arc<Texture>)>,
    /// Some bound texture could not be decoded
    pub degraded: bool,
}

impl Material {
    pub fn is_textured(&self) -> bool {
        !self.textures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MaterialKey {
    program: ResourceRef,
    textures: Vec<(u32, ResourceRef)>,
    degraded: bool,
}

/// Hands out one shared [`Material`] per distinct key, named in first-use
/// order.
#[derive(Debug, Default)]
pub struct MaterialLibrary {
    by_key: HashMap<MaterialKey, Arc<Material>>,
    ordered: Vec<Arc<Material>>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        program: ResourceRef,
        textures: Vec<(u32, Arc<Texture>)>,
        degraded: bool,
    ) -> Arc<Material> {
        let key = MaterialKey {
            program,
            textures: textures.iter().map(|(slot, t)| (*slot, t.source)).collect(),
            degraded,
        };
        if let Some(material) = self.by_key.get(&key) {
            return Arc::clone(material);
        }

        let material = Arc::new(Material {
            name: format!("Material.{:03}", self.ordered.len()),
            program,
            base_color: if degraded { Color::MISSING } else { Color::WHITE },
            textures,
            degraded,
        });
        self.by_key.insert(key, Arc::clone(&material));
        self.ordered.push(Arc::clone(&material));
        material
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn into_materials(self) -> Vec<Arc<Material>> {
        self.ordered
    }
}

#[cfg(test)]
mod tests {
    use mapsmodels_core::ResourceId;

    use super::*;
    use crate::texture::PixelFormat;

    fn r(id: u64, chunk: usize) -> ResourceRef {
        ResourceRef {
            id: ResourceId(id),
            chunk,
        }
    }

    fn texture(id: u64) -> Arc<Texture> {
        Arc::new(Texture {
            source: r(id, 0),
            width: 1,
            height: 1,
            source_format: PixelFormat::Rgba8,
            pixels: vec![0; 4],
        })
    }

    #[test]
    fn same_key_shares_material() {
        let mut library = MaterialLibrary::new();
        let a = library.get_or_create(r(1, 0), vec![(0, texture(5))], false);
        let b = library.get_or_create(r(1, 0), vec![(0, texture(5))], false);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name, "Material.000");
        assert!(a.is_textured());
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn distinct_keys() {
        let mut library = MaterialLibrary::new();
        library.get_or_create(r(1, 0), vec![], false);
        library.get_or_create(r(1, 0), vec![(1, texture(5))], false);
        let degraded = library.get_or_create(r(1, 0), vec![], true);
        library.get_or_create(r(2, 3), vec![], false);
        assert_eq!(library.len(), 4);
        assert_eq!(degraded.name, "Material.002");
        assert_eq!(degraded.base_color, Color::MISSING);
        let names: Vec<_> = library
            .into_materials()
            .iter()
            .map(|m| m.name.clone())
            .collect();
        assert_eq!(names[3], "Material.003");
    }
}

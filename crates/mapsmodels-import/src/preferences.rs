use std::path::PathBuf;

use mapsmodels_core::GraphicsApi;
use serde::{Deserialize, Serialize};

/// Caller-side settings that shape an import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportPreferences {
    /// Reject captures recorded against another API. `None` accepts any.
    pub expected_api: Option<GraphicsApi>,
    /// Write every distinct texture here as PNG.
    pub texture_cache_dir: Option<PathBuf>,
    /// Decode geometry and textures on the rayon pool.
    pub parallel: bool,
}

impl Default for ImportPreferences {
    fn default() -> Self {
        Self {
            expected_api: None,
            texture_cache_dir: None,
            parallel: true,
        }
    }
}

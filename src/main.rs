//! MapsModels - import GPU captures of 3D map views as scenes
//!
//! This is the command line front end of the import pipeline.

mod settings;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mapsmodels_capture::CaptureReader;
use mapsmodels_core::GraphicsApi;
use mapsmodels_import::scene::DegradedTexture;
use mapsmodels_import::{
    import_with_request, ImportError, ImportRequest, ImportStats, ImportedScene, SkippedDraw,
};

use settings::AppSettings;

/// Import GPU captures of 3D map views
#[derive(Debug, Parser)]
#[command(name = "mapsmodels", version)]
#[command(about = "Rebuild meshes, materials and textures from GPU captures of 3D map views")]
struct Cli {
    /// Log every decision the importer makes
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import a capture and report what was rebuilt
    Import {
        capture: PathBuf,

        /// Number of draw calls to import (0 or less for all)
        #[arg(long, allow_negative_numbers = true)]
        max_blocks: Option<i64>,

        /// Use the experimental extraction strategy
        #[arg(long, conflicts_with = "legacy")]
        experimental: bool,

        /// Use the legacy extraction strategy, overriding the settings file
        #[arg(long)]
        legacy: bool,

        /// Frame marker to import instead of the first frame with draws
        #[arg(long)]
        frame: Option<u32>,

        /// Write decoded textures as PNG into this directory
        #[arg(long)]
        texture_dir: Option<PathBuf>,

        /// Graphics API the capture must have been recorded with
        #[arg(long, value_parser = parse_api)]
        api: Option<GraphicsApi>,

        /// Decode on the current thread only
        #[arg(long)]
        serial: bool,

        /// Print a JSON report instead of the summary line
        #[arg(long)]
        json: bool,
    },

    /// Show the header and chunk statistics of a capture
    Inspect { capture: PathBuf },

    /// Show the effective settings
    Config {
        /// Write the settings file (creates it with defaults if missing)
        #[arg(long)]
        save: bool,
    },
}

fn parse_api(s: &str) -> Result<GraphicsApi, String> {
    match s.to_ascii_lowercase().as_str() {
        "gl" | "opengl" => Ok(GraphicsApi::OpenGl),
        "vk" | "vulkan" => Ok(GraphicsApi::Vulkan),
        "d3d11" | "dx11" => Ok(GraphicsApi::D3D11),
        other => Err(format!("unknown graphics API '{other}'")),
    }
}

/// Strategy flags given on the command line win over the settings file.
fn use_experimental(experimental: bool, legacy: bool, default: bool) -> bool {
    match (experimental, legacy) {
        (true, _) => true,
        (_, true) => false,
        _ => default,
    }
}

/// Machine-readable import report
#[derive(Serialize)]
struct ImportReport<'a> {
    capture: &'a Path,
    stats: ImportStats,
    skipped: &'a [SkippedDraw],
    degraded_textures: &'a [DegradedTexture],
    texture_files: &'a [PathBuf],
}

impl<'a> ImportReport<'a> {
    fn new(capture: &'a Path, scene: &'a ImportedScene) -> Self {
        Self {
            capture,
            stats: scene.stats(),
            skipped: &scene.skipped,
            degraded_textures: &scene.degraded_textures,
            texture_files: &scene.texture_files,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Import {
            capture,
            max_blocks,
            experimental,
            legacy,
            frame,
            texture_dir,
            api,
            serial,
            json,
        } => {
            let settings = AppSettings::load();
            let mut prefs = settings.import;
            if texture_dir.is_some() {
                prefs.texture_cache_dir = texture_dir;
            }
            if api.is_some() {
                prefs.expected_api = api;
            }
            if serial {
                prefs.parallel = false;
            }

            let mut request = ImportRequest::new(
                max_blocks.unwrap_or(settings.defaults.max_blocks),
                use_experimental(experimental, legacy, settings.defaults.experimental),
            );
            request.frame = frame;

            run_import(&capture, &request, &prefs, json)
        }
        Commands::Inspect { capture } => inspect(&capture),
        Commands::Config { save } => {
            let settings = AppSettings::load();
            if save {
                let path = settings.save()?;
                println!("# written to {}", path.display());
            }
            print!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

fn run_import(
    capture: &Path,
    request: &ImportRequest,
    prefs: &mapsmodels_import::ImportPreferences,
    json: bool,
) -> Result<()> {
    let scene = match import_with_request(capture, request, prefs) {
        Ok(scene) => scene,
        Err(ImportError::EmptyCapture) => {
            warn!("{}", ImportError::EmptyCapture);
            println!("Nothing to import from {}", capture.display());
            return Ok(());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to import {}", capture.display()))
        }
    };

    if json {
        let report = ImportReport::new(capture, &scene);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", scene.summary());
    }
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let capture = CaptureReader::open_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let header = capture.header();
    info!("Inspecting {}", path.display());

    println!("capture:  {}", path.display());
    println!("version:  {}", header.version);
    println!("api:      {}", header.api);
    println!("chunks:   {}", capture.chunk_count());

    let mut per_kind: BTreeMap<String, (usize, u64)> = BTreeMap::new();
    for entry in capture.entries() {
        let (count, bytes) = per_kind.entry(format!("{:?}", entry.kind)).or_default();
        *count += 1;
        *bytes += entry.payload_len as u64;
    }
    for (kind, (count, bytes)) in per_kind {
        println!("  {kind:<18} {count:>8} chunks {bytes:>12} bytes");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_import() {
        let cli = Cli::try_parse_from([
            "mapsmodels",
            "import",
            "capture.mmcap",
            "--max-blocks",
            "-1",
            "--experimental",
            "--api",
            "Vulkan",
        ])
        .unwrap();
        match cli.command {
            Commands::Import {
                max_blocks,
                experimental,
                api,
                json,
                ..
            } => {
                assert_eq!(max_blocks, Some(-1));
                assert!(experimental);
                assert_eq!(api, Some(GraphicsApi::Vulkan));
                assert!(!json);
            }
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn legacy_flag_overrides_settings() {
        let cli = Cli::try_parse_from(["mapsmodels", "import", "c.mmcap", "--legacy"]).unwrap();
        let Commands::Import {
            experimental,
            legacy,
            ..
        } = cli.command
        else {
            panic!("expected import");
        };
        assert!(!use_experimental(experimental, legacy, true));
        assert!(use_experimental(false, false, true));
        assert!(!use_experimental(false, false, false));
        assert!(use_experimental(true, false, false));

        assert!(Cli::try_parse_from([
            "mapsmodels",
            "import",
            "c.mmcap",
            "--legacy",
            "--experimental"
        ])
        .is_err());
    }

    #[test]
    fn unknown_api_is_rejected() {
        assert!(parse_api("metal").is_err());
        assert_eq!(parse_api("gl"), Ok(GraphicsApi::OpenGl));
    }
}

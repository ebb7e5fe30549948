// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every field has a default, so a missing file or a file with only a few
// keys is fine. A file that fails to parse is reported and ignored.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
}

/// Window settings. The window is never resizable.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "My Shiny Vulkan Window".to_string(),
            width: 800,
            height: 600,
            x: 100,
            y: 100,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    /// RGBA, 0-1 range
    pub clear_color: [f32; 4],
    /// Quad edge length in pixels
    pub quad_size: f32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            clear_color: [1.0, 1.0, 0.0, 1.0], // yellow
            quad_size: 100.0,
        }
    }
}

/// Precompiled SPIR-V paths
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/quad.vert.spv"),
            fragment: PathBuf::from("shaders/quad.frag.spv"),
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honored in debug builds
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "vulkan_debug.log".to_string(),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Validation layers are a debug-build feature.
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }
}

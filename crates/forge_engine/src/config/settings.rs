//! # Application Settings
//!
//! Configuration for the window, the Vulkan renderer, the asset loaders and
//! engine-wide behaviour such as logging. [`ApplicationConfig`] is the top-level
//! structure the viewer loads from disk.
//!
//! ## Configuration Categories
//!
//! - **Engine**: log level and debug features
//! - **Window**: title, size, resizability
//! - **Renderer**: Vulkan instance metadata, shaders, frames in flight, MSAA
//! - **Assets**: base directory and default model

use serde::{Serialize, Deserialize};
use std::path::Path;

use super::{Config, ConfigError};
use crate::render::backends::vulkan::SelectionPolicy;

/// Default number of frames the CPU may record ahead of the GPU
pub const DEFAULT_MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Upper bound accepted for `max_frames_in_flight`
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 8;

/// # Shader Configuration
///
/// Paths of the precompiled SPIR-V blobs used by the forward pipeline.
/// Supports path resolution for applications run from different working directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries a list of common shader directories and picks the first one containing
    /// each file, falling back to `resources/shaders/`.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        let shader_dirs = [
            "resources/shaders/",
            "target/shaders/",
            "shaders/",
            "../resources/shaders/",
            "./",
        ];

        let resolve = |file: &str| {
            shader_dirs
                .iter()
                .map(|dir| format!("{dir}{file}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("resources/shaders/{file}"))
        };

        Self {
            vertex_shader_path: resolve(base_vertex),
            fragment_shader_path: resolve(base_fragment),
        }
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        for path in [&self.vertex_shader_path, &self.fragment_shader_path] {
            if !Path::new(path).exists() {
                return Err(ConfigError::Validation(format!("Shader not found: {path}")));
            }
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("forward.vert.spv", "forward.frag.spv")
    }
}

/// # Window Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the window can be resized
    pub resizable: bool,
}

impl WindowConfig {
    /// Create a window configuration
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
            resizable: true,
        }
    }

    /// Set whether the window is resizable
    pub fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Validation(format!(
                "Window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new("Forge Viewer", 1280, 720)
    }
}

/// # Vulkan Renderer Configuration
///
/// Configuration specific to the Vulkan rendering backend, including
/// application metadata, frame pacing and debug features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulkanRendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Maximum frames in flight
    pub max_frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers (`None` = debug builds only)
    pub enable_validation: Option<bool>,
    /// Colour the swapchain image is cleared to each frame (RGBA)
    pub clear_color: [f32; 4],
    /// Render into a multisampled target at the device's highest usable sample count
    pub msaa: bool,
    /// Use MAILBOX presentation when the surface supports it
    pub prefer_mailbox: bool,
    /// How to rank suitable physical devices
    pub device_selection: SelectionPolicy,
}

impl VulkanRendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            shaders: ShaderConfig::default(),
            max_frames_in_flight: DEFAULT_MAX_FRAMES_IN_FLIGHT,
            enable_validation: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            msaa: true,
            prefer_mailbox: true,
            device_selection: SelectionPolicy::default(),
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set custom shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the clear colour
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Enable or disable multisampling
    pub fn with_msaa(mut self, enabled: bool) -> Self {
        self.msaa = enabled;
        self
    }

    /// Set the device selection policy
    pub fn with_device_selection(mut self, policy: SelectionPolicy) -> Self {
        self.device_selection = policy;
        self
    }

    /// Whether validation layers should be requested for this build
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Validation("Application name cannot be empty".to_string()));
        }

        if !(1..=MAX_FRAMES_IN_FLIGHT_LIMIT).contains(&self.max_frames_in_flight) {
            return Err(ConfigError::Validation(format!(
                "Max frames in flight must be within 1..={MAX_FRAMES_IN_FLIGHT_LIMIT}, got {}",
                self.max_frames_in_flight
            )));
        }

        Ok(())
    }
}

impl Default for VulkanRendererConfig {
    fn default() -> Self {
        Self::new("Forge Viewer")
    }
}

/// # Engine Settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
    /// Whether to enable debug features
    pub debug_mode: bool,
}

impl EngineSettings {
    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_mode: cfg!(debug_assertions),
        }
    }
}

/// # Asset Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Base directory for assets
    pub assets_dir: String,
    /// Model loaded when none is given on the command line
    pub default_model: Option<String>,
    /// Texture applied to the default model
    pub default_texture: Option<String>,
}

impl AssetConfig {
    /// Set assets directory
    pub fn with_assets_dir(mut self, dir: impl Into<String>) -> Self {
        self.assets_dir = dir.into();
        self
    }

    /// Resolve a path relative to the assets directory
    ///
    /// Absolute paths and paths that already exist are returned unchanged.
    pub fn resolve(&self, path: &str) -> String {
        let candidate = Path::new(path);
        if candidate.is_absolute() || candidate.exists() {
            path.to_string()
        } else {
            Path::new(&self.assets_dir).join(path).display().to_string()
        }
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            assets_dir: "resources".to_string(),
            default_model: Some("models/cube.obj".to_string()),
            default_texture: None,
        }
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration that encompasses all engine subsystems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine-wide settings
    pub engine: EngineSettings,
    /// Window configuration
    pub window: WindowConfig,
    /// Rendering system configuration
    pub renderer: VulkanRendererConfig,
    /// Asset system configuration
    pub assets: AssetConfig,
}

impl ApplicationConfig {
    /// Create a new application configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            window: WindowConfig::new(app_name.clone(), 1280, 720),
            renderer: VulkanRendererConfig::new(app_name),
            ..Default::default()
        }
    }

    /// Replace the window configuration
    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    /// Replace the renderer configuration
    pub fn with_renderer(mut self, renderer: VulkanRendererConfig) -> Self {
        self.renderer = renderer;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate()?;
        self.renderer.validate()?;
        Ok(())
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_use_three_frames_in_flight() {
        let config = ApplicationConfig::default();
        assert_eq!(config.renderer.max_frames_in_flight, 3);
        assert!(config.renderer.prefer_mailbox);
        assert_eq!(config.renderer.device_selection, SelectionPolicy::FirstSuitable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        let zero = VulkanRendererConfig::default().with_max_frames_in_flight(0);
        assert!(matches!(zero.validate(), Err(ConfigError::Validation(_))));

        let nine = VulkanRendererConfig::default().with_max_frames_in_flight(9);
        assert!(nine.validate().is_err());

        let eight = VulkanRendererConfig::default().with_max_frames_in_flight(8);
        assert!(eight.validate().is_ok());
    }

    #[test]
    fn test_empty_application_name_rejected() {
        let config = VulkanRendererConfig::new("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_window_size_rejected() {
        let config = ApplicationConfig::default().with_window(WindowConfig::new("w", 0, 600));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_validation_overrides_build_type() {
        assert!(VulkanRendererConfig::default().with_validation(true).validation_enabled());
        assert!(!VulkanRendererConfig::default().with_validation(false).validation_enabled());
    }

    #[test]
    fn test_missing_shader_fails_validation() {
        let shaders = ShaderConfig::new("does/not/exist.vert.spv", "nor/this.frag.spv");
        assert!(shaders.validate().is_err());
    }

    #[test]
    fn test_asset_path_resolution() {
        let assets = AssetConfig::default().with_assets_dir("data");
        assert_eq!(assets.resolve("models/x.obj"), Path::new("data").join("models/x.obj").display().to_string());
        #[cfg(unix)]
        assert_eq!(assets.resolve("/abs/x.obj"), "/abs/x.obj");
    }
}

//! Engine-level error type
//!
//! Every subsystem error funnels into [`EngineError`] at the application boundary,
//! where the driver logs it and exits with a failure code.

use thiserror::Error;

use crate::assets::AssetError;
use crate::config::ConfigError;
use crate::render::backends::vulkan::VulkanError;
use crate::render::window::WindowError;
use crate::scene::SceneError;

/// Top-level engine error
#[derive(Error, Debug)]
pub enum EngineError {
    /// Vulkan backend failure (fatal unless handled internally by the renderer)
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Asset loading failure
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Configuration loading or validation failure
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Scene graph misuse
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
}

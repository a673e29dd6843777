//! # Forge Engine
//!
//! A forward-rendering 3D engine with a Vulkan render core.
//!
//! ## Features
//!
//! - **Vulkan Render Core**: device selection, swapchain lifecycle, render pass and
//!   pipeline construction, frames-in-flight synchronization, staged resource upload
//! - **Scene Model**: arena-backed scene graph with cameras and mesh attachments
//! - **Asset Loading**: Wavefront OBJ, glTF 2.0 and common raster image formats
//! - **Configuration**: TOML / RON application configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use forge_engine::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     let config = ApplicationConfig::default();
//!     let mut window = Window::new(&config.window)?;
//!     let mut renderer = VulkanRenderer::new(&window, &config.renderer)?;
//!     let mut input = InputState::new();
//!
//!     renderer.add_asset(RenderAsset::from_mesh(MeshData::cube()))?;
//!     while !window.should_close() {
//!         input.begin_frame();
//!         for event in window.poll_events(&mut input) {
//!             if let WindowEvent::Resized { width, height } = event {
//!                 renderer.resize(width, height);
//!             }
//!         }
//!         renderer.draw_frame()?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod input;
pub mod scene;
pub mod assets;
pub mod render;

mod engine;

pub use engine::EngineError;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        EngineError,
        config::{Config, ApplicationConfig, VulkanRendererConfig, WindowConfig, ShaderConfig},
        foundation::math::{Vec3, Mat4, Transform},
        foundation::time::FrameClock,
        input::{InputState, KeyCode, MouseButtons, CameraController},
        scene::{Camera, SceneGraph, NodeId},
        assets::{ObjLoader, ImageData},
        config::AssetConfig,
        render::{RenderBackend, RenderAsset, MeshHandle, MeshData, Vertex, Window, WindowEvent},
        render::backends::vulkan::VulkanRenderer,
    };
}

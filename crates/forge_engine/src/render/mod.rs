//! Rendering system
//!
//! The application talks to a [`RenderBackend`]; the only implementation is the
//! Vulkan renderer in [`backends::vulkan`]. Backend-agnostic data (meshes, the
//! window wrapper) lives at this level.

pub mod backends;
pub mod mesh;
pub mod window;

pub use mesh::{MeshData, Vertex};
pub use window::{Window, WindowError, WindowEvent};

use crate::assets::ImageData;
use crate::scene::{Camera, SceneGraph};
use crate::EngineError;

/// Handle to a mesh uploaded to a render backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub usize);

/// Geometry plus optional base colour texture, ready to hand to a backend
#[derive(Debug, Clone)]
pub struct RenderAsset {
    /// Triangle mesh
    pub mesh: MeshData,
    /// Base colour texture; a white texture is used when absent
    pub texture: Option<ImageData>,
}

impl RenderAsset {
    /// Untextured asset
    pub fn from_mesh(mesh: MeshData) -> Self {
        Self { mesh, texture: None }
    }

    /// Attach a base colour texture
    pub fn with_texture(mut self, texture: ImageData) -> Self {
        self.texture = Some(texture);
        self
    }
}

/// Interface between the application loop and a graphics API
pub trait RenderBackend {
    /// Upload an asset and return a handle scene nodes can refer to
    fn add_asset(&mut self, asset: RenderAsset) -> Result<MeshHandle, EngineError>;

    /// Use this camera for subsequent frames
    fn set_camera(&mut self, camera: &Camera);

    /// Take the current mesh instances (handle + world matrix) from a scene
    fn submit_scene(&mut self, scene: &SceneGraph);

    /// Tell the backend the framebuffer size changed
    fn resize(&mut self, width: u32, height: u32);

    /// Render and present one frame
    fn draw_frame(&mut self) -> Result<(), EngineError>;
}

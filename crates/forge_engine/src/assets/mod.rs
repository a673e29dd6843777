//! Asset loading
//!
//! Loaders turn files on disk into CPU-side data ([`MeshData`](crate::render::MeshData),
//! [`ImageData`], [`LoadedScene`]) ready for upload by the renderer.

pub mod obj_loader;
pub mod image_loader;
pub mod gltf_loader;

pub use obj_loader::ObjLoader;
pub use image_loader::ImageData;
pub use gltf_loader::{load_scene, LoadedScene};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset not found
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Malformed asset contents
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Unsupported asset format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// IO error during asset loading
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Map an IO error on `path` to [`AssetError::NotFound`] when the file is missing
pub(crate) fn open_error(path: &std::path::Path, err: std::io::Error) -> AssetError {
    if err.kind() == std::io::ErrorKind::NotFound {
        AssetError::NotFound(path.display().to_string())
    } else {
        AssetError::Io(err)
    }
}

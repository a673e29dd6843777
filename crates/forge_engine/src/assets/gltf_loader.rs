//! glTF 2.0 scene loader
//!
//! Loads one scene (the default scene, or the first one) into a [`SceneGraph`].
//! Each glTF mesh becomes one [`MeshData`] with all of its triangle primitives
//! merged; nodes refer to it through `MeshHandle(index into LoadedScene::meshes)`.
//! A mesh's texture is the base colour texture of its first textured primitive.

use std::path::Path;

use gltf::mesh::Mode;

use super::{AssetError, ImageData};
use crate::foundation::math::{Quat, Quaternion, Transform, Vec3};
use crate::render::{MeshData, MeshHandle, Vertex};
use crate::scene::{NodeId, SceneGraph};

/// Result of loading a glTF file
#[derive(Debug, Default)]
pub struct LoadedScene {
    /// Node hierarchy of the loaded scene
    pub graph: SceneGraph,
    /// Meshes referenced by `graph` nodes, indexed by `MeshHandle.0`
    pub meshes: Vec<MeshData>,
    /// Decoded glTF images by image index; `None` for unsupported pixel formats
    pub textures: Vec<Option<ImageData>>,
    /// Base colour image index of each mesh, parallel to `meshes`
    pub mesh_textures: Vec<Option<usize>>,
}

impl LoadedScene {
    /// Base colour texture of mesh `mesh_index`, if its material has a usable one
    pub fn texture_for(&self, mesh_index: usize) -> Option<&ImageData> {
        let image = self.mesh_textures.get(mesh_index).copied().flatten()?;
        self.textures.get(image)?.as_ref()
    }
}

/// Load a glTF / GLB file
pub fn load_scene<P: AsRef<Path>>(path: P) -> Result<LoadedScene, AssetError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AssetError::NotFound(path.display().to_string()));
    }
    log::debug!("Loading glTF from {:?}", path);

    let (document, buffers, images) = gltf::import(path)
        .map_err(|e| AssetError::LoadFailed(format!("{}: {e}", path.display())))?;

    let scene_count = document.scenes().len();
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| AssetError::InvalidData(format!("{} contains no scenes", path.display())))?;
    if scene_count > 1 {
        log::warn!(
            "{} has {} scenes, loading only scene {}",
            path.display(),
            scene_count,
            scene.index()
        );
    }

    let meshes = document
        .meshes()
        .map(|mesh| read_mesh(&mesh, &buffers))
        .collect::<Result<Vec<_>, _>>()?;
    let mesh_textures: Vec<Option<usize>> = document.meshes().map(|mesh| base_color_image(&mesh)).collect();

    let mut graph = SceneGraph::new();
    let mut stack: Vec<(gltf::Node<'_>, Option<NodeId>)> =
        scene.nodes().map(|node| (node, None)).collect();
    while let Some((node, parent)) = stack.pop() {
        let name = node.name().map_or_else(|| format!("node_{}", node.index()), str::to_string);
        let transform = node_transform(&node);
        let id = match parent {
            Some(parent) => graph
                .add_child(parent, name, transform)
                .map_err(|e| AssetError::InvalidData(e.to_string()))?,
            None => graph.add_root(name, transform),
        };
        if let Some(mesh) = node.mesh() {
            graph
                .set_mesh(id, MeshHandle(mesh.index()))
                .map_err(|e| AssetError::InvalidData(e.to_string()))?;
        }
        stack.extend(node.children().map(|child| (child, Some(id))));
    }

    let textures: Vec<Option<ImageData>> = images.iter().map(convert_image).collect();

    log::info!(
        "Loaded {:?}: {} nodes, {} meshes, {} images",
        path,
        graph.len(),
        meshes.len(),
        textures.len()
    );

    Ok(LoadedScene {
        graph,
        meshes,
        textures,
        mesh_textures,
    })
}

fn base_color_image(mesh: &gltf::Mesh<'_>) -> Option<usize> {
    mesh.primitives()
        .filter(|primitive| primitive.mode() == Mode::Triangles)
        .find_map(|primitive| primitive.material().pbr_metallic_roughness().base_color_texture())
        .map(|info| info.texture().source().index())
}

fn node_transform(node: &gltf::Node<'_>) -> Transform {
    let (translation, [x, y, z, w], scale) = node.transform().decomposed();
    Transform::from_trs(
        Vec3::from(translation),
        Quat::new_normalize(Quaternion::new(w, x, y, z)),
        Vec3::from(scale),
    )
}

fn read_mesh(mesh: &gltf::Mesh<'_>, buffers: &[gltf::buffer::Data]) -> Result<MeshData, AssetError> {
    let label = mesh.name().map_or_else(|| format!("mesh {}", mesh.index()), str::to_string);
    let mut data = MeshData::default();

    for primitive in mesh.primitives() {
        if primitive.mode() != Mode::Triangles {
            log::warn!("{label}: skipping primitive with mode {:?}", primitive.mode());
            continue;
        }

        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|b| &b.0[..]));
        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .ok_or_else(|| AssetError::InvalidData(format!("{label}: primitive has no POSITION")))?
            .collect();

        let base = u32::try_from(data.vertices.len())
            .map_err(|_| AssetError::InvalidData(format!("{label}: too many vertices")))?;
        let start = data.vertices.len();
        data.vertices
            .extend(positions.iter().map(|&p| Vertex::new(p, Vertex::DEFAULT_NORMAL, [0.0, 0.0])));
        let added = &mut data.vertices[start..];

        match reader.read_normals() {
            Some(normals) => added.iter_mut().zip(normals).for_each(|(v, n)| v.normal = n),
            None => log::debug!("{label}: no NORMAL attribute, using default"),
        }
        match reader.read_tex_coords(0) {
            Some(uvs) => added.iter_mut().zip(uvs.into_f32()).for_each(|(v, uv)| v.uv = uv),
            None => log::debug!("{label}: no TEXCOORD_0 attribute, using default"),
        }
        match reader.read_colors(0) {
            Some(colors) => added
                .iter_mut()
                .zip(colors.into_rgb_f32())
                .for_each(|(v, c)| v.color = c),
            None => log::debug!("{label}: no COLOR_0 attribute, using white"),
        }
        match reader.read_tangents() {
            Some(tangents) => added.iter_mut().zip(tangents).for_each(|(v, t)| v.tangent = t),
            None => log::debug!("{label}: no TANGENT attribute, using default"),
        }

        match reader.read_indices() {
            Some(indices) => data.indices.extend(indices.into_u32().map(|i| i + base)),
            None => {
                let count = u32::try_from(positions.len())
                    .map_err(|_| AssetError::InvalidData(format!("{label}: too many vertices")))?;
                data.indices.extend((0..count).map(|i| i + base));
            }
        }
    }

    data.validate()
        .map_err(|e| AssetError::InvalidData(format!("{label}: {e}")))?;
    Ok(data)
}

fn convert_image(image: &gltf::image::Data) -> Option<ImageData> {
    use gltf::image::Format;

    let data = match image.format {
        Format::R8G8B8A8 => image.pixels.clone(),
        Format::R8G8B8 => image
            .pixels
            .chunks_exact(3)
            .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], u8::MAX])
            .collect(),
        other => {
            log::warn!("Unsupported glTF image format {:?}, ignoring texture", other);
            return None;
        }
    };

    Some(ImageData {
        data,
        width: image.width,
        height: image.height,
    })
}

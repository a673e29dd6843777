//! OBJ and glTF files written to a temporary directory and loaded back

use std::io::Write;

use approx::assert_relative_eq;
use forge_engine::assets::{load_scene, AssetError, ObjLoader};
use forge_engine::render::{MeshHandle, Vertex};

const QUAD_OBJ: &str = "\
# unit quad in the XY plane
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
vn 0.0 0.0 1.0
f 1/1/1 2/2/1 3/3/1 4/4/1
";

#[test]
fn obj_quad_is_fan_triangulated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quad.obj");
    std::fs::write(&path, QUAD_OBJ).unwrap();

    let mesh = ObjLoader::load_obj(&path).unwrap();

    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    assert_eq!(mesh.vertices[2].position, [1.0, 1.0, 0.0]);
    // V is flipped for Vulkan
    assert_eq!(mesh.vertices[2].uv, [1.0, 0.0]);
    assert!(mesh.vertices.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));
}

#[test]
fn obj_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let result = ObjLoader::load_obj(dir.path().join("absent.obj"));
    assert!(matches!(result, Err(AssetError::NotFound(_))));
}

/// One triangle under a translated parent node, positions and indices only
fn write_triangle_gltf(dir: &std::path::Path) -> std::path::PathBuf {
    let mut bin = Vec::new();
    for position in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
        for component in position {
            bin.extend_from_slice(&component.to_le_bytes());
        }
    }
    for index in [0u32, 1, 2] {
        bin.extend_from_slice(&index.to_le_bytes());
    }
    std::fs::File::create(dir.join("triangle.bin"))
        .unwrap()
        .write_all(&bin)
        .unwrap();

    let json = r#"{
  "asset": { "version": "2.0" },
  "scene": 0,
  "scenes": [ { "nodes": [0] } ],
  "nodes": [
    { "name": "parent", "translation": [0.0, 0.0, 2.0], "children": [1] },
    { "name": "child", "translation": [1.0, 0.0, 0.0], "mesh": 0 }
  ],
  "meshes": [
    { "name": "triangle", "primitives": [ { "attributes": { "POSITION": 0 }, "indices": 1 } ] }
  ],
  "buffers": [ { "uri": "triangle.bin", "byteLength": 48 } ],
  "bufferViews": [
    { "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 },
    { "buffer": 0, "byteOffset": 36, "byteLength": 12, "target": 34963 }
  ],
  "accessors": [
    { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
    { "bufferView": 1, "componentType": 5125, "count": 3, "type": "SCALAR" }
  ]
}"#;
    let path = dir.join("triangle.gltf");
    std::fs::write(&path, json).unwrap();
    path
}

#[test]
fn gltf_nodes_become_scene_graph() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_triangle_gltf(dir.path());

    let loaded = load_scene(&path).unwrap();

    assert_eq!(loaded.meshes.len(), 1);
    assert_eq!(loaded.graph.len(), 2);
    assert!(loaded.textures.is_empty());
    assert!(loaded.texture_for(0).is_none());

    let parent = loaded.graph.find_by_name("parent").unwrap();
    let child = loaded.graph.find_by_name("child").unwrap();
    assert_eq!(loaded.graph.node(child).unwrap().parent(), Some(parent));

    let world = loaded.graph.world_transform(child).unwrap();
    assert_relative_eq!(world[(0, 3)], 1.0);
    assert_relative_eq!(world[(2, 3)], 2.0);

    let instances = loaded.graph.mesh_nodes();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].0, MeshHandle(0));
}

#[test]
fn gltf_missing_attributes_use_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_triangle_gltf(dir.path());

    let mesh = &load_scene(&path).unwrap().meshes[0];

    assert_eq!(mesh.indices, vec![0, 1, 2]);
    assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 0.0]);
    for vertex in &mesh.vertices {
        assert_eq!(vertex.normal, Vertex::DEFAULT_NORMAL);
        assert_eq!(vertex.color, Vertex::DEFAULT_COLOR);
        assert_eq!(vertex.tangent, Vertex::DEFAULT_TANGENT);
        assert_eq!(vertex.uv, [0.0, 0.0]);
    }
}

#[test]
fn gltf_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_scene(dir.path().join("absent.gltf")),
        Err(AssetError::NotFound(_))
    ));
}

#[test]
fn gltf_meshes_keep_their_own_material_texture() {
    let dir = tempfile::tempdir().unwrap();
    write_triangle_gltf(dir.path());
    image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 0, 0, 255]))
        .save(dir.path().join("red.png"))
        .unwrap();

    let json = r#"{
  "asset": { "version": "2.0" },
  "scene": 0,
  "scenes": [ { "nodes": [0, 1] } ],
  "nodes": [
    { "name": "plain", "mesh": 0 },
    { "name": "painted", "mesh": 1 }
  ],
  "meshes": [
    { "primitives": [ { "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 } ] },
    { "primitives": [ { "attributes": { "POSITION": 0 }, "indices": 1, "material": 1 } ] }
  ],
  "materials": [
    { "name": "untextured" },
    { "name": "red", "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } }
  ],
  "textures": [ { "source": 0 } ],
  "images": [ { "uri": "red.png" } ],
  "buffers": [ { "uri": "triangle.bin", "byteLength": 48 } ],
  "bufferViews": [
    { "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 },
    { "buffer": 0, "byteOffset": 36, "byteLength": 12, "target": 34963 }
  ],
  "accessors": [
    { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
    { "bufferView": 1, "componentType": 5125, "count": 3, "type": "SCALAR" }
  ]
}"#;
    let path = dir.path().join("two_materials.gltf");
    std::fs::write(&path, json).unwrap();

    let loaded = load_scene(&path).unwrap();

    assert_eq!(loaded.meshes.len(), 2);
    assert_eq!(loaded.mesh_textures, vec![None, Some(0)]);
    assert!(loaded.texture_for(0).is_none());

    let texture = loaded.texture_for(1).unwrap();
    assert_eq!((texture.width, texture.height), (1, 1));
    assert_eq!(texture.data, vec![255, 0, 0, 255]);
}

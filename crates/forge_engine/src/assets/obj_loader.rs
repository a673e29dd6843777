//! OBJ file loader for 3D models
//!
//! Supports `v` (with optional `r g b` vertex colours), `vt`, `vn` and `f`
//! statements. Polygons are fan-triangulated and identical vertices are merged.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{open_error, AssetError};
use crate::foundation::math::Vec3;
use crate::render::{MeshData, Vertex};

/// Wavefront OBJ loader
pub struct ObjLoader;

#[derive(Default)]
struct ObjAttributes {
    positions: Vec<[f32; 3]>,
    colors: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    tex_coords: Vec<[f32; 2]>,
}

struct FaceCorner {
    position: usize,
    tex_coord: Option<usize>,
    normal: Option<usize>,
}

impl ObjLoader {
    /// Load an OBJ file into an indexed mesh
    pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<MeshData, AssetError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| open_error(path, e))?;
        log::debug!("Loading OBJ from {:?}", path);

        let mesh = Self::parse(BufReader::new(file))?;
        log::info!(
            "Loaded {:?}: {} vertices, {} triangles",
            path,
            mesh.vertices.len(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }

    /// Parse OBJ text from any reader
    pub fn parse<R: BufRead>(reader: R) -> Result<MeshData, AssetError> {
        let mut attributes = ObjAttributes::default();
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut unique: HashMap<[u32; 15], u32> = HashMap::new();

        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let Some(keyword) = parts.next() else { continue };
            let args: Vec<&str> = parts.collect();
            let at = |what: &str| format!("line {}: {}", line_number + 1, what);

            match keyword {
                "v" => {
                    let values = parse_floats(&args).map_err(|e| AssetError::InvalidData(at(e.as_str())))?;
                    if values.len() < 3 {
                        return Err(AssetError::InvalidData(at("vertex needs 3 coordinates")));
                    }
                    attributes.positions.push([values[0], values[1], values[2]]);
                    let color = if values.len() >= 6 {
                        [values[3], values[4], values[5]]
                    } else {
                        Vertex::DEFAULT_COLOR
                    };
                    attributes.colors.push(color);
                }
                "vn" => {
                    let values = parse_floats(&args).map_err(|e| AssetError::InvalidData(at(e.as_str())))?;
                    if values.len() < 3 {
                        return Err(AssetError::InvalidData(at("normal needs 3 components")));
                    }
                    attributes.normals.push([values[0], values[1], values[2]]);
                }
                "vt" => {
                    let values = parse_floats(&args).map_err(|e| AssetError::InvalidData(at(e.as_str())))?;
                    if values.len() < 2 {
                        return Err(AssetError::InvalidData(at("texture coordinate needs 2 components")));
                    }
                    // OBJ has V pointing up; Vulkan samples with V pointing down.
                    attributes.tex_coords.push([values[0], 1.0 - values[1]]);
                }
                "f" => {
                    if args.len() < 3 {
                        return Err(AssetError::InvalidData(at("face needs at least 3 vertices")));
                    }
                    let corners = args
                        .iter()
                        .map(|corner| parse_corner(corner, &attributes))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|e| AssetError::InvalidData(at(e.as_str())))?;

                    let flat_normal = face_normal(&corners, &attributes);
                    let mut face_indices = Vec::with_capacity(corners.len());
                    for corner in &corners {
                        let vertex = build_vertex(corner, &attributes, flat_normal);
                        let index = *unique.entry(vertex.dedup_key()).or_insert_with(|| {
                            vertices.push(vertex);
                            #[allow(clippy::cast_possible_truncation)]
                            let index = (vertices.len() - 1) as u32;
                            index
                        });
                        face_indices.push(index);
                    }

                    for i in 1..face_indices.len() - 1 {
                        indices.extend_from_slice(&[face_indices[0], face_indices[i], face_indices[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        if vertices.is_empty() {
            return Err(AssetError::InvalidData("No faces found in OBJ file".to_string()));
        }

        Ok(MeshData::new(vertices, indices))
    }
}

fn parse_floats(args: &[&str]) -> Result<Vec<f32>, String> {
    args.iter()
        .map(|s| s.parse::<f32>().map_err(|_| format!("invalid number '{s}'")))
        .collect()
}

/// Resolve a 1-based (or negative, relative) OBJ index against `len` elements
fn resolve_index(raw: &str, len: usize, what: &str) -> Result<usize, String> {
    let value: i64 = raw.parse().map_err(|_| format!("invalid {what} index '{raw}'"))?;
    let len = i64::try_from(len).map_err(|_| format!("too many {what} entries"))?;
    let resolved = match value {
        v if v > 0 => v - 1,
        v if v < 0 => len + v,
        _ => return Err(format!("{what} index 0 is invalid")),
    };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).map_err(|_| format!("{what} index {raw} out of range"))
    } else {
        Err(format!("{what} index {raw} out of range"))
    }
}

fn parse_corner(corner: &str, attributes: &ObjAttributes) -> Result<FaceCorner, String> {
    let mut fields = corner.split('/');
    let position = fields
        .next()
        .ok_or_else(|| format!("empty face corner '{corner}'"))
        .and_then(|raw| resolve_index(raw, attributes.positions.len(), "position"))?;

    let tex_coord = match fields.next() {
        Some(raw) if !raw.is_empty() => {
            Some(resolve_index(raw, attributes.tex_coords.len(), "texture coordinate")?)
        }
        _ => None,
    };
    let normal = match fields.next() {
        Some(raw) if !raw.is_empty() => Some(resolve_index(raw, attributes.normals.len(), "normal")?),
        _ => None,
    };

    Ok(FaceCorner { position, tex_coord, normal })
}

fn face_normal(corners: &[FaceCorner], attributes: &ObjAttributes) -> [f32; 3] {
    let p = |i: usize| Vec3::from(attributes.positions[corners[i].position]);
    let normal = (p(1) - p(0)).cross(&(p(2) - p(0)));
    normal
        .try_normalize(f32::EPSILON)
        .map_or(Vertex::DEFAULT_NORMAL, Into::into)
}

fn build_vertex(corner: &FaceCorner, attributes: &ObjAttributes, face_normal: [f32; 3]) -> Vertex {
    let mut vertex = Vertex::new(
        attributes.positions[corner.position],
        corner.normal.map_or(face_normal, |i| attributes.normals[i]),
        corner.tex_coord.map_or([0.0, 0.0], |i| attributes.tex_coords[i]),
    );
    vertex.color = attributes.colors[corner.position];
    vertex
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const QUAD: &str = "\
# quad made of one polygon
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn test_polygon_is_fan_triangulated() {
        let mesh = ObjLoader::parse(Cursor::new(QUAD)).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(mesh.vertices[0].uv, [0.0, 1.0]);
    }

    #[test]
    fn test_shared_corners_are_deduplicated() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3\nf 1 3 4\n";
        let mesh = ObjLoader::parse(Cursor::new(obj)).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
    }

    #[test]
    fn test_missing_normals_use_face_normal() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = ObjLoader::parse(Cursor::new(obj)).unwrap();
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_negative_indices_and_vertex_colors() {
        let obj = "v 0 0 0 1 0 0\nv 1 0 0 0 1 0\nv 0 1 0 0 0 1\nf -3 -2 -1\n";
        let mesh = ObjLoader::parse(Cursor::new(obj)).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.vertices[1].color, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_out_of_range_index_is_an_error() {
        let obj = "v 0 0 0\nv 1 0 0\nf 1 2 3\n";
        assert!(matches!(
            ObjLoader::parse(Cursor::new(obj)),
            Err(AssetError::InvalidData(_))
        ));
    }

    #[test]
    fn test_file_without_faces_is_an_error() {
        assert!(ObjLoader::parse(Cursor::new("v 0 0 0\n")).is_err());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        assert!(matches!(
            ObjLoader::load_obj("definitely/not/here.obj"),
            Err(AssetError::NotFound(_))
        ));
    }
}

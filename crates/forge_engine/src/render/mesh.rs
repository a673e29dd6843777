//! CPU-side mesh data
//!
//! [`Vertex`] is a plain `#[repr(C)]` record that is uploaded to the GPU as-is.
//! The Vulkan input layout for it lives in the backend's `vertex_layout` module.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Vec3;

/// Interleaved vertex as consumed by the forward pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],
    /// Unit normal
    pub normal: [f32; 3],
    /// Linear RGB vertex colour
    pub color: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
    /// Tangent (xyz) and bitangent sign (w)
    pub tangent: [f32; 4],
}

impl Vertex {
    /// Default normal used when a source provides none
    pub const DEFAULT_NORMAL: [f32; 3] = [0.0, 1.0, 0.0];
    /// Default colour used when a source provides none
    pub const DEFAULT_COLOR: [f32; 3] = [1.0, 1.0, 1.0];
    /// Default tangent used when a source provides none
    pub const DEFAULT_TANGENT: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

    /// Create a vertex with default colour and tangent
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            color: Self::DEFAULT_COLOR,
            uv,
            tangent: Self::DEFAULT_TANGENT,
        }
    }

    /// Bit-exact key for deduplication (`f32` is not `Eq`/`Hash`)
    pub fn dedup_key(&self) -> [u32; 15] {
        bytemuck::cast(*self)
    }
}

impl Default for Vertex {
    fn default() -> Self {
        Self::new([0.0; 3], Self::DEFAULT_NORMAL, [0.0; 2])
    }
}

/// Indexed triangle list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Triangle indices into `vertices`
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Create a mesh from vertices and indices
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check that the mesh is a non-empty triangle list with in-range indices
    pub fn validate(&self) -> Result<(), String> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err("Mesh has no geometry".to_string());
        }
        if self.indices.len() % 3 != 0 {
            return Err(format!("Index count {} is not a multiple of 3", self.indices.len()));
        }
        let vertex_count = self.vertices.len();
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(format!("Index {bad} out of range for {vertex_count} vertices"));
        }
        Ok(())
    }

    /// Bounding sphere as (center, radius), centred on the AABB midpoint
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        if self.vertices.is_empty() {
            return (Vec3::zeros(), 0.0);
        }

        let mut min = Vec3::repeat(f32::MAX);
        let mut max = Vec3::repeat(f32::MIN);
        for vertex in &self.vertices {
            let p = Vec3::from(vertex.position);
            min = min.inf(&p);
            max = max.sup(&p);
        }

        let center = (min + max) * 0.5;
        let radius = self
            .vertices
            .iter()
            .map(|v| (Vec3::from(v.position) - center).norm())
            .fold(0.0, f32::max);
        (center, radius)
    }

    /// Unit cube centred on the origin with per-face normals and UVs
    pub fn cube() -> Self {
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, right, up) in faces {
            let n = Vec3::from(normal);
            let r = Vec3::from(right);
            let u = Vec3::from(up);
            #[allow(clippy::cast_possible_truncation)]
            let base = vertices.len() as u32;
            for (sx, sy, uv) in [(-1.0, -1.0, [0.0, 1.0]), (1.0, -1.0, [1.0, 1.0]), (1.0, 1.0, [1.0, 0.0]), (-1.0, 1.0, [0.0, 0.0])] {
                let p = (n + r * sx + u * sy) * 0.5;
                let mut vertex = Vertex::new(p.into(), normal, uv);
                vertex.tangent = [right[0], right[1], right[2], 1.0];
                vertices.push(vertex);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(vertices, indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 60);
    }

    #[test]
    fn test_dedup_key_distinguishes_attributes() {
        let a = Vertex::new([0.0, 0.0, 0.0], Vertex::DEFAULT_NORMAL, [0.0, 0.0]);
        let mut b = a;
        assert_eq!(a.dedup_key(), b.dedup_key());
        b.uv = [0.5, 0.0];
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_cube_is_valid() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert!(cube.validate().is_ok());

        let (center, radius) = cube.bounding_sphere();
        assert!(center.norm() < 1e-6);
        assert!((radius - 3.0_f32.sqrt() * 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let mesh = MeshData::new(vec![Vertex::default(); 3], vec![0, 1, 3]);
        assert!(mesh.validate().is_err());

        let ragged = MeshData::new(vec![Vertex::default(); 3], vec![0, 1]);
        assert!(ragged.validate().is_err());
    }
}

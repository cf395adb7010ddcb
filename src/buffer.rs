//! Packing of mesh data into one contiguous binary buffer
//!
//! Each mesh contributes two segments to the shared blob: its triangle
//! indices as little-endian `u32` followed by its positions as little-endian
//! `f32` triples. Every segment is described by a buffer view (where it lives
//! in the blob) and an accessor (how to read it, including exact min/max
//! ranges of the data actually written). The blob only ever grows.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::extrude::Mesh;

/// Index of a mesh in the mesh arena
pub type MeshId = usize;

/// Numeric type of accessor components (GL 5125 and 5126)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    /// 32-bit unsigned integer
    UnsignedInt,
    /// 32-bit IEEE float
    Float,
}

/// Shape of one accessor element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// One component per element
    Scalar,
    /// Three components per element
    Vec3,
}

/// Intended GPU binding of a buffer view (GL 34962 and 34963)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTarget {
    /// Vertex attributes
    ArrayBuffer,
    /// Triangle indices
    ElementArrayBuffer,
}

/// A contiguous byte range of the blob
#[derive(Debug, Clone, PartialEq)]
pub struct BufferView {
    /// Start of the segment in bytes
    pub byte_offset: usize,
    /// Length of the segment in bytes
    pub byte_length: usize,
    /// Binding hint
    pub target: BufferTarget,
}

/// Typed view of one buffer view
#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    /// Buffer view index
    pub buffer_view: usize,
    /// Number of elements
    pub count: usize,
    /// Component type
    pub component_type: ComponentType,
    /// Element shape
    pub element_type: ElementType,
    /// Per-component minimum of the packed data
    pub min: Vec<f64>,
    /// Per-component maximum of the packed data
    pub max: Vec<f64>,
}

/// Accessor ids of one packed mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedMesh {
    /// Accessor of the triangle indices
    pub indices: usize,
    /// Accessor of the vertex positions
    pub positions: usize,
}

/// Accumulates mesh data into one blob plus its descriptors
#[derive(Debug, Default)]
pub struct BufferPacker {
    blob: Vec<u8>,
    views: Vec<BufferView>,
    accessors: Vec<Accessor>,
    packed: HashMap<MeshId, PackedMesh>,
}

impl BufferPacker {
    /// Create an empty packer
    pub fn new() -> Self {
        Self::default()
    }

    /// Pack a mesh, or return its existing accessors if already packed
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMesh`] for a mesh without triangles, since its
    /// ranges would be undefined.
    pub fn pack(&mut self, id: MeshId, mesh: &Mesh) -> Result<PackedMesh> {
        if let Some(&packed) = self.packed.get(&id) {
            return Ok(packed);
        }
        if mesh.is_empty() {
            return Err(Error::InvalidMesh(format!(
                "mesh '{}' has no triangles to pack",
                mesh.name
            )));
        }

        let indices = self.pack_indices(&mesh.triangles);
        let positions = self.pack_positions(&mesh.positions);
        let packed = PackedMesh { indices, positions };
        self.packed.insert(id, packed);
        log::debug!(
            "packed mesh '{}' ({} bytes total so far)",
            mesh.name,
            self.blob.len()
        );
        Ok(packed)
    }

    /// Accessors of a previously packed mesh
    pub fn get(&self, id: MeshId) -> Option<PackedMesh> {
        self.packed.get(&id).copied()
    }

    fn push_view(&mut self, bytes: Vec<u8>, target: BufferTarget) -> usize {
        self.views.push(BufferView {
            byte_offset: self.blob.len(),
            byte_length: bytes.len(),
            target,
        });
        self.blob.extend(bytes);
        self.views.len() - 1
    }

    fn pack_indices(&mut self, triangles: &[[u32; 3]]) -> usize {
        let flat = triangles.iter().flatten().copied();
        let min = flat.clone().min().unwrap_or(0);
        let max = flat.clone().max().unwrap_or(0);
        let bytes: Vec<u8> = flat.flat_map(u32::to_le_bytes).collect();

        let buffer_view = self.push_view(bytes, BufferTarget::ElementArrayBuffer);
        self.accessors.push(Accessor {
            buffer_view,
            count: triangles.len() * 3,
            component_type: ComponentType::UnsignedInt,
            element_type: ElementType::Scalar,
            min: vec![f64::from(min)],
            max: vec![f64::from(max)],
        });
        self.accessors.len() - 1
    }

    fn pack_positions(&mut self, positions: &[[f64; 3]]) -> usize {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        let mut bytes = Vec::with_capacity(positions.len() * 12);
        for p in positions {
            for axis in 0..3 {
                let value = p[axis] as f32;
                min[axis] = min[axis].min(value);
                max[axis] = max[axis].max(value);
                bytes.extend(value.to_le_bytes());
            }
        }

        let buffer_view = self.push_view(bytes, BufferTarget::ArrayBuffer);
        self.accessors.push(Accessor {
            buffer_view,
            count: positions.len(),
            component_type: ComponentType::Float,
            element_type: ElementType::Vec3,
            min: min.iter().map(|&v| f64::from(v)).collect(),
            max: max.iter().map(|&v| f64::from(v)).collect(),
        });
        self.accessors.len() - 1
    }

    /// The packed bytes
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Buffer views in creation order
    pub fn views(&self) -> &[BufferView] {
        &self.views
    }

    /// Accessors in creation order
    pub fn accessors(&self) -> &[Accessor] {
        &self.accessors
    }

    /// Consume the packer, returning the blob
    pub fn into_blob(self) -> Vec<u8> {
        self.blob
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_mesh() -> Mesh {
        let mut mesh = Mesh::new("C_L", 0);
        mesh.positions = vec![[0.0, 0.0, 0.0], [2.0, -1.0, 0.5], [1.0, 3.0, 0.25]];
        mesh.triangles = vec![[0, 1, 2]];
        mesh
    }

    #[test]
    fn test_indices_packed_before_positions() {
        let mut packer = BufferPacker::new();
        let packed = packer.pack(0, &triangle_mesh()).unwrap();

        assert_eq!(packed, PackedMesh { indices: 0, positions: 1 });
        let views = packer.views();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].byte_offset, 0);
        assert_eq!(views[0].byte_length, 12);
        assert_eq!(views[0].target, BufferTarget::ElementArrayBuffer);
        assert_eq!(views[1].byte_offset, 12);
        assert_eq!(views[1].byte_length, 36);
        assert_eq!(views[1].target, BufferTarget::ArrayBuffer);
        assert_eq!(packer.blob().len(), 48);
    }

    #[test]
    fn test_ranges_are_exact() {
        let mut packer = BufferPacker::new();
        packer.pack(0, &triangle_mesh()).unwrap();
        let [indices, positions] = packer.accessors() else {
            panic!("expected two accessors");
        };

        assert_eq!(indices.count, 3);
        assert_eq!(indices.min, vec![0.0]);
        assert_eq!(indices.max, vec![2.0]);
        assert_eq!(indices.component_type, ComponentType::UnsignedInt);

        assert_eq!(positions.count, 3);
        assert_eq!(positions.min, vec![0.0, -1.0, 0.0]);
        assert_eq!(positions.max, vec![2.0, 3.0, 0.5]);
        assert_eq!(positions.element_type, ElementType::Vec3);
    }

    #[test]
    fn test_blob_is_little_endian() {
        let mut packer = BufferPacker::new();
        packer.pack(0, &triangle_mesh()).unwrap();
        let blob = packer.blob();
        assert_eq!(&blob[4..8], &1u32.to_le_bytes());
        assert_eq!(&blob[12 + 12..12 + 16], &2.0f32.to_le_bytes());
    }

    #[test]
    fn test_mesh_is_packed_once() {
        let mut packer = BufferPacker::new();
        let mesh = triangle_mesh();
        let first = packer.pack(7, &mesh).unwrap();
        let again = packer.pack(7, &mesh).unwrap();
        assert_eq!(first, again);
        assert_eq!(packer.views().len(), 2);
        assert_eq!(packer.get(7), Some(first));
    }

    #[test]
    fn test_second_mesh_follows_first() {
        let mut packer = BufferPacker::new();
        packer.pack(0, &triangle_mesh()).unwrap();
        let second = packer.pack(1, &triangle_mesh()).unwrap();
        assert_eq!(second, PackedMesh { indices: 2, positions: 3 });
        assert_eq!(packer.views()[2].byte_offset, 48);
    }

    #[test]
    fn test_empty_mesh_rejected() {
        let mut packer = BufferPacker::new();
        assert!(packer.pack(0, &Mesh::new("empty", 0)).is_err());
        assert!(packer.blob().is_empty());
    }
}

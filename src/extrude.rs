//! Extrusion of triangulated polygons into closed solids
//!
//! Every polygon becomes a prism between `zmin` and `zmax`: the triangulated
//! face on top, its mirror image underneath, and one quad (two triangles) per
//! boundary edge along the sides. All faces wind counter-clockwise when seen
//! from outside the solid.

use crate::error::{Error, Result};
use crate::layer_stack::{LayerIndex, ZRange};
use crate::triangulation::TriangulatedPolygon;

/// A triangle mesh for one (cell, layer) pair
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Mesh name, `"{cell}_{layer}"`
    pub name: String,
    /// Layer the mesh was built for; doubles as material index
    pub material: LayerIndex,
    /// Vertex positions
    pub positions: Vec<[f64; 3]>,
    /// Triangles as vertex index triples
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    /// Create an empty mesh
    pub fn new(name: impl Into<String>, material: LayerIndex) -> Self {
        Self {
            name: name.into(),
            material,
            positions: Vec::new(),
            triangles: Vec::new(),
        }
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Whether the mesh has no triangles
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Append the extruded solid of one polygon
    ///
    /// The polygon's indices are offset by the vertices already present.
    /// Polygons whose face has no triangles contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMesh`] if the mesh would outgrow 32-bit indices.
    pub fn append_extrusion(&mut self, polygon: &TriangulatedPolygon, z: ZRange) -> Result<()> {
        if polygon.face.triangles.is_empty() {
            return Ok(());
        }
        let (positions, triangles) = extrude(polygon, z);
        let offset = vertex_offset(&self.name, self.positions.len(), positions.len())?;
        self.positions.extend(positions);
        self.triangles.extend(
            triangles
                .into_iter()
                .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]),
        );
        Ok(())
    }

    /// Check that every index is in range and every coordinate finite
    pub fn validate(&self) -> Result<()> {
        let count = self.positions.len();
        if count > u32::MAX as usize {
            return Err(Error::InvalidMesh(format!(
                "mesh '{}' has {} vertices, more than 32-bit indices can address",
                self.name, count
            )));
        }
        if let Some(p) = self.positions.iter().find(|p| !p.iter().all(|c| c.is_finite())) {
            return Err(Error::InvalidMesh(format!(
                "mesh '{}' has a non-finite vertex {:?}",
                self.name, p
            )));
        }
        for (i, tri) in self.triangles.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&v| v as usize >= count) {
                return Err(Error::InvalidMesh(format!(
                    "mesh '{}' triangle {} uses vertex {} but only {} exist",
                    self.name, i, index, count
                )));
            }
        }
        Ok(())
    }
}

/// Triangle count of an extruded polygon: top, bottom and two per boundary edge
pub fn extruded_triangle_count(top_triangles: usize, boundary_vertices: usize) -> usize {
    2 * top_triangles + 2 * boundary_vertices
}

/// Build the closed solid of one polygon
///
/// Returns positions (top vertices first, then bottom vertices) and
/// triangles indexing them.
pub fn extrude(polygon: &TriangulatedPolygon, z: ZRange) -> (Vec<[f64; 3]>, Vec<[u32; 3]>) {
    let face = &polygon.face;
    let n = face.vertices.len() as u32;

    let mut positions = Vec::with_capacity(face.vertices.len() * 2);
    positions.extend(face.vertices.iter().map(|v| [v.x, v.y, z.zmax]));
    positions.extend(face.vertices.iter().map(|v| [v.x, v.y, z.zmin]));

    let mut triangles = Vec::with_capacity(extruded_triangle_count(
        face.triangles.len(),
        polygon.boundary.len(),
    ));
    triangles.extend(face.triangles.iter().copied());
    triangles.extend(face.triangles.iter().map(|t| [t[2] + n, t[1] + n, t[0] + n]));

    // Walls follow the boundary counter-clockwise so they face outward.
    let mut ring = polygon.boundary.clone();
    if polygon.clockwise {
        ring.reverse();
    }
    let m = ring.len();
    for k in 0..m {
        let top = ring[k];
        let top_next = ring[(k + 1) % m];
        let bottom = top + n;
        let bottom_next = top_next + n;
        triangles.push([bottom, bottom_next, top_next]);
        triangles.push([top_next, top, bottom]);
    }

    (positions, triangles)
}

/// Index offset for `added` vertices appended after `existing` ones
fn vertex_offset(name: &str, existing: usize, added: usize) -> Result<u32> {
    existing
        .checked_add(added)
        .and_then(|total| u32::try_from(total).ok())
        .and_then(|_| u32::try_from(existing).ok())
        .ok_or_else(|| {
            Error::InvalidMesh(format!(
                "mesh '{}' would hold more vertices than 32-bit indices can address",
                name
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ConditionParams, condition};
    use crate::triangulation::{EarcutTriangulator, triangulate};
    use nalgebra::{Point2, Vector3};

    fn prepared(coords: &[(f64, f64)]) -> TriangulatedPolygon {
        let points: Vec<Point2<f64>> = coords.iter().map(|&(x, y)| Point2::new(x, y)).collect();
        let polygon = condition(&points, &ConditionParams::default());
        triangulate(&polygon, &EarcutTriangulator).expect("triangulation")
    }

    fn normal(positions: &[[f64; 3]], t: &[u32; 3]) -> Vector3<f64> {
        let a = Vector3::from(positions[t[0] as usize]);
        let b = Vector3::from(positions[t[1] as usize]);
        let c = Vector3::from(positions[t[2] as usize]);
        (b - a).cross(&(c - a))
    }

    fn z_range(zmin: f64, zmax: f64) -> ZRange {
        ZRange::new(zmin, zmax).unwrap()
    }

    #[test]
    fn test_triangle_extrudes_to_eight_triangles() {
        let poly = prepared(&[(0.0, 0.0), (4.0, 0.0), (0.0, 3.0)]);
        let (positions, triangles) = extrude(&poly, z_range(0.0, 1.0));
        assert_eq!(positions.len(), 6);
        assert_eq!(triangles.len(), 8);
        assert_eq!(triangles.len(), extruded_triangle_count(1, 3));
    }

    #[test]
    fn test_square_extrusion_layout() {
        let poly = prepared(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let (positions, triangles) = extrude(&poly, z_range(0.0, 0.5));
        assert_eq!(positions.len(), 8);
        assert_eq!(triangles.len(), 12);
        assert!(positions[..4].iter().all(|p| p[2] == 0.5));
        assert!(positions[4..].iter().all(|p| p[2] == 0.0));
    }

    #[test]
    fn test_caps_face_up_and_down() {
        let poly = prepared(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let (positions, triangles) = extrude(&poly, z_range(-1.0, 1.0));
        let top = poly.face.triangles.len();
        for t in &triangles[..top] {
            assert!(normal(&positions, t).z > 0.0);
        }
        for t in &triangles[top..2 * top] {
            assert!(normal(&positions, t).z < 0.0);
        }
    }

    fn assert_walls_face_outward(poly: &TriangulatedPolygon) {
        let (positions, triangles) = extrude(poly, z_range(0.0, 2.0));
        let top = poly.face.triangles.len();
        let count = poly.face.vertices.len() as f64;
        let centroid = poly
            .face
            .vertices
            .iter()
            .fold(Vector3::zeros(), |acc, v| acc + Vector3::new(v.x, v.y, 1.0))
            / count;

        for t in &triangles[2 * top..] {
            let n = normal(&positions, t);
            let center = (Vector3::from(positions[t[0] as usize])
                + Vector3::from(positions[t[1] as usize])
                + Vector3::from(positions[t[2] as usize]))
                / 3.0;
            assert!(
                n.dot(&(center - centroid)) > 0.0,
                "wall triangle {t:?} faces inward"
            );
        }
    }

    #[test]
    fn test_walls_face_outward_for_both_orientations() {
        let ccw = [(0.0, 0.0), (10.0, 0.0), (10.0, 4.0), (0.0, 4.0)];
        let mut cw = ccw;
        cw.reverse();

        let a = prepared(&ccw);
        let b = prepared(&cw);
        assert!(!a.clockwise);
        assert!(b.clockwise);
        assert_walls_face_outward(&a);
        assert_walls_face_outward(&b);
    }

    #[test]
    fn test_append_offsets_indices() {
        let square = prepared(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let tri = prepared(&[(5.0, 0.0), (6.0, 0.0), (5.0, 1.0)]);

        let mut mesh = Mesh::new("TOP_M1", 0);
        mesh.append_extrusion(&square, z_range(0.0, 1.0)).unwrap();
        mesh.append_extrusion(&tri, z_range(0.0, 1.0)).unwrap();

        assert_eq!(mesh.vertex_count(), 8 + 6);
        assert_eq!(mesh.triangle_count(), 12 + 8);
        assert!(mesh.triangles[12..].iter().flatten().all(|&i| i >= 8));
        mesh.validate().expect("valid mesh");
    }

    #[test]
    fn test_vertex_offset_stops_at_index_range() {
        assert_eq!(vertex_offset("M", 14, 6).unwrap(), 14);
        let last = u32::MAX as usize;
        assert_eq!(vertex_offset("M", last - 8, 8).unwrap(), u32::MAX - 8);

        let err = vertex_offset("TOP_M1", last - 4, 8).unwrap_err();
        assert!(matches!(err, Error::InvalidMesh(_)));
        assert!(err.to_string().contains("TOP_M1"));
        assert!(vertex_offset("M", usize::MAX, 1).is_err());
    }

    #[test]
    fn test_empty_face_contributes_nothing() {
        let mut poly = prepared(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
        poly.face.triangles.clear();
        let mut mesh = Mesh::new("C_L", 0);
        mesh.append_extrusion(&poly, z_range(0.0, 1.0)).unwrap();
        assert!(mesh.is_empty());
        assert_eq!(mesh.vertex_count(), 0);
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let mut mesh = Mesh::new("bad", 0);
        mesh.positions = vec![[0.0; 3]; 3];
        mesh.triangles = vec![[0, 1, 3]];
        let err = mesh.validate().unwrap_err();
        assert!(err.to_string().contains("[E4002]"));
    }

    #[test]
    fn test_validate_rejects_non_finite_vertex() {
        let mut mesh = Mesh::new("bad", 0);
        mesh.positions = vec![[0.0, f64::NAN, 0.0]];
        assert!(mesh.validate().is_err());
    }
}

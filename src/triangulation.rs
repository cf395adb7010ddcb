//! Constrained triangulation of conditioned polygons
//!
//! The triangulation engine sits behind the [`Triangulator`] trait. It
//! receives vertices plus mandatory boundary segments and returns a vertex
//! array and triangles. [`triangulate`] adapts a [`ConditionedPolygon`] to
//! that interface and normalizes the result:
//! - an engine reporting no triangles yields an empty face, not an error
//! - every triangle is wound counter-clockwise, so faces point up (+z)
//!
//! The default engine is [`EarcutTriangulator`], built on the `earcutr`
//! library, a Rust port of MapBox's earcut.js.

use nalgebra::Point2;

use crate::condition::ConditionedPolygon;

/// Error type for polygon triangulation operations
#[derive(Debug, thiserror::Error)]
pub enum TriangulationError {
    /// A boundary segment refers to a vertex that does not exist
    #[error("Segment index {index} out of range for {count} vertices")]
    SegmentOutOfRange {
        /// Offending index
        index: u32,
        /// Number of vertices supplied
        count: usize,
    },

    /// Boundary segments do not chain into one closed loop
    #[error("Boundary segments do not form a closed loop: {0}")]
    OpenBoundary(String),

    /// The engine itself failed
    #[error("Triangulation engine failed: {0}")]
    EngineFailure(String),
}

/// What a triangulation engine hands back
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineOutput {
    /// Output vertices; engines may reuse or extend the input
    pub vertices: Vec<Point2<f64>>,
    /// Triangles, or `None` when the engine produced none
    pub triangles: Option<Vec<[u32; 3]>>,
}

/// A constrained planar triangulation engine
pub trait Triangulator {
    /// Triangulate the region bounded by `segments`
    ///
    /// Segments are mandatory edges given as vertex index pairs.
    fn triangulate(
        &self,
        vertices: &[Point2<f64>],
        segments: &[[u32; 2]],
    ) -> Result<EngineOutput, TriangulationError>;
}

/// Triangulated top face of one polygon
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TriangulatedFace {
    /// Face vertices
    pub vertices: Vec<Point2<f64>>,
    /// Counter-clockwise triangles indexing `vertices`
    pub triangles: Vec<[u32; 3]>,
}

/// A polygon with its top face triangulated, ready for extrusion
#[derive(Debug, Clone, PartialEq)]
pub struct TriangulatedPolygon {
    /// Triangulated face
    pub face: TriangulatedFace,
    /// Outer boundary loop as indices into `face.vertices`
    pub boundary: Vec<u32>,
    /// Orientation of the source polygon
    pub clockwise: bool,
}

/// Triangulate a conditioned polygon with the given engine
///
/// # Errors
///
/// Engine failures are passed through unchanged; callers treat them as fatal.
pub fn triangulate(
    polygon: &ConditionedPolygon,
    engine: &dyn Triangulator,
) -> Result<TriangulatedPolygon, TriangulationError> {
    let output = engine.triangulate(&polygon.vertices, &polygon.segments)?;
    let mut triangles = output.triangles.unwrap_or_default();

    let count = output.vertices.len();
    for tri in &mut triangles {
        if let Some(&index) = tri.iter().find(|&&i| i as usize >= count) {
            return Err(TriangulationError::EngineFailure(format!(
                "triangle index {} out of range for {} vertices",
                index, count
            )));
        }
        orient_counter_clockwise(tri, &output.vertices);
    }

    Ok(TriangulatedPolygon {
        face: TriangulatedFace {
            vertices: output.vertices,
            triangles,
        },
        boundary: polygon.boundary.clone(),
        clockwise: polygon.clockwise,
    })
}

fn orient_counter_clockwise(tri: &mut [u32; 3], vertices: &[Point2<f64>]) {
    let a = vertices[tri[0] as usize];
    let b = vertices[tri[1] as usize];
    let c = vertices[tri[2] as usize];
    let cross = (b - a).perp(&(c - a));
    if cross < 0.0 {
        tri.swap(1, 2);
    }
}

/// Chain `[i, i-1]` boundary segments back into a vertex loop
///
/// Segment `k` must start where segment `k-1` ends so the segments form one
/// closed loop.
pub fn boundary_loop(
    segments: &[[u32; 2]],
    vertex_count: usize,
) -> Result<Vec<u32>, TriangulationError> {
    let n = segments.len();
    for (k, seg) in segments.iter().enumerate() {
        if let Some(&index) = seg.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(TriangulationError::SegmentOutOfRange {
                index,
                count: vertex_count,
            });
        }
        let previous = segments[(k + n - 1) % n];
        if seg[1] != previous[0] {
            return Err(TriangulationError::OpenBoundary(format!(
                "segment {} ends at {} but segment {} starts at {}",
                k,
                seg[1],
                (k + n - 1) % n,
                previous[0]
            )));
        }
    }
    Ok(segments.iter().map(|s| s[0]).collect())
}

/// Ear-clipping engine backed by `earcutr`
#[derive(Debug, Clone, Copy, Default)]
pub struct EarcutTriangulator;

impl Triangulator for EarcutTriangulator {
    fn triangulate(
        &self,
        vertices: &[Point2<f64>],
        segments: &[[u32; 2]],
    ) -> Result<EngineOutput, TriangulationError> {
        let ring = boundary_loop(segments, vertices.len())?;
        if ring.len() < 3 {
            return Ok(EngineOutput {
                vertices: vertices.to_vec(),
                triangles: None,
            });
        }

        // Convert the loop to a flat coordinate array [x0, y0, x1, y1, ...]
        let mut coords = Vec::with_capacity(ring.len() * 2);
        for &v in &ring {
            let p = vertices[v as usize];
            coords.push(p.x);
            coords.push(p.y);
        }

        let no_holes: [usize; 0] = [];
        let result = earcutr::earcut(&coords, &no_holes, 2)
            .map_err(|e| TriangulationError::EngineFailure(format!("Earcut error: {}", e)))?;

        // Earcut indexes loop positions; map them back to vertex indices.
        let triangles = (!result.is_empty()).then(|| {
            result
                .chunks_exact(3)
                .map(|t| [ring[t[0]], ring[t[1]], ring[t[2]]])
                .collect()
        });

        Ok(EngineOutput {
            vertices: vertices.to_vec(),
            triangles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ConditionParams, condition};

    fn pts(coords: &[(f64, f64)]) -> Vec<Point2<f64>> {
        coords.iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    fn area(face: &TriangulatedFace) -> f64 {
        face.triangles
            .iter()
            .map(|t| {
                let a = face.vertices[t[0] as usize];
                let b = face.vertices[t[1] as usize];
                let c = face.vertices[t[2] as usize];
                (b - a).perp(&(c - a)) / 2.0
            })
            .sum()
    }

    struct NoTriangles;

    impl Triangulator for NoTriangles {
        fn triangulate(
            &self,
            vertices: &[Point2<f64>],
            _segments: &[[u32; 2]],
        ) -> Result<EngineOutput, TriangulationError> {
            Ok(EngineOutput {
                vertices: vertices.to_vec(),
                triangles: None,
            })
        }
    }

    struct Failing;

    impl Triangulator for Failing {
        fn triangulate(
            &self,
            _vertices: &[Point2<f64>],
            _segments: &[[u32; 2]],
        ) -> Result<EngineOutput, TriangulationError> {
            Err(TriangulationError::EngineFailure("internal error".into()))
        }
    }

    #[test]
    fn test_triangulate_square() {
        let polygon = condition(
            &pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            &ConditionParams::default(),
        );
        let out = triangulate(&polygon, &EarcutTriangulator).expect("Failed to triangulate square");

        assert_eq!(out.face.triangles.len(), 2, "Expected 2 triangles");
        assert_eq!(out.face.vertices.len(), 4);
        for tri in &out.face.triangles {
            for &idx in tri {
                assert!(idx < 4, "Triangle index {} out of bounds", idx);
            }
        }
        assert!((area(&out.face) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_clockwise_input_yields_counter_clockwise_triangles() {
        let polygon = condition(
            &pts(&[(0.0, 10.0), (10.0, 10.0), (10.0, 0.0), (0.0, 0.0)]),
            &ConditionParams::default(),
        );
        assert!(polygon.clockwise);
        let out = triangulate(&polygon, &EarcutTriangulator).unwrap();
        assert!(area(&out.face) > 99.9, "all triangles face up");
    }

    #[test]
    fn test_keyhole_slit_leaves_hole_open() {
        let keyhole = pts(&[
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
            (0.0, 5.0),
            (3.0, 5.0),
            (3.0, 7.0),
            (7.0, 7.0),
            (7.0, 3.0),
            (3.0, 3.0),
            (3.0, 5.0),
            (0.0, 5.0),
        ]);
        let polygon = condition(&keyhole, &ConditionParams::default());
        let out = triangulate(&polygon, &EarcutTriangulator).unwrap();
        assert!((area(&out.face) - 84.0).abs() < 1e-2, "hole is not filled");
    }

    #[test]
    fn test_zero_area_polygon_gives_empty_face() {
        let polygon = condition(
            &pts(&[(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)]),
            &ConditionParams::default(),
        );
        let out = triangulate(&polygon, &NoTriangles).unwrap();
        assert!(out.face.triangles.is_empty());
        assert_eq!(out.boundary.len(), 3);
    }

    #[test]
    fn test_too_few_loop_vertices_gives_empty_face() {
        let polygon = condition(
            &pts(&[(1.0, 1.0), (1.0, 1.0), (1.0, 1.0)]),
            &ConditionParams::default(),
        );
        let out = triangulate(&polygon, &EarcutTriangulator).unwrap();
        assert!(out.face.triangles.is_empty());
    }

    #[test]
    fn test_engine_failure_propagates() {
        let polygon = condition(
            &pts(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]),
            &ConditionParams::default(),
        );
        let err = triangulate(&polygon, &Failing).unwrap_err();
        assert!(matches!(err, TriangulationError::EngineFailure(_)));
    }

    #[test]
    fn test_boundary_loop_rejects_open_chain() {
        let err = boundary_loop(&[[0, 2], [1, 0], [2, 0]], 3).unwrap_err();
        assert!(matches!(err, TriangulationError::OpenBoundary(_)));
    }

    #[test]
    fn test_boundary_loop_rejects_out_of_range() {
        let err = boundary_loop(&[[0, 5], [5, 0]], 3).unwrap_err();
        assert!(matches!(
            err,
            TriangulationError::SegmentOutOfRange { index: 5, count: 3 }
        ));
    }

    #[test]
    fn test_boundary_loop_recovers_order() {
        let ring = boundary_loop(&[[0, 3], [1, 0], [2, 1], [3, 2]], 4).unwrap();
        assert_eq!(ring, vec![0, 1, 2, 3]);
    }
}

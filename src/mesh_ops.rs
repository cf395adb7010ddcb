//! Triangle mesh operations
//!
//! This module provides geometric measurements on extruded meshes:
//! - Signed volume
//! - Bounding box calculation and merging
//!
//! These are used for the conversion report and to check that extruded
//! solids are closed and face outward.

use nalgebra::Point3;

use crate::error::{Error, Result};
use crate::extrude::Mesh;

/// An axis-aligned bounding box represented as (min_point, max_point)
pub type BoundingBox = (Point3<f64>, Point3<f64>);

fn corners(mesh: &Mesh, triangle: &[u32; 3]) -> Option<[Point3<f64>; 3]> {
    let get = |i: u32| mesh.positions.get(i as usize).map(|&p| Point3::from(p));
    Some([get(triangle[0])?, get(triangle[1])?, get(triangle[2])?])
}

/// Compute the signed volume of a mesh using the divergence theorem
///
/// For a closed mesh with outward-facing winding the volume is positive.
/// Negative volume indicates inverted triangles. Triangles with
/// out-of-range indices are skipped (caught by [`Mesh::validate`]).
pub fn compute_mesh_signed_volume(mesh: &Mesh) -> f64 {
    let volume: f64 = mesh
        .triangles
        .iter()
        .filter_map(|t| corners(mesh, t))
        .map(|[a, b, c]| a.coords.dot(&b.coords.cross(&c.coords)))
        .sum();
    volume / 6.0
}

/// Compute the axis-aligned bounding box (AABB) of a mesh
///
/// # Errors
///
/// Returns [`Error::InvalidMesh`] for a mesh without vertices.
pub fn compute_mesh_aabb(mesh: &Mesh) -> Result<BoundingBox> {
    let mut points = mesh.positions.iter().map(|&p| Point3::from(p));
    let first = points.next().ok_or_else(|| {
        Error::InvalidMesh(format!(
            "cannot compute bounding box of empty mesh '{}'",
            mesh.name
        ))
    })?;

    Ok(points.fold((first, first), |(min, max), p| {
        (min.inf(&p), max.sup(&p))
    }))
}

/// Merge two bounding boxes into one enclosing both
pub fn union_aabb(a: BoundingBox, b: BoundingBox) -> BoundingBox {
    (a.0.inf(&b.0), a.1.sup(&b.1))
}

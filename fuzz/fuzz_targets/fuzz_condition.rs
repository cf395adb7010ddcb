#![no_main]

use gds2gltf::condition::{ConditionParams, condition};
use gds2gltf::extrude::Mesh;
use gds2gltf::triangulation::{EarcutTriangulator, triangulate};
use gds2gltf::ZRange;
use libfuzzer_sys::fuzz_target;
use nalgebra::Point2;

fuzz_target!(|coords: Vec<(i16, i16)>| {
    // Points on a coarse integer grid, like database units
    let points: Vec<Point2<f64>> = coords
        .iter()
        .map(|&(x, y)| Point2::new(f64::from(x) / 100.0, f64::from(y) / 100.0))
        .collect();
    if points.len() < 3 {
        return;
    }

    let conditioned = condition(&points, &ConditionParams::default());
    assert!(conditioned.segments.len() == conditioned.boundary.len() || conditioned.boundary.len() < 2);

    let Ok(polygon) = triangulate(&conditioned, &EarcutTriangulator) else {
        return;
    };
    let Some(z) = ZRange::new(0.0, 1.0) else {
        return;
    };
    let mut mesh = Mesh::new("FUZZ_M1", 0);
    mesh.append_extrusion(&polygon, z).expect("small mesh fits 32-bit indices");
    assert!(mesh.validate().is_ok());
});

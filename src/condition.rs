//! Polygon conditioning ahead of triangulation
//!
//! Layout polygons encode holes as a boundary that runs into the hole and
//! back out along the same line. Left as is, the two sides of such a slit
//! coincide and the triangulator fills the hole. Conditioning moves every
//! vertex a tiny distance inward, which opens the slit, and then merges
//! vertices that still (or newly) coincide.

use std::collections::HashMap;

use nalgebra::{Point2, Vector2};

/// Tunables for [`condition`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionParams {
    /// Inward displacement per adjacent edge, in layout user units
    pub delta: f64,
    /// Edges shorter than this contribute no normal
    pub epsilon: f64,
    /// Vertices closer than this are merged
    pub merge_tolerance: f64,
}

impl Default for ConditionParams {
    fn default() -> Self {
        Self {
            delta: 1e-5,
            epsilon: 1e-8,
            merge_tolerance: 1e-6,
        }
    }
}

/// Outward unit normal of one boundary edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeNormal {
    /// Unit normal of a regular edge
    Normal(Vector2<f64>),
    /// Edge too short to have a stable normal
    Degenerate,
}

impl EdgeNormal {
    /// Normal of the edge `from → to`
    ///
    /// Points to the right of the direction of travel, which is outward for a
    /// counter-clockwise boundary; `flip` turns it around for clockwise ones.
    pub fn of(from: Point2<f64>, to: Point2<f64>, epsilon: f64, flip: bool) -> Self {
        let d = to - from;
        let length = d.norm();
        if length < epsilon {
            return EdgeNormal::Degenerate;
        }
        let n = Vector2::new(d.y, -d.x) / length;
        EdgeNormal::Normal(if flip { -n } else { n })
    }

    /// Contribution to a vertex displacement; degenerate edges contribute nothing
    pub fn vector(&self) -> Vector2<f64> {
        match self {
            EdgeNormal::Normal(n) => *n,
            EdgeNormal::Degenerate => Vector2::zeros(),
        }
    }
}

/// A polygon ready for triangulation
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionedPolygon {
    /// Inset, deduplicated vertices in first-seen order
    pub vertices: Vec<Point2<f64>>,
    /// Boundary loop as vertex indices, in original point order
    pub boundary: Vec<u32>,
    /// Mandatory boundary segments `[i, i-1]` along the loop
    pub segments: Vec<[u32; 2]>,
    /// Orientation of the original points
    pub clockwise: bool,
}

/// Shoelace sum `Σ (x[i+1] − x[i]) · (y[i+1] + y[i])` over cyclic neighbours
///
/// Positive for clockwise boundaries in a y-up frame.
pub fn orientation_sum(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            (b.x - a.x) * (b.y + a.y)
        })
        .sum()
}

/// Whether a boundary runs clockwise
pub fn is_clockwise(points: &[Point2<f64>]) -> bool {
    orientation_sum(points) > 0.0
}

/// Move every vertex inward along the normals of its two adjacent edges
pub fn inset(points: &[Point2<f64>], clockwise: bool, params: &ConditionParams) -> Vec<Point2<f64>> {
    let n = points.len();
    (0..n)
        .map(|i| {
            let prev = points[(i + n - 1) % n];
            let here = points[i];
            let next = points[(i + 1) % n];
            let outgoing = EdgeNormal::of(here, next, params.epsilon, clockwise);
            let incoming = EdgeNormal::of(prev, here, params.epsilon, clockwise);
            here - (outgoing.vector() + incoming.vector()) * params.delta
        })
        .collect()
}

/// Merge vertices closer than `tolerance`; the first-seen vertex survives
///
/// Returns the surviving vertices and, for every input index, the index of
/// its surviving vertex. Grid cells saturate at the `i64` range, so far-out
/// points share edge cells and are still told apart by distance.
pub fn merge_close_vertices(points: &[Point2<f64>], tolerance: f64) -> (Vec<Point2<f64>>, Vec<u32>) {
    let cell_of = |p: &Point2<f64>| {
        (
            (p.x / tolerance).floor() as i64,
            (p.y / tolerance).floor() as i64,
        )
    };

    let mut unique: Vec<Point2<f64>> = Vec::with_capacity(points.len());
    let mut grid: HashMap<(i64, i64), Vec<u32>> = HashMap::new();
    let mut remap = Vec::with_capacity(points.len());

    for p in points {
        let (cx, cy) = cell_of(p);
        let mut survivor: Option<u32> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                let (Some(nx), Some(ny)) = (cx.checked_add(dx), cy.checked_add(dy)) else {
                    continue;
                };
                let Some(bucket) = grid.get(&(nx, ny)) else {
                    continue;
                };
                for &j in bucket {
                    if (unique[j as usize] - p).norm() < tolerance
                        && survivor.is_none_or(|s| j < s)
                    {
                        survivor = Some(j);
                    }
                }
            }
        }

        let index = match survivor {
            Some(j) => j,
            None => {
                let j = unique.len() as u32;
                unique.push(*p);
                grid.entry((cx, cy)).or_default().push(j);
                j
            }
        };
        remap.push(index);
    }

    (unique, remap)
}

/// Condition one polygon: orientation, inset, then vertex merging
pub fn condition(points: &[Point2<f64>], params: &ConditionParams) -> ConditionedPolygon {
    let clockwise = is_clockwise(points);
    let moved = inset(points, clockwise, params);
    let (vertices, remap) = merge_close_vertices(&moved, params.merge_tolerance);

    let mut boundary: Vec<u32> = Vec::with_capacity(remap.len());
    for &v in &remap {
        if boundary.last() != Some(&v) {
            boundary.push(v);
        }
    }
    while boundary.len() > 1 && boundary.first() == boundary.last() {
        boundary.pop();
    }

    let n = boundary.len();
    let segments = if n < 2 {
        Vec::new()
    } else {
        (0..n).map(|k| [boundary[k], boundary[(k + n - 1) % n]]).collect()
    };

    ConditionedPolygon {
        vertices,
        boundary,
        segments,
        clockwise,
    }
}

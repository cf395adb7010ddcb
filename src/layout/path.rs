//! Wire paths and their polygon outlines
//!
//! A path is a centerline with a width. It is turned into a closed outline
//! with mitred joins so that it can be extruded like any boundary polygon.

use nalgebra::{Point2, Vector2};

use crate::layer_stack::LayerKey;

/// Below this, `1 + n0·n1` is treated as a full reversal
const REVERSAL_EPSILON: f64 = 1e-12;

/// How the two ends of a path are terminated
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PathEnd {
    /// Ends flush with the first and last centerline points (pathtype 0)
    #[default]
    Flush,
    /// Round ends (pathtype 1); outlined as a half-width square extension
    Round,
    /// Square ends extended by half the width (pathtype 2)
    HalfWidth,
    /// Explicit begin and end extensions in user units (pathtype 4)
    Custom {
        /// Extension before the first point
        begin: f64,
        /// Extension past the last point
        end: f64,
    },
}

impl PathEnd {
    /// Build from a GDSII pathtype and optional extensions
    pub fn from_pathtype(pathtype: i16, begin: f64, end: f64) -> Self {
        match pathtype {
            1 => PathEnd::Round,
            2 => PathEnd::HalfWidth,
            4 => PathEnd::Custom { begin, end },
            _ => PathEnd::Flush,
        }
    }

    fn extensions(&self, half_width: f64) -> (f64, f64) {
        match *self {
            PathEnd::Flush => (0.0, 0.0),
            PathEnd::Round | PathEnd::HalfWidth => (half_width, half_width),
            PathEnd::Custom { begin, end } => (begin, end),
        }
    }
}

/// A wire on one layer
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// Layer identity
    pub layer: LayerKey,
    /// Full width in user units
    pub width: f64,
    /// End termination
    pub end: PathEnd,
    /// Centerline points
    pub points: Vec<Point2<f64>>,
}

impl Path {
    /// Create a path; negative (absolute) widths are taken by magnitude
    pub fn new(layer: LayerKey, width: f64, end: PathEnd, points: Vec<Point2<f64>>) -> Self {
        Self {
            layer,
            width: width.abs(),
            end,
            points,
        }
    }

    /// Closed outline of the path
    ///
    /// Returns `None` for zero-width paths and paths with fewer than two
    /// distinct centerline points.
    pub fn outline(&self) -> Option<Vec<Point2<f64>>> {
        let mut centerline: Vec<Point2<f64>> = Vec::with_capacity(self.points.len());
        for &p in &self.points {
            if centerline.last() != Some(&p) {
                centerline.push(p);
            }
        }
        if centerline.len() < 2 || self.width <= 0.0 {
            return None;
        }

        let half = self.width / 2.0;
        let directions: Vec<Vector2<f64>> = centerline
            .windows(2)
            .map(|w| (w[1] - w[0]).normalize())
            .collect();

        let (begin_ext, end_ext) = self.end.extensions(half);
        let last = centerline.len() - 1;
        centerline[0] -= directions[0] * begin_ext;
        centerline[last] += directions[last - 1] * end_ext;

        let mut left = Vec::with_capacity(centerline.len());
        let mut right = Vec::with_capacity(centerline.len());
        for (i, &p) in centerline.iter().enumerate() {
            let offset = if i == 0 {
                left_normal(directions[0]) * half
            } else if i == last {
                left_normal(directions[last - 1]) * half
            } else {
                miter(directions[i - 1], directions[i], half)
            };
            left.push(p + offset);
            right.push(p - offset);
        }

        right.reverse();
        left.extend(right);
        Some(left)
    }
}

fn left_normal(d: Vector2<f64>) -> Vector2<f64> {
    Vector2::new(-d.y, d.x)
}

/// Offset of a mitred join between two unit directions
fn miter(incoming: Vector2<f64>, outgoing: Vector2<f64>, half_width: f64) -> Vector2<f64> {
    let n0 = left_normal(incoming);
    let n1 = left_normal(outgoing);
    let denom = 1.0 + n0.dot(&n1);
    if denom < REVERSAL_EPSILON {
        return n0 * half_width;
    }
    (n0 + n1) * (half_width / denom)
}

//! Hierarchical layout data model
//!
//! A [`Library`] is an arena of [`Cell`]s addressed by stable [`CellId`]s.
//! Cells own their polygons and paths and refer to other cells through
//! [`Instance`]s by name; the same cell may be instanced from many places.
//! The library is read-only once loaded.

pub mod gds;
pub mod path;

use std::collections::{HashMap, HashSet};
use std::path::Path as FsPath;

use nalgebra::{Point2, Vector2};

use crate::error::{Error, Result};
use crate::layer_stack::LayerKey;

pub use path::{Path, PathEnd};

/// Name of the informational pseudo-cell some layout editors append
pub const CONTEXT_INFO_CELL: &str = "$$$CONTEXT_INFO$$$";

/// GDSII property attribute that carries an instance display name
pub const INSTANCE_NAME_PROPERTY: i16 = 61;

/// Stable index of a cell inside its [`Library`]
pub type CellId = usize;

/// A closed polygon boundary on one layer
///
/// The boundary is open: the edge from the last point back to the first is
/// implied.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    /// Layer identity
    pub layer: LayerKey,
    /// Boundary points in file order
    pub points: Vec<Point2<f64>>,
}

impl Polygon {
    /// Create a polygon
    pub fn new(layer: LayerKey, points: Vec<Point2<f64>>) -> Self {
        Self { layer, points }
    }
}

/// Instance rotation, restricted to the Manhattan angles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    /// No rotation
    #[default]
    None,
    /// 90° counter-clockwise
    Deg90,
    /// 180°
    Deg180,
    /// 270° counter-clockwise
    Deg270,
}

impl Rotation {
    /// Snap an angle in degrees to a Manhattan rotation
    ///
    /// Returns `None` for any angle that is not a multiple of 90°.
    pub fn from_degrees(angle: f64) -> Option<Self> {
        let normalized = angle.rem_euclid(360.0);
        let quarter = (normalized / 90.0).round();
        if (normalized - quarter * 90.0).abs() > 1e-9 {
            return None;
        }
        Some(match quarter as i64 % 4 {
            0 => Rotation::None,
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            _ => Rotation::Deg270,
        })
    }
}

/// Display name of an instance
///
/// Layout files may or may not name their instances; unnamed instances fall
/// back to a placeholder instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InstanceName {
    /// Name carried by the instance
    Named(String),
    /// No name property on the instance
    #[default]
    Unresolved,
}

impl InstanceName {
    /// Placeholder used for unnamed instances
    pub const PLACEHOLDER: &'static str = "???";

    /// The name, or the placeholder when unresolved
    pub fn as_str(&self) -> &str {
        match self {
            InstanceName::Named(name) => name,
            InstanceName::Unresolved => Self::PLACEHOLDER,
        }
    }
}

/// A placed reference to another cell
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Name of the referenced cell
    pub cell: String,
    /// Placement offset in user units
    pub origin: Vector2<f64>,
    /// Rotation about the origin
    pub rotation: Rotation,
    /// Mirror about the X axis, applied before rotation
    pub x_reflection: bool,
    /// Uniform scale factor
    pub magnification: f64,
    /// Display name
    pub name: InstanceName,
}

impl Instance {
    /// Create an unrotated, unmirrored, unnamed instance
    pub fn new(cell: impl Into<String>, origin: Vector2<f64>) -> Self {
        Self {
            cell: cell.into(),
            origin,
            rotation: Rotation::None,
            x_reflection: false,
            magnification: 1.0,
            name: InstanceName::Unresolved,
        }
    }

    /// Set the rotation
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Mirror about the X axis
    pub fn mirrored(mut self) -> Self {
        self.x_reflection = true;
        self
    }

    /// Set the display name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = InstanceName::Named(name.into());
        self
    }
}

/// A named unit of geometry plus nested instances
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cell {
    /// Cell name, unique within the library
    pub name: String,
    /// Boundary polygons
    pub polygons: Vec<Polygon>,
    /// Wire paths, outlined into polygons during conversion
    pub paths: Vec<Path>,
    /// References to other cells
    pub instances: Vec<Instance>,
}

impl Cell {
    /// Create an empty cell
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether this is the editor's informational pseudo-cell
    pub fn is_context_info(&self) -> bool {
        self.name == CONTEXT_INFO_CELL
    }

    /// All closed outlines of the cell: outlined paths first, then polygons
    pub fn outlines(&self) -> impl Iterator<Item = (LayerKey, Vec<Point2<f64>>)> + '_ {
        let paths = self
            .paths
            .iter()
            .filter_map(|p| p.outline().map(|outline| (p.layer, outline)));
        let polygons = self.polygons.iter().map(|p| (p.layer, p.points.clone()));
        paths.chain(polygons)
    }
}

/// An arena of cells forming a layout hierarchy
#[derive(Debug, Clone)]
pub struct Library {
    /// Library name from the layout file
    pub name: String,
    /// Size of one user unit in meters
    pub meters_per_unit: f64,
    cells: Vec<Cell>,
    by_name: HashMap<String, CellId>,
}

impl Default for Library {
    fn default() -> Self {
        Self::new("LIB")
    }
}

impl Library {
    /// Create an empty library with micron user units
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meters_per_unit: 1e-6,
            cells: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Read a GDSII file
    pub fn from_file<P: AsRef<FsPath>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        gds::read_library(std::io::BufReader::new(file))
    }

    /// Add a cell; fails if a cell with the same name exists
    pub fn add_cell(&mut self, cell: Cell) -> Result<CellId> {
        if self.by_name.contains_key(&cell.name) {
            return Err(Error::invalid_layout(format!(
                "cell '{}' is defined more than once",
                cell.name
            )));
        }
        let id = self.cells.len();
        self.by_name.insert(cell.name.clone(), id);
        self.cells.push(cell);
        Ok(id)
    }

    /// Cell by id
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id]
    }

    /// Id of the cell with the given name
    pub fn find(&self, name: &str) -> Option<CellId> {
        self.by_name.get(name).copied()
    }

    /// Resolve the cell an instance refers to
    pub fn resolve(&self, instance: &Instance) -> Result<CellId> {
        self.find(&instance.cell).ok_or_else(|| {
            Error::invalid_layout(format!(
                "instance refers to undefined cell '{}'",
                instance.cell
            ))
        })
    }

    /// Iterate cells with their ids in file order
    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.cells.iter().enumerate()
    }

    /// Number of cells, including the context pseudo-cell if present
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the library holds no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell names in file order
    pub fn cell_names(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|c| c.name.as_str())
    }

    /// Cells that no other cell instantiates, in file order
    ///
    /// The context pseudo-cell is never a top-level cell.
    pub fn top_level(&self) -> Vec<CellId> {
        let referenced: HashSet<&str> = self
            .cells
            .iter()
            .flat_map(|c| c.instances.iter().map(|i| i.cell.as_str()))
            .collect();
        self.cells()
            .filter(|(_, c)| !c.is_context_info() && !referenced.contains(c.name.as_str()))
            .map(|(id, _)| id)
            .collect()
    }
}

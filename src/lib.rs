//! # gds2gltf
//!
//! A pure Rust converter from layered GDSII chip layouts to glTF 2.0 scenes.
//!
//! Every polygon on a configured layer is extruded into a closed solid
//! between the layer's `zmin` and `zmax`. The layout's cell hierarchy is kept:
//! each cell instance becomes a scene node carrying its placement, and meshes
//! are shared between all instances of a cell.
//!
//! ## Features
//!
//! - Pure Rust implementation with no unsafe code
//! - GDSII stream reader (boundaries, boxes, paths, structure and array references)
//! - Slit-safe polygon conditioning for keyhole-encoded holes
//! - Watertight, outward-facing extrusion
//! - `.gltf` (embedded buffer) and `.glb` output
//!
//! ## Example
//!
//! ```no_run
//! use gds2gltf::{ConvertOptions, Converter, LayerStack, Library, OutputFormat};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let library = Library::from_file("chip.gds")?;
//! let stack = LayerStack::from_file("chip.layerstack")?;
//!
//! let conversion = Converter::new(&stack, ConvertOptions::new()).convert(&library)?;
//! conversion.write("chip.gds.gltf", OutputFormat::Gltf)?;
//!
//! println!("{}", conversion.report);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod condition;
pub mod convert;
pub mod error;
pub mod extrude;
pub mod gltf;
pub mod layer_stack;
pub mod layout;
pub mod mesh_ops;
pub mod scene;
pub mod triangulation;

pub use condition::{ConditionParams, ConditionedPolygon};
pub use convert::{Conversion, ConversionReport, ConvertOptions, Converter, MeshStats};
pub use error::{Error, Result};
pub use extrude::Mesh;
pub use crate::gltf::{Document, OutputFormat};
pub use layer_stack::{LayerKey, LayerSpec, LayerStack, ZRange};
pub use layout::{Cell, Instance, InstanceName, Library, Polygon, Rotation};
pub use scene::{MeshLibrary, SceneAssembler, SceneNode};
pub use triangulation::{EarcutTriangulator, TriangulationError, Triangulator};

use std::path::Path;

/// Convert a layout file into a scene file in one call
///
/// Reads the layout and the layer stack, runs the conversion with the given
/// options and writes the result to `output`.
///
/// # Example
///
/// ```no_run
/// use gds2gltf::{ConvertOptions, OutputFormat};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let report = gds2gltf::convert_file(
///     "chip.gds",
///     "chip.layerstack",
///     "chip.glb",
///     OutputFormat::Glb,
///     ConvertOptions::new(),
/// )?;
/// println!("{} triangles", report.total_triangles());
/// # Ok(())
/// # }
/// ```
pub fn convert_file<L, S, O>(
    layout: L,
    layer_stack: S,
    output: O,
    format: OutputFormat,
    options: ConvertOptions,
) -> Result<ConversionReport>
where
    L: AsRef<Path>,
    S: AsRef<Path>,
    O: AsRef<Path>,
{
    let stack = LayerStack::from_file(layer_stack)?;
    log::info!("loaded {} layers", stack.len());

    let library = Library::from_file(layout)?;

    let conversion = Converter::new(&stack, options).convert(&library)?;
    conversion.write(output.as_ref(), format)?;
    log::info!("wrote {}", output.as_ref().display());
    Ok(conversion.report)
}

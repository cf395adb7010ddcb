//! Conversion pipeline
//!
//! [`Converter`] runs the whole single-threaded pipeline over a loaded
//! [`Library`]:
//!
//! 1. For each cell in file order, group its outlines by configured layer,
//!    then condition, triangulate and extrude every polygon into one mesh
//!    per (cell, layer)
//! 2. Pack every mesh into the shared binary buffer, in build order
//! 3. Expand the hierarchy from the top-level cell(s) into scene trees
//! 4. Assemble the glTF document
//!
//! A triangulation failure anywhere aborts the run; no partial output is
//! produced.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use nalgebra::Point2;

use crate::buffer::BufferPacker;
use crate::condition::{ConditionParams, condition};
use crate::error::{Error, Result};
use crate::extrude::Mesh;
use crate::gltf::{self, Document, OutputFormat};
use crate::layer_stack::{LayerIndex, LayerStack};
use crate::layout::{Cell, CellId, Library};
use crate::mesh_ops::{self, BoundingBox};
use crate::scene::{MeshLibrary, SceneAssembler, SceneNode};
use crate::triangulation::{EarcutTriangulator, Triangulator, triangulate};

/// Options controlling a conversion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertOptions {
    params: ConditionParams,
    top: Option<String>,
}

impl ConvertOptions {
    /// Default options: standard conditioning, every top-level cell as a root
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given conditioning parameters
    pub fn with_params(mut self, params: ConditionParams) -> Self {
        self.params = params;
        self
    }

    /// Override the inward displacement of polygon vertices
    pub fn with_inset(mut self, delta: f64) -> Self {
        self.params.delta = delta;
        self
    }

    /// Convert only the named cell as the scene root
    pub fn with_top(mut self, name: impl Into<String>) -> Self {
        self.top = Some(name.into());
        self
    }

    /// Conditioning parameters
    pub fn params(&self) -> &ConditionParams {
        &self.params
    }

    /// Explicit top cell, if any
    pub fn top(&self) -> Option<&str> {
        self.top.as_deref()
    }
}

/// Measurements of one built mesh
#[derive(Debug, Clone, PartialEq)]
pub struct MeshStats {
    /// Mesh name
    pub name: String,
    /// Vertex count
    pub vertices: usize,
    /// Triangle count
    pub triangles: usize,
    /// Axis-aligned bounds in the cell's own frame
    pub bounds: BoundingBox,
    /// Signed volume; positive for closed, outward-facing solids
    pub volume: f64,
}

/// Summary of a finished conversion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionReport {
    /// Cells that were processed (context cell excluded)
    pub cells: usize,
    /// Polygons and outlined paths on configured layers
    pub polygons: usize,
    /// Polygons dropped because their layer is not configured
    pub skipped_polygons: usize,
    /// Polygons that triangulated to nothing
    pub empty_polygons: usize,
    /// Per-mesh measurements in build order
    pub meshes: Vec<MeshStats>,
    /// Names of the scene roots
    pub roots: Vec<String>,
    /// Total scene nodes
    pub nodes: usize,
    /// Size of the binary buffer in bytes
    pub buffer_bytes: usize,
}

impl ConversionReport {
    /// Sum of triangles over all meshes
    pub fn total_triangles(&self) -> usize {
        self.meshes.iter().map(|m| m.triangles).sum()
    }

    /// Sum of vertices over all meshes
    pub fn total_vertices(&self) -> usize {
        self.meshes.iter().map(|m| m.vertices).sum()
    }

    /// Bounds enclosing every mesh in its own cell frame; `None` without meshes
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.meshes
            .iter()
            .map(|m| m.bounds)
            .reduce(mesh_ops::union_aabb)
    }
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Roots:     {}", self.roots.join(", "))?;
        writeln!(f, "Cells:     {}", self.cells)?;
        writeln!(
            f,
            "Polygons:  {} ({} on unknown layers, {} empty)",
            self.polygons, self.skipped_polygons, self.empty_polygons
        )?;
        writeln!(
            f,
            "Meshes:    {} ({} vertices, {} triangles)",
            self.meshes.len(),
            self.total_vertices(),
            self.total_triangles()
        )?;
        writeln!(f, "Nodes:     {}", self.nodes)?;
        writeln!(f, "Buffer:    {} bytes", self.buffer_bytes)?;
        if let Some((min, max)) = self.bounds() {
            writeln!(
                f,
                "Bounds:    [{:.3}, {:.3}, {:.3}]..[{:.3}, {:.3}, {:.3}]",
                min.x, min.y, min.z, max.x, max.y, max.z
            )?;
        }
        for mesh in &self.meshes {
            let (min, max) = mesh.bounds;
            writeln!(
                f,
                "  {:<24} {:>8} tris  volume {:>12.4}  [{:.3}, {:.3}, {:.3}]..[{:.3}, {:.3}, {:.3}]",
                mesh.name,
                mesh.triangles,
                mesh.volume,
                min.x,
                min.y,
                min.z,
                max.x,
                max.y,
                max.z
            )?;
        }
        Ok(())
    }
}

/// Result of a conversion: the document, its binary buffer and a report
#[derive(Debug, Clone)]
pub struct Conversion {
    /// glTF document
    pub document: Document,
    /// Binary buffer referenced by the document
    pub blob: Vec<u8>,
    /// Summary
    pub report: ConversionReport,
}

impl Conversion {
    /// Write the scene to a file
    pub fn write<P: AsRef<Path>>(&self, path: P, format: OutputFormat) -> Result<()> {
        gltf::write_file(path, format, &self.document, &self.blob)
    }
}

/// Converts a layout library into a glTF scene
pub struct Converter<'a> {
    stack: &'a LayerStack,
    options: ConvertOptions,
    engine: Box<dyn Triangulator + 'a>,
}

impl<'a> Converter<'a> {
    /// Create a converter using the default triangulation engine
    pub fn new(stack: &'a LayerStack, options: ConvertOptions) -> Self {
        Self {
            stack,
            options,
            engine: Box::new(EarcutTriangulator),
        }
    }

    /// Replace the triangulation engine
    pub fn with_triangulator(mut self, engine: impl Triangulator + 'a) -> Self {
        self.engine = Box::new(engine);
        self
    }

    /// Run the conversion
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLayout`] if there is no top-level cell, the requested
    ///   top cell does not exist, or the hierarchy is broken
    /// - [`Error::Triangulation`] if the engine fails on any polygon
    pub fn convert(&self, library: &Library) -> Result<Conversion> {
        let tops = self.top_cells(library)?;
        let mut report = ConversionReport::default();

        let started = Instant::now();
        let meshes = self.build_meshes(library, &mut report)?;
        log::info!(
            "built {} meshes from {} cells in {:.3}s",
            meshes.len(),
            report.cells,
            started.elapsed().as_secs_f64()
        );

        let mut packer = BufferPacker::new();
        for (id, mesh) in meshes.iter() {
            packer.pack(id, mesh)?;
        }
        log::info!("packed {} bytes of mesh data", packer.blob().len());

        let assembler = SceneAssembler::new(library, self.stack, &meshes);
        let roots = tops
            .iter()
            .map(|&top| assembler.assemble(top))
            .collect::<Result<Vec<SceneNode>>>()?;

        let document = gltf::build_document(self.stack, &meshes, &packer, &roots)?;
        report.roots = roots.iter().map(|r| r.name.clone()).collect();
        report.nodes = document.nodes.len();
        report.buffer_bytes = packer.blob().len();
        log::info!(
            "scene has {} nodes under {} root(s)",
            report.nodes,
            roots.len()
        );

        Ok(Conversion {
            document,
            blob: packer.into_blob(),
            report,
        })
    }

    fn top_cells(&self, library: &Library) -> Result<Vec<CellId>> {
        if let Some(name) = self.options.top() {
            return library
                .find(name)
                .map(|id| vec![id])
                .ok_or_else(|| Error::invalid_layout(format!("no cell named '{}'", name)));
        }
        let tops = library.top_level();
        if tops.is_empty() {
            return Err(Error::invalid_layout("layout has no top-level cell"));
        }
        if tops.len() > 1 {
            log::info!(
                "{} top-level cells; each becomes a scene root",
                tops.len()
            );
        }
        Ok(tops)
    }

    fn build_meshes(&self, library: &Library, report: &mut ConversionReport) -> Result<MeshLibrary> {
        let mut meshes = MeshLibrary::new();
        for (id, cell) in library.cells() {
            if cell.is_context_info() {
                continue;
            }
            report.cells += 1;

            let started = Instant::now();
            let groups = self.group_by_layer(cell, report);
            let polygons: usize = groups.iter().map(|(_, g)| g.len()).sum();

            for (layer, outlines) in groups {
                let mesh = self.build_mesh(cell, layer, &outlines, report)?;
                if mesh.is_empty() {
                    log::debug!("mesh '{}' has no triangles, skipped", mesh.name);
                    continue;
                }
                mesh.validate()?;
                log::debug!(
                    "mesh '{}': {} vertices, {} triangles",
                    mesh.name,
                    mesh.vertex_count(),
                    mesh.triangle_count()
                );
                report.meshes.push(MeshStats {
                    name: mesh.name.clone(),
                    vertices: mesh.vertex_count(),
                    triangles: mesh.triangle_count(),
                    bounds: mesh_ops::compute_mesh_aabb(&mesh)?,
                    volume: mesh_ops::compute_mesh_signed_volume(&mesh),
                });
                meshes.insert(id, layer, mesh)?;
            }

            if polygons == 0 {
                log::debug!("cell '{}' has no polygons on configured layers", cell.name);
            } else {
                log::info!(
                    "cell '{}': {} polygons in {:.3}s",
                    cell.name,
                    polygons,
                    started.elapsed().as_secs_f64()
                );
            }
        }
        Ok(meshes)
    }

    /// Outlines of a cell grouped by layer, layers in first-seen order
    fn group_by_layer(
        &self,
        cell: &Cell,
        report: &mut ConversionReport,
    ) -> Vec<(LayerIndex, Vec<Vec<Point2<f64>>>)> {
        let mut groups: Vec<(LayerIndex, Vec<Vec<Point2<f64>>>)> = Vec::new();
        for (key, points) in cell.outlines() {
            let Some(layer) = self.stack.index_of(key) else {
                report.skipped_polygons += 1;
                continue;
            };
            report.polygons += 1;
            match groups.iter_mut().find(|(l, _)| *l == layer) {
                Some((_, outlines)) => outlines.push(points),
                None => groups.push((layer, vec![points])),
            }
        }
        groups
    }

    fn build_mesh(
        &self,
        cell: &Cell,
        layer: LayerIndex,
        outlines: &[Vec<Point2<f64>>],
        report: &mut ConversionReport,
    ) -> Result<Mesh> {
        let spec = self.stack.layer(layer);
        let mut mesh = Mesh::new(format!("{}_{}", cell.name, spec.name), layer);
        for points in outlines {
            if points.len() < 3 {
                report.empty_polygons += 1;
                continue;
            }
            let conditioned = condition(points, self.options.params());
            let triangulated = triangulate(&conditioned, self.engine.as_ref())?;
            if triangulated.face.triangles.is_empty() {
                report.empty_polygons += 1;
                continue;
            }
            mesh.append_extrusion(&triangulated, spec.z)?;
        }
        Ok(mesh)
    }
}

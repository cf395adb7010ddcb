//! Scene graph assembly
//!
//! The layout hierarchy is a DAG: one cell may be instanced many times. The
//! scene is a tree, so every instance expands into a fresh subtree of
//! [`SceneNode`]s. Meshes are never copied; nodes refer to them by
//! [`MeshId`] in a shared [`MeshLibrary`].
//!
//! Child order is fixed:
//! - an instance node lists its layer mesh nodes (stack order) and then its
//!   nested instances
//! - a root node lists its instances and then its own layer mesh nodes

use std::collections::HashMap;

use crate::buffer::MeshId;
use crate::error::{Error, Result};
use crate::extrude::Mesh;
use crate::layer_stack::{LayerIndex, LayerStack};
use crate::layout::{CellId, Instance, Library, Rotation};

/// Arena of built meshes keyed by (cell, layer)
#[derive(Debug, Default)]
pub struct MeshLibrary {
    meshes: Vec<Mesh>,
    by_key: HashMap<(CellId, LayerIndex), MeshId>,
}

impl MeshLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the mesh of one (cell, layer) pair
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMesh`] if the pair already has a mesh.
    pub fn insert(&mut self, cell: CellId, layer: LayerIndex, mesh: Mesh) -> Result<MeshId> {
        if self.by_key.contains_key(&(cell, layer)) {
            return Err(Error::InvalidMesh(format!(
                "mesh '{}' built twice",
                mesh.name
            )));
        }
        let id = self.meshes.len();
        self.meshes.push(mesh);
        self.by_key.insert((cell, layer), id);
        Ok(id)
    }

    /// Mesh of a (cell, layer) pair, if one was built
    pub fn find(&self, cell: CellId, layer: LayerIndex) -> Option<MeshId> {
        self.by_key.get(&(cell, layer)).copied()
    }

    /// Mesh by id
    pub fn mesh(&self, id: MeshId) -> &Mesh {
        &self.meshes[id]
    }

    /// Iterate meshes with their ids in build order
    pub fn iter(&self) -> impl Iterator<Item = (MeshId, &Mesh)> {
        self.meshes.iter().enumerate()
    }

    /// Number of meshes
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Whether no meshes were built
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// Local transform of a scene node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transform {
    /// Translation, if any
    pub translation: Option<[f64; 3]>,
    /// Rotation as a unit quaternion `[x, y, z, w]`, if any
    pub rotation: Option<[f32; 4]>,
    /// Scale, if any
    pub scale: Option<[f64; 3]>,
}

impl Transform {
    /// Placement transform of an instance
    pub fn of_instance(instance: &Instance) -> Self {
        let (x, y) = (instance.origin.x, instance.origin.y);
        let m = instance.magnification;
        let scale = (instance.x_reflection || m != 1.0).then(|| {
            let mirror = if instance.x_reflection { -1.0 } else { 1.0 };
            [m, mirror * m, 1.0]
        });
        Self {
            translation: Some([x, y, 0.0]),
            rotation: rotation_quaternion(instance.rotation),
            scale,
        }
    }
}

/// Unit quaternion of a rotation about +z; `None` for no rotation
pub fn rotation_quaternion(rotation: Rotation) -> Option<[f32; 4]> {
    match rotation {
        Rotation::None => None,
        Rotation::Deg90 => Some([0.0, 0.0, 0.707_106_8, 0.707_106_8]),
        Rotation::Deg180 => Some([0.0, 0.0, 1.0, 0.0]),
        Rotation::Deg270 => Some([0.0, 0.0, 0.707_106_8, -0.707_106_8]),
    }
}

/// One node of the scene tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneNode {
    /// Node name
    pub name: String,
    /// Referenced mesh, for layer nodes
    pub mesh: Option<MeshId>,
    /// Local transform
    pub transform: Transform,
    /// Name of the instanced cell, for instance nodes
    pub cell_type: Option<String>,
    /// Owned children in emission order
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    /// Create an empty node
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Number of nodes in this subtree, including this one
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(SceneNode::subtree_len).sum::<usize>()
    }
}

/// Expands the layout hierarchy into scene trees
pub struct SceneAssembler<'a> {
    library: &'a Library,
    stack: &'a LayerStack,
    meshes: &'a MeshLibrary,
}

impl<'a> SceneAssembler<'a> {
    /// Create an assembler over built meshes
    pub fn new(library: &'a Library, stack: &'a LayerStack, meshes: &'a MeshLibrary) -> Self {
        Self {
            library,
            stack,
            meshes,
        }
    }

    /// Build the scene tree rooted at a top-level cell
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidLayout`] on references to undefined cells
    /// and on cyclic references.
    pub fn assemble(&self, top: CellId) -> Result<SceneNode> {
        let cell = self.library.cell(top);
        let mut root = SceneNode::new(cell.name.clone());
        let mut ancestors = vec![top];
        self.expand_instances(top, &mut root, &mut ancestors)?;
        self.attach_meshes(top, &mut root);
        log::debug!(
            "scene for '{}' has {} nodes",
            cell.name,
            root.subtree_len()
        );
        Ok(root)
    }

    fn attach_meshes(&self, cell: CellId, node: &mut SceneNode) {
        for layer in 0..self.stack.len() {
            if let Some(id) = self.meshes.find(cell, layer) {
                let mesh = self.meshes.mesh(id);
                node.children.push(SceneNode {
                    name: mesh.name.clone(),
                    mesh: Some(id),
                    ..Default::default()
                });
            }
        }
    }

    fn expand_instances(
        &self,
        cell: CellId,
        parent: &mut SceneNode,
        ancestors: &mut Vec<CellId>,
    ) -> Result<()> {
        for instance in &self.library.cell(cell).instances {
            let child = self.library.resolve(instance)?;
            if ancestors.contains(&child) {
                return Err(Error::invalid_layout(format!(
                    "cell '{}' instantiates itself through '{}'",
                    instance.cell,
                    self.library.cell(cell).name
                )));
            }

            let mut node = SceneNode {
                name: instance.name.as_str().to_string(),
                transform: Transform::of_instance(instance),
                cell_type: Some(instance.cell.clone()),
                ..Default::default()
            };
            self.attach_meshes(child, &mut node);

            ancestors.push(child);
            self.expand_instances(child, &mut node, ancestors)?;
            ancestors.pop();

            parent.children.push(node);
        }
        Ok(())
    }
}

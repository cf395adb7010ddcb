//! glTF 2.0 scene container
//!
//! The document is a [`gltf::json::Root`] assembled from the packed buffer
//! and the scene trees. Two encodings are written:
//! - `.gltf`: JSON with the binary buffer embedded as a base64 data URI
//! - `.glb`: binary container with a JSON chunk and a BIN chunk
//!
//! Node indices are assigned the way the scene tree is emitted: each root
//! first, then its subtree in post-order (children before their parent).

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use ::gltf::binary::{Glb, Header};
use ::gltf::json::{self, Index};
use ::gltf::json::validation::{Checked::Valid, USize64};
use base64::Engine as _;

use crate::buffer::{
    Accessor as PackedAccessor, BufferPacker, BufferTarget, BufferView as PackedView,
    ComponentType, ElementType,
};
use crate::error::{Error, Result};
use crate::layer_stack::LayerStack;
use crate::scene::{MeshLibrary, SceneNode};

/// glTF document emitted by the converter
pub type Document = json::Root;

const DATA_URI_PREFIX: &str = "data:application/octet-stream;base64,";
const GLB_HEADER_LEN: usize = 12;
const GLB_CHUNK_HEADER_LEN: usize = 8;

/// Metallic and roughness factor of every layer material
const SURFACE_FACTOR: f32 = 0.5;

/// Output encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// JSON with an embedded base64 buffer
    #[default]
    Gltf,
    /// Binary container
    Glb,
}

impl OutputFormat {
    /// File extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Gltf => "gltf",
            OutputFormat::Glb => "glb",
        }
    }
}

fn index<T>(value: usize) -> Result<Index<T>> {
    u32::try_from(value)
        .map(Index::new)
        .map_err(|_| Error::scene_write(format!("index {} exceeds the glTF limit", value)))
}

fn size(value: usize) -> USize64 {
    USize64(value as u64)
}

/// Assemble the document from packed meshes and scene trees
///
/// # Errors
///
/// Returns [`Error::SceneWrite`] if a mesh was never packed or an index does
/// not fit the format.
pub fn build_document(
    stack: &LayerStack,
    meshes: &MeshLibrary,
    packer: &BufferPacker,
    roots: &[SceneNode],
) -> Result<Document> {
    let materials = stack
        .iter()
        .map(|layer| json::Material {
            name: Some(layer.name.clone()),
            pbr_metallic_roughness: json::material::PbrMetallicRoughness {
                base_color_factor: json::material::PbrBaseColorFactor(layer.color),
                metallic_factor: json::material::StrengthFactor(SURFACE_FACTOR),
                roughness_factor: json::material::StrengthFactor(SURFACE_FACTOR),
                ..Default::default()
            },
            double_sided: true,
            ..Default::default()
        })
        .collect();

    let gltf_meshes = meshes
        .iter()
        .map(|(id, mesh)| {
            let packed = packer.get(id).ok_or_else(|| {
                Error::scene_write(format!("mesh '{}' was never packed", mesh.name))
            })?;
            let mut attributes = BTreeMap::new();
            attributes.insert(Valid(json::mesh::Semantic::Positions), index(packed.positions)?);
            Ok(json::Mesh {
                extensions: Default::default(),
                extras: Default::default(),
                name: Some(mesh.name.clone()),
                primitives: vec![json::mesh::Primitive {
                    attributes,
                    extensions: Default::default(),
                    extras: Default::default(),
                    indices: Some(index(packed.indices)?),
                    material: Some(index(mesh.material)?),
                    mode: Valid(json::mesh::Mode::Triangles),
                    targets: None,
                }],
                weights: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let accessors = packer
        .accessors()
        .iter()
        .map(accessor)
        .collect::<Result<Vec<_>>>()?;
    let buffer_views = packer
        .views()
        .iter()
        .map(buffer_view)
        .collect::<Vec<_>>();

    let blob_len = packer.blob().len();
    let buffers = if blob_len == 0 {
        Vec::new()
    } else {
        vec![json::Buffer {
            byte_length: size(blob_len),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            uri: None,
        }]
    };

    let mut nodes = Vec::new();
    let scene_roots = roots
        .iter()
        .map(|root| emit_root(&mut nodes, root))
        .collect::<Result<Vec<_>>>()?;

    Ok(json::Root {
        asset: json::Asset {
            generator: Some(format!("gds2gltf {}", env!("CARGO_PKG_VERSION"))),
            version: "2.0".to_string(),
            ..Default::default()
        },
        scene: Some(Index::new(0)),
        scenes: vec![json::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            nodes: scene_roots,
        }],
        nodes,
        meshes: gltf_meshes,
        materials,
        accessors,
        buffer_views,
        buffers,
        ..Default::default()
    })
}

fn accessor(packed: &PackedAccessor) -> Result<json::Accessor> {
    let component_type = match packed.component_type {
        ComponentType::UnsignedInt => json::accessor::ComponentType::U32,
        ComponentType::Float => json::accessor::ComponentType::F32,
    };
    let type_ = match packed.element_type {
        ElementType::Scalar => json::accessor::Type::Scalar,
        ElementType::Vec3 => json::accessor::Type::Vec3,
    };
    Ok(json::Accessor {
        buffer_view: Some(index(packed.buffer_view)?),
        byte_offset: Some(size(0)),
        count: size(packed.count),
        component_type: Valid(json::accessor::GenericComponentType(component_type)),
        extensions: Default::default(),
        extras: Default::default(),
        type_: Valid(type_),
        min: Some(json::Value::from(packed.min.clone())),
        max: Some(json::Value::from(packed.max.clone())),
        name: None,
        normalized: false,
        sparse: None,
    })
}

fn buffer_view(view: &PackedView) -> json::buffer::View {
    let target = match view.target {
        BufferTarget::ArrayBuffer => json::buffer::Target::ArrayBuffer,
        BufferTarget::ElementArrayBuffer => json::buffer::Target::ElementArrayBuffer,
    };
    json::buffer::View {
        buffer: Index::new(0),
        byte_length: size(view.byte_length),
        byte_offset: Some(size(view.byte_offset)),
        byte_stride: None,
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        target: Some(Valid(target)),
    }
}

fn node_record(node: &SceneNode, children: Vec<Index<json::Node>>) -> Result<json::Node> {
    let transform = &node.transform;
    let extras = match &node.cell_type {
        Some(cell) => Some(serde_json::value::to_raw_value(&serde_json::json!({ "type": cell }))?),
        None => None,
    };
    Ok(json::Node {
        name: Some(node.name.clone()),
        mesh: node.mesh.map(index).transpose()?,
        translation: transform.translation.map(|t| t.map(|v| v as f32)),
        rotation: transform.rotation.map(json::scene::UnitQuaternion),
        scale: transform.scale.map(|s| s.map(|v| v as f32)),
        children: (!children.is_empty()).then_some(children),
        extras,
        ..Default::default()
    })
}

/// Root first, then its subtree post-order
fn emit_root(nodes: &mut Vec<json::Node>, root: &SceneNode) -> Result<Index<json::Node>> {
    let at = nodes.len();
    nodes.push(node_record(root, Vec::new())?);
    let children = root
        .children
        .iter()
        .map(|child| emit_post_order(nodes, child))
        .collect::<Result<Vec<_>>>()?;
    nodes[at].children = (!children.is_empty()).then_some(children);
    index(at)
}

fn emit_post_order(nodes: &mut Vec<json::Node>, node: &SceneNode) -> Result<Index<json::Node>> {
    let children = node
        .children
        .iter()
        .map(|child| emit_post_order(nodes, child))
        .collect::<Result<Vec<_>>>()?;
    nodes.push(node_record(node, children)?);
    index(nodes.len() - 1)
}

/// Write a `.gltf` document with the blob embedded as a data URI
pub fn write_gltf<W: Write>(mut writer: W, document: &Document, blob: &[u8]) -> Result<()> {
    let mut document = document.clone();
    if let Some(buffer) = document.buffers.first_mut() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(blob);
        buffer.uri = Some(format!("{}{}", DATA_URI_PREFIX, encoded));
    }
    serde_json::to_writer_pretty(&mut writer, &document)?;
    writer.flush()?;
    Ok(())
}

fn padded(len: usize) -> usize {
    len.div_ceil(4) * 4
}

/// Write a `.glb` binary container
///
/// The BIN chunk is left out when the blob is empty.
pub fn write_glb<W: Write>(mut writer: W, document: &Document, blob: &[u8]) -> Result<()> {
    let json = serde_json::to_vec(document)?;
    let mut length = GLB_HEADER_LEN + GLB_CHUNK_HEADER_LEN + padded(json.len());
    if !blob.is_empty() {
        length += GLB_CHUNK_HEADER_LEN + padded(blob.len());
    }
    let length = u32::try_from(length)
        .map_err(|_| Error::scene_write(format!("{} bytes exceed the GLB size limit", length)))?;

    let glb = Glb {
        header: Header {
            magic: *b"glTF",
            version: 2,
            length,
        },
        json: Cow::Owned(json),
        bin: (!blob.is_empty()).then_some(Cow::Borrowed(blob)),
    };
    glb.to_writer(&mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Write a document to a file in the given format
///
/// The scene is encoded in memory and written to a temporary sibling that
/// replaces `path` only once complete, so a failure never leaves a partial
/// file behind.
pub fn write_file<P: AsRef<Path>>(
    path: P,
    format: OutputFormat,
    document: &Document,
    blob: &[u8],
) -> Result<()> {
    let path = path.as_ref();
    let mut encoded = Vec::new();
    match format {
        OutputFormat::Gltf => write_gltf(&mut encoded, document, blob)?,
        OutputFormat::Glb => write_glb(&mut encoded, document, blob)?,
    }

    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(&encoded)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| err.error)?;
    log::debug!("wrote {} bytes to {}", encoded.len(), path.display());
    Ok(())
}

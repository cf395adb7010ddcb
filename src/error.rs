//! Error types for layout-to-scene conversion
//!
//! All errors carry an error code so failures can be categorized from the
//! message alone.
//!
//! # Error Codes
//!
//! Error codes follow the pattern: `E<category><number>`
//!
//! Categories:
//! - **E1xxx**: I/O errors
//! - **E2xxx**: Layout input errors (GDSII stream and cell hierarchy)
//! - **E3xxx**: Layer-stack configuration errors
//! - **E4xxx**: Geometry errors (triangulation and mesh checks)
//! - **E5xxx**: Scene output errors
//!
//! ## Common Error Codes
//!
//! - `E1001`: I/O error reading or writing a file
//! - `E2001`: Malformed GDSII stream
//! - `E2002`: Invalid layout hierarchy
//! - `E3001`: Invalid layer-stack line
//! - `E3002`: Numeric parse error
//! - `E4001`: Triangulation failure
//! - `E4002`: Invalid mesh
//! - `E5001`: JSON serialization error
//! - `E5002`: Scene write error

use std::io;
use thiserror::Error;

use crate::triangulation::TriangulationError;

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converting a layout into a scene
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred while reading or writing a file
    ///
    /// **Error Code**: E1001
    ///
    /// **Common Causes**:
    /// - File not found
    /// - Insufficient permissions
    /// - Disk full while writing the scene
    #[error("[E1001] I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed GDSII stream
    ///
    /// **Error Code**: E2001
    ///
    /// **Common Causes**:
    /// - Truncated file
    /// - Record with an unknown data type
    /// - Element missing its `XY` record
    ///
    /// **Suggestions**:
    /// - Verify the file is a GDSII stream and not OASIS or a text dump
    /// - Re-export the layout from the layout editor
    #[error("[E2001] GDSII stream error: {0}")]
    Gds(String),

    /// Invalid layout hierarchy
    ///
    /// **Error Code**: E2002
    ///
    /// **Common Causes**:
    /// - Instance referencing a cell that is not defined in the file
    /// - Cell that (indirectly) instantiates itself
    /// - No top-level cell, or an unknown cell requested as top
    #[error("[E2002] Invalid layout: {0}")]
    InvalidLayout(String),

    /// Invalid line in the layer-stack file
    ///
    /// **Error Code**: E3001
    ///
    /// **Suggestions**:
    /// - Each record needs exactly nine fields:
    ///   `name gds_number gds_datatype zmin zmax r g b a`
    /// - `zmin` must be below `zmax`, colors must lie in `[0, 1]`
    #[error("[E3001] Layer stack line {line}: {message}")]
    LayerStack {
        /// 1-based line number in the layer-stack file
        line: usize,
        /// What is wrong with the line
        message: String,
    },

    /// Parse error for numeric values
    ///
    /// **Error Code**: E3002
    #[error("[E3002] Parse error: {0}")]
    ParseError(String),

    /// The triangulation engine failed
    ///
    /// **Error Code**: E4001
    ///
    /// A failure here aborts the whole conversion since a partially
    /// triangulated layer would be silently wrong.
    #[error("[E4001] Triangulation failed: {0}")]
    Triangulation(#[from] TriangulationError),

    /// A mesh violates its structural invariants
    ///
    /// **Error Code**: E4002
    ///
    /// **Common Causes**:
    /// - Triangle index beyond the vertex count
    /// - Non-finite vertex coordinate
    #[error("[E4002] Invalid mesh: {0}")]
    InvalidMesh(String),

    /// JSON serialization error
    ///
    /// **Error Code**: E5001
    #[error("[E5001] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Scene container write error
    ///
    /// **Error Code**: E5002
    #[error("[E5002] Scene write error: {0}")]
    SceneWrite(String),
}

impl From<::gltf::Error> for Error {
    fn from(err: ::gltf::Error) -> Self {
        Error::SceneWrite(err.to_string())
    }
}

impl Error {
    /// Create a GDSII stream error
    pub fn gds(message: impl Into<String>) -> Self {
        Error::Gds(message.into())
    }

    /// Create a GDSII stream error pointing at a byte offset in the stream
    pub fn gds_at(offset: u64, message: &str) -> Self {
        Error::Gds(format!("at byte {}: {}", offset, message))
    }

    /// Create an invalid-layout error
    pub fn invalid_layout(message: impl Into<String>) -> Self {
        Error::InvalidLayout(message.into())
    }

    /// Create a layer-stack error for a 1-based line number
    pub fn layer_stack_line(line: usize, message: impl Into<String>) -> Self {
        Error::LayerStack {
            line,
            message: message.into(),
        }
    }

    /// Create a ParseError with context about what was being parsed
    ///
    /// # Arguments
    /// * `field_name` - The name of the field being parsed (e.g., "zmin")
    /// * `value` - The value that failed to parse
    /// * `expected_type` - The expected type (e.g., "floating-point number")
    pub fn parse_error_with_context(field_name: &str, value: &str, expected_type: &str) -> Self {
        Error::ParseError(format!(
            "Failed to parse '{}': expected {}, got '{}'",
            field_name, expected_type, value
        ))
    }

    /// Create a SceneWrite error
    pub fn scene_write(message: String) -> Self {
        Error::SceneWrite(message)
    }
}

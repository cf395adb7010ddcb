//! Layer-stack configuration
//!
//! A layer stack maps layout layer identities `(number, datatype)` to a
//! vertical extent and a display color. It is loaded once, never mutated, and
//! passed by reference through every stage of the conversion.
//!
//! The text format has one record per line:
//!
//! ```text
//! # name  gds_number gds_datatype zmin zmax r   g   b   a
//! M1      34         0            0.0  0.5  0.2 0.4 0.8 1.0
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Number of whitespace-separated fields in a layer-stack record
const FIELD_COUNT: usize = 9;

/// Identity of a layer in the layout: GDSII layer number and datatype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerKey {
    /// GDSII layer number
    pub number: i16,
    /// GDSII datatype (or boxtype for BOX elements)
    pub datatype: i16,
}

impl LayerKey {
    /// Create a new layer key
    pub fn new(number: i16, datatype: i16) -> Self {
        Self { number, datatype }
    }
}

impl std::fmt::Display for LayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.number, self.datatype)
    }
}

/// Vertical extent of an extruded layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZRange {
    /// Bottom face height
    pub zmin: f64,
    /// Top face height
    pub zmax: f64,
}

impl ZRange {
    /// Create a z-range; returns `None` unless `zmin < zmax`
    pub fn new(zmin: f64, zmax: f64) -> Option<Self> {
        (zmin < zmax).then_some(Self { zmin, zmax })
    }
}

/// One configured layer
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    /// Layout identity
    pub key: LayerKey,
    /// Display name, also used in mesh and node names
    pub name: String,
    /// Vertical extent
    pub z: ZRange,
    /// RGBA tint, each component in `[0, 1]`
    pub color: [f32; 4],
}

/// Position of a [`LayerSpec`] in its [`LayerStack`]; doubles as material index
pub type LayerIndex = usize;

/// Immutable, ordered set of configured layers
#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    layers: Vec<LayerSpec>,
    by_key: HashMap<LayerKey, LayerIndex>,
}

impl LayerStack {
    /// Build a stack from layer specs
    ///
    /// A repeated key replaces the earlier spec but keeps its position.
    pub fn new(specs: impl IntoIterator<Item = LayerSpec>) -> Self {
        let mut stack = Self::default();
        for spec in specs {
            stack.insert(spec);
        }
        stack
    }

    fn insert(&mut self, spec: LayerSpec) {
        match self.by_key.get(&spec.key) {
            Some(&index) => {
                log::warn!(
                    "layer {} defined twice ('{}' and '{}'); keeping the later definition",
                    spec.key,
                    self.layers[index].name,
                    spec.name
                );
                self.layers[index] = spec;
            }
            None => {
                self.by_key.insert(spec.key, self.layers.len());
                self.layers.push(spec);
            }
        }
    }

    /// Read a layer-stack file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        text.parse()
    }

    /// Look up the stack position of a layout layer
    pub fn index_of(&self, key: LayerKey) -> Option<LayerIndex> {
        self.by_key.get(&key).copied()
    }

    /// Look up a layer spec by layout identity
    pub fn get(&self, key: LayerKey) -> Option<&LayerSpec> {
        self.index_of(key).map(|i| &self.layers[i])
    }

    /// Layer spec at a stack position
    pub fn layer(&self, index: LayerIndex) -> &LayerSpec {
        &self.layers[index]
    }

    /// Iterate layers in stack order
    pub fn iter(&self) -> impl Iterator<Item = &LayerSpec> {
        self.layers.iter()
    }

    /// Number of configured layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether no layers are configured
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl FromStr for LayerStack {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut specs = Vec::new();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            specs.push(parse_record(i + 1, line)?);
        }
        Ok(Self::new(specs))
    }
}

fn parse_record(line_no: usize, line: &str) -> Result<LayerSpec> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != FIELD_COUNT {
        return Err(Error::layer_stack_line(
            line_no,
            format!("expected {} fields, found {}", FIELD_COUNT, fields.len()),
        ));
    }

    let field = |i: usize, what: &str| -> Result<f64> {
        fields[i].parse::<f64>().map_err(|_| {
            Error::parse_error_with_context(
                &format!("{} on line {}", what, line_no),
                fields[i],
                "floating-point number",
            )
        })
    };
    let int_field = |i: usize, what: &str| -> Result<i16> {
        fields[i].parse::<i16>().map_err(|_| {
            Error::parse_error_with_context(
                &format!("{} on line {}", what, line_no),
                fields[i],
                "16-bit integer",
            )
        })
    };

    let key = LayerKey::new(int_field(1, "gds_number")?, int_field(2, "gds_datatype")?);
    let (zmin, zmax) = (field(3, "zmin")?, field(4, "zmax")?);
    let z = ZRange::new(zmin, zmax).ok_or_else(|| {
        Error::layer_stack_line(
            line_no,
            format!("zmin ({}) must be below zmax ({})", zmin, zmax),
        )
    })?;

    let mut color = [0.0f32; 4];
    for (c, name) in ["color_r", "color_g", "color_b", "color_a"].iter().enumerate() {
        let value = field(5 + c, name)?;
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::layer_stack_line(
                line_no,
                format!("{} ({}) must lie in [0, 1]", name, value),
            ));
        }
        color[c] = value as f32;
    }

    Ok(LayerSpec {
        key,
        name: fields[0].to_string(),
        z,
        color,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# name gds_number gds_datatype zmin zmax r g b a
substrate 245 0 -1 0 0.2 0.2 0.2 1.0

M1 34 0 0.0 0.5 0.2 0.4 0.8 1.0
";

    #[test]
    fn test_parse_sample_stack() {
        let stack: LayerStack = SAMPLE.parse().expect("valid stack");
        assert_eq!(stack.len(), 2);

        let m1 = stack.get(LayerKey::new(34, 0)).expect("M1 present");
        assert_eq!(m1.name, "M1");
        assert_eq!(m1.z.zmin, 0.0);
        assert_eq!(m1.z.zmax, 0.5);
        assert_eq!(m1.color, [0.2, 0.4, 0.8, 1.0]);
        assert_eq!(stack.index_of(LayerKey::new(34, 0)), Some(1));

        let substrate = stack.layer(0);
        assert_eq!(substrate.z.zmax - substrate.z.zmin, 1.0);
    }

    #[test]
    fn test_unknown_key_is_absent() {
        let stack: LayerStack = SAMPLE.parse().unwrap();
        assert!(stack.get(LayerKey::new(34, 1)).is_none());
    }

    #[test]
    fn test_wrong_field_count_reports_line() {
        let err = "M1 34 0 0.0 0.5\n".parse::<LayerStack>().unwrap_err();
        match err {
            Error::LayerStack { line, message } => {
                assert_eq!(line, 1);
                assert!(message.contains("found 5"));
            }
            other => panic!("Expected LayerStack error, got {other:?}"),
        }
    }

    #[test]
    fn test_line_numbers_count_comments_and_blanks() {
        let text = "# header\n\nM1 34 0 0 1 0 0 0\n";
        let err = text.parse::<LayerStack>().unwrap_err();
        assert!(matches!(err, Error::LayerStack { line: 3, .. }));
    }

    #[test]
    fn test_inverted_z_range_rejected() {
        let err = "M1 34 0 1.0 0.5 0 0 0 1\n".parse::<LayerStack>().unwrap_err();
        assert!(err.to_string().contains("must be below"));
    }

    #[test]
    fn test_color_out_of_range_rejected() {
        let err = "M1 34 0 0 1 0 0 1.5 1\n".parse::<LayerStack>().unwrap_err();
        assert!(err.to_string().contains("color_b"));
    }

    #[test]
    fn test_non_numeric_field_rejected() {
        let err = "M1 x 0 0 1 0 0 0 1\n".parse::<LayerStack>().unwrap_err();
        assert!(err.to_string().contains("gds_number"));
        assert!(err.to_string().contains("[E3002]"));
        assert!(err.to_string().contains("line 1"));

        let err = "M1 34 0 0 high 0 0 0 1\n".parse::<LayerStack>().unwrap_err();
        assert!(err.to_string().contains("zmax on line 1"));
    }

    #[test]
    fn test_duplicate_key_replaces_in_place() {
        let text = "A 1 0 0 1 0 0 0 1\nB 2 0 0 1 0 0 0 1\nC 1 0 2 3 0 0 0 1\n";
        let stack: LayerStack = text.parse().unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.layer(0).name, "C");
        assert_eq!(stack.layer(1).name, "B");
    }
}

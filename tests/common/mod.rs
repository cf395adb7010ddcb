//! Shared utilities for integration tests
//!
//! Builds GDSII streams in memory so tests do not depend on fixture files.
//! Coordinates are given in database units; the library written by
//! [`GdsBuilder::new`] uses 1000 database units per user unit.

#![allow(dead_code)]

use gds2gltf::layout::gds::record;

const NO_DATA: u8 = 0;
const BIT_ARRAY: u8 = 1;
const INT16: u8 = 2;
const INT32: u8 = 3;
const REAL8: u8 = 5;
const ASCII: u8 = 6;

/// Database units per user unit in streams built here
pub const DB_PER_UNIT: i32 = 1000;

/// Layer stack used by most integration tests
pub const LAYER_STACK: &str = "\
# name gds_number gds_datatype zmin zmax r g b a
M1   34 0 0.0 0.5 0.2 0.4 0.8 1.0
M2   36 0 0.5 1.0 0.8 0.4 0.2 1.0
";

/// Encode a value as an 8-byte excess-64 base-16 GDSII real
pub fn encode_real8(value: f64) -> [u8; 8] {
    if value == 0.0 {
        return [0; 8];
    }
    let sign = if value < 0.0 { 0x80u8 } else { 0 };
    let mut fraction = value.abs();
    let mut exponent: i32 = 64;
    while fraction >= 1.0 {
        fraction /= 16.0;
        exponent += 1;
    }
    while fraction < 1.0 / 16.0 {
        fraction *= 16.0;
        exponent -= 1;
    }
    let mut mantissa = (fraction * 2f64.powi(56)).round() as u64;
    if mantissa >= 1 << 56 {
        mantissa >>= 4;
        exponent += 1;
    }
    let mut bytes = mantissa.to_be_bytes();
    bytes[0] = sign | exponent as u8;
    bytes
}

/// Placement options of a structure reference
#[derive(Debug, Clone, Default)]
pub struct Placement {
    /// Rotation in degrees
    pub angle: Option<f64>,
    /// Mirror about X
    pub reflect: bool,
    /// Magnification
    pub mag: Option<f64>,
    /// Instance name stored in property 61
    pub name: Option<String>,
}

impl Placement {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn rotated(mut self, angle: f64) -> Self {
        self.angle = Some(angle);
        self
    }

    pub fn mirrored(mut self) -> Self {
        self.reflect = true;
        self
    }
}

/// In-memory GDSII stream writer
pub struct GdsBuilder {
    bytes: Vec<u8>,
}

impl GdsBuilder {
    /// Start a library with 1e-3 user units per database unit, 1e-9 m per database unit
    pub fn new(name: &str) -> Self {
        let mut builder = Self { bytes: Vec::new() };
        builder.int16(record::HEADER, &[600]);
        builder.int16(record::BGNLIB, &[0; 12]);
        builder.ascii(record::LIBNAME, name);
        let mut units = encode_real8(1.0 / f64::from(DB_PER_UNIT)).to_vec();
        units.extend_from_slice(&encode_real8(1e-9));
        builder.record(record::UNITS, REAL8, &units);
        builder
    }

    pub fn record(&mut self, kind: u8, data_type: u8, payload: &[u8]) -> &mut Self {
        self.bytes
            .extend_from_slice(&((payload.len() + 4) as u16).to_be_bytes());
        self.bytes.push(kind);
        self.bytes.push(data_type);
        self.bytes.extend_from_slice(payload);
        self
    }

    pub fn ascii(&mut self, kind: u8, text: &str) -> &mut Self {
        let mut payload = text.as_bytes().to_vec();
        if payload.len() % 2 == 1 {
            payload.push(0);
        }
        self.record(kind, ASCII, &payload)
    }

    pub fn int16(&mut self, kind: u8, values: &[i16]) -> &mut Self {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.record(kind, INT16, &payload)
    }

    pub fn int32(&mut self, kind: u8, values: &[i32]) -> &mut Self {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.record(kind, INT32, &payload)
    }

    pub fn real8(&mut self, kind: u8, value: f64) -> &mut Self {
        self.record(kind, REAL8, &encode_real8(value))
    }

    fn xy(&mut self, points: &[(i32, i32)]) -> &mut Self {
        let flat: Vec<i32> = points.iter().flat_map(|&(x, y)| [x, y]).collect();
        self.int32(record::XY, &flat)
    }

    fn end_element(&mut self) -> &mut Self {
        self.record(record::ENDEL, NO_DATA, &[])
    }

    pub fn begin_cell(&mut self, name: &str) -> &mut Self {
        self.int16(record::BGNSTR, &[0; 12]);
        self.ascii(record::STRNAME, name)
    }

    pub fn end_cell(&mut self) -> &mut Self {
        self.record(record::ENDSTR, NO_DATA, &[])
    }

    /// Boundary on `(layer, datatype)`; the closing point is added here
    pub fn boundary(&mut self, layer: i16, datatype: i16, points: &[(i32, i32)]) -> &mut Self {
        let mut closed = points.to_vec();
        closed.push(points[0]);
        self.record(record::BOUNDARY, NO_DATA, &[]);
        self.int16(record::LAYER, &[layer]);
        self.int16(record::DATATYPE, &[datatype]);
        self.xy(&closed);
        self.end_element()
    }

    /// Axis-aligned rectangle from `(x0, y0)` to `(x1, y1)`
    pub fn rect(&mut self, layer: i16, datatype: i16, (x0, y0): (i32, i32), (x1, y1): (i32, i32)) -> &mut Self {
        self.boundary(layer, datatype, &[(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
    }

    pub fn box_element(&mut self, layer: i16, boxtype: i16, points: &[(i32, i32)]) -> &mut Self {
        self.record(record::BOX, NO_DATA, &[]);
        self.int16(record::LAYER, &[layer]);
        self.int16(record::BOXTYPE, &[boxtype]);
        self.xy(points);
        self.end_element()
    }

    pub fn path(
        &mut self,
        layer: i16,
        datatype: i16,
        pathtype: i16,
        width: i32,
        points: &[(i32, i32)],
    ) -> &mut Self {
        self.record(record::PATH, NO_DATA, &[]);
        self.int16(record::LAYER, &[layer]);
        self.int16(record::DATATYPE, &[datatype]);
        self.int16(record::PATHTYPE, &[pathtype]);
        self.int32(record::WIDTH, &[width]);
        self.xy(points);
        self.end_element()
    }

    pub fn text(&mut self, layer: i16, at: (i32, i32), text: &str) -> &mut Self {
        self.record(record::TEXT, NO_DATA, &[]);
        self.int16(record::LAYER, &[layer]);
        self.int16(record::TEXTTYPE, &[0]);
        self.xy(&[at]);
        self.ascii(0x19, text);
        self.end_element()
    }

    fn placement(&mut self, placement: &Placement) {
        if placement.reflect || placement.angle.is_some() || placement.mag.is_some() {
            let bits: u16 = if placement.reflect { 0x8000 } else { 0 };
            self.record(record::STRANS, BIT_ARRAY, &bits.to_be_bytes());
            if let Some(mag) = placement.mag {
                self.real8(record::MAG, mag);
            }
            if let Some(angle) = placement.angle {
                self.real8(record::ANGLE, angle);
            }
        }
    }

    fn name_property(&mut self, placement: &Placement) {
        if let Some(name) = &placement.name {
            self.int16(record::PROPATTR, &[61]);
            self.ascii(record::PROPVALUE, name);
        }
    }

    pub fn sref(&mut self, cell: &str, at: (i32, i32), placement: Placement) -> &mut Self {
        self.record(record::SREF, NO_DATA, &[]);
        self.ascii(record::SNAME, cell);
        self.placement(&placement);
        self.xy(&[at]);
        self.name_property(&placement);
        self.end_element()
    }

    pub fn aref(
        &mut self,
        cell: &str,
        origin: (i32, i32),
        (cols, rows): (i16, i16),
        (pitch_x, pitch_y): (i32, i32),
    ) -> &mut Self {
        let (x, y) = origin;
        self.record(record::AREF, NO_DATA, &[]);
        self.ascii(record::SNAME, cell);
        self.int16(record::COLROW, &[cols, rows]);
        self.xy(&[
            (x, y),
            (x + pitch_x * i32::from(cols), y),
            (x, y + pitch_y * i32::from(rows)),
        ]);
        self.end_element()
    }

    pub fn finish(&mut self) -> Vec<u8> {
        self.record(record::ENDLIB, NO_DATA, &[]);
        std::mem::take(&mut self.bytes)
    }
}

/// Read a library from bytes built with [`GdsBuilder`]
pub fn read(bytes: &[u8]) -> gds2gltf::Library {
    gds2gltf::layout::gds::read_library(bytes).expect("valid GDSII stream")
}

/// Single cell `TOP` with a 10 x 10 square on M1
pub fn single_square() -> Vec<u8> {
    GdsBuilder::new("LIB")
        .begin_cell("TOP")
        .rect(34, 0, (0, 0), (10_000, 10_000))
        .end_cell()
        .finish()
}

/// `LEAF` with geometry on M1 and M2, placed twice in `TOP`
pub fn two_instances() -> Vec<u8> {
    GdsBuilder::new("LIB")
        .begin_cell("LEAF")
        .rect(36, 0, (0, 0), (2_000, 2_000))
        .rect(34, 0, (0, 0), (4_000, 1_000))
        .end_cell()
        .begin_cell("TOP")
        .sref("LEAF", (10_000, 0), Placement::named("U1"))
        .sref("LEAF", (0, 10_000), Placement::default().rotated(90.0).mirrored())
        .rect(34, 0, (0, 0), (20_000, 20_000))
        .end_cell()
        .finish()
}

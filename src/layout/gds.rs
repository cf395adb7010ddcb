//! GDSII stream reader
//!
//! Reads the subset of GDSII needed for extrusion: structures, boundaries,
//! boxes, paths, structure references and array references, plus the
//! instance-name property. Text and node elements are skipped.
//!
//! A GDSII stream is a sequence of records. Each record starts with a
//! big-endian `u16` total length (header included), a record type byte and a
//! data type byte.

use std::io::Read;

use nalgebra::{Point2, Vector2};

use super::{
    Cell, INSTANCE_NAME_PROPERTY, Instance, InstanceName, Library, Path, PathEnd, Polygon,
    Rotation,
};
use crate::error::{Error, Result};
use crate::layer_stack::LayerKey;

/// GDSII record type codes
pub mod record {
    #![allow(missing_docs)]
    pub const HEADER: u8 = 0x00;
    pub const BGNLIB: u8 = 0x01;
    pub const LIBNAME: u8 = 0x02;
    pub const UNITS: u8 = 0x03;
    pub const ENDLIB: u8 = 0x04;
    pub const BGNSTR: u8 = 0x05;
    pub const STRNAME: u8 = 0x06;
    pub const ENDSTR: u8 = 0x07;
    pub const BOUNDARY: u8 = 0x08;
    pub const PATH: u8 = 0x09;
    pub const SREF: u8 = 0x0A;
    pub const AREF: u8 = 0x0B;
    pub const TEXT: u8 = 0x0C;
    pub const LAYER: u8 = 0x0D;
    pub const DATATYPE: u8 = 0x0E;
    pub const WIDTH: u8 = 0x0F;
    pub const XY: u8 = 0x10;
    pub const ENDEL: u8 = 0x11;
    pub const SNAME: u8 = 0x12;
    pub const COLROW: u8 = 0x13;
    pub const NODE: u8 = 0x15;
    pub const TEXTTYPE: u8 = 0x16;
    pub const STRANS: u8 = 0x1A;
    pub const MAG: u8 = 0x1B;
    pub const ANGLE: u8 = 0x1C;
    pub const PATHTYPE: u8 = 0x21;
    pub const PROPATTR: u8 = 0x2B;
    pub const PROPVALUE: u8 = 0x2C;
    pub const BOX: u8 = 0x2D;
    pub const BOXTYPE: u8 = 0x2E;
    pub const BGNEXTN: u8 = 0x30;
    pub const ENDEXTN: u8 = 0x31;
}

/// GDSII data type codes
mod data_type {
    pub const NONE: u8 = 0;
    pub const BIT_ARRAY: u8 = 1;
    pub const INT16: u8 = 2;
    pub const INT32: u8 = 3;
    pub const REAL4: u8 = 4;
    pub const REAL8: u8 = 5;
    pub const ASCII: u8 = 6;
}

const STRANS_REFLECTION: u16 = 0x8000;

/// Largest array reference expanded into instances
pub const MAX_AREF_INSTANCES: i64 = 1 << 22;

/// Payload of one record
#[derive(Debug, Clone, PartialEq)]
enum Data {
    None,
    BitArray(u16),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Real8(Vec<f64>),
    Ascii(String),
}

#[derive(Debug)]
struct Record {
    kind: u8,
    data: Data,
    offset: u64,
}

impl Record {
    fn int16(&self, what: &str) -> Result<i16> {
        match &self.data {
            Data::Int16(v) if !v.is_empty() => Ok(v[0]),
            _ => Err(self.malformed(what)),
        }
    }

    fn int32(&self, what: &str) -> Result<i32> {
        match &self.data {
            Data::Int32(v) if !v.is_empty() => Ok(v[0]),
            _ => Err(self.malformed(what)),
        }
    }

    fn real8(&self, what: &str) -> Result<f64> {
        match &self.data {
            Data::Real8(v) if !v.is_empty() => Ok(v[0]),
            _ => Err(self.malformed(what)),
        }
    }

    fn ascii(&self, what: &str) -> Result<String> {
        match &self.data {
            Data::Ascii(s) => Ok(s.clone()),
            _ => Err(self.malformed(what)),
        }
    }

    fn malformed(&self, what: &str) -> Error {
        Error::gds_at(
            self.offset,
            &format!("{} record (0x{:02X}) has an unexpected payload", what, self.kind),
        )
    }
}

/// Decode an 8-byte excess-64 base-16 GDSII real
pub fn decode_real8(bytes: [u8; 8]) -> f64 {
    let negative = bytes[0] & 0x80 != 0;
    let exponent = (bytes[0] & 0x7F) as i32 - 64;
    let mantissa = bytes[1..]
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    let value = mantissa as f64 / 2f64.powi(56) * 16f64.powi(exponent);
    if negative { -value } else { value }
}

/// Record-level reader that tracks its byte offset for error messages
struct RecordReader<R: Read> {
    inner: R,
    offset: u64,
}

impl<R: Read> RecordReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Next record, or `None` at a clean end of stream
    fn next(&mut self) -> Result<Option<Record>> {
        let start = self.offset;
        let mut header = [0u8; 4];
        let mut filled = 0;
        while filled < header.len() {
            let n = self.inner.read(&mut header[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(Error::gds_at(start, "stream ends inside a record header"));
            }
            filled += n;
        }
        self.offset += 4;

        let length = u16::from_be_bytes([header[0], header[1]]) as usize;
        if length < 4 {
            return Err(Error::gds_at(
                start,
                &format!("record length {} is shorter than its header", length),
            ));
        }
        let mut payload = vec![0u8; length - 4];
        self.inner.read_exact(&mut payload).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::gds_at(start, "stream ends inside a record payload")
            } else {
                Error::Io(e)
            }
        })?;
        self.offset += payload.len() as u64;

        let data = decode_payload(header[3], &payload)
            .map_err(|message| Error::gds_at(start, &message))?;
        Ok(Some(Record {
            kind: header[2],
            data,
            offset: start,
        }))
    }

    fn expect_next(&mut self, context: &str) -> Result<Record> {
        self.next()?.ok_or_else(|| {
            Error::gds_at(self.offset, &format!("unexpected end of stream inside {}", context))
        })
    }
}

fn decode_payload(code: u8, payload: &[u8]) -> std::result::Result<Data, String> {
    let check_multiple = |size: usize| {
        if payload.len() % size != 0 {
            Err(format!(
                "payload of {} bytes is not a multiple of {}",
                payload.len(),
                size
            ))
        } else {
            Ok(())
        }
    };

    match code {
        data_type::NONE => Ok(Data::None),
        data_type::BIT_ARRAY => {
            check_multiple(2)?;
            if payload.len() < 2 {
                return Err("bit array record without payload".to_string());
            }
            Ok(Data::BitArray(u16::from_be_bytes([payload[0], payload[1]])))
        }
        data_type::INT16 => {
            check_multiple(2)?;
            Ok(Data::Int16(
                payload
                    .chunks_exact(2)
                    .map(|c| i16::from_be_bytes([c[0], c[1]]))
                    .collect(),
            ))
        }
        data_type::INT32 => {
            check_multiple(4)?;
            Ok(Data::Int32(
                payload
                    .chunks_exact(4)
                    .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ))
        }
        data_type::REAL4 => Err("4-byte reals are not supported".to_string()),
        data_type::REAL8 => {
            check_multiple(8)?;
            Ok(Data::Real8(
                payload
                    .chunks_exact(8)
                    .map(|c| {
                        let mut bytes = [0u8; 8];
                        bytes.copy_from_slice(c);
                        decode_real8(bytes)
                    })
                    .collect(),
            ))
        }
        data_type::ASCII => {
            let end = payload
                .iter()
                .rposition(|&b| b != 0)
                .map_or(0, |last| last + 1);
            Ok(Data::Ascii(
                String::from_utf8_lossy(&payload[..end]).into_owned(),
            ))
        }
        other => Err(format!("unknown data type 0x{:02X}", other)),
    }
}

/// Read a GDSII library from a stream
///
/// Coordinates are converted to user units.
pub fn read_library<R: Read>(reader: R) -> Result<Library> {
    let mut records = RecordReader::new(reader);
    let mut library = Library::default();
    let mut scale = 1.0;

    loop {
        let Some(rec) = records.next()? else {
            return Err(Error::gds("stream ends before ENDLIB"));
        };
        match rec.kind {
            record::LIBNAME => library.name = rec.ascii("LIBNAME")?,
            record::UNITS => {
                let Data::Real8(units) = &rec.data else {
                    return Err(rec.malformed("UNITS"));
                };
                if units.len() != 2 || units[0] <= 0.0 || units[1] <= 0.0 {
                    return Err(Error::gds_at(rec.offset, "UNITS must hold two positive reals"));
                }
                scale = units[0];
                library.meters_per_unit = units[1] / units[0];
            }
            record::BGNSTR => {
                let cell = read_structure(&mut records, scale)?;
                log::debug!(
                    "read cell '{}': {} polygons, {} paths, {} instances",
                    cell.name,
                    cell.polygons.len(),
                    cell.paths.len(),
                    cell.instances.len()
                );
                library.add_cell(cell)?;
            }
            record::ENDLIB => break,
            _ => {}
        }
    }

    log::info!(
        "read library '{}' with {} cells",
        library.name,
        library.len()
    );
    Ok(library)
}

fn read_structure<R: Read>(records: &mut RecordReader<R>, scale: f64) -> Result<Cell> {
    let mut cell = Cell::default();
    loop {
        let rec = records.expect_next("structure")?;
        match rec.kind {
            record::STRNAME => cell.name = rec.ascii("STRNAME")?,
            record::ENDSTR => break,
            record::BOUNDARY
            | record::BOX
            | record::PATH
            | record::SREF
            | record::AREF
            | record::TEXT
            | record::NODE => {
                let element = read_element(records, rec.kind, rec.offset)?;
                element.add_to(&mut cell, scale)?;
            }
            _ => {}
        }
    }
    if cell.name.is_empty() {
        return Err(Error::gds("structure without STRNAME"));
    }
    Ok(cell)
}

/// Raw fields of one element, collected up to its ENDEL
#[derive(Debug, Default)]
struct Element {
    kind: u8,
    offset: u64,
    layer: i16,
    datatype: i16,
    width: i32,
    pathtype: i16,
    begin_extension: i32,
    end_extension: i32,
    xy: Vec<i32>,
    sname: String,
    strans: u16,
    magnification: Option<f64>,
    angle: Option<f64>,
    colrow: Option<(i16, i16)>,
    properties: Vec<(i16, String)>,
}

fn read_element<R: Read>(records: &mut RecordReader<R>, kind: u8, offset: u64) -> Result<Element> {
    let mut element = Element {
        kind,
        offset,
        ..Default::default()
    };
    let mut pending_attr = None;

    loop {
        let rec = records.expect_next("element")?;
        match rec.kind {
            record::ENDEL => break,
            record::LAYER => element.layer = rec.int16("LAYER")?,
            record::DATATYPE | record::BOXTYPE => element.datatype = rec.int16("DATATYPE")?,
            record::WIDTH => element.width = rec.int32("WIDTH")?,
            record::PATHTYPE => element.pathtype = rec.int16("PATHTYPE")?,
            record::BGNEXTN => element.begin_extension = rec.int32("BGNEXTN")?,
            record::ENDEXTN => element.end_extension = rec.int32("ENDEXTN")?,
            record::SNAME => element.sname = rec.ascii("SNAME")?,
            record::MAG => element.magnification = Some(rec.real8("MAG")?),
            record::ANGLE => element.angle = Some(rec.real8("ANGLE")?),
            record::STRANS => match rec.data {
                Data::BitArray(bits) => element.strans = bits,
                _ => return Err(rec.malformed("STRANS")),
            },
            record::COLROW => match &rec.data {
                Data::Int16(v) if v.len() == 2 => element.colrow = Some((v[0], v[1])),
                _ => return Err(rec.malformed("COLROW")),
            },
            record::XY => match rec.data {
                Data::Int32(v) if v.len() % 2 == 0 => element.xy = v,
                _ => return Err(rec.malformed("XY")),
            },
            record::PROPATTR => pending_attr = Some(rec.int16("PROPATTR")?),
            record::PROPVALUE => {
                if let Some(attr) = pending_attr.take() {
                    element.properties.push((attr, rec.ascii("PROPVALUE")?));
                }
            }
            _ => {}
        }
    }
    Ok(element)
}

impl Element {
    fn points(&self, scale: f64) -> Vec<Point2<f64>> {
        self.xy
            .chunks_exact(2)
            .map(|c| Point2::new(f64::from(c[0]) * scale, f64::from(c[1]) * scale))
            .collect()
    }

    fn layer_key(&self) -> LayerKey {
        LayerKey::new(self.layer, self.datatype)
    }

    fn require_xy(&self, min_points: usize) -> Result<()> {
        if self.xy.len() / 2 < min_points {
            return Err(Error::gds_at(
                self.offset,
                &format!(
                    "element 0x{:02X} needs at least {} XY points, found {}",
                    self.kind,
                    min_points,
                    self.xy.len() / 2
                ),
            ));
        }
        Ok(())
    }

    fn add_to(self, cell: &mut Cell, scale: f64) -> Result<()> {
        match self.kind {
            record::BOUNDARY | record::BOX => {
                self.require_xy(1)?;
                let mut points = self.points(scale);
                if points.len() > 1 && points.first() == points.last() {
                    points.pop();
                }
                if points.len() < 3 {
                    log::debug!(
                        "skipping degenerate boundary with {} points in '{}'",
                        points.len(),
                        cell.name
                    );
                    return Ok(());
                }
                cell.polygons.push(Polygon::new(self.layer_key(), points));
            }
            record::PATH => {
                self.require_xy(1)?;
                let end = PathEnd::from_pathtype(
                    self.pathtype,
                    f64::from(self.begin_extension) * scale,
                    f64::from(self.end_extension) * scale,
                );
                cell.paths.push(Path::new(
                    self.layer_key(),
                    f64::from(self.width) * scale,
                    end,
                    self.points(scale),
                ));
            }
            record::SREF => {
                self.require_xy(1)?;
                let origin = self.points(scale)[0].coords;
                let instance = self.instance(origin, &cell.name);
                cell.instances.push(instance);
            }
            record::AREF => {
                self.require_xy(3)?;
                let (cols, rows) = self
                    .colrow
                    .ok_or_else(|| Error::gds_at(self.offset, "AREF without COLROW"))?;
                if cols <= 0 || rows <= 0 {
                    return Err(Error::gds_at(
                        self.offset,
                        &format!("AREF with {} columns and {} rows", cols, rows),
                    ));
                }
                let count = i64::from(cols) * i64::from(rows);
                if count > MAX_AREF_INSTANCES {
                    return Err(Error::gds_at(
                        self.offset,
                        &format!(
                            "AREF of '{}' expands to {} instances, more than {}",
                            self.sname, count, MAX_AREF_INSTANCES
                        ),
                    ));
                }
                let pts = self.points(scale);
                let col_step = (pts[1] - pts[0]) / f64::from(cols);
                let row_step = (pts[2] - pts[0]) / f64::from(rows);
                for r in 0..rows {
                    for c in 0..cols {
                        let origin =
                            pts[0].coords + col_step * f64::from(c) + row_step * f64::from(r);
                        cell.instances.push(self.instance(origin, &cell.name));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn instance(&self, origin: Vector2<f64>, parent: &str) -> Instance {
        let rotation = match self.angle {
            None => Rotation::None,
            Some(angle) => Rotation::from_degrees(angle).unwrap_or_else(|| {
                log::warn!(
                    "instance of '{}' in '{}' has non-Manhattan angle {}; ignoring rotation",
                    self.sname,
                    parent,
                    angle
                );
                Rotation::None
            }),
        };
        let name = self
            .properties
            .iter()
            .find(|(attr, _)| *attr == INSTANCE_NAME_PROPERTY)
            .map_or(InstanceName::Unresolved, |(_, value)| {
                InstanceName::Named(value.clone())
            });

        Instance {
            cell: self.sname.clone(),
            origin,
            rotation,
            x_reflection: self.strans & STRANS_REFLECTION != 0,
            magnification: self.magnification.unwrap_or(1.0),
            name,
        }
    }
}

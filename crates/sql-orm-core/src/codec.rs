// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! The value codec (C3): marshalling between host values and driver-level
//! values. Deterministic and side-effect free; every failure propagates as
//! an [`OrmError::Conversion`].

use std::io::{Read, Write};

use chrono::NaiveDateTime;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use uuid::Uuid;

use crate::{
    error::{OrmError, OrmResult},
    registry::HostType
};

/// An in-memory pixel bitmap, the domain capability behind the `Image`
/// host type. Concrete platform PNG codecs plug in at [`Bitmap::encode_png`]
/// / [`Bitmap::decode_png`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Packed 8-bit RGBA pixels, `width * height * 4` bytes.
    pub rgba: Vec<u8>
}

impl Bitmap {
    /// Encode to PNG bytes.
    pub fn encode_png(&self) -> OrmResult<Vec<u8>> {
        let mut buf = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buf, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder
                .write_header()
                .map_err(|_| OrmError::conversion("Bitmap", "png"))?;
            writer
                .write_image_data(&self.rgba)
                .map_err(|_| OrmError::conversion("Bitmap", "png"))?;
        }
        Ok(buf)
    }

    /// Decode PNG bytes back into a bitmap.
    pub fn decode_png(bytes: &[u8]) -> OrmResult<Self> {
        let decoder = png::Decoder::new(bytes);
        let mut reader = decoder
            .read_info()
            .map_err(|_| OrmError::conversion("png", "Bitmap"))?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut buf)
            .map_err(|_| OrmError::conversion("png", "Bitmap"))?;
        buf.truncate(info.buffer_size());
        Ok(Self {
            width: info.width,
            height: info.height,
            rgba: buf
        })
    }
}

/// A host or driver-level value. The same type is used on both sides of
/// [`to_db`]/[`from_db`]; the functions narrow or widen the variant set as
/// appropriate for the direction of travel.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Database/host null.
    Null,
    /// 8-bit signed integer.
    I8(i8),
    /// 16-bit signed integer.
    I16(i16),
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// 32-bit floating point.
    F32(f32),
    /// 64-bit floating point.
    F64(f64),
    /// Fixed-point decimal.
    Decimal(rust_decimal::Decimal),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A pixel bitmap.
    Image(Bitmap),
    /// Globally unique identifier; [`Uuid::nil`] means "empty".
    Guid(Uuid),
    /// Date and time.
    DateTime(NaiveDateTime),
    /// The fully-qualified name of a reflected type.
    TypeName(String),
    /// A 32-bit backed enum discriminant.
    Enum(i32),
    /// A non-value serializable object.
    Object(serde_json::Value)
}

impl Value {
    /// The type-appropriate zero/empty default, used by `from_db` when the
    /// driver returns a null for a non-nullable host type.
    pub fn default_for(host_type: HostType) -> Self {
        match host_type {
            HostType::I8 => Value::I8(0),
            HostType::I16 => Value::I16(0),
            HostType::I32 => Value::I32(0),
            HostType::I64 => Value::I64(0),
            HostType::F32 => Value::F32(0.0),
            HostType::F64 => Value::F64(0.0),
            HostType::Decimal => Value::Decimal(rust_decimal::Decimal::ZERO),
            HostType::Bool => Value::Bool(false),
            HostType::String => Value::String(String::new()),
            HostType::Bytes => Value::Bytes(Vec::new()),
            HostType::Image => Value::Bytes(Vec::new()),
            HostType::Guid => Value::Guid(Uuid::nil()),
            HostType::DateTime => Value::DateTime(NaiveDateTime::MIN),
            HostType::TypeName => Value::TypeName(String::new()),
            HostType::Enum => Value::Enum(0),
            HostType::Object => Value::Object(serde_json::Value::Null)
        }
    }
}

/// Strings whose first character is a member of this set are treated as
/// boolean `true` by [`from_db`] when the target host type is `Bool`.
const TRUTHY_PREFIXES: &str = "JjYy1";

/// Marshal a host value into its driver-level representation.
///
/// Rules (spec §4.2):
/// - an empty [`Uuid`] becomes [`Value::Null`];
/// - a [`HostType::TypeName`] value is passed through as a string;
/// - a [`HostType::Image`] value is PNG-encoded into bytes;
/// - a [`HostType::Object`] value is JSON-encoded, optionally gzip-compressed;
/// - byte arrays pass through unchanged;
/// - an enum becomes a 32-bit integer;
/// - everything else is boxed into its native driver representation.
pub fn to_db(value: &Value, host_type: HostType, compress_if_blob: bool) -> OrmResult<Value> {
    match (value, host_type) {
        (Value::Guid(g), HostType::Guid) if g.is_nil() => Ok(Value::Null),
        (Value::Guid(g), HostType::Guid) => Ok(Value::String(g.to_string())),
        (Value::TypeName(name), HostType::TypeName) => Ok(Value::String(name.clone())),
        (Value::Image(bitmap), HostType::Image) => Ok(Value::Bytes(bitmap.encode_png()?)),
        (Value::Object(json), HostType::Object) => {
            let bytes =
                serde_json::to_vec(json).map_err(|_| OrmError::conversion("Object", "json"))?;
            if compress_if_blob {
                Ok(Value::Bytes(gzip_compress(&bytes)?))
            } else {
                Ok(Value::Bytes(bytes))
            }
        }
        (Value::Bytes(b), HostType::Bytes) => Ok(Value::Bytes(b.clone())),
        (Value::Enum(n), HostType::Enum) => Ok(Value::I32(*n)),
        (Value::Null, _) => Ok(Value::Null),
        (other, _) => Ok(other.clone())
    }
}

/// Marshal a driver-level value back into the host representation named by
/// `target_type`.
///
/// Coercions (spec §4.2):
/// - a driver null becomes the type-default (see [`Value::default_for`]);
/// - a string whose first character is in `JjYy1` becomes `true` for a
///   `Bool` target;
/// - bytes decode to a [`Bitmap`] for an `Image` target, or via JSON for
///   any other non-array target;
/// - an out-of-range 64-bit integer into a narrower target is a conversion
///   error.
pub fn from_db(value: &Value, target_type: HostType) -> OrmResult<Value> {
    if matches!(value, Value::Null) {
        return Ok(Value::default_for(target_type));
    }

    match target_type {
        HostType::Guid => match value {
            Value::String(s) => {
                Uuid::parse_str(s)
                    .map(Value::Guid)
                    .map_err(|_| OrmError::conversion("string", "Guid"))
            }
            Value::Guid(g) => Ok(Value::Guid(*g)),
            _ => Err(OrmError::conversion("value", "Guid"))
        },
        HostType::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => {
                let truthy = s
                    .chars()
                    .next()
                    .map(|c| TRUTHY_PREFIXES.contains(c))
                    .unwrap_or(false);
                Ok(Value::Bool(truthy))
            }
            Value::I64(n) => Ok(Value::Bool(*n != 0)),
            _ => Err(OrmError::conversion("value", "Bool"))
        },
        HostType::Image => match value {
            Value::Bytes(bytes) => Ok(Value::Image(Bitmap::decode_png(bytes)?)),
            Value::Image(bmp) => Ok(Value::Image(bmp.clone())),
            _ => Err(OrmError::conversion("value", "Image"))
        },
        HostType::Object => match value {
            Value::Bytes(bytes) => {
                let decompressed = gzip_decompress(bytes).unwrap_or_else(|_| bytes.clone());
                serde_json::from_slice(&decompressed)
                    .map(Value::Object)
                    .map_err(|_| OrmError::conversion("bytes", "Object"))
            }
            Value::Object(v) => Ok(Value::Object(v.clone())),
            _ => Err(OrmError::conversion("value", "Object"))
        },
        HostType::Enum => match value {
            Value::I32(n) => Ok(Value::Enum(*n)),
            Value::I64(n) => Ok(Value::Enum(*n as i32)),
            _ => Err(OrmError::conversion("value", "Enum"))
        },
        HostType::I64 => match value {
            Value::I64(n) => Ok(Value::I64(*n)),
            Value::I32(n) => Ok(Value::I64(*n as i64)),
            Value::Decimal(d) => d
                .to_string()
                .parse::<i64>()
                .map(Value::I64)
                .map_err(|_| OrmError::conversion("Decimal", "i64 (overflow)")),
            _ => Err(OrmError::conversion("value", "i64"))
        },
        HostType::TypeName => match value {
            Value::String(s) => Ok(Value::TypeName(s.clone())),
            _ => Err(OrmError::conversion("value", "TypeName"))
        },
        _ => Ok(value.clone())
    }
}

fn gzip_compress(bytes: &[u8]) -> OrmResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|_| OrmError::conversion("bytes", "gzip"))?;
    encoder
        .finish()
        .map_err(|_| OrmError::conversion("bytes", "gzip"))
}

fn gzip_decompress(bytes: &[u8]) -> OrmResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|_| OrmError::conversion("gzip", "bytes"))?;
    Ok(out)
}

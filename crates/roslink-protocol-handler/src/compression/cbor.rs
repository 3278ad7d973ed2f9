//! CBOR frames (`cbor` and `cbor-raw` compression) and RFC 8746 typed arrays.

use super::{CompressedPayload, Decompressor, failure};
use ciborium::Value as Cbor;
use roslink_core::error::ProtocolError;
use serde_json::{Map, Number, Value};

#[derive(Debug, Default, Clone, Copy)]
pub struct CborDecompressor;

impl Decompressor for CborDecompressor {
    fn name(&self) -> &str {
        "cbor"
    }

    fn decompress(&self, payload: CompressedPayload) -> Result<Value, ProtocolError> {
        let bytes = match payload {
            CompressedPayload::Binary(bytes) => bytes,
            CompressedPayload::Text(text) => text.into_bytes(),
        };
        let value: Cbor = ciborium::de::from_reader(bytes.as_slice()).map_err(|e| failure("cbor", e))?;
        Ok(to_json(value))
    }

    fn is_blocking(&self) -> bool {
        false
    }
}

/// A decoded typed array. 64-bit integer arrays are widened into `Float64`
/// and lose precision beyond 2^53.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    Uint8(Vec<u8>),
    Uint16(Vec<u16>),
    Uint32(Vec<u32>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl TypedArray {
    pub fn len(&self) -> usize {
        match self {
            TypedArray::Uint8(v) => v.len(),
            TypedArray::Uint16(v) => v.len(),
            TypedArray::Uint32(v) => v.len(),
            TypedArray::Int8(v) => v.len(),
            TypedArray::Int16(v) => v.len(),
            TypedArray::Int32(v) => v.len(),
            TypedArray::Float32(v) => v.len(),
            TypedArray::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_json(self) -> Value {
        fn ints<T: Into<i64>>(values: Vec<T>) -> Value {
            Value::Array(values.into_iter().map(|v| Value::from(v.into())).collect())
        }
        fn floats<T: Into<f64>>(values: Vec<T>) -> Value {
            Value::Array(values.into_iter().map(|v| float(v.into())).collect())
        }
        match self {
            TypedArray::Uint8(v) => ints(v),
            TypedArray::Uint16(v) => ints(v),
            TypedArray::Uint32(v) => ints(v),
            TypedArray::Int8(v) => ints(v),
            TypedArray::Int16(v) => ints(v),
            TypedArray::Int32(v) => ints(v),
            TypedArray::Float32(v) => floats(v),
            TypedArray::Float64(v) => floats(v),
        }
    }
}

macro_rules! le_array {
    ($bytes:expr, $ty:ty) => {
        $bytes
            .chunks_exact(std::mem::size_of::<$ty>())
            .map(|chunk| {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(chunk);
                <$ty>::from_le_bytes(raw)
            })
            .collect::<Vec<$ty>>()
    };
}

/// Reconstructs the little-endian typed array carried by `tag`, or `None`
/// for tags that are not typed arrays. Trailing bytes that do not fill a
/// whole element are ignored.
pub fn resolve_typed_array(tag: u64, bytes: &[u8]) -> Option<TypedArray> {
    Some(match tag {
        64 | 68 => TypedArray::Uint8(bytes.to_vec()),
        69 => TypedArray::Uint16(le_array!(bytes, u16)),
        70 => TypedArray::Uint32(le_array!(bytes, u32)),
        71 => TypedArray::Float64(le_array!(bytes, u64).into_iter().map(|v| v as f64).collect()),
        72 => TypedArray::Int8(bytes.iter().map(|b| *b as i8).collect()),
        77 => TypedArray::Int16(le_array!(bytes, i16)),
        78 => TypedArray::Int32(le_array!(bytes, i32)),
        79 => TypedArray::Float64(le_array!(bytes, i64).into_iter().map(|v| v as f64).collect()),
        85 => TypedArray::Float32(le_array!(bytes, f32)),
        86 => TypedArray::Float64(le_array!(bytes, f64)),
        _ => return None,
    })
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn to_json(value: Cbor) -> Value {
    match value {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(i) => {
            let i = i128::from(i);
            if let Ok(v) = i64::try_from(i) {
                Value::from(v)
            } else if let Ok(v) = u64::try_from(i) {
                Value::from(v)
            } else {
                float(i as f64)
            }
        }
        Cbor::Float(f) => float(f),
        Cbor::Text(s) => Value::String(s),
        Cbor::Bytes(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
        Cbor::Array(items) => Value::Array(items.into_iter().map(to_json).collect()),
        Cbor::Map(entries) => {
            let mut fields = Map::with_capacity(entries.len());
            for (key, value) in entries {
                let key = match key {
                    Cbor::Text(s) => s,
                    other => to_json(other).to_string(),
                };
                fields.insert(key, to_json(value));
            }
            Value::Object(fields)
        }
        Cbor::Tag(tag, inner) => match *inner {
            Cbor::Bytes(bytes) => match resolve_typed_array(tag, &bytes) {
                Some(array) => array.into_json(),
                None => to_json(Cbor::Bytes(bytes)),
            },
            other => to_json(other),
        },
        _ => Value::Null,
    }
}

//! Query argument encoding.
//!
//! Arguments are encoded to the wire as text, except raw byte payloads which
//! pass through in binary format. Arrays use the textual array grammar with
//! `NULL` elements and quoted, escaped scalars; byte elements inside arrays
//! use the `\x`-hex bytea form.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

use crate::error::{Error, Result};
use crate::protocol::frontend::query::EncodedArg;

use super::bytea::encode_bytea;

/// A query argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// SQL NULL
    Null,
    /// bool
    Bool(bool),
    /// int2
    Int2(i16),
    /// int4
    Int4(i32),
    /// int8
    Int8(i64),
    /// float4
    Float4(f32),
    /// float8
    Float8(f64),
    /// Any textual value
    Text(String),
    /// Raw bytes, passed through in binary format (hex-encoded inside arrays)
    Bytes(Vec<u8>),
    /// A point in time with an offset; encoded as ISO-8601
    Timestamp(DateTime<FixedOffset>),
    /// A JSON document, encoded as its serialization
    Json(serde_json::Value),
    /// An array of arguments, encoded in the textual array grammar
    Array(Vec<Param>),
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl From<i16> for Param {
    fn from(v: i16) -> Self {
        Param::Int2(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Param::Int4(v)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int8(v)
    }
}

impl From<f32> for Param {
    fn from(v: f32) -> Self {
        Param::Float4(v)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Float8(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<Vec<u8>> for Param {
    fn from(v: Vec<u8>) -> Self {
        Param::Bytes(v)
    }
}

impl From<&[u8]> for Param {
    fn from(v: &[u8]) -> Self {
        Param::Bytes(v.to_vec())
    }
}

impl From<DateTime<FixedOffset>> for Param {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Param::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(v: DateTime<Utc>) -> Self {
        Param::Timestamp(v.fixed_offset())
    }
}

impl From<serde_json::Value> for Param {
    fn from(v: serde_json::Value) -> Self {
        Param::Json(v)
    }
}

impl From<Vec<Param>> for Param {
    fn from(v: Vec<Param>) -> Self {
        Param::Array(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Param::Null,
        }
    }
}

/// Encode one argument for the Bind message.
pub(crate) fn encode_param(param: &Param) -> Result<EncodedArg> {
    match param {
        Param::Null => Ok(EncodedArg::Null),
        Param::Bytes(bytes) => Ok(EncodedArg::Binary(bytes.clone())),
        other => encode_text(other).map(EncodedArg::Text),
    }
}

/// The lexical form of an argument, as used for text-format values and for
/// array elements.
fn encode_text(param: &Param) -> Result<String> {
    match param {
        Param::Null => Ok("NULL".to_string()),
        Param::Bool(v) => Ok(v.to_string()),
        Param::Int2(v) => Ok(v.to_string()),
        Param::Int4(v) => Ok(v.to_string()),
        Param::Int8(v) => Ok(v.to_string()),
        Param::Float4(v) => Ok(v.to_string()),
        Param::Float8(v) => Ok(v.to_string()),
        Param::Text(v) => Ok(v.clone()),
        Param::Bytes(v) => Ok(encode_bytea(v)),
        Param::Timestamp(v) => Ok(v.to_rfc3339_opts(SecondsFormat::Millis, false)),
        Param::Json(v) => {
            serde_json::to_string(v).map_err(|e| Error::Encode(format!("Invalid JSON argument: {e}")))
        }
        Param::Array(items) => encode_array(items),
    }
}

fn encode_array(items: &[Param]) -> Result<String> {
    let mut out = String::from("{");
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        match item {
            Param::Null => out.push_str("NULL"),
            Param::Array(nested) => out.push_str(&encode_array(nested)?),
            scalar => {
                let encoded = encode_text(scalar)?;
                out.push('"');
                for ch in encoded.chars() {
                    if ch == '\\' || ch == '"' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push('"');
            }
        }
    }
    out.push('}');
    Ok(out)
}

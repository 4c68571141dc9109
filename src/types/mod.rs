//! Typed value decoding and argument encoding.
//!
//! Result columns arrive in text format and are decoded by OID into [`Value`];
//! query arguments are encoded from [`Param`] into the wire representation.

mod array;
mod bytea;
mod encode;
mod geometric;
mod temporal;

pub use bytea::{decode_bytea, encode_bytea};
pub use encode::Param;
pub(crate) use encode::encode_param;
pub use geometric::{Circle, Line, LineSegment, Path, PgBox, Point, Polygon, Tid};
pub use temporal::{PgDate, PgTimestamp};

use crate::error::{Error, Result};
use crate::protocol::backend::Column;
use crate::protocol::types::{oid, FormatCode, Oid};

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
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
    /// Any textual, identifier, network, numeric, uuid or registered-object
    /// type, kept in its lexical form
    Text(String),
    /// bytea, or any column delivered in binary format
    Bytes(Vec<u8>),
    /// date
    Date(PgDate),
    /// timestamp / timestamptz
    Timestamp(PgTimestamp),
    /// json / jsonb
    Json(serde_json::Value),
    /// point
    Point(Point),
    /// line
    Line(Line),
    /// lseg
    LineSegment(LineSegment),
    /// box
    Box(PgBox),
    /// path
    Path(Path),
    /// polygon
    Polygon(Polygon),
    /// circle
    Circle(Circle),
    /// tid
    Tid(Tid),
    /// Any array type, elements decoded recursively
    Array(Vec<Value>),
}

impl Value {
    /// Check if the value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The value as a string slice, for textual values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an i64, for any integer width.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int2(v) => Some(*v as i64),
            Value::Int4(v) => Some(*v as i64),
            Value::Int8(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as an f64, for either float width.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float4(v) => Some(*v as f64),
            Value::Float8(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The value as an array slice.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }
}

/// Decode one column payload into a [`Value`].
///
/// Binary-format columns pass through as raw bytes: the engine always
/// requests text results, so binary shows up only where the server echoes a
/// raw byte argument.
pub fn decode(raw: &[u8], column: &Column) -> Result<Value> {
    match column.format {
        FormatCode::Binary => Ok(Value::Bytes(raw.to_vec())),
        FormatCode::Text => decode_text(raw, column.type_oid),
    }
}

fn decode_text(raw: &[u8], type_oid: Oid) -> Result<Value> {
    let text = simdutf8::basic::from_utf8(raw)
        .map_err(|_| Error::Decode(format!("Column payload is not UTF-8 (OID {})", type_oid)))?;

    if let Some((element_oid, separator)) = array_element(type_oid) {
        let values = array::parse_array(text, separator, &|entry| {
            decode_scalar(entry, element_oid)
        })?;
        return Ok(Value::Array(values));
    }
    decode_scalar(text, type_oid)
}

/// Decode a scalar text payload by its type OID.
fn decode_scalar(text: &str, type_oid: Oid) -> Result<Value> {
    match type_oid {
        oid::BOOL => Ok(Value::Bool(decode_bool(text))),
        oid::INT2 => parse_number(text, "int2").map(Value::Int2),
        oid::INT4 => parse_number(text, "int4").map(Value::Int4),
        oid::INT8 => parse_number(text, "int8").map(Value::Int8),
        oid::FLOAT4 => parse_number(text, "float4").map(Value::Float4),
        oid::FLOAT8 => parse_number(text, "float8").map(Value::Float8),
        oid::BYTEA => decode_bytea(text).map(Value::Bytes),
        oid::DATE => temporal::decode_date(text).map(Value::Date),
        oid::TIMESTAMP | oid::TIMESTAMPTZ => {
            temporal::decode_timestamp(text).map(Value::Timestamp)
        }
        oid::JSON | oid::JSONB => serde_json::from_str(text)
            .map(Value::Json)
            .map_err(|e| Error::Decode(format!("Invalid JSON payload: {e}"))),
        oid::POINT => geometric::decode_point(text).map(Value::Point),
        oid::LINE => geometric::decode_line(text).map(Value::Line),
        oid::LSEG => geometric::decode_lseg(text).map(Value::LineSegment),
        oid::BOX => geometric::decode_box(text).map(Value::Box),
        oid::PATH => geometric::decode_path(text).map(Value::Path),
        oid::POLYGON => geometric::decode_polygon(text).map(Value::Polygon),
        oid::CIRCLE => geometric::decode_circle(text).map(Value::Circle),
        oid::TID => geometric::decode_tid(text).map(Value::Tid),
        // Lexical pass-through: textual, identifier, network and
        // registered-object types, numeric, uuid, void, time of day
        oid::CHAR
        | oid::NAME
        | oid::TEXT
        | oid::BPCHAR
        | oid::VARCHAR
        | oid::CIDR
        | oid::INET
        | oid::MACADDR
        | oid::REGPROC
        | oid::REGCLASS
        | oid::REGTYPE
        | oid::OID
        | oid::XID
        | oid::CID
        | oid::NUMERIC
        | oid::UUID
        | oid::VOID
        | oid::TIME
        | oid::TIMETZ
        | oid::UNKNOWN => Ok(Value::Text(text.to_string())),
        _ => Err(Error::Decode(format!(
            "Don't know how to parse column type: {}",
            type_oid
        ))),
    }
}

fn decode_bool(text: &str) -> bool {
    matches!(
        text.as_bytes().first(),
        Some(b't' | b'T' | b'y' | b'Y' | b'1')
    ) || text.eq_ignore_ascii_case("on")
}

fn parse_number<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    text.parse()
        .map_err(|_| Error::Decode(format!("Invalid {what}: \"{text}\"")))
}

/// Element OID and separator for an array type OID.
fn array_element(type_oid: Oid) -> Option<(Oid, u8)> {
    let element = match type_oid {
        oid::BOOL_ARRAY => oid::BOOL,
        oid::BYTEA_ARRAY => oid::BYTEA,
        oid::CHAR_ARRAY => oid::CHAR,
        oid::NAME_ARRAY => oid::NAME,
        oid::INT2_ARRAY => oid::INT2,
        oid::INT4_ARRAY => oid::INT4,
        oid::INT8_ARRAY => oid::INT8,
        oid::REGPROC_ARRAY => oid::REGPROC,
        oid::TEXT_ARRAY => oid::TEXT,
        oid::TID_ARRAY => oid::TID,
        oid::XID_ARRAY => oid::XID,
        oid::CID_ARRAY => oid::CID,
        oid::BPCHAR_ARRAY => oid::BPCHAR,
        oid::VARCHAR_ARRAY => oid::VARCHAR,
        oid::POINT_ARRAY => oid::POINT,
        oid::LSEG_ARRAY => oid::LSEG,
        oid::PATH_ARRAY => oid::PATH,
        oid::FLOAT4_ARRAY => oid::FLOAT4,
        oid::FLOAT8_ARRAY => oid::FLOAT8,
        oid::POLYGON_ARRAY => oid::POLYGON,
        oid::OID_ARRAY => oid::OID,
        oid::MACADDR_ARRAY => oid::MACADDR,
        oid::INET_ARRAY => oid::INET,
        oid::CIDR_ARRAY => oid::CIDR,
        oid::JSON_ARRAY => oid::JSON,
        oid::JSONB_ARRAY => oid::JSONB,
        oid::TIMESTAMP_ARRAY => oid::TIMESTAMP,
        oid::TIMESTAMPTZ_ARRAY => oid::TIMESTAMPTZ,
        oid::DATE_ARRAY => oid::DATE,
        oid::TIME_ARRAY => oid::TIME,
        oid::TIMETZ_ARRAY => oid::TIMETZ,
        oid::NUMERIC_ARRAY => oid::NUMERIC,
        oid::LINE_ARRAY => oid::LINE,
        oid::CIRCLE_ARRAY => oid::CIRCLE,
        oid::REGCLASS_ARRAY => oid::REGCLASS,
        oid::REGTYPE_ARRAY => oid::REGTYPE,
        oid::UUID_ARRAY => oid::UUID,
        // Box text form uses ',' between its corner points, so box arrays
        // separate elements with ';'
        oid::BOX_ARRAY => return Some((oid::BOX, b';')),
        _ => return None,
    };
    Some((element, b','))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_column(type_oid: Oid) -> Column {
        Column {
            name: "c".into(),
            table_oid: 0,
            column_id: 0,
            type_oid,
            type_size: -1,
            type_modifier: -1,
            format: FormatCode::Text,
        }
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(
            decode(b"t", &text_column(oid::BOOL)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            decode(b"off", &text_column(oid::BOOL)).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            decode(b"-12", &text_column(oid::INT2)).unwrap(),
            Value::Int2(-12)
        );
        assert_eq!(
            decode(b"7000000000", &text_column(oid::INT8)).unwrap(),
            Value::Int8(7_000_000_000)
        );
        assert_eq!(
            decode(b"1.5", &text_column(oid::FLOAT8)).unwrap(),
            Value::Float8(1.5)
        );
        assert_eq!(
            decode(b"abc", &text_column(oid::TEXT)).unwrap(),
            Value::Text("abc".into())
        );
        assert_eq!(
            decode(b"12.30", &text_column(oid::NUMERIC)).unwrap(),
            Value::Text("12.30".into())
        );
    }

    #[test]
    fn test_decode_int4_array_with_null() {
        let value = decode(b"{1,2,NULL,4}", &text_column(oid::INT4_ARRAY)).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Int4(1),
                Value::Int4(2),
                Value::Null,
                Value::Int4(4),
            ])
        );
    }

    #[test]
    fn test_decode_text_array_quoting() {
        let value = decode(br#"{"a,b","\"c\""}"#, &text_column(oid::TEXT_ARRAY)).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Text("a,b".into()),
                Value::Text("\"c\"".into()),
            ])
        );
    }

    #[test]
    fn test_decode_json() {
        let value = decode(br#"{"a": [1, 2]}"#, &text_column(oid::JSONB)).unwrap();
        assert_eq!(
            value,
            Value::Json(serde_json::json!({ "a": [1, 2] }))
        );
    }

    #[test]
    fn test_decode_unknown_oid() {
        let err = decode(b"x", &text_column(999_999)).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(err
            .to_string()
            .contains("Don't know how to parse column type: 999999"));
    }

    #[test]
    fn test_binary_format_passthrough() {
        let mut column = text_column(oid::INT4);
        column.format = FormatCode::Binary;
        assert_eq!(
            decode(&[0, 0, 0, 1], &column).unwrap(),
            Value::Bytes(vec![0, 0, 0, 1])
        );
    }

    #[test]
    fn test_box_array_separator() {
        let value = decode(
            b"{(2,2),(0,0);(4,4),(2,2)}",
            &text_column(oid::BOX_ARRAY),
        )
        .unwrap();
        let boxes = value.as_array().unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(
            boxes[0],
            Value::Box(PgBox {
                a: Point { x: 2.0, y: 2.0 },
                b: Point { x: 0.0, y: 0.0 },
            })
        );
    }
}

//! Error and notice response parsing.

use crate::error::{Notice, Result};
use crate::protocol::codec::PacketReader;

/// Error and notice field type codes from the wire protocol.
pub mod field_type {
    /// Severity
    pub const SEVERITY: u8 = b'S';
    /// SQLSTATE code
    pub const CODE: u8 = b'C';
    /// Message
    pub const MESSAGE: u8 = b'M';
    /// Detail
    pub const DETAIL: u8 = b'D';
    /// Hint
    pub const HINT: u8 = b'H';
    /// Position in query
    pub const POSITION: u8 = b'P';
    /// Internal position
    pub const INTERNAL_POSITION: u8 = b'p';
    /// Internal query
    pub const INTERNAL_QUERY: u8 = b'q';
    /// Where (context)
    pub const WHERE: u8 = b'W';
    /// Schema name
    pub const SCHEMA: u8 = b's';
    /// Table name
    pub const TABLE: u8 = b't';
    /// Column name
    pub const COLUMN: u8 = b'c';
    /// Data type name
    pub const DATA_TYPE: u8 = b'd';
    /// Constraint name
    pub const CONSTRAINT: u8 = b'n';
    /// File name
    pub const FILE: u8 = b'F';
    /// Line number
    pub const LINE: u8 = b'L';
    /// Routine name
    pub const ROUTINE: u8 = b'R';
}

/// Parse the fields of an ErrorResponse or NoticeResponse payload.
///
/// The payload is a sequence of `[code:1][value:cstr]` pairs ended by a zero
/// byte. Codes that are not recognized are ignored.
pub fn parse_notice_fields(payload: &[u8]) -> Result<Notice> {
    let mut reader = PacketReader::new(payload);
    let mut fields = Notice::default();

    loop {
        let code = reader.read_u8()?;
        if code == 0 {
            break;
        }
        let value = reader.read_cstr()?;

        match code {
            field_type::SEVERITY => fields.severity = Some(value.to_string()),
            field_type::CODE => fields.code = Some(value.to_string()),
            field_type::MESSAGE => fields.message = Some(value.to_string()),
            field_type::DETAIL => fields.detail = Some(value.to_string()),
            field_type::HINT => fields.hint = Some(value.to_string()),
            field_type::POSITION => fields.position = value.parse().ok(),
            field_type::INTERNAL_POSITION => fields.internal_position = value.parse().ok(),
            field_type::INTERNAL_QUERY => fields.internal_query = Some(value.to_string()),
            field_type::WHERE => fields.where_ = Some(value.to_string()),
            field_type::SCHEMA => fields.schema = Some(value.to_string()),
            field_type::TABLE => fields.table = Some(value.to_string()),
            field_type::COLUMN => fields.column = Some(value.to_string()),
            field_type::DATA_TYPE => fields.data_type = Some(value.to_string()),
            field_type::CONSTRAINT => fields.constraint = Some(value.to_string()),
            field_type::FILE => fields.file = Some(value.to_string()),
            field_type::LINE => fields.line = value.parse().ok(),
            field_type::ROUTINE => fields.routine = Some(value.to_string()),
            _ => {
                tracing::debug!("Ignoring unknown error field code: {}", code as char);
            }
        }
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_fields() {
        let payload = b"SERROR\0C42P01\0Mrelation \"users\" does not exist\0P15\0\0";
        let fields = parse_notice_fields(payload).unwrap();

        assert_eq!(fields.severity.as_deref(), Some("ERROR"));
        assert_eq!(fields.code.as_deref(), Some("42P01"));
        assert_eq!(
            fields.message.as_deref(),
            Some("relation \"users\" does not exist")
        );
        assert_eq!(fields.position, Some(15));
        assert_eq!(fields.detail, None);
    }

    #[test]
    fn test_unknown_codes_are_ignored_silently() {
        let payload = b"SNOTICE\0Vok\0Mhello\0\0";
        let fields = parse_notice_fields(payload).unwrap();
        assert_eq!(fields.severity.as_deref(), Some("NOTICE"));
        assert_eq!(fields.message.as_deref(), Some("hello"));
    }

    #[test]
    fn test_truncated_payload() {
        assert!(parse_notice_fields(b"SERROR").is_err());
    }
}

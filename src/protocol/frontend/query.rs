//! Simple and extended query protocol messages.

use crate::protocol::codec::PacketWriter;
use crate::protocol::types::FormatCode;

/// A query argument already encoded for the wire.
///
/// Text arguments are sent in text format; binary arguments are raw byte
/// payloads passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedArg {
    /// SQL NULL, sent with length -1.
    Null,
    /// Text-format value.
    Text(String),
    /// Raw binary payload.
    Binary(Vec<u8>),
}

/// Write a Query message (simple query protocol).
///
/// The query string may contain multiple SQL statements separated by
/// semicolons.
pub fn write_query(writer: &mut PacketWriter, query: &str) -> Vec<u8> {
    writer.add_cstr(query);
    writer.flush(Some(super::msg_type::QUERY))
}

/// Write a Parse message for the unnamed (or a named) prepared statement.
///
/// No parameter type OIDs are declared; the server infers them.
pub fn write_parse(writer: &mut PacketWriter, statement: &str, query: &str) -> Vec<u8> {
    writer.add_cstr(statement);
    writer.add_cstr(query);
    writer.add_i16(0);
    writer.flush(Some(super::msg_type::PARSE))
}

/// Write a Bind message creating a portal from a prepared statement.
///
/// When at least one argument is binary a per-argument format-code vector is
/// emitted (1 for binary, 0 for text); otherwise a single zero-length vector
/// declares all arguments as text. Results are always requested in text
/// format.
pub fn write_bind(
    writer: &mut PacketWriter,
    portal: &str,
    statement: &str,
    args: &[EncodedArg],
) -> Vec<u8> {
    writer.add_cstr(portal);
    writer.add_cstr(statement);

    let has_binary = args.iter().any(|arg| matches!(arg, EncodedArg::Binary(_)));
    if has_binary {
        writer.add_i16(args.len() as i16);
        for arg in args {
            let format = match arg {
                EncodedArg::Binary(_) => FormatCode::Binary,
                _ => FormatCode::Text,
            };
            writer.add_i16(format as i16);
        }
    } else {
        writer.add_i16(0);
    }

    writer.add_i16(args.len() as i16);
    for arg in args {
        match arg {
            EncodedArg::Null => writer.add_i32(-1),
            EncodedArg::Text(text) => {
                writer.add_i32(text.len() as i32);
                writer.add_str(text);
            }
            EncodedArg::Binary(bytes) => {
                writer.add_i32(bytes.len() as i32);
                writer.add_bytes(bytes);
            }
        }
    }

    // Result format codes: a single zero-length vector, all text
    writer.add_i16(0);
    writer.flush(Some(super::msg_type::BIND))
}

/// Write a Describe message for a portal.
pub fn write_describe_portal(writer: &mut PacketWriter, portal: &str) -> Vec<u8> {
    writer.add_u8(b'P');
    writer.add_cstr(portal);
    writer.flush(Some(super::msg_type::DESCRIBE))
}

/// Write an Execute message running a portal.
///
/// `max_rows` of 0 means unlimited.
pub fn write_execute(writer: &mut PacketWriter, portal: &str, max_rows: i32) -> Vec<u8> {
    writer.add_cstr(portal);
    writer.add_i32(max_rows);
    writer.flush(Some(super::msg_type::EXECUTE))
}

/// Write a Sync message, ending an extended query sequence.
///
/// The server answers the whole sequence and finishes with ReadyForQuery.
pub fn write_sync(writer: &mut PacketWriter) -> Vec<u8> {
    writer.flush(Some(super::msg_type::SYNC))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query() {
        let mut writer = PacketWriter::new();
        let packet = write_query(&mut writer, "SELECT 1");

        assert_eq!(packet[0], b'Q');
        let len = i32::from_be_bytes([packet[1], packet[2], packet[3], packet[4]]);
        assert_eq!(len, 13);
        assert_eq!(&packet[5..14], b"SELECT 1\0");
    }

    #[test]
    fn test_parse_no_param_oids() {
        let mut writer = PacketWriter::new();
        let packet = write_parse(&mut writer, "", "SELECT $1");

        assert_eq!(packet[0], b'P');
        // empty statement name, query, then int16(0)
        assert_eq!(&packet[5..], b"\0SELECT $1\0\x00\x00");
    }

    #[test]
    fn test_bind_all_text() {
        let mut writer = PacketWriter::new();
        let args = vec![EncodedArg::Text("42".into()), EncodedArg::Null];
        let packet = write_bind(&mut writer, "", "", &args);

        assert_eq!(packet[0], b'B');
        let body = &packet[5..];
        // portal "", statement "", then a zero-length format vector
        assert_eq!(&body[..2], b"\0\0");
        assert_eq!(&body[2..4], &0_i16.to_be_bytes());
        // arg count 2
        assert_eq!(&body[4..6], &2_i16.to_be_bytes());
        // "42" with length 2
        assert_eq!(&body[6..10], &2_i32.to_be_bytes());
        assert_eq!(&body[10..12], b"42");
        // NULL sentinel
        assert_eq!(&body[12..16], &(-1_i32).to_be_bytes());
        // result formats: zero-length vector
        assert_eq!(&body[16..18], &0_i16.to_be_bytes());
        assert_eq!(body.len(), 18);
    }

    #[test]
    fn test_bind_mixed_formats() {
        let mut writer = PacketWriter::new();
        let args = vec![
            EncodedArg::Text("x".into()),
            EncodedArg::Binary(vec![1, 2, 3]),
        ];
        let packet = write_bind(&mut writer, "", "", &args);

        let body = &packet[5..];
        // per-arg format vector: count 2, then 0 (text), 1 (binary)
        assert_eq!(&body[2..4], &2_i16.to_be_bytes());
        assert_eq!(&body[4..6], &0_i16.to_be_bytes());
        assert_eq!(&body[6..8], &1_i16.to_be_bytes());
    }

    #[test]
    fn test_execute_unlimited() {
        let mut writer = PacketWriter::new();
        let packet = write_execute(&mut writer, "", 0);

        assert_eq!(packet[0], b'E');
        let len = i32::from_be_bytes([packet[1], packet[2], packet[3], packet[4]]);
        assert_eq!(len, 9);
    }

    #[test]
    fn test_describe_portal() {
        let mut writer = PacketWriter::new();
        let packet = write_describe_portal(&mut writer, "");

        assert_eq!(packet[0], b'D');
        assert_eq!(&packet[5..], b"P\0");
    }

    #[test]
    fn test_sync() {
        let mut writer = PacketWriter::new();
        let packet = write_sync(&mut writer);
        assert_eq!(packet, vec![b'S', 0, 0, 0, 4]);
    }
}

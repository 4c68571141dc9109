//! Startup and termination messages.

use crate::protocol::codec::PacketWriter;

/// Protocol version 3.0 (0x00030000)
pub const PROTOCOL_VERSION_3_0: i32 = 196608;

/// SSL request code
pub const SSL_REQUEST_CODE: i32 = 80877103;

/// Write an SSLRequest message.
///
/// Sent before StartupMessage to request TLS encryption. The server responds
/// with a single byte: 'S' (accepted) or 'N' (rejected).
pub fn write_ssl_request(writer: &mut PacketWriter) -> Vec<u8> {
    writer.add_i32(SSL_REQUEST_CODE);
    writer.flush(None)
}

/// Write a StartupMessage.
///
/// Parameters is a list of (name, value) pairs. Required: "user". Optional:
/// "database", "application_name", "client_encoding", backend options.
pub fn write_startup(writer: &mut PacketWriter, params: &[(&str, &str)]) -> Vec<u8> {
    writer.add_i32(PROTOCOL_VERSION_3_0);
    for (name, value) in params {
        writer.add_cstr(name);
        writer.add_cstr(value);
    }
    // Terminator
    writer.add_u8(0);
    writer.flush(None)
}

/// Write a Terminate message, sent to cleanly close the connection.
pub fn write_terminate(writer: &mut PacketWriter) -> Vec<u8> {
    writer.flush(Some(super::msg_type::TERMINATE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_request() {
        let mut writer = PacketWriter::new();
        let packet = write_ssl_request(&mut writer);

        assert_eq!(packet.len(), 8);
        assert_eq!(&packet[0..4], &8_i32.to_be_bytes());
        assert_eq!(&packet[4..8], &SSL_REQUEST_CODE.to_be_bytes());
    }

    #[test]
    fn test_startup() {
        let mut writer = PacketWriter::new();
        let packet = write_startup(&mut writer, &[("user", "postgres"), ("database", "test")]);

        let len = i32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]);
        assert_eq!(len as usize, packet.len());

        let version = i32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
        assert_eq!(version, PROTOCOL_VERSION_3_0);

        assert_eq!(&packet[8..], b"user\0postgres\0database\0test\0\0");
    }

    #[test]
    fn test_terminate() {
        let mut writer = PacketWriter::new();
        let packet = write_terminate(&mut writer);

        assert_eq!(packet, vec![b'X', 0, 0, 0, 4]);
    }
}

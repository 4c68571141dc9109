//! Framed packet encoding and decoding primitives.
//!
//! PostgreSQL uses big-endian (network byte order) for all integers. Messages
//! are framed as `[tag:1][length:4][payload]` where the length includes its
//! own four bytes but not the tag.

use zerocopy::FromBytes;

use crate::error::{Error, Result};

use super::types::{I16BE, I32BE};

/// Accumulates the payload of an outgoing message and frames it on flush.
///
/// One writer is kept per connection and its backing buffer is reused across
/// sends.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payload bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if no payload bytes are accumulated.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discard any accumulated payload.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append a 2-byte big-endian signed integer.
    pub fn add_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a 4-byte big-endian signed integer.
    pub fn add_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a single byte.
    pub fn add_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Append raw bytes.
    pub fn add_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Append a UTF-8 string without a terminator.
    pub fn add_str(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Append a null-terminated UTF-8 string (PostgreSQL String type).
    pub fn add_cstr(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Produce the framed message and clear the payload buffer.
    ///
    /// The frame is the optional 1-byte tag, the 4-byte big-endian length
    /// (payload length + 4), then the payload.
    pub fn flush(&mut self, tag: Option<u8>) -> Vec<u8> {
        let mut packet = Vec::with_capacity(self.buf.len() + 5);
        if let Some(tag) = tag {
            packet.push(tag);
        }
        packet.extend_from_slice(&((self.buf.len() as i32 + 4).to_be_bytes()));
        packet.extend_from_slice(&self.buf);
        self.buf.clear();
        packet
    }
}

/// Cursor over the payload of one received message.
///
/// Readers borrow the connection's read buffer; parsed values must be copied
/// out before the next message is read.
#[derive(Debug, Clone, Copy)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Wrap a message payload.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Protocol(format!(
                "{}: buffer too short: {} < {}",
                what,
                self.remaining(),
                n
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "read_u8")?[0])
    }

    /// Read a 2-byte big-endian signed integer.
    pub fn read_i16(&mut self) -> Result<i16> {
        let bytes = self.take(2, "read_i16")?;
        let value = I16BE::ref_from_bytes(bytes)
            .map_err(|e| Error::Protocol(format!("read_i16: {e:?}")))?
            .get();
        Ok(value)
    }

    /// Read a 4-byte big-endian signed integer.
    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4, "read_i32")?;
        let value = I32BE::ref_from_bytes(bytes)
            .map_err(|e| Error::Protocol(format!("read_i32: {e:?}")))?
            .get();
        Ok(value)
    }

    /// Read a raw sub-slice of `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n, "read_bytes")
    }

    /// Read a fixed-length UTF-8 string.
    pub fn read_string(&mut self, n: usize) -> Result<&'a str> {
        let bytes = self.take(n, "read_string")?;
        std::str::from_utf8(bytes)
            .map_err(|e| Error::Protocol(format!("read_string: invalid UTF-8: {e}")))
    }

    /// Read a null-terminated UTF-8 string (PostgreSQL String type).
    pub fn read_cstr(&mut self) -> Result<&'a str> {
        let rest = &self.buf[self.pos..];
        match memchr::memchr(0, rest) {
            Some(end) => {
                self.pos += end + 1;
                std::str::from_utf8(&rest[..end])
                    .map_err(|e| Error::Protocol(format!("read_cstr: invalid UTF-8: {e}")))
            }
            None => Err(Error::Protocol(
                "read_cstr: no null terminator found".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_round_trip() {
        let mut writer = PacketWriter::new();
        writer.add_i32(42);
        writer.add_i16(-7);
        writer.add_cstr("hello");
        writer.add_bytes(&[0xde, 0xad]);
        let packet = writer.flush(Some(b'Q'));

        assert_eq!(packet[0], b'Q');
        let len = i32::from_be_bytes([packet[1], packet[2], packet[3], packet[4]]);
        assert_eq!(len as usize, packet.len() - 1);

        let mut reader = PacketReader::new(&packet[5..]);
        assert_eq!(reader.read_i32().unwrap(), 42);
        assert_eq!(reader.read_i16().unwrap(), -7);
        assert_eq!(reader.read_cstr().unwrap(), "hello");
        assert_eq!(reader.read_bytes(2).unwrap(), &[0xde, 0xad]);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_flush_clears_buffer() {
        let mut writer = PacketWriter::new();
        writer.add_str("abc");
        let first = writer.flush(None);
        assert_eq!(first.len(), 7);
        assert!(writer.is_empty());

        // Untagged frame: length includes itself
        let len = i32::from_be_bytes([first[0], first[1], first[2], first[3]]);
        assert_eq!(len, 7);

        let second = writer.flush(Some(b'S'));
        assert_eq!(second, vec![b'S', 0, 0, 0, 4]);
    }

    #[test]
    fn test_read_past_end() {
        let mut reader = PacketReader::new(&[0x00, 0x01]);
        assert!(reader.read_i32().is_err());
        assert_eq!(reader.read_i16().unwrap(), 1);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_read_string_fixed() {
        let mut reader = PacketReader::new(b"abcdef");
        assert_eq!(reader.read_string(3).unwrap(), "abc");
        assert_eq!(reader.read_string(3).unwrap(), "def");
    }

    #[test]
    fn test_read_cstr_missing_terminator() {
        let mut reader = PacketReader::new(b"abc");
        assert!(reader.read_cstr().is_err());
    }
}

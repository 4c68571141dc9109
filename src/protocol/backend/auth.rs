//! Authentication-related backend messages.

use zerocopy::byteorder::big_endian::U32 as U32BE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::PacketReader;
use crate::protocol::types::TransactionStatus;

/// Authentication subcode constants.
pub mod auth_type {
    pub const OK: i32 = 0;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const MD5_PASSWORD: i32 = 5;
    pub const SASL: i32 = 10;
    pub const SASL_CONTINUE: i32 = 11;
    pub const SASL_FINAL: i32 = 12;
}

/// Authentication message from the server.
#[derive(Debug)]
pub enum AuthenticationMessage<'a> {
    /// Authentication successful
    Ok,
    /// Cleartext password required
    CleartextPassword,
    /// MD5 password required, with the 4-byte salt
    Md5Password { salt: [u8; 4] },
    /// SASL authentication required, with the offered mechanisms
    Sasl { mechanisms: Vec<&'a str> },
    /// SASL continue, carrying the server-first-message
    SaslContinue { data: &'a [u8] },
    /// SASL final, carrying the server-final-message
    SaslFinal { data: &'a [u8] },
}

impl<'a> AuthenticationMessage<'a> {
    /// Parse an Authentication message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut reader = PacketReader::new(payload);
        let subcode = reader.read_i32()?;

        match subcode {
            auth_type::OK => Ok(AuthenticationMessage::Ok),
            auth_type::CLEARTEXT_PASSWORD => Ok(AuthenticationMessage::CleartextPassword),
            auth_type::MD5_PASSWORD => {
                let salt = reader.read_bytes(4)?;
                Ok(AuthenticationMessage::Md5Password {
                    salt: [salt[0], salt[1], salt[2], salt[3]],
                })
            }
            auth_type::SASL => {
                let mut mechanisms = Vec::new();
                loop {
                    let mechanism = reader.read_cstr()?;
                    if mechanism.is_empty() {
                        break;
                    }
                    mechanisms.push(mechanism);
                }
                Ok(AuthenticationMessage::Sasl { mechanisms })
            }
            auth_type::SASL_CONTINUE => {
                let data = reader.read_bytes(reader.remaining())?;
                Ok(AuthenticationMessage::SaslContinue { data })
            }
            auth_type::SASL_FINAL => {
                let data = reader.read_bytes(reader.remaining())?;
                Ok(AuthenticationMessage::SaslFinal { data })
            }
            _ => Err(Error::Connection(format!(
                "Unsupported authentication method: {}",
                subcode
            ))),
        }
    }
}

/// BackendKeyData message, the process id and secret key for cancellation.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct BackendKeyData {
    pid: U32BE,
    secret_key: U32BE,
}

impl BackendKeyData {
    /// Parse a BackendKeyData message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<&Self> {
        Self::ref_from_bytes(payload).map_err(|e| Error::Protocol(format!("BackendKeyData: {e:?}")))
    }

    /// Process ID of the backend.
    pub fn process_id(&self) -> u32 {
        self.pid.get()
    }

    /// Secret key for cancellation requests.
    pub fn secret(&self) -> u32 {
        self.secret_key.get()
    }
}

/// ParameterStatus message, a server parameter name and value.
#[derive(Debug, Clone)]
pub struct ParameterStatus<'a> {
    /// Parameter name
    pub name: &'a str,
    /// Parameter value
    pub value: &'a str,
}

impl<'a> ParameterStatus<'a> {
    /// Parse a ParameterStatus message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut reader = PacketReader::new(payload);
        let name = reader.read_cstr()?;
        let value = reader.read_cstr()?;
        Ok(Self { name, value })
    }
}

/// ReadyForQuery message, the synchronization token ending a command cycle.
#[derive(Debug, Clone, Copy)]
pub struct ReadyForQuery {
    /// Transaction status of the backend.
    pub status: TransactionStatus,
}

impl ReadyForQuery {
    /// Parse a ReadyForQuery message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = PacketReader::new(payload);
        let byte = reader.read_u8()?;
        let status = TransactionStatus::from_byte(byte).ok_or_else(|| {
            Error::Protocol(format!("ReadyForQuery: unknown transaction status '{}'", byte as char))
        })?;
        Ok(Self { status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_ok() {
        let bytes = 0_i32.to_be_bytes();
        let msg = AuthenticationMessage::parse(&bytes).unwrap();
        assert!(matches!(msg, AuthenticationMessage::Ok));
    }

    #[test]
    fn test_parse_auth_md5() {
        let mut payload = 5_i32.to_be_bytes().to_vec();
        payload.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd]);
        let msg = AuthenticationMessage::parse(&payload).unwrap();
        match msg {
            AuthenticationMessage::Md5Password { salt } => {
                assert_eq!(salt, [0xaa, 0xbb, 0xcc, 0xdd]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_auth_sasl_mechanisms() {
        let mut payload = 10_i32.to_be_bytes().to_vec();
        payload.extend_from_slice(b"SCRAM-SHA-256-PLUS\0SCRAM-SHA-256\0\0");
        let msg = AuthenticationMessage::parse(&payload).unwrap();
        match msg {
            AuthenticationMessage::Sasl { mechanisms } => {
                assert_eq!(mechanisms, vec!["SCRAM-SHA-256-PLUS", "SCRAM-SHA-256"]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_subcode() {
        assert!(AuthenticationMessage::parse(&7_i32.to_be_bytes()).is_err());
    }

    #[test]
    fn test_parse_backend_key_data() {
        let mut payload = 1234_u32.to_be_bytes().to_vec();
        payload.extend_from_slice(&99999_u32.to_be_bytes());
        let key = BackendKeyData::parse(&payload).unwrap();
        assert_eq!(key.process_id(), 1234);
        assert_eq!(key.secret(), 99999);
    }

    #[test]
    fn test_parse_ready_for_query() {
        let ready = ReadyForQuery::parse(b"T").unwrap();
        assert_eq!(ready.status, TransactionStatus::InTransaction);
        assert!(ReadyForQuery::parse(b"x").is_err());
    }
}

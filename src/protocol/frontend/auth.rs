//! Authentication messages and the SCRAM-SHA-256 client.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::RngCore;
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::protocol::codec::PacketWriter;

/// Write a PasswordMessage (cleartext or MD5 hashed password).
pub fn write_password(writer: &mut PacketWriter, password: &str) -> Vec<u8> {
    writer.add_cstr(password);
    writer.flush(Some(super::msg_type::PASSWORD))
}

/// Write a SASLInitialResponse message carrying the client-first-message.
pub fn write_sasl_initial_response(
    writer: &mut PacketWriter,
    mechanism: &str,
    initial_response: &str,
) -> Vec<u8> {
    writer.add_cstr(mechanism);
    writer.add_i32(initial_response.len() as i32);
    writer.add_str(initial_response);
    writer.flush(Some(super::msg_type::PASSWORD))
}

/// Write a SASLResponse message carrying the client-final-message.
pub fn write_sasl_response(writer: &mut PacketWriter, response: &str) -> Vec<u8> {
    writer.add_str(response);
    writer.flush(Some(super::msg_type::PASSWORD))
}

/// Compute the MD5 password hash.
///
/// PostgreSQL MD5 password format: `"md5" + md5(md5(password + username) + salt)`.
pub fn md5_password(password: &str, user: &str, salt: &[u8; 4]) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(user.as_bytes());
    let inner = format!("{:x}", hasher.finalize());

    let mut hasher = Md5::new();
    hasher.update(inner.as_bytes());
    hasher.update(salt);
    format!("md5{:x}", hasher.finalize())
}

/// SASL mechanism implemented by [`ScramClient`].
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

// gs2 header for "no channel binding".
const GS2_HEADER: &str = "n,,";

/// Client side of a SCRAM-SHA-256 exchange (RFC 5802).
///
/// Usage: [`client_first_message`](Self::client_first_message), feed the
/// server-first-message to [`handle_server_first`](Self::handle_server_first)
/// and send its result, then verify the server-final-message with
/// [`handle_server_final`](Self::handle_server_final).
pub struct ScramClient {
    password: String,
    nonce: String,
    auth_message: Option<String>,
    salted_password: Option<[u8; 32]>,
}

impl ScramClient {
    /// Create a client with a fresh random nonce.
    pub fn new(password: &str) -> Self {
        let mut nonce_bytes = [0u8; 24];
        rand::rng().fill_bytes(&mut nonce_bytes);
        Self::with_nonce(password, &BASE64.encode(nonce_bytes))
    }

    fn with_nonce(password: &str, nonce: &str) -> Self {
        Self {
            password: password.to_string(),
            nonce: nonce.to_string(),
            auth_message: None,
            salted_password: None,
        }
    }

    /// The client-first-message.
    ///
    /// The username attribute is left empty: PostgreSQL takes the username
    /// from the startup packet and ignores the SCRAM one.
    pub fn client_first_message(&self) -> String {
        format!("{}{}", GS2_HEADER, self.client_first_bare())
    }

    fn client_first_bare(&self) -> String {
        format!("n=,r={}", self.nonce)
    }

    /// Process the server-first-message and produce the client-final-message.
    pub fn handle_server_first(&mut self, server_first: &str) -> Result<String> {
        let server_nonce = scram_attribute(server_first, 'r')?;
        let salt_b64 = scram_attribute(server_first, 's')?;
        let iterations: u32 = scram_attribute(server_first, 'i')?
            .parse()
            .map_err(|_| scram_error("invalid iteration count"))?;

        if !server_nonce.starts_with(&self.nonce) {
            return Err(scram_error("server nonce does not extend client nonce"));
        }
        let salt = BASE64
            .decode(salt_b64)
            .map_err(|_| scram_error("invalid salt encoding"))?;

        // SaltedPassword = Hi(password, salt, i)
        let mut salted_password = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            self.password.as_bytes(),
            &salt,
            iterations,
            &mut salted_password,
        );
        self.salted_password = Some(salted_password);

        let client_key = hmac_sha256(&salted_password, b"Client Key")?;
        let stored_key = Sha256::digest(client_key);

        let without_proof = format!("c={},r={}", BASE64.encode(GS2_HEADER), server_nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            without_proof
        );

        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes())?;
        self.auth_message = Some(auth_message);

        // ClientProof = ClientKey XOR ClientSignature
        let mut proof = [0u8; 32];
        for (out, (key, sig)) in proof
            .iter_mut()
            .zip(client_key.iter().zip(client_signature.iter()))
        {
            *out = key ^ sig;
        }

        Ok(format!("{},p={}", without_proof, BASE64.encode(proof)))
    }

    /// Verify the server-final-message signature.
    pub fn handle_server_final(&self, server_final: &str) -> Result<()> {
        if let Ok(reason) = scram_attribute(server_final, 'e') {
            return Err(scram_error(&format!("server rejected exchange: {reason}")));
        }
        let signature_b64 = scram_attribute(server_final, 'v')?;
        let signature = BASE64
            .decode(signature_b64)
            .map_err(|_| scram_error("invalid server signature encoding"))?;

        let salted_password = self
            .salted_password
            .ok_or_else(|| scram_error("server-final-message before server-first-message"))?;
        let auth_message = self
            .auth_message
            .as_ref()
            .ok_or_else(|| scram_error("server-final-message before server-first-message"))?;

        let server_key = hmac_sha256(&salted_password, b"Server Key")?;
        let expected = hmac_sha256(&server_key, auth_message.as_bytes())?;

        if signature.as_slice() != expected.as_slice() {
            return Err(scram_error("server signature verification failed"));
        }
        Ok(())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
        .map_err(|_| scram_error("invalid HMAC key length"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Extract a `k=value` attribute from a comma-separated SCRAM message.
fn scram_attribute<'a>(message: &'a str, key: char) -> Result<&'a str> {
    message
        .split(',')
        .find_map(|part| {
            let mut chars = part.chars();
            (chars.next() == Some(key) && chars.next() == Some('=')).then(|| &part[2..])
        })
        .ok_or_else(|| scram_error(&format!("missing '{key}=' attribute")))
}

fn scram_error(message: &str) -> Error {
    Error::Connection(format!("SCRAM-SHA-256: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_password_shape() {
        let hashed = md5_password("password", "postgres", &[0x01, 0x02, 0x03, 0x04]);
        assert!(hashed.starts_with("md5"));
        assert_eq!(hashed.len(), 35); // "md5" + 32 hex chars
        assert!(hashed[3..].bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_password_message_frame() {
        let mut writer = PacketWriter::new();
        let packet = write_password(&mut writer, "secret");

        assert_eq!(packet[0], b'p');
        assert_eq!(&packet[5..], b"secret\0");
    }

    #[test]
    fn test_sasl_initial_response_frame() {
        let mut writer = PacketWriter::new();
        let packet = write_sasl_initial_response(&mut writer, SCRAM_SHA_256, "n,,n=,r=abc");

        assert_eq!(packet[0], b'p');
        let mechanism_end = 5 + SCRAM_SHA_256.len() + 1;
        assert_eq!(&packet[5..mechanism_end - 1], SCRAM_SHA_256.as_bytes());
        let len = i32::from_be_bytes([
            packet[mechanism_end],
            packet[mechanism_end + 1],
            packet[mechanism_end + 2],
            packet[mechanism_end + 3],
        ]);
        assert_eq!(len as usize, "n,,n=,r=abc".len());
    }

    #[test]
    fn test_client_first_message() {
        let scram = ScramClient::with_nonce("pw", "rOprNGfwEbeRWgbNEkqO");
        assert_eq!(scram.client_first_message(), "n,,n=,r=rOprNGfwEbeRWgbNEkqO");
    }

    #[test]
    fn test_server_first_nonce_mismatch() {
        let mut scram = ScramClient::with_nonce("pw", "clientnonce");
        let err = scram.handle_server_first("r=othernonce,s=c2FsdA==,i=4096");
        assert!(err.is_err());
    }

    #[test]
    fn test_server_first_produces_proof() {
        let mut scram = ScramClient::with_nonce("pencil", "clientnonce");
        let reply = scram
            .handle_server_first("r=clientnonceservernonce,s=c2FsdA==,i=4096")
            .unwrap();
        assert!(reply.starts_with("c=biws,r=clientnonceservernonce,p="));
    }

    #[test]
    fn test_server_final_error_attribute() {
        let mut scram = ScramClient::with_nonce("pencil", "clientnonce");
        scram
            .handle_server_first("r=clientnonceservernonce,s=c2FsdA==,i=4096")
            .unwrap();
        assert!(scram.handle_server_final("e=invalid-proof").is_err());
    }
}

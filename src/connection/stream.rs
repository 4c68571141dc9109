//! Transport stream over TCP, TLS or unix-domain sockets.

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tokio_native_tls::TlsStream;

use crate::config::{ConnectionConfig, HostKind};
use crate::error::{Error, Result};

pub(crate) enum Stream {
    Tcp(BufReader<TcpStream>),
    Tls(BufReader<TlsStream<TcpStream>>),
    Unix(BufReader<UnixStream>),
}

impl Stream {
    /// Open the transport named by the configuration.
    pub(crate) async fn connect(config: &ConnectionConfig) -> Result<Self> {
        match config.host_kind {
            HostKind::Socket => {
                let path = socket_path(&config.host, config.port);
                let unix = UnixStream::connect(&path).await.map_err(|e| {
                    Error::Connection(format!("Could not open socket \"{}\": {}", path, e))
                })?;
                Ok(Stream::Unix(BufReader::new(unix)))
            }
            HostKind::Tcp => {
                if config.host.is_empty() {
                    return Err(Error::Connection("No hostname configured".into()));
                }
                let addr = format!("{}:{}", config.host, config.port);
                let tcp = TcpStream::connect(&addr).await.map_err(|e| {
                    Error::Connection(format!("Could not connect to \"{}\": {}", addr, e))
                })?;
                tcp.set_nodelay(true)?;
                Ok(Stream::Tcp(BufReader::new(tcp)))
            }
        }
    }

    /// Upgrade a TCP stream to TLS after a positive SSLRequest probe.
    ///
    /// The configured CA certificates become the trust anchors of the
    /// handshake.
    pub(crate) async fn upgrade_to_tls(self, config: &ConnectionConfig) -> Result<Self> {
        match self {
            Stream::Tcp(buf_reader) => {
                let tcp = buf_reader.into_inner();

                let mut builder = native_tls::TlsConnector::builder();
                for pem in &config.tls.ca_certificates {
                    let certificate = native_tls::Certificate::from_pem(pem.as_bytes())?;
                    builder.add_root_certificate(certificate);
                }
                let connector = tokio_native_tls::TlsConnector::from(builder.build()?);

                let tls = connector.connect(&config.host, tcp).await?;
                Ok(Stream::Tls(BufReader::new(tls)))
            }
            Stream::Tls(_) => Err(Error::Connection("Stream is already TLS".into())),
            Stream::Unix(_) => Err(Error::Connection(
                "TLS is not available over unix-domain sockets".into(),
            )),
        }
    }

    pub(crate) async fn read_u8(&mut self) -> std::io::Result<u8> {
        match self {
            Stream::Tcp(r) => r.read_u8().await,
            Stream::Tls(r) => r.read_u8().await,
            Stream::Unix(r) => r.read_u8().await,
        }
    }

    pub(crate) async fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.read_exact(buf).await.map(|_| ()),
            Stream::Tls(r) => r.read_exact(buf).await.map(|_| ()),
            Stream::Unix(r) => r.read_exact(buf).await.map(|_| ()),
        }
    }

    pub(crate) async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().write_all(buf).await,
            Stream::Tls(r) => r.get_mut().write_all(buf).await,
            Stream::Unix(r) => r.get_mut().write_all(buf).await,
        }
    }

    pub(crate) async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().flush().await,
            Stream::Tls(r) => r.get_mut().flush().await,
            Stream::Unix(r) => r.get_mut().flush().await,
        }
    }
}

/// The socket file lives in the configured directory under the conventional
/// `.s.PGSQL.<port>` name; a path that already names the socket file is used
/// as given.
fn socket_path(host: &str, port: u16) -> String {
    if host.contains(".s.PGSQL.") {
        host.to_string()
    } else {
        format!("{}/.s.PGSQL.{}", host.trim_end_matches('/'), port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path() {
        assert_eq!(
            socket_path("/var/run/postgresql", 5432),
            "/var/run/postgresql/.s.PGSQL.5432"
        );
        assert_eq!(
            socket_path("/var/run/postgresql/", 5433),
            "/var/run/postgresql/.s.PGSQL.5433"
        );
        assert_eq!(
            socket_path("/tmp/.s.PGSQL.6000", 6000),
            "/tmp/.s.PGSQL.6000"
        );
    }
}

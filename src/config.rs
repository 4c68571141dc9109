//! Connection configuration.

use url::Url;

use crate::error::{Error, Result};

/// Default application name reported to the server.
pub const DEFAULT_APPLICATION_NAME: &str = "harbor_postgres";

/// How the server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKind {
    /// TCP hostname or IP address.
    #[default]
    Tcp,
    /// Absolute or relative filesystem path of a unix-domain socket.
    Socket,
}

/// TLS settings for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// Attempt the SSLRequest probe before startup.
    pub enabled: bool,
    /// Fail instead of continuing in cleartext when the server declines TLS.
    pub enforce: bool,
    /// Trusted CA certificates, PEM encoded, in order.
    pub ca_certificates: Vec<String>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            enforce: false,
            ca_certificates: Vec::new(),
        }
    }
}

/// Connection configuration. Immutable once handed to a [`crate::Client`] or
/// [`crate::Pool`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Database name.
    pub database: String,
    /// Username for authentication.
    pub user: String,
    /// Password for authentication.
    pub password: Option<String>,
    /// TCP hostname or socket path, depending on `host_kind`.
    pub host: String,
    /// Whether `host` names a TCP endpoint or a unix-domain socket.
    pub host_kind: HostKind,
    /// Port number. Ignored for socket hosts when the path is absolute.
    pub port: u16,
    /// Application name reported in the startup packet.
    pub application_name: String,
    /// Additional backend startup options, sent as key/value pairs.
    pub options: Vec<(String, String)>,
    /// TLS settings.
    pub tls: TlsOptions,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            database: String::new(),
            user: String::new(),
            password: None,
            host: "127.0.0.1".into(),
            host_kind: HostKind::Tcp,
            port: 5432,
            application_name: DEFAULT_APPLICATION_NAME.into(),
            options: Vec::new(),
            tls: TlsOptions::default(),
        }
    }
}

impl ConnectionConfig {
    /// Validate the invariants of a fully resolved configuration.
    pub fn validate(&self) -> Result<()> {
        if self.tls.enforce && !self.tls.enabled {
            return Err(Error::Config(
                "TLS can't be enforced when it is disabled".into(),
            ));
        }
        if self.host_kind == HostKind::Socket && self.tls.enabled {
            return Err(Error::Config(
                "TLS is not available over unix-domain sockets".into(),
            ));
        }
        for (key, _) in &self.options {
            if !is_identifier(key) {
                return Err(Error::Config(format!(
                    "Invalid option key: \"{}\"",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Resolve a configuration from the `PGDATABASE`, `PGHOST`, `PGPORT`,
    /// `PGUSER`, `PGPASSWORD`, `PGAPPNAME` and `PGOPTIONS` environment
    /// variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.database = std::env::var("PGDATABASE")
            .map_err(|_| Error::Config("Missing database name (PGDATABASE)".into()))?;
        config.user = std::env::var("PGUSER")
            .map_err(|_| Error::Config("Missing username (PGUSER)".into()))?;

        if let Ok(host) = std::env::var("PGHOST") {
            config.host_kind = host_kind_of(&host);
            config.host = host;
        }
        if let Ok(port) = std::env::var("PGPORT") {
            config.port = parse_port(&port)?;
        }
        if let Ok(password) = std::env::var("PGPASSWORD") {
            config.password = Some(password);
        }
        if let Ok(name) = std::env::var("PGAPPNAME") {
            config.application_name = name;
        }
        if let Ok(options) = std::env::var("PGOPTIONS") {
            config.options = parse_options(&options)?;
        }

        if config.host_kind == HostKind::Socket {
            config.tls.enabled = false;
        }
        config.validate()?;
        Ok(config)
    }
}

impl TryFrom<&Url> for ConnectionConfig {
    type Error = Error;

    /// Parse a PostgreSQL connection URL.
    ///
    /// Format: `postgres://[user[:password]@]host[:port]/database[?k=v&..]`.
    /// `postgresql://` is accepted as well; a socket path is given as a
    /// percent-encoded host.
    fn try_from(url: &Url) -> Result<Self> {
        if !["postgres", "postgresql"].contains(&url.scheme()) {
            return Err(Error::Config(format!(
                "Unknown driver scheme: expected 'postgres://' or 'postgresql://', got '{}://'",
                url.scheme()
            )));
        }

        let mut config = ConnectionConfig {
            user: percent_decode(url.username())?,
            password: url
                .password()
                .map(percent_decode)
                .transpose()?,
            database: url
                .path()
                .strip_prefix('/')
                .unwrap_or_default()
                .to_string(),
            ..ConnectionConfig::default()
        };

        if let Some(host) = url.host_str() {
            let host = percent_decode(host)?;
            config.host_kind = host_kind_of(&host);
            config.host = host;
        }
        if let Some(port) = url.port() {
            config.port = port;
        }

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "application_name" => config.application_name = value.to_string(),
                "sslmode" => match value.as_ref() {
                    "disable" => config.tls.enabled = false,
                    "prefer" => {
                        config.tls.enabled = true;
                        config.tls.enforce = false;
                    }
                    "require" => {
                        config.tls.enabled = true;
                        config.tls.enforce = true;
                    }
                    _ => {
                        return Err(Error::Config(format!(
                            "Invalid sslmode: expected one of ['disable', 'prefer', 'require'], got '{}'",
                            value
                        )));
                    }
                },
                "options" => config.options = parse_options(&value)?,
                _ => {
                    return Err(Error::Config(format!(
                        "Unknown connection parameter: \"{}\"",
                        key
                    )));
                }
            }
        }

        if config.host_kind == HostKind::Socket {
            config.tls.enabled = false;
        }
        config.validate()?;
        Ok(config)
    }
}

impl TryFrom<&str> for ConnectionConfig {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| Error::Config(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}

fn host_kind_of(host: &str) -> HostKind {
    if host.starts_with('/') || host.starts_with("./") {
        HostKind::Socket
    } else {
        HostKind::Tcp
    }
}

fn parse_port(port: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| Error::Config(format!("Invalid port: \"{}\"", port)))
}

/// True for strings matching `[a-zA-Z_][a-zA-Z0-9_]*`.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a `PGOPTIONS`-style string into backend startup options.
///
/// Accepts repeated `-c key=value` and `--key=value` switches separated by
/// spaces. A backslash escapes a space inside a value.
pub(crate) fn parse_options(raw: &str) -> Result<Vec<(String, String)>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => return Err(Error::Config("Dangling escape in options".into())),
            },
            ' ' => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }

    let mut options = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let pair = if arg == "-c" {
            args.next()
                .ok_or_else(|| Error::Config("Missing value after -c in options".into()))?
        } else if let Some(rest) = arg.strip_prefix("--") {
            rest.to_string()
        } else {
            return Err(Error::Config(format!(
                "Unsupported option switch: \"{}\"",
                arg
            )));
        };

        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("Invalid option \"{}\": expected key=value", pair)))?;
        if !is_identifier(key) {
            return Err(Error::Config(format!("Invalid option key: \"{}\"", key)));
        }
        options.push((key.to_string(), value.to_string()));
    }
    Ok(options)
}

fn percent_decode(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 3 > bytes.len() {
                return Err(Error::Config(format!("Invalid percent-encoding: \"{}\"", s)));
            }
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| Error::Config(format!("Invalid percent-encoding: \"{}\"", s)))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| Error::Config(format!("Invalid percent-encoding: \"{}\"", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_full() {
        let config = ConnectionConfig::try_from(
            "postgres://alice:pw@db.example:5433/store?application_name=svc&sslmode=require",
        )
        .unwrap();
        assert_eq!(config.host_kind, HostKind::Tcp);
        assert_eq!(config.host, "db.example");
        assert_eq!(config.port, 5433);
        assert_eq!(config.user, "alice");
        assert_eq!(config.password.as_deref(), Some("pw"));
        assert_eq!(config.database, "store");
        assert_eq!(config.application_name, "svc");
        assert!(config.tls.enabled);
        assert!(config.tls.enforce);
    }

    #[test]
    fn test_url_defaults() {
        let config = ConnectionConfig::try_from("postgresql://localhost/app").unwrap();
        assert_eq!(config.port, 5432);
        assert_eq!(config.user, "");
        assert_eq!(config.database, "app");
        assert_eq!(config.application_name, DEFAULT_APPLICATION_NAME);
        assert!(config.tls.enabled);
        assert!(!config.tls.enforce);
    }

    #[test]
    fn test_url_socket_host() {
        let config =
            ConnectionConfig::try_from("postgres://bob@%2Fvar%2Frun%2Fpostgresql/app").unwrap();
        assert_eq!(config.host_kind, HostKind::Socket);
        assert_eq!(config.host, "/var/run/postgresql");
        assert!(!config.tls.enabled);
    }

    #[test]
    fn test_url_bad_scheme() {
        assert!(matches!(
            ConnectionConfig::try_from("mysql://localhost/app"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_url_socket_with_enforced_tls_fails() {
        assert!(matches!(
            ConnectionConfig::try_from("postgres://%2Ftmp/app?sslmode=require"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_parse_options_c_switch() {
        let options = parse_options("-c search_path=public -c statement_timeout=1000").unwrap();
        assert_eq!(
            options,
            vec![
                ("search_path".to_string(), "public".to_string()),
                ("statement_timeout".to_string(), "1000".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_options_long_switch_with_escaped_space() {
        let options = parse_options("--default_transaction_isolation=repeatable\\ read").unwrap();
        assert_eq!(
            options,
            vec![(
                "default_transaction_isolation".to_string(),
                "repeatable read".to_string()
            )]
        );
    }

    #[test]
    fn test_parse_options_rejects_bad_key() {
        assert!(parse_options("--1bad=value").is_err());
        assert!(parse_options("bare=value").is_err());
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("search_path"));
        assert!(is_identifier("_x9"));
        assert!(!is_identifier("9x"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("has space"));
    }
}

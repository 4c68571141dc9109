//! Error types for harbor-postgres.

use thiserror::Error;

/// Result type for harbor-postgres operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Fields of a server error or notice, keyed by the single-byte codes of the
/// wire protocol. Codes that are not recognized are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notice {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG (`S`)
    pub severity: Option<String>,
    /// SQLSTATE code, 5 characters (`C`)
    pub code: Option<String>,
    /// Primary human-readable message (`M`)
    pub message: Option<String>,
    /// Detailed error explanation (`D`)
    pub detail: Option<String>,
    /// Suggestion for fixing the problem (`H`)
    pub hint: Option<String>,
    /// Cursor position in the query string, 1-based (`P`)
    pub position: Option<u32>,
    /// Cursor position in an internally generated query (`p`)
    pub internal_position: Option<u32>,
    /// Text of the failed internally generated query (`q`)
    pub internal_query: Option<String>,
    /// Context in which the error occurred (`W`)
    pub where_: Option<String>,
    /// Schema name (`s`)
    pub schema: Option<String>,
    /// Table name (`t`)
    pub table: Option<String>,
    /// Column name (`c`)
    pub column: Option<String>,
    /// Data type name (`d`)
    pub data_type: Option<String>,
    /// Constraint name (`n`)
    pub constraint: Option<String>,
    /// Source file reporting the error (`F`)
    pub file: Option<String>,
    /// Source line reporting the error (`L`)
    pub line: Option<u32>,
    /// Source routine reporting the error (`R`)
    pub routine: Option<String>,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (SQLSTATE {})",
            self.severity.as_deref().unwrap_or("ERROR"),
            self.message.as_deref().unwrap_or_default(),
            self.code.as_deref().unwrap_or_default(),
        )?;
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// An error response sent by the backend, optionally carrying the text of the
/// query that provoked it.
#[derive(Debug, Clone)]
pub struct PostgresError {
    /// Parsed error fields.
    pub fields: Notice,
    /// Text of the originating query, when known.
    pub query: Option<String>,
}

impl PostgresError {
    pub(crate) fn new(fields: Notice, query: Option<String>) -> Self {
        Self { fields, query }
    }

    /// The SQLSTATE code, if the backend sent one.
    pub fn sqlstate(&self) -> Option<&str> {
        self.fields.code.as_deref()
    }

    /// The primary message.
    pub fn message(&self) -> &str {
        self.fields.message.as_deref().unwrap_or_default()
    }
}

impl std::fmt::Display for PostgresError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fields.fmt(f)
    }
}

/// Error type for harbor-postgres.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid connection configuration or environment
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport, TLS handshake, or startup failure; the connection is gone
    #[error("Connection error: {0}")]
    Connection(String),

    /// I/O error on the transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// Unexpected message tag or truncated frame; the connection is terminated
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The backend sent an ErrorResponse
    #[error("PostgreSQL error: {0}")]
    Postgres(PostgresError),

    /// A backend error raised while a transaction was open
    #[error("Transaction \"{name}\" aborted: {source}")]
    Transaction {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// A session-level query was attempted while a transaction owns the session
    #[error("This session is locked by transaction \"{0}\"")]
    SessionLocked(String),

    /// The value codec could not process a column payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// The value codec could not process a query argument
    #[error("Encode error: {0}")]
    Encode(String),

    /// Explicit field mismatch or duplicate column names in a result
    #[error("Result shape error: {0}")]
    ResultShape(String),

    /// Operation on an ended pool
    #[error("The pool connections have already been ended")]
    PoolClosed,

    /// API misuse (e.g. commit on an ended transaction)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),
}

impl Error {
    /// Returns true if the error means the connection cannot be reused.
    ///
    /// `Postgres` errors are recoverable: the engine drains to the next
    /// ReadyForQuery so the connection stays usable. FATAL and PANIC
    /// severities are the exception, the backend closes after sending those.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_) | Error::Tls(_) | Error::Connection(_) | Error::Protocol(_) => true,
            Error::Postgres(err) => matches!(
                err.fields.severity.as_deref(),
                Some("FATAL") | Some("PANIC")
            ),
            _ => false,
        }
    }

    /// The SQLSTATE code if this is a backend error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Postgres(err) => err.sqlstate(),
            _ => None,
        }
    }
}

impl From<PostgresError> for Error {
    fn from(err: PostgresError) -> Self {
        Error::Postgres(err)
    }
}

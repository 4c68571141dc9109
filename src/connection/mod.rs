//! The wire-protocol engine.
//!
//! A [`Connection`] owns one transport stream and drives the startup,
//! simple-query and extended-query dialogues against it. The engine is not
//! reentrant: one request runs at a time, and a request is finished only once
//! its terminating ReadyForQuery has been consumed.

mod stream;

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::config::{ConnectionConfig, HostKind};
use crate::error::{Error, PostgresError, Result};
use crate::protocol::backend::{
    msg_type, parse_notice_fields, AuthenticationMessage, BackendKeyData, CommandComplete,
    DataRow, ParameterStatus, ReadyForQuery, RowDescription,
};
use crate::protocol::codec::PacketWriter;
use crate::protocol::frontend::auth::{
    md5_password, write_password, write_sasl_initial_response, write_sasl_response, ScramClient,
    SCRAM_SHA_256,
};
use crate::protocol::frontend::{
    write_bind, write_describe_portal, write_execute, write_parse, write_query, write_ssl_request,
    write_startup, write_sync, write_terminate,
};
use crate::protocol::types::TransactionStatus;
use crate::query::{Query, QueryResult, ResultAccumulator};

use self::stream::Stream;

pub(crate) struct Connection {
    stream: Stream,
    /// Outgoing packet buffer, reused across sends.
    writer: PacketWriter,
    /// Payload of the message currently being processed.
    read_buf: Vec<u8>,
    backend_pid: u32,
    backend_secret_key: u32,
    backend_parameters: HashMap<String, String>,
    transaction_status: TransactionStatus,
    connected: bool,
    /// Set while a query dialogue is on the wire. A connection dropped
    /// mid-dialogue (cancelled future) stays flagged and is treated as dead.
    in_flight: bool,
    packet_count: u64,
}

impl Connection {
    /// Open a connection and complete startup and authentication.
    pub(crate) async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut writer = PacketWriter::new();
        let mut stream = Stream::connect(config).await?;

        if config.tls.enabled && config.host_kind == HostKind::Tcp {
            let probe = write_ssl_request(&mut writer);
            stream.write_all(&probe).await?;
            stream.flush().await?;

            match stream.read_u8().await? {
                b'S' => {
                    stream = stream.upgrade_to_tls(config).await?;
                }
                b'N' => {
                    if config.tls.enforce {
                        return Err(Error::Connection(
                            "The server does not accept TLS connections".into(),
                        ));
                    }
                    debug!("Server declined TLS, continuing in cleartext");
                }
                byte => {
                    return Err(Error::Protocol(format!(
                        "Unexpected SSLRequest response: '{}'",
                        byte as char
                    )));
                }
            }
        }

        let mut connection = Self {
            stream,
            writer,
            read_buf: Vec::new(),
            backend_pid: 0,
            backend_secret_key: 0,
            backend_parameters: HashMap::new(),
            transaction_status: TransactionStatus::Idle,
            connected: false,
            in_flight: false,
            packet_count: 0,
        };
        connection.startup(config).await?;
        connection.connected = true;

        debug!(
            pid = connection.backend_pid,
            user = %config.user,
            database = %config.database,
            "connection ready"
        );
        Ok(connection)
    }

    /// Backend process id, available after startup.
    pub(crate) fn backend_pid(&self) -> u32 {
        self.backend_pid
    }

    /// Backend cancellation key, available after startup.
    #[allow(dead_code)]
    pub(crate) fn backend_secret_key(&self) -> u32 {
        self.backend_secret_key
    }

    /// Runtime parameters reported by the backend.
    pub(crate) fn backend_parameters(&self) -> &HashMap<String, String> {
        &self.backend_parameters
    }

    /// Whether the connection can run another query.
    pub(crate) fn is_healthy(&self) -> bool {
        self.connected && !self.in_flight
    }

    /// Send a Terminate message and mark the connection closed.
    pub(crate) async fn terminate(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        let packet = write_terminate(&mut self.writer);
        self.send(&packet).await
    }

    /// Execute one query and materialize its result.
    pub(crate) async fn query(&mut self, query: &Query) -> Result<QueryResult> {
        if !self.is_healthy() {
            return Err(Error::Connection("The connection is closed".into()));
        }

        self.in_flight = true;
        let result = if query.args.is_empty() {
            self.simple_query(query).await
        } else {
            self.extended_query(query).await
        };
        if let Err(error) = &result {
            if error.is_connection_broken() {
                self.connected = false;
            }
        }
        self.in_flight = false;
        result
    }

    // ===== startup =====

    async fn startup(&mut self, config: &ConnectionConfig) -> Result<()> {
        let mut params: Vec<(&str, &str)> = vec![
            ("user", &config.user),
            ("database", &config.database),
            ("application_name", &config.application_name),
            ("client_encoding", "utf-8"),
        ];
        for (key, value) in &config.options {
            params.push((key, value));
        }

        let packet = write_startup(&mut self.writer, &params);
        self.send(&packet).await?;

        loop {
            match self.read_message().await? {
                msg_type::AUTHENTICATION => self.handle_auth(config).await?,
                msg_type::BACKEND_KEY_DATA => {
                    let key = BackendKeyData::parse(&self.read_buf)?;
                    self.backend_pid = key.process_id();
                    self.backend_secret_key = key.secret();
                }
                msg_type::PARAMETER_STATUS => {
                    let status = ParameterStatus::parse(&self.read_buf)?;
                    self.backend_parameters
                        .insert(status.name.to_string(), status.value.to_string());
                }
                msg_type::READY_FOR_QUERY => {
                    let ready = ReadyForQuery::parse(&self.read_buf)?;
                    self.transaction_status = ready.status;
                    return Ok(());
                }
                msg_type::ERROR_RESPONSE => {
                    let fields = parse_notice_fields(&self.read_buf)?;
                    return Err(PostgresError::new(fields, None).into());
                }
                msg_type::NOTICE_RESPONSE => {
                    let fields = parse_notice_fields(&self.read_buf)?;
                    warn!("Notice during startup: {}", fields);
                }
                tag => return Err(self.protocol_error(tag, "startup")),
            }
        }
    }

    async fn handle_auth(&mut self, config: &ConnectionConfig) -> Result<()> {
        // The parsed message borrows the read buffer; reduce it to an owned
        // action before any further send can reuse the buffer.
        enum AuthAction {
            Done,
            Password(String),
            Sasl,
        }

        let action = match AuthenticationMessage::parse(&self.read_buf)? {
            AuthenticationMessage::Ok => AuthAction::Done,
            AuthenticationMessage::CleartextPassword => {
                AuthAction::Password(required_password(config)?.to_string())
            }
            AuthenticationMessage::Md5Password { salt } => AuthAction::Password(md5_password(
                required_password(config)?,
                &config.user,
                &salt,
            )),
            AuthenticationMessage::Sasl { mechanisms } => {
                if !mechanisms.iter().any(|m| *m == SCRAM_SHA_256) {
                    return Err(Error::Connection(format!(
                        "No supported SASL mechanism, server offers: {:?}",
                        mechanisms
                    )));
                }
                AuthAction::Sasl
            }
            other => {
                return Err(Error::Connection(format!(
                    "Unsupported authentication method: {:?}",
                    other
                )));
            }
        };

        match action {
            AuthAction::Done => Ok(()),
            AuthAction::Password(password) => {
                let packet = write_password(&mut self.writer, &password);
                self.send(&packet).await
            }
            AuthAction::Sasl => self.sasl_exchange(config).await,
        }
    }

    /// Drive the SCRAM-SHA-256 dialogue up to (excluding) the final
    /// Authentication Ok, which the startup loop consumes.
    async fn sasl_exchange(&mut self, config: &ConnectionConfig) -> Result<()> {
        let mut scram = ScramClient::new(required_password(config)?);

        let client_first = scram.client_first_message();
        let packet = write_sasl_initial_response(&mut self.writer, SCRAM_SHA_256, &client_first);
        self.send(&packet).await?;

        let server_first = self.read_sasl_payload(false).await?;
        let client_final = scram.handle_server_first(&server_first)?;
        let packet = write_sasl_response(&mut self.writer, &client_final);
        self.send(&packet).await?;

        let server_final = self.read_sasl_payload(true).await?;
        scram.handle_server_final(&server_final)
    }

    async fn read_sasl_payload(&mut self, want_final: bool) -> Result<String> {
        match self.read_message().await? {
            msg_type::AUTHENTICATION => {
                let message = AuthenticationMessage::parse(&self.read_buf)?;
                let data = match message {
                    AuthenticationMessage::SaslContinue { data } if !want_final => data,
                    AuthenticationMessage::SaslFinal { data } if want_final => data,
                    other => {
                        return Err(Error::Protocol(format!(
                            "Out-of-sequence SASL message: {:?}",
                            other
                        )));
                    }
                };
                String::from_utf8(data.to_vec())
                    .map_err(|_| Error::Protocol("SASL payload is not UTF-8".into()))
            }
            msg_type::ERROR_RESPONSE => {
                let fields = parse_notice_fields(&self.read_buf)?;
                Err(PostgresError::new(fields, None).into())
            }
            tag => Err(self.protocol_error(tag, "SASL exchange")),
        }
    }

    // ===== query dialogues =====

    async fn simple_query(&mut self, query: &Query) -> Result<QueryResult> {
        let mut accumulator = ResultAccumulator::new(query);
        let mut failure: Option<Error> = None;

        let packet = write_query(&mut self.writer, &query.text);
        self.send(&packet).await?;

        loop {
            match self.read_message().await? {
                msg_type::ROW_DESCRIPTION => {
                    let description = RowDescription::parse(&self.read_buf)?;
                    accumulator.describe(description);
                }
                msg_type::DATA_ROW => {
                    if failure.is_none() {
                        let row = DataRow::parse(&self.read_buf)?;
                        if let Err(error) = accumulator.add_row(&row) {
                            failure = Some(error);
                        }
                    }
                }
                msg_type::COMMAND_COMPLETE => {
                    let complete = CommandComplete::parse(&self.read_buf)?;
                    accumulator.complete(&complete);
                }
                msg_type::EMPTY_QUERY_RESPONSE => accumulator.complete_empty(),
                msg_type::NOTICE_RESPONSE => {
                    let fields = parse_notice_fields(&self.read_buf)?;
                    accumulator.warn(fields);
                }
                msg_type::ERROR_RESPONSE => {
                    let error = self.error_response(&query.text).await?;
                    return Err(error);
                }
                msg_type::READY_FOR_QUERY => {
                    let ready = ReadyForQuery::parse(&self.read_buf)?;
                    self.transaction_status = ready.status;
                    if let Some(error) = failure {
                        return Err(error);
                    }
                    if !accumulator.is_complete() {
                        self.connected = false;
                        return Err(Error::Protocol(
                            "ReadyForQuery received before CommandComplete".into(),
                        ));
                    }
                    return Ok(accumulator.finish());
                }
                tag => return Err(self.protocol_error(tag, "simple query")),
            }
        }
    }

    async fn extended_query(&mut self, query: &Query) -> Result<QueryResult> {
        let mut accumulator = ResultAccumulator::new(query);
        let mut failure: Option<Error> = None;

        // Parse, Bind, Describe, Execute and Sync travel in one batch; the
        // pending Sync is also what resynchronizes after an error.
        let packets = [
            write_parse(&mut self.writer, "", &query.text),
            write_bind(&mut self.writer, "", "", &query.args),
            write_describe_portal(&mut self.writer, ""),
            write_execute(&mut self.writer, "", 0),
            write_sync(&mut self.writer),
        ];
        for packet in &packets {
            self.stream.write_all(packet).await?;
        }
        self.stream.flush().await?;

        loop {
            match self.read_message().await? {
                msg_type::PARSE_COMPLETE | msg_type::BIND_COMPLETE | msg_type::NO_DATA => {}
                msg_type::ROW_DESCRIPTION => {
                    let description = RowDescription::parse(&self.read_buf)?;
                    accumulator.describe(description);
                }
                msg_type::DATA_ROW => {
                    if failure.is_none() {
                        let row = DataRow::parse(&self.read_buf)?;
                        if let Err(error) = accumulator.add_row(&row) {
                            failure = Some(error);
                        }
                    }
                }
                msg_type::COMMAND_COMPLETE => {
                    let complete = CommandComplete::parse(&self.read_buf)?;
                    accumulator.complete(&complete);
                }
                msg_type::PORTAL_SUSPENDED | msg_type::EMPTY_QUERY_RESPONSE => {
                    accumulator.complete_empty();
                }
                msg_type::NOTICE_RESPONSE => {
                    let fields = parse_notice_fields(&self.read_buf)?;
                    accumulator.warn(fields);
                }
                msg_type::ERROR_RESPONSE => {
                    let error = self.error_response(&query.text).await?;
                    return Err(error);
                }
                msg_type::READY_FOR_QUERY => {
                    let ready = ReadyForQuery::parse(&self.read_buf)?;
                    self.transaction_status = ready.status;
                    if let Some(error) = failure {
                        return Err(error);
                    }
                    if !accumulator.is_complete() {
                        self.connected = false;
                        return Err(Error::Protocol(
                            "ReadyForQuery received before CommandComplete".into(),
                        ));
                    }
                    return Ok(accumulator.finish());
                }
                tag => return Err(self.protocol_error(tag, "extended query")),
            }
        }
    }

    /// Parse an ErrorResponse and drain to the synchronization point so the
    /// connection stays usable. For extended queries the Sync is already on
    /// the wire.
    async fn error_response(&mut self, query_text: &str) -> Result<Error> {
        let fields = parse_notice_fields(&self.read_buf)?;

        loop {
            match self.read_message().await {
                Ok(msg_type::READY_FOR_QUERY) => {
                    let ready = ReadyForQuery::parse(&self.read_buf)?;
                    self.transaction_status = ready.status;
                    break;
                }
                Ok(tag) => {
                    debug!("Discarding '{}' while resynchronizing", tag as char);
                }
                // A FATAL error closes the backend before any ReadyForQuery;
                // surface the server error, not the hang-up
                Err(_) => {
                    self.connected = false;
                    break;
                }
            }
        }

        Ok(Error::Postgres(PostgresError::new(
            fields,
            Some(query_text.to_string()),
        )))
    }

    // ===== transport helpers =====

    async fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.stream.write_all(packet).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one framed message; the tag is returned and the payload is left
    /// in `read_buf`.
    async fn read_message(&mut self) -> Result<u8> {
        let tag = self.stream.read_u8().await?;
        let mut length_bytes = [0u8; 4];
        self.stream.read_exact(&mut length_bytes).await?;
        let length = i32::from_be_bytes(length_bytes);
        if length < 4 {
            self.connected = false;
            return Err(Error::Protocol(format!(
                "Invalid message length: {}",
                length
            )));
        }

        let payload_len = (length - 4) as usize;
        self.read_buf.clear();
        self.read_buf.resize(payload_len, 0);
        self.stream.read_exact(&mut self.read_buf).await?;

        self.packet_count += 1;
        trace!(
            packet = self.packet_count,
            tag = %(tag as char),
            len = payload_len,
            "message received"
        );
        Ok(tag)
    }

    /// An unexpected tag terminates the connection.
    fn protocol_error(&mut self, tag: u8, context: &str) -> Error {
        self.connected = false;
        Error::Protocol(format!(
            "Unexpected message '{}' during {}",
            tag as char, context
        ))
    }
}

fn required_password(config: &ConnectionConfig) -> Result<&str> {
    config.password.as_deref().ok_or_else(|| {
        Error::Connection("The server requested a password but none was configured".into())
    })
}

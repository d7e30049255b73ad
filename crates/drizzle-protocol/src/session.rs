//! Protocol session: one authenticated connection and its state.
//!
//! Everything a caller does funnels through [`Session::execute_query`] (or
//! the two dedicated commands, COM_INIT_DB and COM_PING). Each request
//! resets the packet sequence, sends one command, and reads the complete
//! response before returning.
//!
//! A `Session` is not meant to be shared between threads; it needs
//! `&mut self` for every request.
//!
//! # Failure model
//!
//! A server error (ERR packet) is returned as [`Error::Server`] and the
//! session stays usable. Every other failure leaves the packet stream in
//! an unknown position, so the session is marked broken and further
//! requests fail fast until the caller closes it.

use std::io::{Read, Write};
use std::net::TcpStream;

use drizzle_core::Error;
use drizzle_core::error::{ConnectionError, ConnectionErrorKind};

use crate::auth;
use crate::config::DrizzleConfig;
use crate::protocol::response::{Response, classify};
use crate::protocol::writer::build_command_payload;
use crate::protocol::{
    Capabilities, Command, Greeting, HandshakeResponse, PacketStream, ResultSetStreamer,
    protocol_error, server_status,
};
use crate::result::{OkResult, QueryResult};
use crate::socket::{SocketFactory, TcpSocketFactory};

/// Mutable per-connection bookkeeping, changed only by `Session` methods.
#[derive(Debug, Default)]
struct SessionState {
    /// Database selected through `select_database`
    database: Option<String>,
    auto_commit: bool,
    /// Tracked locally only; never sent to the server
    readonly: bool,
    /// Statements queued by `add_to_batch`
    batch: Vec<String>,
    /// Status flags from the last OK or EOF packet
    status_flags: u16,
    /// Set after a connection-fatal error
    broken: bool,
}

/// An authenticated connection to a MySQL/Drizzle server.
pub struct Session<S = TcpStream> {
    /// `None` once closed
    stream: Option<PacketStream<S>>,
    config: DrizzleConfig,
    server_version: String,
    connection_id: u32,
    capabilities: Capabilities,
    state: SessionState,
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("user", &self.config.user)
            .field("connection_id", &self.connection_id)
            .field("server_version", &self.server_version)
            .field("state", &self.state)
            .field("closed", &self.stream.is_none())
            .finish_non_exhaustive()
    }
}

impl Session<TcpStream> {
    /// Connect over TCP and authenticate.
    #[allow(clippy::result_large_err)]
    pub fn connect(config: DrizzleConfig) -> Result<Self, Error> {
        Self::connect_with(config, &TcpSocketFactory)
    }

    /// Connect to an endpoint given as its individual parts.
    #[allow(clippy::result_large_err)]
    pub fn connect_to(
        host: &str,
        port: u16,
        database: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, Error> {
        let mut config = DrizzleConfig::new()
            .host(host)
            .port(port)
            .user(username)
            .password(password);
        if !database.is_empty() {
            config = config.database(database);
        }
        Self::connect(config)
    }
}

impl<S: Read + Write> Session<S> {
    /// Open a stream through `factory`, run the handshake, then select the
    /// configured database and enable autocommit.
    ///
    /// Any failure aborts the attempt; nothing is retried.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(
        level = "info",
        skip(config, factory),
        fields(host = %config.host, port = config.port, user = %config.user)
    )]
    pub fn connect_with<F>(config: DrizzleConfig, factory: &F) -> Result<Self, Error>
    where
        F: SocketFactory<Stream = S>,
    {
        let transport = factory.connect(&config)?;
        let mut stream = PacketStream::new(transport);

        let greeting_packet = stream.receive_packet()?;
        let greeting = Greeting::parse(&greeting_packet.payload)?;
        tracing::debug!(
            server_version = %greeting.server_version,
            connection_id = greeting.connection_id,
            server_capabilities = ?greeting.capabilities,
            "Received greeting"
        );

        let capabilities = Capabilities::negotiate(greeting.capabilities);
        tracing::debug!(client_capabilities = ?capabilities, "Negotiated capabilities");

        authenticate(&mut stream, &config, &greeting, capabilities)?;

        let mut session = Self {
            stream: Some(stream),
            server_version: greeting.server_version,
            connection_id: greeting.connection_id,
            capabilities,
            state: SessionState::default(),
            config,
        };

        if let Some(database) = session.config.database.clone().filter(|db| !db.is_empty()) {
            session.select_database(&database)?;
        }
        session.set_auto_commit(true)?;

        tracing::info!(
            connection_id = session.connection_id,
            server_version = %session.server_version,
            "Session established"
        );
        Ok(session)
    }

    /// Execute one statement and read its complete response.
    ///
    /// An ERR reply becomes `Err(Error::Server)`; the session stays usable.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn execute_query(&mut self, sql: &str) -> Result<QueryResult, Error> {
        let payload = build_command_payload(Command::Query as u8, sql.as_bytes());
        let result = self.request(&payload, Some(sql));
        if let Ok(result) = &result {
            tracing::trace!(
                rows = result.as_tabular().map_or(0, |t| t.row_count()),
                affected = result.affected_rows(),
                "Statement complete"
            );
        }
        result
    }

    /// Switch the default database (COM_INIT_DB).
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn select_database(&mut self, name: &str) -> Result<(), Error> {
        let payload = build_command_payload(Command::InitDb as u8, name.as_bytes());
        self.expect_ok(&payload, None)?;
        self.state.database = Some(name.to_string());
        Ok(())
    }

    /// Enable or disable autocommit on the server.
    #[allow(clippy::result_large_err)]
    pub fn set_auto_commit(&mut self, enabled: bool) -> Result<(), Error> {
        let sql = if enabled {
            "SET autocommit=1"
        } else {
            "SET autocommit=0"
        };
        self.run_statement(sql)?;
        self.state.auto_commit = enabled;
        Ok(())
    }

    /// Autocommit as last set through this session. No round trip.
    pub fn auto_commit(&self) -> bool {
        self.state.auto_commit
    }

    #[allow(clippy::result_large_err)]
    pub fn commit(&mut self) -> Result<(), Error> {
        self.run_statement("COMMIT")
    }

    #[allow(clippy::result_large_err)]
    pub fn rollback(&mut self) -> Result<(), Error> {
        self.run_statement("ROLLBACK")
    }

    #[allow(clippy::result_large_err)]
    pub fn set_savepoint(&mut self, name: &str) -> Result<(), Error> {
        self.run_statement(&format!("SAVEPOINT {}", quote_identifier(name)))
    }

    #[allow(clippy::result_large_err)]
    pub fn release_savepoint(&mut self, name: &str) -> Result<(), Error> {
        self.run_statement(&format!("RELEASE SAVEPOINT {}", quote_identifier(name)))
    }

    #[allow(clippy::result_large_err)]
    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), Error> {
        self.run_statement(&format!("ROLLBACK TO SAVEPOINT {}", quote_identifier(name)))
    }

    /// Record the readonly flag.
    ///
    /// This is client-side bookkeeping only: nothing is sent, and the
    /// server will still accept writes.
    pub fn set_readonly(&mut self, readonly: bool) {
        tracing::debug!(readonly, "Readonly flag is tracked locally and not enforced");
        self.state.readonly = readonly;
    }

    pub fn readonly(&self) -> bool {
        self.state.readonly
    }

    /// Send COM_PING. `Ok(false)` means the server answered with ERR.
    #[allow(clippy::result_large_err)]
    pub fn ping(&mut self) -> Result<bool, Error> {
        let payload = build_command_payload(Command::Ping as u8, &[]);
        match self.request(&payload, None) {
            Ok(QueryResult::Update(_)) => Ok(true),
            Ok(QueryResult::Tabular(_)) => Ok(false),
            Err(Error::Server(e)) => {
                tracing::debug!(code = e.code, message = %e.message, "Ping rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Queue a statement for `execute_batch`. No network activity.
    pub fn add_to_batch(&mut self, sql: impl Into<String>) {
        self.state.batch.push(sql.into());
    }

    pub fn clear_batch(&mut self) {
        self.state.batch.clear();
    }

    /// Number of queued statements.
    pub fn batch_len(&self) -> usize {
        self.state.batch.len()
    }

    /// Execute every queued statement in order.
    ///
    /// Stops at the first failure and returns it; results of the statements
    /// already executed are discarded and nothing is rolled back. The queue
    /// is empty afterwards either way.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self), fields(count = self.state.batch.len()))]
    pub fn execute_batch(&mut self) -> Result<Vec<QueryResult>, Error> {
        let batch = std::mem::take(&mut self.state.batch);
        let mut results = Vec::with_capacity(batch.len());

        for (index, sql) in batch.iter().enumerate() {
            match self.execute_query(sql) {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::warn!(
                        index,
                        remaining = batch.len() - index - 1,
                        error = %e,
                        "Batch aborted"
                    );
                    return Err(e);
                }
            }
        }

        tracing::debug!(executed = results.len(), "Batch complete");
        Ok(results)
    }

    /// Send COM_QUIT and release the stream.
    ///
    /// The stream is released even when COM_QUIT cannot be written; that
    /// write error is still returned. Closing twice is a no-op.
    #[allow(clippy::result_large_err)]
    pub fn close(&mut self) -> Result<(), Error> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        stream.reset_sequence();
        let payload = build_command_payload(Command::Quit as u8, &[]);
        let sent = stream.send(&payload);
        drop(stream);
        self.state.batch.clear();

        if let Err(e) = &sent {
            tracing::warn!(
                connection_id = self.connection_id,
                error = %e,
                "Could not close connection cleanly"
            );
        } else {
            tracing::info!(connection_id = self.connection_id, "Session closed");
        }
        sent
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// True after a connection-fatal error; only `close` is useful then.
    pub fn is_broken(&self) -> bool {
        self.state.broken
    }

    // ==================== Accessors ====================

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Currently selected database.
    pub fn database(&self) -> Option<&str> {
        self.state.database.as_deref()
    }

    pub fn username(&self) -> &str {
        &self.config.user
    }

    pub fn password(&self) -> Option<&str> {
        self.config.password.as_deref()
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Capabilities negotiated during the handshake.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Status flags from the most recent OK or EOF packet.
    pub fn status_flags(&self) -> u16 {
        self.state.status_flags
    }

    pub fn in_transaction(&self) -> bool {
        self.state.status_flags & server_status::SERVER_STATUS_IN_TRANS != 0
    }

    // ==================== Internals ====================

    /// Run a statement whose only acceptable answer is OK.
    #[allow(clippy::result_large_err)]
    fn run_statement(&mut self, sql: &str) -> Result<(), Error> {
        let payload = build_command_payload(Command::Query as u8, sql.as_bytes());
        self.expect_ok(&payload, Some(sql)).map(|_| ())
    }

    #[allow(clippy::result_large_err)]
    fn expect_ok(&mut self, payload: &[u8], sql: Option<&str>) -> Result<OkResult, Error> {
        match self.request(payload, sql)? {
            QueryResult::Update(ok) => Ok(ok),
            QueryResult::Tabular(t) => Err(protocol_error(format!(
                "Expected OK, got a result set with {} columns",
                t.column_count()
            ))),
        }
    }

    /// One request/response cycle, with broken-state bookkeeping.
    #[allow(clippy::result_large_err)]
    fn request(&mut self, payload: &[u8], sql: Option<&str>) -> Result<QueryResult, Error> {
        if self.state.broken {
            return Err(connection_error(
                ConnectionErrorKind::Broken,
                "Session is broken after an earlier failure; close it and reconnect",
            ));
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(connection_error(ConnectionErrorKind::Closed, "Session is closed"));
        };

        let result = exchange(stream, payload, sql);
        match &result {
            Ok(QueryResult::Update(ok)) => self.state.status_flags = ok.status_flags,
            Ok(QueryResult::Tabular(t)) => self.state.status_flags = t.status_flags,
            Err(e) if e.is_connection_fatal() => {
                tracing::warn!(error = %e, "Connection-fatal error, session marked broken");
                self.state.broken = true;
            }
            Err(_) => {}
        }
        result
    }
}

#[allow(clippy::result_large_err)]
fn exchange<S: Read + Write>(
    stream: &mut PacketStream<S>,
    payload: &[u8],
    sql: Option<&str>,
) -> Result<QueryResult, Error> {
    stream.reset_sequence();
    stream.send(payload)?;

    let packet = stream.receive()?;
    match classify(&packet.payload)? {
        Response::Ok(ok) => Ok(QueryResult::Update(ok.into())),
        Response::Error(err) => Err(Error::Server(err.to_server_error(sql))),
        Response::Eof(_) => Err(protocol_error("Unexpected EOF packet in response")),
        Response::ResultSetHeader { column_count } => {
            let mut streamer = ResultSetStreamer::new(stream);
            if let Some(sql) = sql {
                streamer = streamer.with_sql(sql);
            }
            streamer.stream(column_count).map(QueryResult::Tabular)
        }
    }
}

/// Send the auth packet (sequence 1) and require an OK in reply, after at
/// most one AuthMoreData round handled by the plugin.
#[allow(clippy::result_large_err)]
fn authenticate<S: Read + Write>(
    stream: &mut PacketStream<S>,
    config: &DrizzleConfig,
    greeting: &Greeting,
    capabilities: Capabilities,
) -> Result<(), Error> {
    let plugin = config
        .auth_plugin
        .clone()
        .unwrap_or_else(|| auth::plugin_for(&greeting.auth_plugin));
    let password = config.password.as_deref().unwrap_or("");
    let scramble = plugin.scramble(password, &greeting.auth_data);

    let payload = HandshakeResponse::new(capabilities, &config.user)
        .max_packet_size(config.max_packet_size)
        .charset(config.charset)
        .auth_response(&scramble)
        .database(config.database.as_deref())
        .auth_plugin(plugin.name())
        .encode()?;

    tracing::debug!(plugin = plugin.name(), user = %config.user, "Sending auth packet");
    stream.send_packet(&payload, 1)?;

    let mut reply = stream.receive()?;
    if reply.payload.first() == Some(&auth::AUTH_MORE_DATA) {
        plugin.more_data(&reply.payload[1..])?;
        reply = stream.receive()?;
    }
    match classify(&reply.payload) {
        Ok(Response::Ok(_)) => {
            tracing::debug!("Authenticated");
            Ok(())
        }
        Ok(Response::Error(err)) => Err(connection_error(
            ConnectionErrorKind::Authentication,
            format!(
                "Authentication failed: {} ({})",
                err.error_message, err.error_code
            ),
        )),
        Ok(Response::Eof(_)) => Err(protocol_error("Auth switch requests are not supported")),
        Ok(Response::ResultSetHeader { .. }) | Err(_) => Err(protocol_error(format!(
            "Unexpected packet during authentication (first byte 0x{:02X})",
            reply.payload.first().copied().unwrap_or(0)
        ))),
    }
}

/// Backtick-quote an identifier, doubling embedded backticks.
fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn connection_error(kind: ConnectionErrorKind, msg: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind,
        message: msg.into(),
        source: None,
    })
}

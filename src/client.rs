//! The client session.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::Mutex as AsyncMutex;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::query::{
    Query, QueryArrayResult, QueryObjectResult, QueryOptions, QueryResult, ResultMode,
};
use crate::transaction::{Transaction, TransactionOptions};
use crate::types::Param;

/// A single database session over one backend connection.
///
/// Queries on one client are totally ordered: an internal mutex serializes
/// access to the connection, and a new query starts only after the previous
/// one has consumed its terminating ReadyForQuery. While a [`Transaction`]
/// owns the session, session-level queries fail with
/// [`Error::SessionLocked`].
pub struct Client {
    connection: AsyncMutex<Connection>,
    current_transaction: Mutex<Option<String>>,
}

impl Client {
    /// Open a connection and complete the startup handshake.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let connection = Connection::connect(&config).await?;
        Ok(Self {
            connection: AsyncMutex::new(connection),
            current_transaction: Mutex::new(None),
        })
    }

    /// Execute a query and materialize rows as positional vectors.
    pub async fn query_array(&self, text: &str, args: &[Param]) -> Result<QueryArrayResult> {
        self.query_array_with(QueryOptions::new(text, args)).await
    }

    /// Execute a query described by a full [`QueryOptions`] record, rows as
    /// positional vectors.
    pub async fn query_array_with(&self, options: QueryOptions) -> Result<QueryArrayResult> {
        self.ensure_unlocked()?;
        let query = Query::new(options, ResultMode::Array)?;
        Ok(self.execute(&query).await?.into_array())
    }

    /// Execute a query and materialize rows as column-name → value mappings.
    pub async fn query_object(&self, text: &str, args: &[Param]) -> Result<QueryObjectResult> {
        self.query_object_with(QueryOptions::new(text, args)).await
    }

    /// Execute a query described by a full [`QueryOptions`] record, rows as
    /// mappings. `fields` overrides the column names; `camel_case` translates
    /// them.
    pub async fn query_object_with(&self, options: QueryOptions) -> Result<QueryObjectResult> {
        self.ensure_unlocked()?;
        let query = Query::new(options, ResultMode::Object)?;
        Ok(self.execute(&query).await?.into_object())
    }

    /// Create a transaction controller bound to this session.
    ///
    /// The transaction takes effect on [`Transaction::begin`].
    pub fn create_transaction(&self, name: &str, options: TransactionOptions) -> Transaction<'_> {
        Transaction::new(self, name, options)
    }

    /// Name of the transaction currently owning the session, if any.
    pub fn current_transaction(&self) -> Option<String> {
        self.current_transaction.lock().unwrap().clone()
    }

    /// Backend process id of the underlying connection.
    pub async fn backend_pid(&self) -> u32 {
        self.connection.lock().await.backend_pid()
    }

    /// Runtime parameters reported by the backend during startup.
    pub async fn backend_parameters(&self) -> HashMap<String, String> {
        self.connection.lock().await.backend_parameters().clone()
    }

    /// Close the session, sending a Terminate message.
    pub async fn end(&self) -> Result<()> {
        self.connection.lock().await.terminate().await
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if let Some(name) = self.current_transaction.lock().unwrap().as_deref() {
            return Err(Error::SessionLocked(name.to_string()));
        }
        Ok(())
    }

    /// Run a query against the connection, serialized by the session mutex.
    /// Transactions use this path directly, bypassing the session lock check.
    pub(crate) async fn execute(&self, query: &Query) -> Result<QueryResult> {
        let mut connection = self.connection.lock().await;
        connection.query(query).await
    }

    /// Flip the single-writer transaction lock of the session.
    pub(crate) fn set_current_transaction(&self, name: Option<String>) {
        *self.current_transaction.lock().unwrap() = name;
    }

    /// Whether the underlying connection can serve another query. False for
    /// closed connections and for connections poisoned by a cancelled
    /// in-flight query.
    pub(crate) async fn is_healthy(&self) -> bool {
        self.connection.lock().await.is_healthy()
    }
}

//! The transaction controller.
//!
//! A [`Transaction`] serializes its queries against the session that created
//! it: `begin` locks the session, `commit`/`rollback` release it. Savepoints
//! form a multi-instance stack; establishing an existing name again
//! increments its instance count.

use tracing::debug;

use crate::client::Client;
use crate::config::is_identifier;
use crate::error::{Error, Result};
use crate::query::{
    Query, QueryArrayResult, QueryObjectResult, QueryOptions, QueryResult, ResultMode,
};
use crate::types::{Param, Value};

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Each statement sees rows committed before it started.
    #[default]
    ReadCommitted,
    /// The whole transaction sees a snapshot from its first statement.
    RepeatableRead,
    /// Serializable snapshot isolation.
    Serializable,
}

impl IsolationLevel {
    fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Options for creating a transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// Isolation level, defaults to read committed.
    pub isolation_level: IsolationLevel,
    /// Open the transaction in read-only access mode.
    pub read_only: bool,
    /// A snapshot id from [`Transaction::get_snapshot`] to share visibility
    /// with another transaction.
    pub snapshot: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Created,
    Open,
    Ended,
}

/// A savepoint of an open transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    name: String,
    instance_count: usize,
}

impl Savepoint {
    /// The (lowercased) savepoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How many instances of this savepoint are outstanding.
    pub fn instance_count(&self) -> usize {
        self.instance_count
    }
}

/// A client-side transaction bound to one session.
pub struct Transaction<'a> {
    client: &'a Client,
    name: String,
    isolation_level: IsolationLevel,
    read_only: bool,
    snapshot: Option<String>,
    savepoints: Vec<Savepoint>,
    state: TransactionState,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(client: &'a Client, name: &str, options: TransactionOptions) -> Self {
        Self {
            client,
            name: name.to_string(),
            isolation_level: options.isolation_level,
            read_only: options.read_only,
            snapshot: options.snapshot,
            savepoints: Vec::new(),
            state: TransactionState::Created,
        }
    }

    /// The transaction name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured isolation level.
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// Whether the transaction was opened read-only.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// The savepoint stack.
    pub fn savepoints(&self) -> &[Savepoint] {
        &self.savepoints
    }

    /// Open the transaction and lock the session.
    pub async fn begin(&mut self) -> Result<()> {
        if self.state != TransactionState::Created {
            return Err(Error::InvalidUsage(format!(
                "The transaction \"{}\" has already begun",
                self.name
            )));
        }
        if let Some(owner) = self.client.current_transaction() {
            return Err(Error::InvalidUsage(format!(
                "This session already has an ongoing transaction \"{}\"",
                owner
            )));
        }

        let begin = begin_sql(self.read_only, self.isolation_level);
        self.run(&begin).await.map_err(|e| self.wrap(e))?;

        if let Some(snapshot) = self.snapshot.clone() {
            let set = set_snapshot_sql(&snapshot);
            self.run(&set).await.map_err(|e| self.wrap(e))?;
        }

        self.client.set_current_transaction(Some(self.name.clone()));
        self.state = TransactionState::Open;
        debug!(name = %self.name, "transaction open");
        Ok(())
    }

    /// Execute a query inside the transaction, rows as positional vectors.
    pub async fn query_array(&mut self, text: &str, args: &[Param]) -> Result<QueryArrayResult> {
        self.assert_open()?;
        let query = Query::new(QueryOptions::new(text, args), ResultMode::Array)?;
        Ok(self.guarded(&query).await?.into_array())
    }

    /// Execute a query inside the transaction, rows as mappings.
    pub async fn query_object(&mut self, text: &str, args: &[Param]) -> Result<QueryObjectResult> {
        self.assert_open()?;
        let query = Query::new(QueryOptions::new(text, args), ResultMode::Object)?;
        Ok(self.guarded(&query).await?.into_object())
    }

    /// Execute a query described by a full [`QueryOptions`] record, rows as
    /// mappings.
    pub async fn query_object_with(
        &mut self,
        options: QueryOptions,
    ) -> Result<QueryObjectResult> {
        self.assert_open()?;
        let query = Query::new(options, ResultMode::Object)?;
        Ok(self.guarded(&query).await?.into_object())
    }

    /// Commit the transaction and release the session.
    pub async fn commit(&mut self) -> Result<()> {
        self.commit_inner(false).await
    }

    /// Commit and immediately chain a new transaction with the same options.
    /// The session stays locked.
    pub async fn commit_chain(&mut self) -> Result<()> {
        self.commit_inner(true).await
    }

    async fn commit_inner(&mut self, chain: bool) -> Result<()> {
        self.assert_open()?;
        match self.run(&commit_sql(chain)).await {
            Ok(_) => {
                self.savepoints.clear();
                if !chain {
                    self.release_session();
                }
                Ok(())
            }
            Err(error) => {
                self.release_session();
                Err(self.wrap(error))
            }
        }
    }

    /// Roll the whole transaction back and release the session.
    pub async fn rollback(&mut self) -> Result<()> {
        self.rollback_inner(false).await
    }

    /// Roll back and immediately chain a new transaction with the same
    /// options. The session stays locked.
    pub async fn rollback_chain(&mut self) -> Result<()> {
        self.rollback_inner(true).await
    }

    async fn rollback_inner(&mut self, chain: bool) -> Result<()> {
        self.assert_open()?;
        match self.run(&rollback_sql(chain)).await {
            Ok(_) => {
                self.savepoints.clear();
                if !chain {
                    self.release_session();
                }
                Ok(())
            }
            Err(error) => {
                self.release_session();
                Err(self.wrap(error))
            }
        }
    }

    /// Roll back to a savepoint. The transaction stays open and the session
    /// stays locked.
    pub async fn rollback_to(&mut self, savepoint: &str) -> Result<()> {
        self.assert_open()?;
        let name = savepoint.to_lowercase();
        let registered = self
            .savepoints
            .iter()
            .any(|entry| entry.name == name && entry.instance_count > 0);
        if !registered {
            return Err(Error::InvalidUsage(format!(
                "There is no \"{}\" savepoint registered in this transaction",
                name
            )));
        }

        let sql = format!("ROLLBACK TO {}", name);
        self.guarded_sql(&sql).await?;
        Ok(())
    }

    /// Establish a savepoint. An existing name is re-established, raising
    /// its instance count.
    pub async fn savepoint(&mut self, name: &str) -> Result<&Savepoint> {
        self.assert_open()?;
        let name = name.to_lowercase();
        if !is_savepoint_name(&name) {
            return Err(Error::InvalidUsage(format!(
                "The savepoint name \"{}\" is not valid: names are up to 63 \
                 characters of letters, digits and underscores, not starting \
                 with a digit",
                name
            )));
        }

        let sql = format!("SAVEPOINT {}", name);
        self.guarded_sql(&sql).await?;

        Ok(register_savepoint(&mut self.savepoints, &name))
    }

    /// Release one instance of a savepoint.
    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.assert_open()?;
        let name = name.to_lowercase();
        let entry = self
            .savepoints
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| {
                Error::InvalidUsage(format!(
                    "There is no \"{}\" savepoint registered in this transaction",
                    name
                ))
            })?;
        if entry.instance_count == 0 {
            return Err(Error::InvalidUsage(format!(
                "The savepoint \"{}\" has no instances to release",
                name
            )));
        }

        let sql = format!("RELEASE SAVEPOINT {}", name);
        self.guarded_sql(&sql).await?;

        release_savepoint_instance(&mut self.savepoints, &name);
        Ok(())
    }

    /// Export the visibility snapshot of this transaction.
    ///
    /// The returned id can seed another transaction via
    /// [`TransactionOptions::snapshot`].
    pub async fn get_snapshot(&mut self) -> Result<String> {
        self.assert_open()?;
        let query = Query::new(
            QueryOptions::new("SELECT PG_EXPORT_SNAPSHOT()", &[]),
            ResultMode::Array,
        )?;
        let result = self.guarded(&query).await?.into_array();
        match result.rows.first().and_then(|row| row.first()) {
            Some(Value::Text(snapshot)) => Ok(snapshot.clone()),
            other => Err(Error::Decode(format!(
                "Unexpected snapshot result: {:?}",
                other
            ))),
        }
    }

    fn assert_open(&self) -> Result<()> {
        if self.state != TransactionState::Open {
            return Err(Error::InvalidUsage(format!(
                "The transaction \"{}\" has not begun or has already ended",
                self.name
            )));
        }
        match self.client.current_transaction() {
            Some(owner) if owner == self.name => Ok(()),
            _ => Err(Error::InvalidUsage(format!(
                "The transaction \"{}\" no longer owns the session",
                self.name
            ))),
        }
    }

    /// Run SQL on the session, bypassing the session lock.
    async fn run(&self, text: &str) -> Result<QueryResult> {
        let query = Query::new(QueryOptions::new(text, &[]), ResultMode::Array)?;
        self.client.execute(&query).await
    }

    async fn guarded_sql(&mut self, text: &str) -> Result<QueryResult> {
        let query = Query::new(QueryOptions::new(text, &[]), ResultMode::Array)?;
        self.guarded(&query).await
    }

    /// Execute a query; a backend error closes the transaction with a forced
    /// COMMIT (releasing the backend) and surfaces wrapped.
    async fn guarded(&mut self, query: &Query) -> Result<QueryResult> {
        match self.client.execute(query).await {
            Ok(result) => Ok(result),
            Err(error @ Error::Postgres(_)) => {
                if let Err(commit_error) = self.run(&commit_sql(false)).await {
                    debug!(
                        name = %self.name,
                        "commit after failed transaction query also failed: {}",
                        commit_error
                    );
                }
                self.release_session();
                Err(self.wrap(error))
            }
            Err(other) => Err(other),
        }
    }

    fn release_session(&mut self) {
        self.savepoints.clear();
        self.state = TransactionState::Ended;
        self.client.set_current_transaction(None);
    }

    fn wrap(&self, error: Error) -> Error {
        match error {
            wrapped @ Error::Postgres(_) => Error::Transaction {
                name: self.name.clone(),
                source: Box::new(wrapped),
            },
            other => other,
        }
    }
}

fn begin_sql(read_only: bool, isolation_level: IsolationLevel) -> String {
    format!(
        "BEGIN READ {} ISOLATION LEVEL {};",
        if read_only { "ONLY" } else { "WRITE" },
        isolation_level.as_sql()
    )
}

fn set_snapshot_sql(snapshot: &str) -> String {
    format!("SET TRANSACTION SNAPSHOT '{}'", snapshot.replace('\'', "''"))
}

fn commit_sql(chain: bool) -> String {
    format!("COMMIT {}", if chain { "AND CHAIN" } else { "" })
}

fn rollback_sql(chain: bool) -> String {
    format!("ROLLBACK {}", if chain { "AND CHAIN" } else { "" })
}

/// Savepoint names are SQL identifiers of at most 63 bytes.
fn is_savepoint_name(name: &str) -> bool {
    name.len() <= 63 && is_identifier(name)
}

/// Create or re-establish a savepoint entry, raising its instance count.
fn register_savepoint<'s>(savepoints: &'s mut Vec<Savepoint>, name: &str) -> &'s Savepoint {
    match savepoints.iter().position(|entry| entry.name == name) {
        Some(index) => {
            savepoints[index].instance_count += 1;
            &savepoints[index]
        }
        None => {
            savepoints.push(Savepoint {
                name: name.to_string(),
                instance_count: 1,
            });
            savepoints.last().unwrap()
        }
    }
}

/// Drop one instance of an existing savepoint.
fn release_savepoint_instance(savepoints: &mut [Savepoint], name: &str) {
    if let Some(entry) = savepoints.iter_mut().find(|entry| entry.name == name) {
        entry.instance_count -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_sql() {
        assert_eq!(
            begin_sql(true, IsolationLevel::Serializable),
            "BEGIN READ ONLY ISOLATION LEVEL SERIALIZABLE;"
        );
        assert_eq!(
            begin_sql(false, IsolationLevel::ReadCommitted),
            "BEGIN READ WRITE ISOLATION LEVEL READ COMMITTED;"
        );
        assert_eq!(
            begin_sql(false, IsolationLevel::RepeatableRead),
            "BEGIN READ WRITE ISOLATION LEVEL REPEATABLE READ;"
        );
    }

    #[test]
    fn test_commit_and_rollback_sql() {
        assert_eq!(commit_sql(false), "COMMIT ");
        assert_eq!(commit_sql(true), "COMMIT AND CHAIN");
        assert_eq!(rollback_sql(false), "ROLLBACK ");
        assert_eq!(rollback_sql(true), "ROLLBACK AND CHAIN");
    }

    #[test]
    fn test_set_snapshot_sql_escapes_quotes() {
        assert_eq!(
            set_snapshot_sql("00000003-0000001B-1"),
            "SET TRANSACTION SNAPSHOT '00000003-0000001B-1'"
        );
        assert_eq!(set_snapshot_sql("a'b"), "SET TRANSACTION SNAPSHOT 'a''b'");
    }

    #[test]
    fn test_savepoint_name_validation() {
        assert!(is_savepoint_name("sp_1"));
        assert!(is_savepoint_name(&"a".repeat(63)));
        assert!(!is_savepoint_name(&"a".repeat(64)));
        assert!(!is_savepoint_name("1up"));
        assert!(!is_savepoint_name("has space"));
        assert!(!is_savepoint_name(""));
    }

    #[test]
    fn test_savepoint_update_then_release_is_noop() {
        let mut savepoints = Vec::new();
        register_savepoint(&mut savepoints, "sp");
        assert_eq!(savepoints[0].instance_count(), 1);

        register_savepoint(&mut savepoints, "sp");
        assert_eq!(savepoints[0].instance_count(), 2);

        release_savepoint_instance(&mut savepoints, "sp");
        assert_eq!(savepoints[0].instance_count(), 1);
    }

    #[test]
    fn test_savepoint_algebra() {
        // k updates followed by j <= k releases leaves k - j instances
        let (k, j) = (5, 3);
        let mut savepoints = Vec::new();
        for _ in 0..k {
            register_savepoint(&mut savepoints, "sp");
        }
        for _ in 0..j {
            release_savepoint_instance(&mut savepoints, "sp");
        }
        assert_eq!(savepoints[0].instance_count(), k - j);
    }

    #[test]
    fn test_savepoints_are_distinct_by_name() {
        let mut savepoints = Vec::new();
        register_savepoint(&mut savepoints, "a");
        register_savepoint(&mut savepoints, "b");
        register_savepoint(&mut savepoints, "a");
        assert_eq!(savepoints.len(), 2);
        assert_eq!(savepoints[0].instance_count(), 2);
        assert_eq!(savepoints[1].instance_count(), 1);
    }
}

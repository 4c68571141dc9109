//! Query and result types.

use std::collections::{HashMap, HashSet};

use crate::config::is_identifier;
use crate::error::{Error, Notice, Result};
use crate::protocol::backend::{CommandComplete, DataRow, RowDescription};
use crate::protocol::frontend::query::EncodedArg;
use crate::types::{self, Param, Value};

/// How rows of a result are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultMode {
    /// Rows are positional vectors of values.
    #[default]
    Array,
    /// Rows are column-name → value mappings.
    Object,
}

/// The command a completed query executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Insert,
    Delete,
    Update,
    Select,
    Move,
    Fetch,
    Copy,
}

impl CommandType {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "INSERT" => Some(CommandType::Insert),
            "DELETE" => Some(CommandType::Delete),
            "UPDATE" => Some(CommandType::Update),
            "SELECT" => Some(CommandType::Select),
            "MOVE" => Some(CommandType::Move),
            "FETCH" => Some(CommandType::Fetch),
            "COPY" => Some(CommandType::Copy),
            _ => None,
        }
    }
}

/// Options of one query execution.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Query text, with `$n` placeholders for the arguments.
    pub text: String,
    /// Positional arguments.
    pub args: Vec<Param>,
    /// Object-mode only: names overriding the result columns.
    pub fields: Option<Vec<String>>,
    /// Object-mode only: translate snake_case column names to camelCase.
    pub camel_case: bool,
}

impl QueryOptions {
    /// Plain text + positional args.
    pub fn new(text: impl Into<String>, args: &[Param]) -> Self {
        Self {
            text: text.into(),
            args: args.to_vec(),
            ..Self::default()
        }
    }
}

/// A validated query ready to be driven through a connection.
#[derive(Debug, Clone)]
pub(crate) struct Query {
    pub(crate) text: String,
    pub(crate) args: Vec<EncodedArg>,
    pub(crate) result_mode: ResultMode,
    pub(crate) fields: Option<Vec<String>>,
    pub(crate) camel_case: bool,
}

impl Query {
    pub(crate) fn new(options: QueryOptions, result_mode: ResultMode) -> Result<Self> {
        if let Some(fields) = &options.fields {
            for field in fields {
                if !is_identifier(field) {
                    return Err(Error::ResultShape(format!(
                        "The field name \"{}\" is not a valid identifier",
                        field
                    )));
                }
            }
            let unique: HashSet<&String> = fields.iter().collect();
            if unique.len() != fields.len() {
                return Err(Error::ResultShape(
                    "The field names are not unique".into(),
                ));
            }
        }

        let args = options
            .args
            .iter()
            .map(types::encode_param)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            text: options.text,
            args,
            result_mode,
            fields: options.fields,
            camel_case: options.camel_case,
        })
    }
}

/// A result whose rows are positional vectors.
#[derive(Debug, Clone, Default)]
pub struct QueryArrayResult {
    /// Decoded rows.
    pub rows: Vec<Vec<Value>>,
    /// The completed command.
    pub command: Option<CommandType>,
    /// Rows the command affected, when the tag carried a count.
    pub row_count: Option<u64>,
    /// Notices received while the query ran.
    pub warnings: Vec<Notice>,
    /// Column metadata, when the query returned rows.
    pub row_description: Option<RowDescription>,
}

/// A result whose rows are column-name → value mappings.
#[derive(Debug, Clone, Default)]
pub struct QueryObjectResult {
    /// Decoded rows.
    pub rows: Vec<HashMap<String, Value>>,
    /// Resolved column names, set once on the first row.
    pub columns: Vec<String>,
    /// The completed command.
    pub command: Option<CommandType>,
    /// Rows the command affected, when the tag carried a count.
    pub row_count: Option<u64>,
    /// Notices received while the query ran.
    pub warnings: Vec<Notice>,
    /// Column metadata, when the query returned rows.
    pub row_description: Option<RowDescription>,
}

/// Result of one query, shaped per the requested [`ResultMode`].
#[derive(Debug, Clone)]
pub enum QueryResult {
    Array(QueryArrayResult),
    Object(QueryObjectResult),
}

impl QueryResult {
    /// The completed command.
    pub fn command(&self) -> Option<CommandType> {
        match self {
            QueryResult::Array(result) => result.command,
            QueryResult::Object(result) => result.command,
        }
    }

    /// Rows the command affected.
    pub fn row_count(&self) -> Option<u64> {
        match self {
            QueryResult::Array(result) => result.row_count,
            QueryResult::Object(result) => result.row_count,
        }
    }

    /// Notices received while the query ran.
    pub fn warnings(&self) -> &[Notice] {
        match self {
            QueryResult::Array(result) => &result.warnings,
            QueryResult::Object(result) => &result.warnings,
        }
    }

    pub(crate) fn into_array(self) -> QueryArrayResult {
        match self {
            QueryResult::Array(result) => result,
            QueryResult::Object(_) => unreachable!("array result requested"),
        }
    }

    pub(crate) fn into_object(self) -> QueryObjectResult {
        match self {
            QueryResult::Object(result) => result,
            QueryResult::Array(_) => unreachable!("object result requested"),
        }
    }
}

/// Collects the protocol events of one query into a [`QueryResult`].
///
/// Row bytes are decoded as they arrive; object-mode column names are
/// resolved once, on the first row.
#[derive(Debug)]
pub(crate) struct ResultAccumulator {
    mode: ResultMode,
    fields: Option<Vec<String>>,
    camel_case: bool,
    row_description: Option<RowDescription>,
    columns: Option<Vec<String>>,
    array_rows: Vec<Vec<Value>>,
    object_rows: Vec<HashMap<String, Value>>,
    command: Option<CommandType>,
    row_count: Option<u64>,
    warnings: Vec<Notice>,
    completed: bool,
}

impl ResultAccumulator {
    pub(crate) fn new(query: &Query) -> Self {
        Self {
            mode: query.result_mode,
            fields: query.fields.clone(),
            camel_case: query.camel_case,
            row_description: None,
            columns: None,
            array_rows: Vec::new(),
            object_rows: Vec::new(),
            command: None,
            row_count: None,
            warnings: Vec::new(),
            completed: false,
        }
    }

    /// Store the column metadata of the (next) result set.
    pub(crate) fn describe(&mut self, description: RowDescription) {
        self.row_description = Some(description);
        self.columns = None;
    }

    /// Decode and append one row.
    pub(crate) fn add_row(&mut self, row: &DataRow<'_>) -> Result<()> {
        let description = self
            .row_description
            .as_ref()
            .ok_or_else(|| Error::Protocol("DataRow received without a RowDescription".into()))?;
        if row.len() != description.len() {
            return Err(Error::Protocol(format!(
                "DataRow has {} columns, RowDescription announced {}",
                row.len(),
                description.len()
            )));
        }

        let mut values = Vec::with_capacity(row.len());
        for (raw, column) in row.values.iter().zip(&description.columns) {
            values.push(match raw {
                None => Value::Null,
                Some(bytes) => types::decode(bytes, column)?,
            });
        }

        match self.mode {
            ResultMode::Array => self.array_rows.push(values),
            ResultMode::Object => {
                if self.columns.is_none() {
                    self.columns = Some(resolve_columns(
                        self.fields.as_deref(),
                        self.camel_case,
                        description,
                    )?);
                }
                let columns = self.columns.as_ref().unwrap();
                let row_map = columns.iter().cloned().zip(values).collect();
                self.object_rows.push(row_map);
            }
        }
        Ok(())
    }

    /// Record a CommandComplete tag.
    pub(crate) fn complete(&mut self, complete: &CommandComplete) {
        self.completed = true;
        if let Some(command) = complete.command().and_then(CommandType::from_word) {
            self.command = Some(command);
        }
        if let Some(count) = complete.rows_affected() {
            self.row_count = Some(count);
        }
    }

    /// Record a completion that carries no tag (empty query, suspended portal).
    pub(crate) fn complete_empty(&mut self) {
        self.completed = true;
    }

    /// Append a notice to the warnings of the result.
    pub(crate) fn warn(&mut self, notice: Notice) {
        self.warnings.push(notice);
    }

    /// True once a completion event was seen.
    pub(crate) fn is_complete(&self) -> bool {
        self.completed
    }

    pub(crate) fn finish(self) -> QueryResult {
        match self.mode {
            ResultMode::Array => QueryResult::Array(QueryArrayResult {
                rows: self.array_rows,
                command: self.command,
                row_count: self.row_count,
                warnings: self.warnings,
                row_description: self.row_description,
            }),
            ResultMode::Object => QueryResult::Object(QueryObjectResult {
                rows: self.object_rows,
                columns: self.columns.unwrap_or_default(),
                command: self.command,
                row_count: self.row_count,
                warnings: self.warnings,
                row_description: self.row_description,
            }),
        }
    }
}

/// Resolve the object-mode column names: explicit fields override the row
/// description; otherwise names come from the description, optionally
/// camel-cased. Duplicates are rejected.
fn resolve_columns(
    fields: Option<&[String]>,
    camel_case: bool,
    description: &RowDescription,
) -> Result<Vec<String>> {
    let columns: Vec<String> = match fields {
        Some(fields) => {
            if fields.len() != description.len() {
                return Err(Error::ResultShape(format!(
                    "The fields provided ({}) don't match the result columns ({})",
                    fields.len(),
                    description.len()
                )));
            }
            fields.to_vec()
        }
        None => description
            .columns
            .iter()
            .map(|column| {
                if camel_case {
                    snake_to_camel(&column.name)
                } else {
                    column.name.clone()
                }
            })
            .collect(),
    };

    let unique: HashSet<&String> = columns.iter().collect();
    if unique.len() != columns.len() {
        return Err(Error::ResultShape(
            "The result contains duplicate column names".into(),
        ));
    }
    Ok(columns)
}

/// Translate a snake_case name to camelCase.
pub(crate) fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut capitalize_next = false;
    for ch in name.chars() {
        if ch == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            out.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::backend::Column;
    use crate::protocol::types::{oid, FormatCode};

    fn description(names: &[&str]) -> RowDescription {
        RowDescription {
            columns: names
                .iter()
                .map(|name| Column {
                    name: name.to_string(),
                    table_oid: 0,
                    column_id: 0,
                    type_oid: oid::TEXT,
                    type_size: -1,
                    type_modifier: -1,
                    format: FormatCode::Text,
                })
                .collect(),
        }
    }

    fn query(mode: ResultMode, options: QueryOptions) -> Query {
        Query::new(options, mode).unwrap()
    }

    #[test]
    fn test_snake_to_camel() {
        assert_eq!(snake_to_camel("user_id"), "userId");
        assert_eq!(snake_to_camel("a_b_c"), "aBC");
        assert_eq!(snake_to_camel("plain"), "plain");
    }

    #[test]
    fn test_snake_to_camel_is_idempotent() {
        for name in ["user_id", "alreadyCamel", "_leading", "trailing_"] {
            let once = snake_to_camel(name);
            assert_eq!(snake_to_camel(&once), once);
        }
    }

    #[test]
    fn test_query_rejects_invalid_fields() {
        let options = QueryOptions {
            text: "SELECT 1".into(),
            fields: Some(vec!["ok".into(), "not ok".into()]),
            ..Default::default()
        };
        assert!(matches!(
            Query::new(options, ResultMode::Object),
            Err(Error::ResultShape(_))
        ));
    }

    #[test]
    fn test_query_rejects_duplicate_fields() {
        let options = QueryOptions {
            text: "SELECT 1".into(),
            fields: Some(vec!["a".into(), "a".into()]),
            ..Default::default()
        };
        assert!(matches!(
            Query::new(options, ResultMode::Object),
            Err(Error::ResultShape(_))
        ));
    }

    #[test]
    fn test_array_accumulation() {
        let query = query(ResultMode::Array, QueryOptions::new("SELECT x", &[]));
        let mut accumulator = ResultAccumulator::new(&query);
        accumulator.describe(description(&["x"]));
        accumulator
            .add_row(&DataRow {
                values: vec![Some(b"a".as_slice())],
            })
            .unwrap();
        accumulator
            .add_row(&DataRow { values: vec![None] })
            .unwrap();
        accumulator.complete(&CommandComplete {
            tag: "SELECT 2".into(),
        });

        assert!(accumulator.is_complete());
        let result = accumulator.finish().into_array();
        assert_eq!(
            result.rows,
            vec![vec![Value::Text("a".into())], vec![Value::Null]]
        );
        assert_eq!(result.command, Some(CommandType::Select));
        assert_eq!(result.row_count, Some(2));
    }

    #[test]
    fn test_object_accumulation_with_camel_case() {
        let options = QueryOptions {
            text: "SELECT 1".into(),
            camel_case: true,
            ..Default::default()
        };
        let query = query(ResultMode::Object, options);
        let mut accumulator = ResultAccumulator::new(&query);
        accumulator.describe(description(&["user_id"]));
        accumulator
            .add_row(&DataRow {
                values: vec![Some(b"7".as_slice())],
            })
            .unwrap();

        let result = accumulator.finish().into_object();
        assert_eq!(result.columns, vec!["userId"]);
        assert_eq!(result.rows[0]["userId"], Value::Text("7".into()));
    }

    #[test]
    fn test_object_fields_override_and_mismatch() {
        let options = QueryOptions {
            text: "SELECT 1".into(),
            fields: Some(vec!["a".into(), "b".into()]),
            ..Default::default()
        };
        let query = query(ResultMode::Object, options);
        let mut accumulator = ResultAccumulator::new(&query);
        accumulator.describe(description(&["x"]));
        let err = accumulator
            .add_row(&DataRow {
                values: vec![Some(b"1".as_slice())],
            })
            .unwrap_err();
        assert!(matches!(err, Error::ResultShape(_)));
    }

    #[test]
    fn test_object_duplicate_columns_rejected() {
        let query = query(ResultMode::Object, QueryOptions::new("SELECT 1", &[]));
        let mut accumulator = ResultAccumulator::new(&query);
        accumulator.describe(description(&["x", "x"]));
        let err = accumulator
            .add_row(&DataRow {
                values: vec![Some(b"1".as_slice()), Some(b"2".as_slice())],
            })
            .unwrap_err();
        assert!(matches!(err, Error::ResultShape(_)));
    }

    #[test]
    fn test_row_without_description_is_protocol_error() {
        let query = query(ResultMode::Array, QueryOptions::new("SELECT 1", &[]));
        let mut accumulator = ResultAccumulator::new(&query);
        let err = accumulator
            .add_row(&DataRow {
                values: vec![Some(b"1".as_slice())],
            })
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}

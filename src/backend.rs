//! Storage backend boundary.
//!
//! A [`Backend`] executes generated [`Command`]s and reports row data, a
//! scalar, or per-statement output values (generated identities). The
//! traversal engine and command builder depend on nothing else about a
//! backend beyond this contract plus the capability description in
//! [`BackendProfile`].
//!
//! Two collaborators are assumed: a live relational backend (out of
//! crate scope; [`BackendProfile::postgres`] documents its contract) and
//! the in-memory tabular backend in [`memory`].

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use sea_query::Value;
use serde::Deserialize;

use crate::command::{Command, SelectSpec};
use crate::query::Pagination;

/// One result row: an ordered sequence of named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    /// Value of a named column, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Columns in statement order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// First column's value, if any.
    pub fn first(&self) -> Option<&Value> {
        self.columns.first().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Result of executing a write statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Output values reported by the backend, keyed by column name
    /// (generated identities for fields flagged return-on-insert).
    pub output: BTreeMap<String, Value>,
}

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read uncommitted (not supported by PostgreSQL, maps to ReadCommitted)
    ReadUncommitted,
    /// Read committed (default)
    ReadCommitted,
    /// Repeatable read
    RepeatableRead,
    /// Serializable
    Serializable,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        IsolationLevel::ReadCommitted
    }
}

impl IsolationLevel {
    /// SQL syntax for this isolation level.
    pub fn to_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Ambient transaction context handed back by [`Backend::begin`].
///
/// The engine passes it through unchanged to every recursive step so the
/// whole traversal participates in one transaction; it carries no
/// behavior of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionContext {
    pub id: u64,
    pub isolation: IsolationLevel,
}

/// Backend error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Statement execution failed
    Execution(String),
    /// Statement referenced a table the backend does not know
    UnknownTable(String),
    /// Operation the backend does not support
    Unsupported(String),
    /// Transaction already committed or rolled back
    TransactionClosed,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Execution(msg) => {
                write!(f, "Execution error: {msg}")
            }
            BackendError::UnknownTable(table) => {
                write!(f, "Unknown table: {table}")
            }
            BackendError::Unsupported(what) => {
                write!(f, "Unsupported operation: {what}")
            }
            BackendError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
        }
    }
}

impl std::error::Error for BackendError {}

/// Trait for executing generated commands.
///
/// Implementations receive the full [`Command`]: SQL-speaking backends
/// render it to text and bind values, the in-memory backend interprets
/// the structured statement spec directly.
pub trait Backend {
    /// Execute a query and return the full result set.
    fn query(
        &self,
        command: &Command,
        tx: Option<&TransactionContext>,
    ) -> Result<Vec<Row>, BackendError>;

    /// Execute a query and return the first column of the first row.
    fn query_scalar(
        &self,
        command: &Command,
        tx: Option<&TransactionContext>,
    ) -> Result<Option<Value>, BackendError> {
        let rows = self.query(command, tx)?;
        Ok(rows.into_iter().next().and_then(|row| row.first().cloned()))
    }

    /// Execute a write statement and return rows affected plus output
    /// values.
    fn execute(
        &self,
        command: &Command,
        tx: Option<&TransactionContext>,
    ) -> Result<ExecOutcome, BackendError>;

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Backends without transaction support return
    /// `BackendError::Unsupported`.
    fn begin(&self, isolation: IsolationLevel) -> Result<TransactionContext, BackendError>;

    /// Commit a transaction.
    fn commit(&self, tx: TransactionContext) -> Result<(), BackendError>;

    /// Roll back a transaction.
    fn rollback(&self, tx: TransactionContext) -> Result<(), BackendError>;
}

/// Strategy applying a row limit to a select spec as a statement
/// modifier.
pub type RowLimitStrategy = Arc<dyn Fn(&mut SelectSpec, u64) + Send + Sync>;

/// Strategy applying a pagination spec to a select spec.
pub type PaginationStrategy = Arc<dyn Fn(&mut SelectSpec, Pagination) + Send + Sync>;

/// Capability description of a backend, consumed by the command builder.
///
/// The strategy slots are injectable per backend; absent slots make the
/// builder fall back to the behavior documented on each (post-filter row
/// limiting, loud pagination failure).
#[derive(Clone)]
pub struct BackendProfile {
    pub name: &'static str,
    /// Row-limit statement modifier; `None` records the limit for
    /// post-filtering instead.
    pub row_limit: Option<RowLimitStrategy>,
    /// Pagination statement modifier; `None` makes pagination an error
    /// for this backend.
    pub pagination: Option<PaginationStrategy>,
    /// Whether INSERT readback is arranged with a RETURNING clause.
    pub insert_returning: bool,
    pub supports_procedures: bool,
    pub supports_transactions: bool,
}

impl fmt::Debug for BackendProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendProfile")
            .field("name", &self.name)
            .field("row_limit", &self.row_limit.is_some())
            .field("pagination", &self.pagination.is_some())
            .field("insert_returning", &self.insert_returning)
            .field("supports_procedures", &self.supports_procedures)
            .field("supports_transactions", &self.supports_transactions)
            .finish()
    }
}

impl BackendProfile {
    /// Profile of a live PostgreSQL-flavored backend: LIMIT/OFFSET row
    /// limiting and pagination, RETURNING-based insert readback, stored
    /// procedures, transactions.
    pub fn postgres() -> Self {
        Self {
            name: "postgres",
            row_limit: Some(Arc::new(|spec: &mut SelectSpec, limit: u64| {
                let capped = spec.limit.map_or(limit, |l| l.min(limit));
                spec.limit = Some(capped);
            })),
            pagination: Some(Arc::new(|spec: &mut SelectSpec, page: Pagination| {
                spec.limit = Some(page.per_page);
                spec.offset = Some(page.offset());
            })),
            insert_returning: true,
            supports_procedures: true,
            supports_transactions: true,
        }
    }

    /// Profile of the in-memory tabular backend: no statement-level row
    /// limiting, no pagination, no procedures, no transactions.
    pub fn memory() -> Self {
        Self {
            name: "memory",
            row_limit: None,
            pagination: None,
            insert_returning: false,
            supports_procedures: false,
            supports_transactions: false,
        }
    }
}

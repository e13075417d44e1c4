//! In-memory tabular backend.
//!
//! Executes commands by interpreting their structured statement specs
//! over plain in-memory tables: conditions become row predicates, sorts
//! become value comparisons, inserts assign monotonic identities for
//! returned columns that were not supplied. No SQL text is ever parsed.
//!
//! Deliberately unsupported, failing explicitly rather than degrading:
//! transactions, stored procedures, raw filter expressions. Schema
//! qualifiers are ignored; tables are keyed by bare name.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Mutex;

use sea_query::Value;

use crate::backend::{Backend, BackendError, ExecOutcome, IsolationLevel, Row, TransactionContext};
use crate::command::{Command, FilterSpec, Projection, SelectSpec, StatementSpec};
use crate::query::{CompareOp, SortOrder};
use crate::value::{is_null, ColumnType};

#[derive(Debug, Default)]
struct MemTable {
    rows: Vec<BTreeMap<String, Value>>,
    next_identity: i64,
}

/// In-memory tabular backend.
///
/// # Example
///
/// ```
/// use tiderow::backend::memory::MemoryBackend;
/// use tiderow::value::ValueType;
///
/// let backend = MemoryBackend::new();
/// backend.create_table("users");
/// backend.insert_row("users", vec![
///     ("id".into(), 1i32.into_value()),
///     ("name".into(), "Ada".to_string().into_value()),
/// ]);
/// assert_eq!(backend.row_count("users"), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: Mutex<BTreeMap<String, MemTable>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table, replacing nothing if it already exists.
    pub fn create_table(&self, name: &str) {
        let mut tables = self.tables.lock().unwrap();
        tables.entry(name.to_string()).or_default();
    }

    /// Seed one row directly, creating the table if needed. Fixture
    /// helper; engine-driven writes go through [`Backend::execute`].
    pub fn insert_row(&self, table: &str, columns: Vec<(String, Value)>) {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(table.to_string()).or_default();
        table.rows.push(columns.into_iter().collect());
    }

    /// Number of rows currently in a table (zero for unknown tables).
    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.lock().unwrap();
        tables.get(table).map_or(0, |t| t.rows.len())
    }

    fn run_select(&self, command: &Command, spec: &SelectSpec) -> Result<Vec<Row>, BackendError> {
        if spec.filter.raw.is_some() {
            return Err(BackendError::Unsupported(
                "raw filter expressions".to_string(),
            ));
        }
        let tables = self.tables.lock().unwrap();
        let table = tables
            .get(&command.table)
            .ok_or_else(|| BackendError::UnknownTable(command.table.clone()))?;

        let mut matched: Vec<&BTreeMap<String, Value>> = table
            .rows
            .iter()
            .filter(|row| row_matches(row, &spec.filter))
            .collect();

        for sort in spec.sorts.iter().rev() {
            matched.sort_by(|a, b| {
                let ordering = value_cmp(a.get(&sort.column), b.get(&sort.column));
                match sort.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(offset) = spec.offset {
            matched = matched.into_iter().skip(offset as usize).collect();
        }
        if let Some(limit) = spec.limit.or(spec.post_limit) {
            matched.truncate(limit as usize);
        }

        let rows = match &spec.projection {
            Projection::Columns(columns) => matched
                .into_iter()
                .map(|row| {
                    Row::new(
                        columns
                            .iter()
                            .map(|column| {
                                let value = row
                                    .get(column)
                                    .cloned()
                                    .unwrap_or(Value::String(None));
                                (column.clone(), value)
                            })
                            .collect(),
                    )
                })
                .collect(),
            Projection::CountAll => {
                vec![Row::new(vec![(
                    "count".to_string(),
                    Value::BigInt(Some(matched.len() as i64)),
                )])]
            }
        };
        Ok(rows)
    }
}

impl Backend for MemoryBackend {
    fn query(
        &self,
        command: &Command,
        _tx: Option<&TransactionContext>,
    ) -> Result<Vec<Row>, BackendError> {
        match &command.spec {
            StatementSpec::Select(spec) => self.run_select(command, spec),
            StatementSpec::Procedure { name } => Err(BackendError::Unsupported(format!(
                "stored procedure {name}"
            ))),
            other => Err(BackendError::Execution(format!(
                "not a query statement: {other:?}"
            ))),
        }
    }

    fn execute(
        &self,
        command: &Command,
        _tx: Option<&TransactionContext>,
    ) -> Result<ExecOutcome, BackendError> {
        match &command.spec {
            StatementSpec::Insert {
                assignments,
                returning,
                ..
            } => {
                let mut tables = self.tables.lock().unwrap();
                let table = tables
                    .get_mut(&command.table)
                    .ok_or_else(|| BackendError::UnknownTable(command.table.clone()))?;

                let mut row: BTreeMap<String, Value> = assignments
                    .iter()
                    .map(|a| (a.column.clone(), a.value.clone()))
                    .collect();

                let mut output = BTreeMap::new();
                for ret in returning {
                    let current = row.get(&ret.column);
                    let value = match current {
                        Some(value) if !is_null(value) => value.clone(),
                        _ => {
                            // Advance past any seeded values so generated
                            // identities never collide with existing rows.
                            let max_existing = table
                                .rows
                                .iter()
                                .filter_map(|r| r.get(&ret.column).and_then(as_i128))
                                .max()
                                .unwrap_or(0);
                            table.next_identity =
                                (table.next_identity + 1).max(max_existing as i64 + 1);
                            let generated = generate_identity(ret.column_type, table.next_identity);
                            row.insert(ret.column.clone(), generated.clone());
                            generated
                        }
                    };
                    output.insert(ret.column.clone(), value);
                }

                table.rows.push(row);
                Ok(ExecOutcome {
                    rows_affected: 1,
                    output,
                })
            }
            StatementSpec::Update {
                assignments,
                filter,
            } => {
                if filter.raw.is_some() {
                    return Err(BackendError::Unsupported(
                        "raw filter expressions".to_string(),
                    ));
                }
                let mut tables = self.tables.lock().unwrap();
                let table = tables
                    .get_mut(&command.table)
                    .ok_or_else(|| BackendError::UnknownTable(command.table.clone()))?;
                let mut affected = 0u64;
                for row in table.rows.iter_mut() {
                    if !row_matches(row, filter) {
                        continue;
                    }
                    for a in assignments {
                        row.insert(a.column.clone(), a.value.clone());
                    }
                    affected += 1;
                }
                Ok(ExecOutcome {
                    rows_affected: affected,
                    output: BTreeMap::new(),
                })
            }
            StatementSpec::Delete { filter } => {
                if filter.raw.is_some() {
                    return Err(BackendError::Unsupported(
                        "raw filter expressions".to_string(),
                    ));
                }
                let mut tables = self.tables.lock().unwrap();
                let table = tables
                    .get_mut(&command.table)
                    .ok_or_else(|| BackendError::UnknownTable(command.table.clone()))?;
                let before = table.rows.len();
                table.rows.retain(|row| !row_matches(row, filter));
                Ok(ExecOutcome {
                    rows_affected: (before - table.rows.len()) as u64,
                    output: BTreeMap::new(),
                })
            }
            StatementSpec::Procedure { name } => Err(BackendError::Unsupported(format!(
                "stored procedure {name}"
            ))),
            StatementSpec::Select(_) => Err(BackendError::Execution(
                "not a write statement: select".to_string(),
            )),
        }
    }

    fn begin(&self, _isolation: IsolationLevel) -> Result<TransactionContext, BackendError> {
        Err(BackendError::Unsupported("transactions".to_string()))
    }

    fn commit(&self, _tx: TransactionContext) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("transactions".to_string()))
    }

    fn rollback(&self, _tx: TransactionContext) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("transactions".to_string()))
    }
}

fn generate_identity(column_type: ColumnType, next: i64) -> Value {
    match column_type {
        ColumnType::Int => Value::Int(Some(next as i32)),
        ColumnType::BigInt => Value::BigInt(Some(next)),
        // Uuid columns ride as strings in `sea_query::Value`.
        ColumnType::Uuid => Value::String(Some(uuid::Uuid::new_v4().to_string())),
        _ => Value::BigInt(Some(next)),
    }
}

fn row_matches(row: &BTreeMap<String, Value>, filter: &FilterSpec) -> bool {
    filter.conditions.iter().all(|condition| {
        let actual = row.get(&condition.column);
        compare(condition.op, actual, &condition.value)
    })
}

/// Evaluate one comparison. NULL on either side matches nothing, the way
/// SQL comparison semantics treat it.
fn compare(op: CompareOp, actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    if is_null(actual) || is_null(expected) {
        return false;
    }
    match op {
        CompareOp::Eq => value_cmp(Some(actual), Some(expected)) == Ordering::Equal,
        CompareOp::NotEq => value_cmp(Some(actual), Some(expected)) != Ordering::Equal,
        CompareOp::Gt => value_cmp(Some(actual), Some(expected)) == Ordering::Greater,
        CompareOp::GtEq => value_cmp(Some(actual), Some(expected)) != Ordering::Less,
        CompareOp::Lt => value_cmp(Some(actual), Some(expected)) == Ordering::Less,
        CompareOp::LtEq => value_cmp(Some(actual), Some(expected)) != Ordering::Greater,
        CompareOp::Like => match (actual, expected) {
            (Value::String(Some(text)), Value::String(Some(pattern))) => {
                like_match(text, pattern)
            }
            _ => false,
        },
    }
}

/// Order two optional values: absent and NULL sort first, numbers
/// compare numerically across integer widths, everything else compares
/// by its string form.
fn value_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (is_null(a), is_null(b)) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => compare_present(a, b),
        },
    }
}

fn compare_present(a: &Value, b: &Value) -> Ordering {
    if let (Some(a), Some(b)) = (as_i128(a), as_i128(b)) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (as_f64(a), as_f64(b)) {
        return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    }
    match (a, b) {
        (Value::String(Some(a)), Value::String(Some(b))) => a.cmp(b),
        (Value::Bool(Some(a)), Value::Bool(Some(b))) => a.cmp(b),
        (a, b) => format!("{a:?}").cmp(&format!("{b:?}")),
    }
}

fn as_i128(value: &Value) -> Option<i128> {
    match value {
        Value::TinyInt(Some(v)) => Some(*v as i128),
        Value::SmallInt(Some(v)) => Some(*v as i128),
        Value::Int(Some(v)) => Some(*v as i128),
        Value::BigInt(Some(v)) => Some(*v as i128),
        Value::TinyUnsigned(Some(v)) => Some(*v as i128),
        Value::SmallUnsigned(Some(v)) => Some(*v as i128),
        Value::Unsigned(Some(v)) => Some(*v as i128),
        Value::BigUnsigned(Some(v)) => Some(*v as i128),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float(Some(v)) => Some(*v as f64),
        Value::Double(Some(v)) => Some(*v),
        _ => as_i128(value).map(|v| v as f64),
    }
}

/// SQL LIKE over `%` (any run) and `_` (any one character).
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    fn matches(text: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('%', rest)) => {
                (0..=text.len()).any(|skip| matches(&text[skip..], rest))
            }
            Some(('_', rest)) => !text.is_empty() && matches(&text[1..], rest),
            Some((ch, rest)) => {
                text.first() == Some(ch) && matches(&text[1..], rest)
            }
        }
    }
    matches(&text, &pattern)
}

//! The dynamic command builder.
//!
//! Translates a [`QueryDescriptor`] or a single entity's change-state
//! into an executable [`Command`]: a structured statement spec plus an
//! ordered, name-deduplicated parameter list. SQL-speaking backends
//! render the command to text with `sea-query`'s `PostgresQueryBuilder`
//! via [`Command::to_sql`]; the in-memory backend interprets the
//! structured spec directly, so no backend ever parses SQL.
//!
//! Statement kind is decided from context: SELECT for queries; for a
//! single entity, INSERT if new, else UPDATE if dirty, else DELETE if
//! marked deleted, else no command at all (the caller must skip
//! execution entirely).

use std::fmt;

use sea_query::{
    DeleteStatement, Expr, ExprTrait, InsertStatement, IntoIden, Order, PostgresQueryBuilder,
    SchemaName, SelectStatement, TableName, UpdateStatement, Value, Values,
};

use crate::backend::BackendProfile;
use crate::config::EngineConfig;
use crate::entity::Entity;
use crate::mapping::{FieldMapping, MappingError, StatementKind, TableMapping};
use crate::query::{CompareOp, Condition, ConditionSubject, QueryDescriptor, SortItem, SortOrder};

/// One named bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
}

/// A condition with its subject resolved to a concrete column.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCondition {
    pub column: String,
    pub op: CompareOp,
    pub param: String,
    pub value: Value,
}

/// A resolved ORDER BY item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSort {
    pub column: String,
    pub order: SortOrder,
}

/// WHERE clause of a resolved statement: ANDed conditions in
/// declaration order, or a raw expression overriding them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub conditions: Vec<ResolvedCondition>,
    pub raw: Option<String>,
}

/// Column list of a resolved SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Explicit column list (all mapped columns unless overridden).
    Columns(Vec<String>),
    /// `COUNT(*)` aggregate.
    CountAll,
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Columns(Vec::new())
    }
}

/// Resolved SELECT statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectSpec {
    pub projection: Projection,
    pub filter: FilterSpec,
    pub sorts: Vec<ResolvedSort>,
    /// Statement-level row limit (rendered into SQL).
    pub limit: Option<u64>,
    /// Statement-level row offset (rendered into SQL).
    pub offset: Option<u64>,
    /// Row limit with no statement-level mechanism available; the caller
    /// truncates the result set after execution.
    pub post_limit: Option<u64>,
}

/// One column assignment of an INSERT or UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub param: String,
    pub value: Value,
}

/// One column whose generated value is read back after INSERT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturningColumn {
    pub column: String,
    pub column_type: crate::value::ColumnType,
}

/// Resolved statement body.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementSpec {
    Select(SelectSpec),
    Insert {
        assignments: Vec<Assignment>,
        /// Columns whose generated values the backend reports back.
        returning: Vec<ReturningColumn>,
        /// Whether readback is rendered as a RETURNING clause.
        returning_rendered: bool,
    },
    Update {
        assignments: Vec<Assignment>,
        filter: FilterSpec,
    },
    Delete {
        filter: FilterSpec,
    },
    /// Stored-procedure invocation in place of ad-hoc SQL.
    Procedure { name: String },
}

/// An executable command: statement spec plus ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: StatementKind,
    pub table: String,
    pub schema: Option<String>,
    pub spec: StatementSpec,
    params: Vec<Parameter>,
}

impl Command {
    fn new(kind: StatementKind, table: &str, schema: Option<String>, spec: StatementSpec) -> Self {
        Self {
            kind,
            table: table.to_string(),
            schema,
            spec,
            params: Vec::new(),
        }
    }

    /// Bound parameters in clause order.
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Value bound under a parameter name.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// Append a parameter unless the name is already bound. The first
    /// binding of a name wins; the same name referenced by multiple
    /// clauses is emitted once.
    fn push_param(&mut self, name: String, value: Value) {
        if self.params.iter().any(|p| p.name == name) {
            return;
        }
        self.params.push(Parameter { name, value });
    }

    /// Render statement text plus positional bind values for a
    /// SQL-speaking backend.
    pub fn to_sql(&self) -> (String, Values) {
        let table = table_ref(self.schema.as_deref(), &self.table);
        match &self.spec {
            StatementSpec::Select(spec) => {
                let mut stmt = SelectStatement::default();
                match &spec.projection {
                    Projection::Columns(columns) => {
                        for column in columns {
                            stmt.column(column.clone().into_iden());
                        }
                    }
                    Projection::CountAll => {
                        stmt.expr(Expr::cust("COUNT(*)"));
                    }
                }
                stmt.from(table);
                apply_filter(&mut stmt, &spec.filter);
                for sort in &spec.sorts {
                    let order = match sort.order {
                        SortOrder::Asc => Order::Asc,
                        SortOrder::Desc => Order::Desc,
                    };
                    stmt.order_by(sort.column.clone().into_iden(), order);
                }
                if let Some(limit) = spec.limit {
                    stmt.limit(limit);
                }
                if let Some(offset) = spec.offset {
                    stmt.offset(offset);
                }
                stmt.build(PostgresQueryBuilder)
            }
            StatementSpec::Insert {
                assignments,
                returning,
                returning_rendered,
            } => {
                let mut stmt = InsertStatement::default();
                stmt.into_table(table);
                stmt.columns(assignments.iter().map(|a| a.column.clone().into_iden()));
                stmt.values_panic(assignments.iter().map(|a| Expr::val(a.value.clone())));
                if *returning_rendered && !returning.is_empty() {
                    if returning.len() == 1 {
                        stmt.returning_col(returning[0].column.clone().into_iden());
                    } else {
                        stmt.returning_col(sea_query::Asterisk);
                    }
                }
                stmt.build(PostgresQueryBuilder)
            }
            StatementSpec::Update {
                assignments,
                filter,
            } => {
                let mut stmt = UpdateStatement::default();
                stmt.table(table);
                for a in assignments {
                    stmt.value(a.column.clone().into_iden(), Expr::val(a.value.clone()));
                }
                apply_filter(&mut stmt, filter);
                stmt.build(PostgresQueryBuilder)
            }
            StatementSpec::Delete { filter } => {
                let mut stmt = DeleteStatement::default();
                stmt.from_table(table);
                apply_filter(&mut stmt, filter);
                stmt.build(PostgresQueryBuilder)
            }
            StatementSpec::Procedure { name } => {
                let placeholders: Vec<String> =
                    (1..=self.params.len()).map(|i| format!("${i}")).collect();
                let invocation = match self.kind {
                    StatementKind::Select => {
                        format!("SELECT * FROM {}({})", name, placeholders.join(", "))
                    }
                    _ => format!("CALL {}({})", name, placeholders.join(", ")),
                };
                let values = Values(self.params.iter().map(|p| p.value.clone()).collect());
                (invocation, values)
            }
        }
    }
}

/// Build a schema-qualified table reference.
fn table_ref(schema: Option<&str>, table: &str) -> TableName {
    match schema {
        Some(schema) => TableName(
            Some(SchemaName::from(schema.to_string())),
            table.to_string().into_iden(),
        ),
        None => TableName(None, table.to_string().into_iden()),
    }
}

trait ConditionalStatement {
    fn and_where_expr(&mut self, expr: Expr);
}

impl ConditionalStatement for SelectStatement {
    fn and_where_expr(&mut self, expr: Expr) {
        self.and_where(expr);
    }
}

impl ConditionalStatement for UpdateStatement {
    fn and_where_expr(&mut self, expr: Expr) {
        self.and_where(expr);
    }
}

impl ConditionalStatement for DeleteStatement {
    fn and_where_expr(&mut self, expr: Expr) {
        self.and_where(expr);
    }
}

fn apply_filter<S: ConditionalStatement>(stmt: &mut S, filter: &FilterSpec) {
    if let Some(raw) = &filter.raw {
        stmt.and_where_expr(Expr::cust(raw.clone()));
        return;
    }
    for condition in &filter.conditions {
        let column = Expr::col(condition.column.clone().into_iden());
        let value = Expr::val(condition.value.clone());
        let expr = match condition.op {
            CompareOp::Eq => column.eq(value),
            CompareOp::NotEq => column.ne(value),
            CompareOp::Gt => column.gt(value),
            CompareOp::GtEq => column.gte(value),
            CompareOp::Lt => column.lt(value),
            CompareOp::LtEq => column.lte(value),
            CompareOp::Like => {
                let pattern = match &condition.value {
                    Value::String(Some(s)) => s.clone(),
                    other => format!("{other:?}"),
                };
                column.like(pattern)
            }
        };
        stmt.and_where_expr(expr);
    }
}

/// Command builder error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Condition or sort subject could not be resolved against the
    /// mapping
    Mapping(MappingError),
    /// Pagination requested against a backend with no pagination
    /// strategy
    PaginationUnsupported { backend: &'static str },
    /// Mapping names a stored procedure but the backend cannot invoke
    /// procedures
    ProceduresUnsupported { backend: &'static str },
    /// Ad-hoc-only feature used against a stored-procedure-backed
    /// statement
    ProcedureAdHoc {
        procedure: String,
        feature: &'static str,
    },
    /// LIKE condition with a non-string pattern
    LikePattern { column: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Mapping(err) => write!(f, "{err}"),
            CommandError::PaginationUnsupported { backend } => {
                write!(f, "Backend {backend} has no pagination strategy")
            }
            CommandError::ProceduresUnsupported { backend } => {
                write!(f, "Backend {backend} cannot invoke stored procedures")
            }
            CommandError::ProcedureAdHoc { procedure, feature } => {
                write!(
                    f,
                    "Stored procedure {procedure} does not accept {feature}"
                )
            }
            CommandError::LikePattern { column } => {
                write!(f, "LIKE condition on {column} requires a string pattern")
            }
        }
    }
}

impl std::error::Error for CommandError {}

impl From<MappingError> for CommandError {
    fn from(err: MappingError) -> Self {
        CommandError::Mapping(err)
    }
}

/// Builds executable commands from mapping metadata plus either a query
/// descriptor or an entity's change-state.
///
/// # Example
///
/// ```
/// use tiderow::backend::BackendProfile;
/// use tiderow::command::CommandBuilder;
/// use tiderow::config::EngineConfig;
/// use tiderow::mapping::{TableMapping, FieldMapping};
/// use tiderow::query::{QueryDescriptor, CompareOp};
/// use tiderow::value::{ColumnType, ValueType};
///
/// let mapping = TableMapping::new("User", "users")
///     .field(FieldMapping::new("id", "id", ColumnType::Int).primary_key())
///     .field(FieldMapping::new("name", "name", ColumnType::Text));
///
/// let config = EngineConfig::default();
/// let profile = BackendProfile::postgres();
/// let builder = CommandBuilder::new(&config, &profile);
///
/// let query = QueryDescriptor::new().filter("id", CompareOp::Eq, 1i32.into_value());
/// let command = builder.select(&mapping, &query).unwrap();
/// let (sql, _values) = command.to_sql();
/// assert_eq!(sql, r#"SELECT "id", "name" FROM "users" WHERE "id" = $1"#);
/// ```
pub struct CommandBuilder<'a> {
    config: &'a EngineConfig,
    profile: &'a BackendProfile,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(config: &'a EngineConfig, profile: &'a BackendProfile) -> Self {
        Self { config, profile }
    }

    fn schema_for(&self, mapping: &TableMapping) -> Option<String> {
        mapping
            .schema
            .clone()
            .or_else(|| self.config.default_schema.clone())
    }

    /// Build a SELECT command for a query descriptor.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` for unresolvable subjects, pagination
    /// without a strategy, or ad-hoc features against a
    /// stored-procedure-backed mapping.
    pub fn select(
        &self,
        mapping: &TableMapping,
        query: &QueryDescriptor,
    ) -> Result<Command, CommandError> {
        self.select_with_projection(mapping, query, None)
    }

    /// Build a SELECT command with an explicit override column list
    /// (used for aggregate queries).
    pub fn select_with_projection(
        &self,
        mapping: &TableMapping,
        query: &QueryDescriptor,
        columns: Option<Vec<String>>,
    ) -> Result<Command, CommandError> {
        if let Some(procedure) = mapping.procedures.get(StatementKind::Select) {
            return self.procedure_query(mapping, procedure, query, StatementKind::Select);
        }

        let mut command = Command::new(
            StatementKind::Select,
            &mapping.table,
            self.schema_for(mapping),
            StatementSpec::Select(SelectSpec::default()),
        );

        let projection = match columns {
            Some(columns) => Projection::Columns(columns),
            None => Projection::Columns(mapping.fields.iter().map(|f| f.column.clone()).collect()),
        };
        let filter = self.resolve_filter(mapping, query, StatementKind::Select, &mut command)?;
        let mut sorts = resolve_sorts(mapping, &query.sorts)?;

        let mut spec = SelectSpec {
            projection,
            filter,
            sorts: Vec::new(),
            limit: None,
            offset: None,
            post_limit: None,
        };

        if let Some(limit) = query.limit {
            match &self.profile.row_limit {
                Some(strategy) => strategy(&mut spec, limit),
                // No statement-level mechanism: record the limit for
                // post-filtering; a limit of one takes the single-row
                // path in the engine.
                None => spec.post_limit = Some(limit),
            }
        }

        if let Some(pagination) = query.pagination.filter(|p| p.is_bounded()) {
            // Paging requires a deterministic order; inject primary-key
            // ascending sorts when the caller specified none.
            if sorts.is_empty() {
                for pk in mapping.primary_key_fields() {
                    sorts.push(ResolvedSort {
                        column: pk.column.clone(),
                        order: SortOrder::Asc,
                    });
                }
            }
            let strategy = self.profile.pagination.as_ref().ok_or(
                CommandError::PaginationUnsupported {
                    backend: self.profile.name,
                },
            )?;
            strategy(&mut spec, pagination);
        }
        spec.sorts = sorts;

        log::debug!(
            "select on {} ({} conditions, {} params)",
            mapping.table,
            spec.filter.conditions.len(),
            command.params.len()
        );
        command.spec = StatementSpec::Select(spec);
        Ok(command)
    }

    /// Build a `COUNT(*)` command for a query descriptor. Sort order,
    /// row limits, and pagination do not affect the count and are
    /// dropped.
    pub fn count(
        &self,
        mapping: &TableMapping,
        query: &QueryDescriptor,
    ) -> Result<Command, CommandError> {
        if let Some(procedure) = mapping.procedures.get(StatementKind::Select) {
            return Err(CommandError::ProcedureAdHoc {
                procedure: procedure.to_string(),
                feature: "aggregate projection",
            });
        }
        let mut command = Command::new(
            StatementKind::Select,
            &mapping.table,
            self.schema_for(mapping),
            StatementSpec::Select(SelectSpec::default()),
        );
        let filter = self.resolve_filter(mapping, query, StatementKind::Select, &mut command)?;
        command.spec = StatementSpec::Select(SelectSpec {
            projection: Projection::CountAll,
            filter,
            ..SelectSpec::default()
        });
        Ok(command)
    }

    /// Build the command for a single entity's current change-state, or
    /// `None` when the state is clean and the caller must skip execution
    /// entirely.
    pub fn entity_command(
        &self,
        entity: &Entity,
        query: Option<&QueryDescriptor>,
    ) -> Result<Option<Command>, CommandError> {
        let state = entity.state();
        if state.is_new {
            self.insert(entity).map(Some)
        } else if state.is_dirty {
            self.update(entity, query).map(Some)
        } else if state.mark_deleted {
            self.delete(entity, query).map(Some)
        } else {
            Ok(None)
        }
    }

    fn insert(&self, entity: &Entity) -> Result<Command, CommandError> {
        let mapping = entity.mapping().clone();
        if let Some(procedure) = mapping.procedures.get(StatementKind::Insert) {
            return self.procedure_entity(entity, procedure, StatementKind::Insert);
        }

        let mut command = Command::new(
            StatementKind::Insert,
            &mapping.table,
            self.schema_for(&mapping),
            StatementSpec::Select(SelectSpec::default()),
        );

        let mut assignments = Vec::new();
        for field in mapping.fields.iter().filter(|f| f.include_on_insert) {
            let value = entity
                .get(&field.member)
                .cloned()
                .unwrap_or_else(|| field.null_value());
            let param = field.param_name(StatementKind::Insert);
            command.push_param(param.clone(), value.clone());
            assignments.push(Assignment {
                column: field.column.clone(),
                param,
                value,
            });
        }
        // Relationship local columns not covered by a field mapping are
        // still part of the row.
        for relation in &mapping.relations {
            let column = &relation.local_column;
            if mapping.field_by_column(column).is_some()
                || assignments.iter().any(|a| &a.column == column)
            {
                continue;
            }
            let value = entity
                .get(column)
                .cloned()
                .unwrap_or(Value::String(None));
            let param = format!("i_{column}");
            command.push_param(param.clone(), value.clone());
            assignments.push(Assignment {
                column: column.clone(),
                param,
                value,
            });
        }

        let returning: Vec<ReturningColumn> = mapping
            .output_fields()
            .iter()
            .map(|f| ReturningColumn {
                column: f.column.clone(),
                column_type: f.column_type,
            })
            .collect();

        log::debug!(
            "insert into {} ({} columns, {} outputs)",
            mapping.table,
            assignments.len(),
            returning.len()
        );
        command.spec = StatementSpec::Insert {
            assignments,
            returning,
            returning_rendered: self.profile.insert_returning,
        };
        Ok(command)
    }

    fn update(
        &self,
        entity: &Entity,
        query: Option<&QueryDescriptor>,
    ) -> Result<Command, CommandError> {
        let mapping = entity.mapping().clone();
        if let Some(procedure) = mapping.procedures.get(StatementKind::Update) {
            return self.procedure_entity(entity, procedure, StatementKind::Update);
        }

        let mut command = Command::new(
            StatementKind::Update,
            &mapping.table,
            self.schema_for(&mapping),
            StatementSpec::Select(SelectSpec::default()),
        );

        let mut assignments = Vec::new();
        for field in &mapping.fields {
            if !self.config.update_all_columns && !entity.is_modified(&field.member) {
                continue;
            }
            let value = entity
                .get(&field.member)
                .cloned()
                .unwrap_or_else(|| field.null_value());
            let param = field.param_name(StatementKind::Update);
            command.push_param(param.clone(), value.clone());
            assignments.push(Assignment {
                column: field.column.clone(),
                param,
                value,
            });
        }

        let filter = match query {
            Some(query) if !query.is_unfiltered() => {
                self.resolve_filter(&mapping, query, StatementKind::Select, &mut command)?
            }
            _ => identity_filter(&mapping, entity, StatementKind::Select, &mut command),
        };

        log::debug!(
            "update {} ({} assignments)",
            mapping.table,
            assignments.len()
        );
        command.spec = StatementSpec::Update {
            assignments,
            filter,
        };
        Ok(command)
    }

    fn delete(
        &self,
        entity: &Entity,
        query: Option<&QueryDescriptor>,
    ) -> Result<Command, CommandError> {
        let mapping = entity.mapping().clone();
        if let Some(procedure) = mapping.procedures.get(StatementKind::Delete) {
            return self.procedure_entity(entity, procedure, StatementKind::Delete);
        }

        let mut command = Command::new(
            StatementKind::Delete,
            &mapping.table,
            self.schema_for(&mapping),
            StatementSpec::Select(SelectSpec::default()),
        );

        let filter = match query {
            Some(query) if !query.is_unfiltered() => {
                self.resolve_filter(&mapping, query, StatementKind::Delete, &mut command)?
            }
            _ => identity_filter(&mapping, entity, StatementKind::Delete, &mut command),
        };

        log::debug!("delete from {}", mapping.table);
        command.spec = StatementSpec::Delete { filter };
        Ok(command)
    }

    /// Stored-procedure SELECT: equality conditions become procedure
    /// parameters; every ad-hoc-only descriptor feature is rejected.
    fn procedure_query(
        &self,
        mapping: &TableMapping,
        procedure: &str,
        query: &QueryDescriptor,
        kind: StatementKind,
    ) -> Result<Command, CommandError> {
        if !self.profile.supports_procedures {
            return Err(CommandError::ProceduresUnsupported {
                backend: self.profile.name,
            });
        }
        let reject = |feature: &'static str| CommandError::ProcedureAdHoc {
            procedure: procedure.to_string(),
            feature,
        };
        if query.raw_filter.is_some() {
            return Err(reject("a raw filter expression"));
        }
        if !query.sorts.is_empty() {
            return Err(reject("sort items"));
        }
        if query.pagination.is_some_and(|p| p.is_bounded()) {
            return Err(reject("pagination"));
        }

        let mut command = Command::new(
            kind,
            &mapping.table,
            self.schema_for(mapping),
            StatementSpec::Procedure {
                name: procedure.to_string(),
            },
        );
        for condition in &query.conditions {
            if condition.op != CompareOp::Eq {
                return Err(reject("a non-equality condition"));
            }
            let (_, param) = resolve_subject(mapping, &condition.subject, kind)?;
            command.push_param(param, condition.value.clone());
        }
        Ok(command)
    }

    /// Stored-procedure INSERT/UPDATE/DELETE: every mapped field is
    /// bound under its parameter name for the statement kind.
    fn procedure_entity(
        &self,
        entity: &Entity,
        procedure: &str,
        kind: StatementKind,
    ) -> Result<Command, CommandError> {
        if !self.profile.supports_procedures {
            return Err(CommandError::ProceduresUnsupported {
                backend: self.profile.name,
            });
        }
        let mapping = entity.mapping().clone();
        let mut command = Command::new(
            kind,
            &mapping.table,
            self.schema_for(&mapping),
            StatementSpec::Procedure {
                name: procedure.to_string(),
            },
        );
        for field in &mapping.fields {
            let value = entity
                .get(&field.member)
                .cloned()
                .unwrap_or_else(|| field.null_value());
            command.push_param(field.param_name(kind), value);
        }
        Ok(command)
    }

    fn resolve_filter(
        &self,
        mapping: &TableMapping,
        query: &QueryDescriptor,
        where_kind: StatementKind,
        command: &mut Command,
    ) -> Result<FilterSpec, CommandError> {
        if let Some(raw) = &query.raw_filter {
            return Ok(FilterSpec {
                conditions: Vec::new(),
                raw: Some(raw.clone()),
            });
        }
        let mut conditions = Vec::new();
        for condition in &query.conditions {
            conditions.push(resolve_condition(mapping, condition, where_kind, command)?);
        }
        Ok(FilterSpec {
            conditions,
            raw: None,
        })
    }
}

/// Resolve a condition subject to its column and parameter name.
///
/// Member subjects must resolve against the mapping; raw column
/// subjects use a mapped field's parameter name when one covers the
/// column, and the column name itself otherwise.
fn resolve_subject(
    mapping: &TableMapping,
    subject: &ConditionSubject,
    kind: StatementKind,
) -> Result<(String, String), CommandError> {
    match subject {
        ConditionSubject::Member(member) => {
            let field = mapping.field_by_member(member).ok_or_else(|| {
                MappingError::UnknownMember {
                    mapping: mapping.name.clone(),
                    member: member.clone(),
                }
            })?;
            Ok((field.column.clone(), field.param_name(kind)))
        }
        ConditionSubject::Column(column) => match mapping.field_by_column(column) {
            Some(field) => Ok((field.column.clone(), field.param_name(kind))),
            None => Ok((column.clone(), column.clone())),
        },
    }
}

fn resolve_condition(
    mapping: &TableMapping,
    condition: &Condition,
    kind: StatementKind,
    command: &mut Command,
) -> Result<ResolvedCondition, CommandError> {
    let (column, param) = resolve_subject(mapping, &condition.subject, kind)?;
    if condition.op == CompareOp::Like && !matches!(condition.value, Value::String(Some(_))) {
        return Err(CommandError::LikePattern { column });
    }
    command.push_param(param.clone(), condition.value.clone());
    Ok(ResolvedCondition {
        column,
        op: condition.op,
        param,
        value: condition.value.clone(),
    })
}

fn resolve_sorts(
    mapping: &TableMapping,
    sorts: &[SortItem],
) -> Result<Vec<ResolvedSort>, CommandError> {
    let mut resolved = Vec::new();
    for sort in sorts {
        let column = match &sort.subject {
            ConditionSubject::Member(member) => mapping
                .field_by_member(member)
                .map(|f| f.column.clone())
                .ok_or_else(|| MappingError::UnknownMember {
                    mapping: mapping.name.clone(),
                    member: member.clone(),
                })?,
            ConditionSubject::Column(column) => column.clone(),
        };
        resolved.push(ResolvedSort {
            column,
            order: sort.order,
        });
    }
    Ok(resolved)
}

/// Identity condition for UPDATE/DELETE when no query is supplied:
/// primary-key columns when declared, every field otherwise.
///
/// Policy preserved from the source system: a field in the modified set
/// binds its ORIGINAL value (so the statement matches the pre-change
/// row), an unmodified field binds its current value.
fn identity_filter(
    mapping: &TableMapping,
    entity: &Entity,
    kind: StatementKind,
    command: &mut Command,
) -> FilterSpec {
    let pk_fields = mapping.primary_key_fields();
    let fields: Vec<&FieldMapping> = if pk_fields.is_empty() {
        mapping.fields.iter().collect()
    } else {
        pk_fields
    };

    let mut conditions = Vec::new();
    for field in fields {
        let value = if entity.is_modified(&field.member) {
            entity.get_original(&field.member)
        } else {
            entity.get(&field.member)
        };
        let value = value.cloned().unwrap_or_else(|| field.null_value());
        let param = field.param_name(kind);
        command.push_param(param.clone(), value.clone());
        conditions.push(ResolvedCondition {
            column: field.column.clone(),
            op: CompareOp::Eq,
            param,
            value,
        });
    }
    FilterSpec {
        conditions,
        raw: None,
    }
}

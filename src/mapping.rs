//! Mapping metadata: per-entity-type descriptions of columns, primary
//! keys, relationships, and stored-procedure overrides.
//!
//! Mappings are plain data. The attribute/derive surface that would
//! normally produce them is out of scope here; callers construct
//! [`TableMapping`] values directly (fluent setters keep that readable)
//! and register them in a [`MappingRegistry`] for lookup by name during
//! traversal.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::value::ColumnType;

/// Statement kind a command is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    /// Short prefix used when deriving default parameter names.
    fn param_prefix(self) -> &'static str {
        match self {
            StatementKind::Select => "s",
            StatementKind::Insert => "i",
            StatementKind::Update => "u",
            StatementKind::Delete => "d",
        }
    }
}

/// Type of relationship between a source entity and a target member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// One-to-one relationship
    OneToOne,
    /// Many-to-one relationship (belongs_to)
    ManyToOne,
    /// One-to-many relationship
    OneToMany,
    /// Many-to-many relationship via a junction table
    ManyToMany,
}

impl RelationKind {
    /// Whether the target member holds a collection.
    pub fn is_many(self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

/// Junction table implementing a many-to-many relationship.
///
/// The junction table is expected to carry columns named after the
/// relation's local and related columns. A `ManyToMany` relation without
/// a junction degrades to one-to-many semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junction {
    pub table: String,
    pub schema: Option<String>,
}

impl Junction {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: None,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// Target of a relationship: either another registered mapping, or a
/// plain scalar column on some table.
///
/// Scalar targets cover members whose element type is not itself a mapped
/// entity; traversal wraps them in a synthesized single-field mapping and
/// unwraps the values before assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationTarget {
    /// A mapping registered under this name.
    Mapped(String),
    /// A bare column on a table with no mapping of its own.
    Scalar { table: String, column: String },
}

/// One navigable relationship from a source entity type to a target
/// member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMapping {
    /// Member on the source entity the loaded result is assigned to.
    pub member: String,
    pub kind: RelationKind,
    /// Join column on the source table.
    pub local_column: String,
    /// Join column on the related (or junction) table.
    pub related_column: String,
    pub target: RelationTarget,
    /// Junction table, many-to-many only.
    pub junction: Option<Junction>,
}

impl RelationMapping {
    pub fn new(
        member: impl Into<String>,
        kind: RelationKind,
        local_column: impl Into<String>,
        related_column: impl Into<String>,
        target: RelationTarget,
    ) -> Self {
        Self {
            member: member.into(),
            kind,
            local_column: local_column.into(),
            related_column: related_column.into(),
            target,
            junction: None,
        }
    }

    pub fn junction(mut self, junction: Junction) -> Self {
        self.junction = Some(junction);
        self
    }

    /// Whether the loaded result is assigned as a collection.
    ///
    /// `ManyToMany` without a junction degrades to one-to-many, which is
    /// still collection-valued.
    pub fn is_many(&self) -> bool {
        self.kind.is_many()
    }
}

/// Field-level foreign reference: after the owning entity is loaded, a
/// single related entity is fetched by `column = <field value>` on the
/// `mapping` and assigned into `member`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignRef {
    /// Registered mapping name of the referenced entity type.
    pub mapping: String,
    /// Column on the referenced table the field value is matched against.
    pub column: String,
    /// Member on the owning entity the result is assigned to.
    pub member: String,
}

/// Binds one entity member to one table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    /// Member name on the entity.
    pub member: String,
    /// Column name in the table.
    pub column: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub size: Option<u32>,
    /// Part of the primary key. Primary-key fields must be addressable by
    /// exact-equality condition for update/delete identification.
    pub primary_key: bool,
    /// Value is generated by the backend (auto-increment / identity).
    pub identity: bool,
    /// Column appears in generated INSERT column lists.
    pub include_on_insert: bool,
    /// After INSERT, the backend-generated value is read back into this
    /// field.
    pub return_on_insert: bool,
    /// Optional per-statement parameter name overrides.
    param_names: BTreeMap<&'static str, String>,
    pub foreign: Option<ForeignRef>,
}

impl FieldMapping {
    pub fn new(member: impl Into<String>, column: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            member: member.into(),
            column: column.into(),
            column_type,
            nullable: false,
            size: None,
            primary_key: false,
            identity: false,
            include_on_insert: true,
            return_on_insert: false,
            param_names: BTreeMap::new(),
            foreign: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Mark as (part of) the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark as backend-generated: excluded from INSERT column lists and
    /// read back as an output value after the insert executes.
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self.include_on_insert = false;
        self.return_on_insert = true;
        self
    }

    pub fn exclude_on_insert(mut self) -> Self {
        self.include_on_insert = false;
        self
    }

    pub fn return_on_insert(mut self) -> Self {
        self.return_on_insert = true;
        self
    }

    /// Override the parameter name used for one statement kind.
    pub fn param_name_for(mut self, kind: StatementKind, name: impl Into<String>) -> Self {
        self.param_names.insert(kind.param_prefix(), name.into());
        self
    }

    pub fn foreign(mut self, foreign: ForeignRef) -> Self {
        self.foreign = Some(foreign);
        self
    }

    /// Parameter name for this field in a statement of the given kind.
    ///
    /// Defaults to `<prefix>_<column>` with a per-kind prefix, so the same
    /// column can be bound in a SET list and an identity condition of one
    /// statement without the names colliding.
    pub fn param_name(&self, kind: StatementKind) -> String {
        match self.param_names.get(kind.param_prefix()) {
            Some(name) => name.clone(),
            None => format!("{}_{}", kind.param_prefix(), self.column),
        }
    }

    /// Typed NULL marker for this field's column type.
    pub fn null_value(&self) -> sea_query::Value {
        self.column_type.null_value()
    }
}

/// Stored-procedure overrides, one optional procedure name per statement
/// kind. When a kind has a procedure, generated commands invoke it in
/// place of ad-hoc SQL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Procedures {
    pub select: Option<String>,
    pub insert: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
}

impl Procedures {
    pub fn get(&self, kind: StatementKind) -> Option<&str> {
        match kind {
            StatementKind::Select => self.select.as_deref(),
            StatementKind::Insert => self.insert.as_deref(),
            StatementKind::Update => self.update.as_deref(),
            StatementKind::Delete => self.delete.as_deref(),
        }
    }

    fn set(&mut self, kind: StatementKind, name: String) {
        match kind {
            StatementKind::Select => self.select = Some(name),
            StatementKind::Insert => self.insert = Some(name),
            StatementKind::Update => self.update = Some(name),
            StatementKind::Delete => self.delete = Some(name),
        }
    }
}

/// Static, per-entity-type description of columns, primary keys, and
/// relationships. Pure data; behavior is limited to lookup.
///
/// # Example
///
/// ```
/// use tiderow::mapping::{TableMapping, FieldMapping, RelationMapping, RelationKind, RelationTarget};
/// use tiderow::value::ColumnType;
///
/// let users = TableMapping::new("User", "users")
///     .field(FieldMapping::new("id", "id", ColumnType::Int).primary_key().identity())
///     .field(FieldMapping::new("name", "name", ColumnType::Text))
///     .relation(RelationMapping::new(
///         "posts",
///         RelationKind::OneToMany,
///         "id",
///         "user_id",
///         RelationTarget::Mapped("Post".into()),
///     ));
/// assert_eq!(users.table, "users");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    /// Mapping name, used for registry lookup and structural identity.
    pub name: String,
    pub table: String,
    pub schema: Option<String>,
    pub fields: Vec<FieldMapping>,
    pub relations: Vec<RelationMapping>,
    pub procedures: Procedures,
}

/// Member name used by synthesized single-field wrapper mappings.
pub const SCALAR_MEMBER: &str = "value";

impl TableMapping {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            schema: None,
            fields: Vec::new(),
            relations: Vec::new(),
            procedures: Procedures::default(),
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn field(mut self, field: FieldMapping) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, relation: RelationMapping) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn procedure(mut self, kind: StatementKind, name: impl Into<String>) -> Self {
        self.procedures.set(kind, name.into());
        self
    }

    /// Synthesize a single-field mapping wrapping one scalar column.
    ///
    /// Used by traversal to treat a plain-value relationship target as a
    /// mapped entity for the duration of a load or save; the value is
    /// unwrapped before member assignment.
    pub fn synthetic(table: &str, column: &str) -> Self {
        TableMapping::new(format!("{}::{}", table, column), table)
            .field(FieldMapping::new(SCALAR_MEMBER, column, ColumnType::Text).nullable())
    }

    pub fn field_by_member(&self, member: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.member == member)
    }

    pub fn field_by_column(&self, column: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// Fields flagged as primary key, in declaration order.
    pub fn primary_key_fields(&self) -> Vec<&FieldMapping> {
        self.fields.iter().filter(|f| f.primary_key).collect()
    }

    /// Fields flagged for output readback after INSERT.
    pub fn output_fields(&self) -> Vec<&FieldMapping> {
        self.fields.iter().filter(|f| f.return_on_insert).collect()
    }

    /// Validate member declarations for conflicting multiplicity.
    ///
    /// A collection-valued relation mapped onto a member that another
    /// declaration makes single-valued cannot be satisfied at runtime and
    /// is rejected up front.
    pub fn validate(&self) -> Result<(), MappingError> {
        for rel in &self.relations {
            if !rel.is_many() {
                continue;
            }
            let single_elsewhere = self.field_by_member(&rel.member).is_some()
                || self
                    .relations
                    .iter()
                    .any(|other| other.member == rel.member && !other.is_many())
                || self
                    .fields
                    .iter()
                    .any(|f| f.foreign.as_ref().is_some_and(|fk| fk.member == rel.member));
            if single_elsewhere {
                return Err(MappingError::ManyToManyNotList {
                    mapping: self.name.clone(),
                    member: rel.member.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Registry of table mappings, looked up by mapping name during
/// traversal.
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    mappings: BTreeMap<String, Arc<TableMapping>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapping, validating it first.
    ///
    /// # Errors
    ///
    /// Returns `MappingError` if the mapping declares conflicting member
    /// multiplicity.
    pub fn register(&mut self, mapping: TableMapping) -> Result<(), MappingError> {
        mapping.validate()?;
        self.mappings.insert(mapping.name.clone(), Arc::new(mapping));
        Ok(())
    }

    /// Look up a mapping by name.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::UnknownMapping` if no mapping is registered
    /// under the name.
    pub fn get(&self, name: &str) -> Result<Arc<TableMapping>, MappingError> {
        self.mappings
            .get(name)
            .cloned()
            .ok_or_else(|| MappingError::UnknownMapping(name.to_string()))
    }
}

/// Mapping metadata error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// No mapping registered under the name
    UnknownMapping(String),
    /// No field bound to the member name
    UnknownMember { mapping: String, member: String },
    /// Collection-valued relationship mapped onto a single-valued member
    ManyToManyNotList { mapping: String, member: String },
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingError::UnknownMapping(name) => {
                write!(f, "Unknown mapping: {name}")
            }
            MappingError::UnknownMember { mapping, member } => {
                write!(f, "Mapping {mapping} has no member {member}")
            }
            MappingError::ManyToManyNotList { mapping, member } => {
                write!(
                    f,
                    "Mapping {mapping}: collection relationship mapped onto single-valued member {member}"
                )
            }
        }
    }
}

impl std::error::Error for MappingError {}

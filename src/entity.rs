//! The runtime entity record: current and original field values,
//! modified-member tracking, change-state flags, and relationship
//! members.
//!
//! An [`Entity`] is a dynamic record tied to a [`TableMapping`]. Identity
//! is structural: two entities are equal when their mapped column values
//! match, not when they are the same allocation. Entities are owned
//! values; the traversal engine never assumes shared ownership across
//! calls.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use sea_query::Value;

use crate::backend::Row;
use crate::mapping::{MappingError, TableMapping, SCALAR_MEMBER};
use crate::value::is_null;

/// A relationship member held by an entity.
///
/// `Scalar` and `ScalarList` are the unwrapped forms used when the
/// relationship target is a plain value rather than a mapped entity type.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    One(Entity),
    Many(Vec<Entity>),
    Scalar(Value),
    ScalarList(Vec<Value>),
}

impl Member {
    /// Whether this member holds a collection.
    pub fn is_many(&self) -> bool {
        matches!(self, Member::Many(_) | Member::ScalarList(_))
    }
}

/// Per-entity change-state flags.
///
/// The single-entity save contract dispatches on these: INSERT when new,
/// UPDATE when dirty, DELETE when marked deleted, and a no-op otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeState {
    pub is_new: bool,
    pub is_dirty: bool,
    pub mark_deleted: bool,
}

impl ChangeState {
    /// No statement should be issued for this state.
    pub fn is_clean(&self) -> bool {
        !self.is_new && !self.is_dirty && !self.mark_deleted
    }
}

/// A runtime instance of a mapped type.
///
/// # Example
///
/// ```
/// use tiderow::entity::Entity;
/// use tiderow::mapping::{TableMapping, FieldMapping};
/// use tiderow::value::{ColumnType, ValueType};
/// use std::sync::Arc;
///
/// let mapping = Arc::new(
///     TableMapping::new("User", "users")
///         .field(FieldMapping::new("id", "id", ColumnType::Int).primary_key())
///         .field(FieldMapping::new("name", "name", ColumnType::Text)),
/// );
///
/// let mut user = Entity::new(mapping);
/// user.set("id", 1i32.into_value()).unwrap();
/// user.set("name", "Ada".to_string().into_value()).unwrap();
/// assert!(user.state().is_new);
/// ```
#[derive(Debug, Clone)]
pub struct Entity {
    mapping: Arc<TableMapping>,
    values: BTreeMap<String, Value>,
    original: BTreeMap<String, Value>,
    modified: BTreeSet<String>,
    members: BTreeMap<String, Member>,
    state: ChangeState,
}

impl Entity {
    /// Create a fresh entity for the mapping, flagged new.
    pub fn new(mapping: Arc<TableMapping>) -> Self {
        Self {
            mapping,
            values: BTreeMap::new(),
            original: BTreeMap::new(),
            modified: BTreeSet::new(),
            members: BTreeMap::new(),
            state: ChangeState {
                is_new: true,
                is_dirty: false,
                mark_deleted: false,
            },
        }
    }

    /// Materialize a loaded entity from a backend row.
    ///
    /// Row columns are matched to members through the mapping; columns the
    /// mapping does not know are ignored, mapped columns absent from the
    /// row become typed NULLs. The result carries no pending changes.
    pub fn from_row(mapping: Arc<TableMapping>, row: &Row) -> Self {
        let mut values = BTreeMap::new();
        for field in &mapping.fields {
            let value = row
                .get(&field.column)
                .cloned()
                .unwrap_or_else(|| field.null_value());
            values.insert(field.member.clone(), value);
        }
        Self {
            original: values.clone(),
            values,
            modified: BTreeSet::new(),
            members: BTreeMap::new(),
            mapping,
            state: ChangeState::default(),
        }
    }

    pub fn mapping(&self) -> &Arc<TableMapping> {
        &self.mapping
    }

    pub fn state(&self) -> &ChangeState {
        &self.state
    }

    /// Current value of a member, if set.
    pub fn get(&self, member: &str) -> Option<&Value> {
        self.values.get(member)
    }

    /// Original (pre-change) value of a member, if any.
    pub fn get_original(&self, member: &str) -> Option<&Value> {
        self.original.get(member)
    }

    /// Current value of the member bound to a column.
    pub fn get_by_column(&self, column: &str) -> Option<&Value> {
        let field = self.mapping.field_by_column(column)?;
        self.values.get(&field.member)
    }

    /// Members modified since load, in name order.
    pub fn modified_members(&self) -> impl Iterator<Item = &str> {
        self.modified.iter().map(String::as_str)
    }

    pub fn is_modified(&self, member: &str) -> bool {
        self.modified.contains(member)
    }

    /// Set a member value, recording it as modified when it changes.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::UnknownMember` when the mapping has no field
    /// for the member.
    pub fn set(&mut self, member: &str, value: Value) -> Result<(), MappingError> {
        let field = self.mapping.field_by_member(member).ok_or_else(|| {
            MappingError::UnknownMember {
                mapping: self.mapping.name.clone(),
                member: member.to_string(),
            }
        })?;
        let member = field.member.clone();
        if self.values.get(&member) == Some(&value) {
            return Ok(());
        }
        self.values.insert(member.clone(), value);
        self.modified.insert(member);
        self.state.is_dirty = true;
        Ok(())
    }

    /// Overwrite a field value without touching change-state.
    ///
    /// Used for output readback after INSERT, where the backend-generated
    /// value is part of the persisted row, not a pending change.
    pub(crate) fn write_through(&mut self, member: &str, value: Value) {
        self.values.insert(member.to_string(), value.clone());
        self.original.insert(member.to_string(), value);
        self.modified.remove(member);
    }

    pub fn mark_deleted(&mut self) {
        self.state.mark_deleted = true;
    }

    pub fn mark_new(&mut self) {
        self.state.is_new = true;
    }

    /// Clear all change-state after a successful save; current values
    /// become the new originals.
    pub fn accept_changes(&mut self) {
        self.original = self.values.clone();
        self.modified.clear();
        self.state = ChangeState::default();
    }

    /// Relationship member, if assigned.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn member_mut(&mut self, name: &str) -> Option<&mut Member> {
        self.members.get_mut(name)
    }

    pub fn set_member(&mut self, name: impl Into<String>, member: Member) {
        self.members.insert(name.into(), member);
    }

    /// Assigned members in name order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.members.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Structural identity check.
    ///
    /// Entities match when they map the same table and every column both
    /// mappings know carries an equal value. Comparing over the shared
    /// columns also matches a synthesized scalar wrapper against a full
    /// entity of the same table.
    pub fn structurally_matches(&self, other: &Entity) -> bool {
        if self.mapping.table != other.mapping.table || self.mapping.schema != other.mapping.schema
        {
            return false;
        }
        let mut shared = 0usize;
        for field in &self.mapping.fields {
            let Some(other_field) = other.mapping.field_by_column(&field.column) else {
                continue;
            };
            shared += 1;
            let mine = self.values.get(&field.member);
            let theirs = other.values.get(&other_field.member);
            if mine != theirs {
                return false;
            }
        }
        shared > 0
    }

    /// Unwrap a synthesized scalar wrapper into its single value.
    ///
    /// Returns the wrapped value when the mapping is a single-field
    /// wrapper; a NULL marker when the value was never set.
    pub(crate) fn into_scalar(mut self) -> Value {
        match self.values.remove(SCALAR_MEMBER) {
            Some(value) => value,
            None => Value::String(None),
        }
    }

    /// Whether every mapped column of this entity is NULL or unset.
    pub fn is_empty(&self) -> bool {
        self.mapping
            .fields
            .iter()
            .all(|f| self.values.get(&f.member).map_or(true, is_null))
    }
}

/// Structural equality over mapped columns.
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.structurally_matches(other)
    }
}

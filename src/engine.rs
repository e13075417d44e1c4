//! The graph traversal engine: recursive deep load and deep save across
//! entity relationships.
//!
//! Each top-level call owns a [`VisitedSet`] of structural snapshots
//! that breaks cycles and de-duplicates work: before recursing into a
//! relationship, the engine checks membership; the first structural
//! match in visitation order wins. Traversal is synchronous and
//! sequential per invocation, each recursive step blocking on the prior
//! step's backend round trip. An ambient [`TransactionContext`], when
//! supplied, is passed through unchanged to every recursive step;
//! sub-steps never open transactions of their own.

use std::fmt;
use std::sync::Arc;

use sea_query::Value;

use crate::backend::{Backend, BackendError, BackendProfile, TransactionContext};
use crate::command::{Command, CommandBuilder, CommandError, StatementSpec};
use crate::config::EngineConfig;
use crate::entity::{Entity, Member};
use crate::mapping::{
    FieldMapping, MappingError, MappingRegistry, RelationKind, RelationMapping, RelationTarget,
    StatementKind, TableMapping,
};
use crate::query::{CompareOp, QueryDescriptor};
use crate::value::{is_null, ColumnType};

/// Traversal engine error type
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Configuration error in mapping metadata
    Mapping(MappingError),
    /// Command generation failed
    Command(CommandError),
    /// Backend execution failed; propagated unchanged
    Backend(BackendError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Mapping(err) => write!(f, "Mapping error: {err}"),
            EngineError::Command(err) => write!(f, "Command error: {err}"),
            EngineError::Backend(err) => write!(f, "Backend error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<MappingError> for EngineError {
    fn from(err: MappingError) -> Self {
        EngineError::Mapping(err)
    }
}

impl From<CommandError> for EngineError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Mapping(err) => EngineError::Mapping(err),
            other => EngineError::Command(other),
        }
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        EngineError::Backend(err)
    }
}

/// Ordered set of entities already loaded (or saved) within one
/// top-level invocation.
///
/// Grows monotonically during the call and is discarded at completion.
/// Membership is a linear structural scan; fine at the graph sizes deep
/// traversal works with.
#[derive(Debug, Default)]
struct VisitedSet {
    entities: Vec<Entity>,
}

impl VisitedSet {
    fn new() -> Self {
        Self::default()
    }

    /// First structurally matching entry, in visitation order.
    fn find_match(&self, entity: &Entity) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|seen| seen.structurally_matches(entity) || entity.structurally_matches(seen))
    }

    fn contains(&self, entity: &Entity) -> bool {
        self.find_match(entity).is_some()
    }

    fn record(&mut self, entity: &Entity) {
        self.entities.push(entity.clone());
    }
}

/// Remaining depth budget after descending one relationship level.
fn descend(depth: Option<u32>) -> Option<u32> {
    depth.map(|d| d.saturating_sub(1))
}

/// Recursive load/save orchestrator over a mapping registry and one
/// storage backend.
///
/// # Example
///
/// ```no_run
/// use tiderow::backend::{BackendProfile, memory::MemoryBackend};
/// use tiderow::config::EngineConfig;
/// use tiderow::engine::GraphEngine;
/// use tiderow::mapping::MappingRegistry;
/// use tiderow::query::{QueryDescriptor, CompareOp};
/// use tiderow::value::ValueType;
///
/// # let registry = MappingRegistry::new();
/// let backend = MemoryBackend::new();
/// let engine = GraphEngine::new(
///     &registry,
///     &backend,
///     EngineConfig::default(),
///     BackendProfile::memory(),
/// );
///
/// let query = QueryDescriptor::new().filter("id", CompareOp::Eq, 1i32.into_value());
/// let user = engine.deep_load("User", &query, None, None)?;
/// # Ok::<(), tiderow::engine::EngineError>(())
/// ```
pub struct GraphEngine<'a, B: Backend> {
    registry: &'a MappingRegistry,
    backend: &'a B,
    config: EngineConfig,
    profile: BackendProfile,
}

impl<'a, B: Backend> GraphEngine<'a, B> {
    pub fn new(
        registry: &'a MappingRegistry,
        backend: &'a B,
        config: EngineConfig,
        profile: BackendProfile,
    ) -> Self {
        Self {
            registry,
            backend,
            config,
            profile,
        }
    }

    fn builder(&self) -> CommandBuilder<'_> {
        CommandBuilder::new(&self.config, &self.profile)
    }

    /// Deep-load a single entity matching the query.
    ///
    /// Relationships expand `depth` levels from the root; `None` is
    /// unbounded. A query matching zero rows yields `Ok(None)`, never an
    /// error.
    pub fn deep_load(
        &self,
        mapping: &str,
        query: &QueryDescriptor,
        depth: Option<u32>,
        tx: Option<&TransactionContext>,
    ) -> Result<Option<Entity>, EngineError> {
        log::debug!("deep load {mapping} (depth {depth:?})");
        let mapping = self.registry.get(mapping)?;
        let mut visited = VisitedSet::new();
        self.load_one(&mapping, query.clone(), depth, &mut visited, tx)
    }

    /// Deep-load every entity matching the query, sharing one visited
    /// set across the whole invocation.
    pub fn deep_load_all(
        &self,
        mapping: &str,
        query: &QueryDescriptor,
        depth: Option<u32>,
        tx: Option<&TransactionContext>,
    ) -> Result<Vec<Entity>, EngineError> {
        log::debug!("deep load all {mapping} (depth {depth:?})");
        let mapping = self.registry.get(mapping)?;
        let mut visited = VisitedSet::new();
        let roots = self.fetch(&mapping, query, tx)?;
        let mut loaded = Vec::with_capacity(roots.len());
        for root in roots {
            loaded.push(self.expand(root, depth, &mut visited, tx)?);
        }
        Ok(loaded)
    }

    /// Single-row convenience: the first entity matching the query,
    /// without relationship expansion.
    pub fn find_one(
        &self,
        mapping: &str,
        query: &QueryDescriptor,
        tx: Option<&TransactionContext>,
    ) -> Result<Option<Entity>, EngineError> {
        self.deep_load(mapping, query, Some(0), tx)
    }

    /// Count entities matching the query.
    pub fn count(
        &self,
        mapping: &str,
        query: &QueryDescriptor,
        tx: Option<&TransactionContext>,
    ) -> Result<u64, EngineError> {
        let mapping = self.registry.get(mapping)?;
        let command = self.builder().count(&mapping, query)?;
        let scalar = self.backend.query_scalar(&command, tx)?;
        Ok(match scalar {
            Some(Value::BigInt(Some(n))) => n.max(0) as u64,
            Some(Value::Int(Some(n))) => n.max(0) as u64,
            _ => 0,
        })
    }

    /// Page-by-page loading over a query with a fixed page size.
    pub fn paginate(
        &self,
        mapping: &str,
        query: QueryDescriptor,
        per_page: u64,
        depth: Option<u32>,
    ) -> Paginator<'_, 'a, B> {
        Paginator {
            engine: self,
            mapping: mapping.to_string(),
            query,
            per_page,
            depth,
            total: None,
        }
    }

    /// Deep-save an entity graph, walking outward from the root through
    /// relationship-bearing members. Every reachable entity is persisted
    /// at most once per invocation; order is depth-first from the root,
    /// with no topological ordering by foreign-key dependency.
    pub fn deep_save(
        &self,
        entity: &mut Entity,
        tx: Option<&TransactionContext>,
    ) -> Result<(), EngineError> {
        log::debug!("deep save {}", entity.mapping().name);
        let mut visited = VisitedSet::new();
        self.save_graph(entity, &mut visited, tx)
    }

    /// Persist one entity within an optional ambient transaction
    /// context.
    ///
    /// No-op, by contract, unless the entity is new, dirty, or marked
    /// deleted. On successful insert, fields flagged return-on-insert
    /// are refreshed from the backend's reported output values.
    pub fn save_one(
        &self,
        entity: &mut Entity,
        tx: Option<&TransactionContext>,
    ) -> Result<(), EngineError> {
        let Some(command) = self.builder().entity_command(entity, None)? else {
            return Ok(());
        };
        let outcome = self.backend.execute(&command, tx)?;
        if command.kind == StatementKind::Insert {
            let mapping = entity.mapping().clone();
            for field in mapping.output_fields() {
                if let Some(value) = outcome.output.get(&field.column) {
                    entity.write_through(&field.member, value.clone());
                }
            }
        }
        entity.accept_changes();
        Ok(())
    }

    /// Run one traversal inside a backend transaction: commit on
    /// success, roll back on error.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Self, &TransactionContext) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let tx = self.backend.begin(self.config.isolation)?;
        match f(self, &tx) {
            Ok(value) => {
                self.backend.commit(tx)?;
                Ok(value)
            }
            Err(err) => {
                // The original error is what the caller needs to see.
                let _ = self.backend.rollback(tx);
                Err(err)
            }
        }
    }

    /// Fetch the flat entities matching a query: one non-recursive
    /// round trip.
    fn fetch(
        &self,
        mapping: &Arc<TableMapping>,
        query: &QueryDescriptor,
        tx: Option<&TransactionContext>,
    ) -> Result<Vec<Entity>, EngineError> {
        let command = self.builder().select(mapping, query)?;
        let mut rows = self.backend.query(&command, tx)?;
        if let Some(post_limit) = post_limit(&command) {
            rows.truncate(post_limit as usize);
        }
        Ok(rows
            .iter()
            .map(|row| Entity::from_row(mapping.clone(), row))
            .collect())
    }

    /// Load and expand a single entity; `Ok(None)` when no row matches.
    fn load_one(
        &self,
        mapping: &Arc<TableMapping>,
        query: QueryDescriptor,
        depth: Option<u32>,
        visited: &mut VisitedSet,
        tx: Option<&TransactionContext>,
    ) -> Result<Option<Entity>, EngineError> {
        let query = query.limit(1);
        let Some(root) = self.fetch(mapping, &query, tx)?.into_iter().next() else {
            return Ok(None);
        };
        self.expand(root, depth, visited, tx).map(Some)
    }

    /// Expand one loaded entity: cycle check, visited recording, then
    /// relationship dispatch with a shrinking depth budget.
    fn expand(
        &self,
        mut entity: Entity,
        depth: Option<u32>,
        visited: &mut VisitedSet,
        tx: Option<&TransactionContext>,
    ) -> Result<Entity, EngineError> {
        if let Some(seen) = visited.find_match(&entity) {
            // Second encounter: hand back the first instance instead of
            // recursing again.
            return Ok(seen.clone());
        }
        visited.record(&entity);

        if depth == Some(0) {
            return Ok(entity);
        }

        let mapping = entity.mapping().clone();
        for relation in &mapping.relations {
            self.expand_relation(&mut entity, relation, depth, visited, tx)?;
        }

        // Field-level foreign references with an explicit member target
        // resolve with one more single-entity load each.
        for field in &mapping.fields {
            let Some(foreign) = &field.foreign else {
                continue;
            };
            let Some(value) = entity.get(&field.member).cloned() else {
                continue;
            };
            if is_null(&value) {
                continue;
            }
            let target = self.registry.get(&foreign.mapping)?;
            let query = QueryDescriptor::new().filter_column(
                foreign.column.clone(),
                CompareOp::Eq,
                value,
            );
            if let Some(loaded) = self.load_one(&target, query, descend(depth), visited, tx)? {
                entity.set_member(foreign.member.clone(), Member::One(loaded));
            }
        }

        Ok(entity)
    }

    /// Dispatch one relationship by kind.
    fn expand_relation(
        &self,
        entity: &mut Entity,
        relation: &RelationMapping,
        depth: Option<u32>,
        visited: &mut VisitedSet,
        tx: Option<&TransactionContext>,
    ) -> Result<(), EngineError> {
        let Some(local) = value_for_column(entity, &relation.local_column) else {
            return Ok(());
        };
        if is_null(&local) {
            // Equality on NULL matches nothing; leave the member
            // unpopulated.
            return Ok(());
        }

        let (target, scalar) = self.relation_target(relation)?;

        match relation.kind {
            RelationKind::OneToOne | RelationKind::ManyToOne => {
                let query = QueryDescriptor::new().filter_column(
                    relation.related_column.clone(),
                    CompareOp::Eq,
                    local,
                );
                if let Some(loaded) =
                    self.load_one(&target, query, descend(depth), visited, tx)?
                {
                    let member = if scalar {
                        Member::Scalar(loaded.into_scalar())
                    } else {
                        Member::One(loaded)
                    };
                    self.assign_member(entity, relation, member)?;
                }
            }
            RelationKind::OneToMany => {
                let loaded =
                    self.load_collection(&target, &relation.related_column, local, depth, visited, tx)?;
                let member = collection_member(loaded, scalar);
                self.assign_member(entity, relation, member)?;
            }
            RelationKind::ManyToMany => match &relation.junction {
                Some(junction) => {
                    let junction_mapping = Arc::new(junction_mapping(
                        junction,
                        &relation.local_column,
                        &relation.related_column,
                    ));
                    let query = QueryDescriptor::new().filter_column(
                        relation.local_column.clone(),
                        CompareOp::Eq,
                        local,
                    );
                    let junction_rows = self.fetch(&junction_mapping, &query, tx)?;

                    let mut loaded = Vec::new();
                    for junction_row in junction_rows {
                        let Some(far) = junction_row.get(&relation.related_column).cloned() else {
                            continue;
                        };
                        if is_null(&far) {
                            continue;
                        }
                        let query = QueryDescriptor::new().filter_column(
                            relation.related_column.clone(),
                            CompareOp::Eq,
                            far,
                        );
                        if let Some(far_entity) =
                            self.load_one(&target, query, descend(depth), visited, tx)?
                        {
                            loaded.push(far_entity);
                        }
                    }
                    let member = collection_member(loaded, scalar);
                    self.assign_member(entity, relation, member)?;
                }
                // No junction configured: degrade to one-to-many
                // semantics over the same join predicate.
                None => {
                    let loaded = self.load_collection(
                        &target,
                        &relation.related_column,
                        local,
                        depth,
                        visited,
                        tx,
                    )?;
                    let member = collection_member(loaded, scalar);
                    self.assign_member(entity, relation, member)?;
                }
            },
        }
        Ok(())
    }

    /// Load the full collection matching `related_column = local`; the
    /// budget is unchanged across siblings, each element consuming one
    /// level on its own sub-path.
    fn load_collection(
        &self,
        target: &Arc<TableMapping>,
        related_column: &str,
        local: Value,
        depth: Option<u32>,
        visited: &mut VisitedSet,
        tx: Option<&TransactionContext>,
    ) -> Result<Vec<Entity>, EngineError> {
        let query = QueryDescriptor::new().filter_column(
            related_column.to_string(),
            CompareOp::Eq,
            local,
        );
        let roots = self.fetch(target, &query, tx)?;
        let mut loaded = Vec::with_capacity(roots.len());
        for root in roots {
            loaded.push(self.expand(root, descend(depth), visited, tx)?);
        }
        Ok(loaded)
    }

    fn relation_target(
        &self,
        relation: &RelationMapping,
    ) -> Result<(Arc<TableMapping>, bool), EngineError> {
        match &relation.target {
            RelationTarget::Mapped(name) => Ok((self.registry.get(name)?, false)),
            RelationTarget::Scalar { table, column } => {
                Ok((Arc::new(TableMapping::synthetic(table, column)), true))
            }
        }
    }

    /// Assign a loaded member, rejecting a collection onto a member some
    /// earlier assignment made single-valued.
    fn assign_member(
        &self,
        entity: &mut Entity,
        relation: &RelationMapping,
        member: Member,
    ) -> Result<(), EngineError> {
        if member.is_many() {
            if let Some(existing) = entity.member(&relation.member) {
                if !existing.is_many() {
                    return Err(MappingError::ManyToManyNotList {
                        mapping: entity.mapping().name.clone(),
                        member: relation.member.clone(),
                    }
                    .into());
                }
            }
        }
        entity.set_member(relation.member.clone(), member);
        Ok(())
    }

    /// Depth-first save over declared sub-entity members.
    fn save_graph(
        &self,
        entity: &mut Entity,
        visited: &mut VisitedSet,
        tx: Option<&TransactionContext>,
    ) -> Result<(), EngineError> {
        if visited.contains(entity) {
            return Ok(());
        }
        self.save_one(entity, tx)?;
        visited.record(entity);

        let mapping = entity.mapping().clone();
        for name in declared_members(&mapping) {
            let scalar_table = scalar_target_for(&mapping, &name);
            let Some(member) = entity.member_mut(&name) else {
                continue;
            };
            match member {
                Member::One(child) => self.save_graph(child, visited, tx)?,
                Member::Many(children) => {
                    for child in children.iter_mut() {
                        self.save_graph(child, visited, tx)?;
                    }
                }
                Member::Scalar(value) => {
                    let value = value.clone();
                    self.save_wrapped(&scalar_table, &name, value, visited, tx)?;
                }
                Member::ScalarList(values) => {
                    let values = values.clone();
                    for value in values {
                        self.save_wrapped(&scalar_table, &name, value, visited, tx)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Wrap a plain value in a synthesized single-member entity, then
    /// run it through the single-entity save contract.
    fn save_wrapped(
        &self,
        scalar_target: &Option<(String, String)>,
        member: &str,
        value: Value,
        visited: &mut VisitedSet,
        tx: Option<&TransactionContext>,
    ) -> Result<(), EngineError> {
        let Some((table, column)) = scalar_target else {
            log::warn!("scalar member {member} has no scalar relation target; skipping");
            return Ok(());
        };
        let mapping = Arc::new(TableMapping::synthetic(table, column));
        let mut wrapped = Entity::new(mapping);
        wrapped.set(crate::mapping::SCALAR_MEMBER, value).ok();
        if visited.contains(&wrapped) {
            return Ok(());
        }
        self.save_one(&mut wrapped, tx)?;
        visited.record(&wrapped);
        Ok(())
    }
}

/// Member names that may hold sub-entities, per mapping metadata.
fn declared_members(mapping: &TableMapping) -> Vec<String> {
    let mut names: Vec<String> = mapping.relations.iter().map(|r| r.member.clone()).collect();
    for field in &mapping.fields {
        if let Some(foreign) = &field.foreign {
            if !names.contains(&foreign.member) {
                names.push(foreign.member.clone());
            }
        }
    }
    names
}

fn scalar_target_for(mapping: &TableMapping, member: &str) -> Option<(String, String)> {
    mapping.relations.iter().find_map(|r| {
        if r.member != member {
            return None;
        }
        match &r.target {
            RelationTarget::Scalar { table, column } => Some((table.clone(), column.clone())),
            RelationTarget::Mapped(_) => None,
        }
    })
}

/// Synthesize a two-column mapping over a junction table.
fn junction_mapping(
    junction: &crate::mapping::Junction,
    local_column: &str,
    related_column: &str,
) -> TableMapping {
    let mut mapping = TableMapping::new(
        format!("{}::junction", junction.table),
        junction.table.clone(),
    )
    .field(FieldMapping::new(local_column, local_column, ColumnType::BigInt).nullable())
    .field(FieldMapping::new(related_column, related_column, ColumnType::BigInt).nullable());
    if let Some(schema) = &junction.schema {
        mapping = mapping.schema(schema.clone());
    }
    mapping
}

/// Current value for a column: the mapped member's value, or a member
/// sharing the column's name when no field covers it.
fn value_for_column(entity: &Entity, column: &str) -> Option<Value> {
    entity
        .get_by_column(column)
        .or_else(|| entity.get(column))
        .cloned()
}

fn collection_member(loaded: Vec<Entity>, scalar: bool) -> Member {
    if scalar {
        Member::ScalarList(loaded.into_iter().map(Entity::into_scalar).collect())
    } else {
        Member::Many(loaded)
    }
}

fn post_limit(command: &Command) -> Option<u64> {
    match &command.spec {
        StatementSpec::Select(spec) => spec.post_limit,
        _ => None,
    }
}

/// Page-by-page fetching over one query with a fixed page size.
///
/// Created by [`GraphEngine::paginate`]; each page is a full deep load.
pub struct Paginator<'e, 'a, B: Backend> {
    engine: &'e GraphEngine<'a, B>,
    mapping: String,
    query: QueryDescriptor,
    per_page: u64,
    depth: Option<u32>,
    total: Option<u64>,
}

impl<B: Backend> Paginator<'_, '_, B> {
    /// Fetch one page (1-based).
    pub fn fetch_page(&self, page: u64) -> Result<Vec<Entity>, EngineError> {
        let query = self.query.clone().paginate(page, self.per_page);
        self.engine
            .deep_load_all(&self.mapping, &query, self.depth, None)
    }

    /// Total matching items; cached after the first call.
    pub fn num_items(&mut self) -> Result<u64, EngineError> {
        if let Some(total) = self.total {
            return Ok(total);
        }
        let total = self.engine.count(&self.mapping, &self.query, None)?;
        self.total = Some(total);
        Ok(total)
    }

    /// Total pages at the configured page size.
    pub fn num_pages(&mut self) -> Result<u64, EngineError> {
        let items = self.num_items()?;
        Ok(items.div_ceil(self.per_page.max(1)))
    }
}

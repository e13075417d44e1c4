//! Shared test fixtures: a blog-shaped mapping registry, seeded
//! in-memory tables, and a statement-counting backend wrapper.
//!
//! The graph is deliberately cyclic: users reference each other through
//! `best_friend_id`, posts point back at their author, and comments
//! carry a field-level foreign reference to their post.

use std::sync::atomic::{AtomicUsize, Ordering};

use sea_query::Value;
use tiderow::backend::memory::MemoryBackend;
use tiderow::backend::{
    Backend, BackendError, ExecOutcome, IsolationLevel, Row, TransactionContext,
};
use tiderow::command::Command;
use tiderow::mapping::{
    FieldMapping, ForeignRef, Junction, MappingRegistry, RelationKind, RelationMapping,
    RelationTarget, TableMapping,
};
use tiderow::value::{ColumnType, ValueType};

// ============================================================================
// Mappings
// ============================================================================

fn user_mapping() -> TableMapping {
    TableMapping::new("User", "users")
        .field(FieldMapping::new("id", "id", ColumnType::Int).primary_key().identity())
        .field(FieldMapping::new("name", "name", ColumnType::Text))
        .field(FieldMapping::new("best_friend_id", "best_friend_id", ColumnType::Int).nullable())
        .relation(RelationMapping::new(
            "best_friend",
            RelationKind::OneToOne,
            "best_friend_id",
            "id",
            RelationTarget::Mapped("User".into()),
        ))
        .relation(RelationMapping::new(
            "posts",
            RelationKind::OneToMany,
            "id",
            "user_id",
            RelationTarget::Mapped("Post".into()),
        ))
        .relation(
            RelationMapping::new(
                "tags",
                RelationKind::ManyToMany,
                "id",
                "tag_id",
                RelationTarget::Mapped("Tag".into()),
            )
            .junction(Junction::new("user_tags")),
        )
        // No junction: degrades to one-to-many over the same predicate.
        .relation(RelationMapping::new(
            "badges",
            RelationKind::ManyToMany,
            "id",
            "user_id",
            RelationTarget::Mapped("Badge".into()),
        ))
        .relation(RelationMapping::new(
            "badges_list",
            RelationKind::OneToMany,
            "id",
            "user_id",
            RelationTarget::Mapped("Badge".into()),
        ))
        .relation(RelationMapping::new(
            "nicknames",
            RelationKind::OneToMany,
            "id",
            "user_id",
            RelationTarget::Scalar {
                table: "nicknames".into(),
                column: "nickname".into(),
            },
        ))
}

fn post_mapping() -> TableMapping {
    TableMapping::new("Post", "posts")
        .field(FieldMapping::new("id", "id", ColumnType::Int).primary_key().identity())
        .field(FieldMapping::new("title", "title", ColumnType::Text))
        .field(FieldMapping::new("user_id", "user_id", ColumnType::Int))
        .relation(RelationMapping::new(
            "author",
            RelationKind::ManyToOne,
            "user_id",
            "id",
            RelationTarget::Mapped("User".into()),
        ))
        .relation(RelationMapping::new(
            "comments",
            RelationKind::OneToMany,
            "id",
            "post_id",
            RelationTarget::Mapped("Comment".into()),
        ))
}

fn comment_mapping() -> TableMapping {
    TableMapping::new("Comment", "comments")
        .field(FieldMapping::new("id", "id", ColumnType::Int).primary_key().identity())
        .field(
            FieldMapping::new("post_id", "post_id", ColumnType::Int).foreign(ForeignRef {
                mapping: "Post".into(),
                column: "id".into(),
                member: "post".into(),
            }),
        )
        .field(FieldMapping::new("body", "body", ColumnType::Text))
}

fn tag_mapping() -> TableMapping {
    TableMapping::new("Tag", "tags")
        .field(FieldMapping::new("tag_id", "tag_id", ColumnType::Int).primary_key())
        .field(FieldMapping::new("label", "label", ColumnType::Text))
}

fn badge_mapping() -> TableMapping {
    TableMapping::new("Badge", "badges")
        .field(FieldMapping::new("id", "id", ColumnType::Int).primary_key())
        .field(FieldMapping::new("user_id", "user_id", ColumnType::Int))
        .field(FieldMapping::new("label", "label", ColumnType::Text))
}

fn team_mapping() -> TableMapping {
    TableMapping::new("Team", "teams")
        .field(FieldMapping::new("id", "id", ColumnType::Int).primary_key())
        .field(FieldMapping::new("name", "name", ColumnType::Text))
        .field(FieldMapping::new("lead_id", "lead_id", ColumnType::Int).nullable())
        .relation(RelationMapping::new(
            "lead",
            RelationKind::OneToOne,
            "lead_id",
            "id",
            RelationTarget::Mapped("Person".into()),
        ))
        .relation(RelationMapping::new(
            "members",
            RelationKind::OneToMany,
            "id",
            "team_id",
            RelationTarget::Mapped("Person".into()),
        ))
}

fn person_mapping() -> TableMapping {
    TableMapping::new("Person", "persons")
        .field(FieldMapping::new("id", "id", ColumnType::Int).primary_key())
        .field(FieldMapping::new("name", "name", ColumnType::Text))
}

pub fn registry() -> MappingRegistry {
    let mut registry = MappingRegistry::new();
    registry.register(user_mapping()).unwrap();
    registry.register(post_mapping()).unwrap();
    registry.register(comment_mapping()).unwrap();
    registry.register(tag_mapping()).unwrap();
    registry.register(badge_mapping()).unwrap();
    registry.register(team_mapping()).unwrap();
    registry.register(person_mapping()).unwrap();
    registry
}

// ============================================================================
// Seed data
// ============================================================================

fn row(columns: Vec<(&str, Value)>) -> Vec<(String, Value)> {
    columns.into_iter().map(|(n, v)| (n.to_string(), v)).collect()
}

/// Seed the blog graph: Ada and Grace are mutual best friends, Ada wrote
/// three posts, the first post has two comments, Alan has no friends and
/// no content.
pub fn seed(backend: &MemoryBackend) {
    backend.insert_row(
        "users",
        row(vec![
            ("id", 1i32.into_value()),
            ("name", "Ada".to_string().into_value()),
            ("best_friend_id", 2i32.into_value()),
        ]),
    );
    backend.insert_row(
        "users",
        row(vec![
            ("id", 2i32.into_value()),
            ("name", "Grace".to_string().into_value()),
            ("best_friend_id", 1i32.into_value()),
        ]),
    );
    backend.insert_row(
        "users",
        row(vec![
            ("id", 3i32.into_value()),
            ("name", "Alan".to_string().into_value()),
            ("best_friend_id", Value::Int(None)),
        ]),
    );

    for (id, title, user_id) in [(1, "P1", 1), (2, "P2", 1), (3, "P3", 1), (4, "P4", 2)] {
        backend.insert_row(
            "posts",
            row(vec![
                ("id", id.into_value()),
                ("title", title.to_string().into_value()),
                ("user_id", user_id.into_value()),
            ]),
        );
    }

    for (id, post_id, body) in [(1, 1, "C1"), (2, 1, "C2")] {
        backend.insert_row(
            "comments",
            row(vec![
                ("id", id.into_value()),
                ("post_id", post_id.into_value()),
                ("body", body.to_string().into_value()),
            ]),
        );
    }

    for (tag_id, label) in [(10, "rust"), (11, "orm")] {
        backend.insert_row(
            "tags",
            row(vec![
                ("tag_id", tag_id.into_value()),
                ("label", label.to_string().into_value()),
            ]),
        );
    }
    // Junction rows carry the relation's local and related column names.
    for (user_id, tag_id) in [(1, 10), (1, 11), (2, 10)] {
        backend.insert_row(
            "user_tags",
            row(vec![("id", user_id.into_value()), ("tag_id", tag_id.into_value())]),
        );
    }

    for (id, user_id, label) in [(100, 1, "gold"), (101, 1, "silver")] {
        backend.insert_row(
            "badges",
            row(vec![
                ("id", id.into_value()),
                ("user_id", user_id.into_value()),
                ("label", label.to_string().into_value()),
            ]),
        );
    }

    for (user_id, nickname) in [(1, "ada"), (1, "countess")] {
        backend.insert_row(
            "nicknames",
            row(vec![
                ("user_id", user_id.into_value()),
                ("nickname", nickname.to_string().into_value()),
            ]),
        );
    }

    backend.create_table("teams");
    backend.create_table("persons");
}

/// Fresh backend with every fixture table created and seeded.
pub fn seeded_backend() -> MemoryBackend {
    let backend = MemoryBackend::new();
    seed(&backend);
    backend
}

/// Fresh backend with every fixture table created but no rows.
pub fn empty_backend() -> MemoryBackend {
    let backend = MemoryBackend::new();
    for table in [
        "users",
        "posts",
        "comments",
        "tags",
        "user_tags",
        "badges",
        "nicknames",
        "teams",
        "persons",
    ] {
        backend.create_table(table);
    }
    backend
}

// ============================================================================
// Statement-counting backend
// ============================================================================

/// Wraps a backend and counts every statement handed to it, so tests can
/// assert that an operation issued exactly N statements (or none).
pub struct CountingBackend {
    inner: MemoryBackend,
    queries: AtomicUsize,
    executes: AtomicUsize,
}

impl CountingBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.queries.store(0, Ordering::SeqCst);
        self.executes.store(0, Ordering::SeqCst);
    }
}

impl Backend for CountingBackend {
    fn query(
        &self,
        command: &Command,
        tx: Option<&TransactionContext>,
    ) -> Result<Vec<Row>, BackendError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(command, tx)
    }

    fn execute(
        &self,
        command: &Command,
        tx: Option<&TransactionContext>,
    ) -> Result<ExecOutcome, BackendError> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(command, tx)
    }

    fn begin(&self, isolation: IsolationLevel) -> Result<TransactionContext, BackendError> {
        self.inner.begin(isolation)
    }

    fn commit(&self, tx: TransactionContext) -> Result<(), BackendError> {
        self.inner.commit(tx)
    }

    fn rollback(&self, tx: TransactionContext) -> Result<(), BackendError> {
        self.inner.rollback(tx)
    }
}

//! # Tiderow
//!
//! Synchronous object-relational mapping core: declarative table mappings,
//! dynamic command generation, and recursive relationship graph traversal.
//!
//! See [README on GitHub](https://github.com/microscaler/tiderow) for full architecture.

pub mod backend;
pub mod command;
pub mod config;
pub mod engine;
pub mod entity;
pub mod mapping;
pub mod query;
pub mod value;

pub use backend::{Backend, BackendError, BackendProfile, IsolationLevel, Row, TransactionContext};
pub use command::{Command, CommandBuilder, CommandError};
pub use config::EngineConfig;
pub use engine::{EngineError, GraphEngine, Paginator};
pub use entity::{Entity, Member};
pub use mapping::{
    FieldMapping, ForeignRef, Junction, MappingError, MappingRegistry, RelationKind,
    RelationMapping, RelationTarget, StatementKind, TableMapping,
};
pub use query::{CompareOp, QueryDescriptor, SortOrder};
pub use value::{ColumnType, ValueType};

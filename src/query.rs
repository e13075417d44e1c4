//! Query descriptors: composable filter conditions, sort order, and
//! pagination, consumed by the command builder.
//!
//! A [`QueryDescriptor`] is constructed fresh per logical query and
//! handed to command generation; it never executes anything itself.
//!
//! # Example
//!
//! ```
//! use tiderow::query::{QueryDescriptor, CompareOp, SortOrder};
//! use tiderow::value::ValueType;
//!
//! let query = QueryDescriptor::new()
//!     .filter("age", CompareOp::GtEq, 18i32.into_value())
//!     .order_by("name", SortOrder::Asc)
//!     .paginate(2, 25);
//! assert_eq!(query.conditions.len(), 1);
//! ```

use sea_query::Value;

/// Comparison operator for a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    Like,
}

/// Subject of a condition: an entity member resolved against mapping
/// metadata, or a raw column name used verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionSubject {
    Member(String),
    Column(String),
}

/// One filter condition. Conditions are ANDed in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub subject: ConditionSubject,
    pub op: CompareOp,
    pub value: Value,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One ORDER BY item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortItem {
    pub subject: ConditionSubject,
    pub order: SortOrder,
}

/// Pagination spec: 1-based page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
}

impl Pagination {
    /// Whether this spec actually constrains the result set.
    ///
    /// Page 1 with no page size is the unbounded first page.
    pub fn is_bounded(&self) -> bool {
        self.per_page > 0
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1) * self.per_page
    }
}

/// An entity-typed, composable description of filter conditions, sort
/// order, and pagination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDescriptor {
    /// Conditions, ANDed in declaration order.
    pub conditions: Vec<Condition>,
    /// Sort items, applied in declaration order.
    pub sorts: Vec<SortItem>,
    pub pagination: Option<Pagination>,
    /// Request at most this many rows.
    pub limit: Option<u64>,
    /// Raw WHERE expression override; bypasses condition-based
    /// generation entirely.
    pub raw_filter: Option<String>,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition on an entity member.
    pub fn filter(mut self, member: impl Into<String>, op: CompareOp, value: Value) -> Self {
        self.conditions.push(Condition {
            subject: ConditionSubject::Member(member.into()),
            op,
            value,
        });
        self
    }

    /// Add a condition on a raw column name.
    pub fn filter_column(mut self, column: impl Into<String>, op: CompareOp, value: Value) -> Self {
        self.conditions.push(Condition {
            subject: ConditionSubject::Column(column.into()),
            op,
            value,
        });
        self
    }

    /// Add an ORDER BY item on an entity member.
    pub fn order_by(mut self, member: impl Into<String>, order: SortOrder) -> Self {
        self.sorts.push(SortItem {
            subject: ConditionSubject::Member(member.into()),
            order,
        });
        self
    }

    /// Add an ORDER BY item on a raw column name.
    pub fn order_by_column(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sorts.push(SortItem {
            subject: ConditionSubject::Column(column.into()),
            order,
        });
        self
    }

    /// Request one page of results.
    pub fn paginate(mut self, page: u64, per_page: u64) -> Self {
        self.pagination = Some(Pagination { page, per_page });
        self
    }

    /// Request at most `limit` rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Replace condition-based WHERE generation with a raw expression.
    pub fn raw_filter(mut self, expression: impl Into<String>) -> Self {
        self.raw_filter = Some(expression.into());
        self
    }

    /// Whether the descriptor constrains nothing at all.
    pub fn is_unfiltered(&self) -> bool {
        self.conditions.is_empty() && self.raw_filter.is_none()
    }
}

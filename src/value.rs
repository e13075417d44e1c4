//! Runtime value helpers over `sea_query::Value`.
//!
//! The whole crate uses `sea_query::Value` as its single runtime value
//! representation: entity fields, bound parameters, and rows coming back
//! from a backend all carry it. This module adds the pieces the mapping
//! layer needs on top: null inspection, typed null construction from a
//! declared column type, and the `ValueType` conversion trait used by
//! fixtures and tests.

use sea_query::Value;

/// Declared storage type of a mapped column.
///
/// Used by field mappings to produce a correctly-typed NULL marker when a
/// value is absent, so generated statements bind `NULL` with the variant
/// the backend expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Int,
    BigInt,
    Float,
    Double,
    Text,
    Bytes,
    Json,
    Uuid,
    DateTime,
    Decimal,
}

impl ColumnType {
    /// The NULL marker for this column type.
    ///
    /// Uuid, timestamp, and decimal columns ride as strings in
    /// `sea_query::Value`; their NULL marker is the string variant.
    pub fn null_value(self) -> Value {
        match self {
            ColumnType::Bool => Value::Bool(None),
            ColumnType::Int => Value::Int(None),
            ColumnType::BigInt => Value::BigInt(None),
            ColumnType::Float => Value::Float(None),
            ColumnType::Double => Value::Double(None),
            ColumnType::Text => Value::String(None),
            ColumnType::Bytes => Value::Bytes(None),
            ColumnType::Json => Value::Json(None),
            ColumnType::Uuid => Value::String(None),
            ColumnType::DateTime => Value::String(None),
            ColumnType::Decimal => Value::String(None),
        }
    }
}

/// Check whether a value is a NULL marker of any variant.
///
/// # Example
///
/// ```
/// use sea_query::Value;
/// use tiderow::value::is_null;
///
/// assert!(is_null(&Value::Int(None)));
/// assert!(!is_null(&Value::Int(Some(42))));
/// ```
pub fn is_null(value: &Value) -> bool {
    match value {
        Value::Bool(v) => v.is_none(),
        Value::TinyInt(v) => v.is_none(),
        Value::SmallInt(v) => v.is_none(),
        Value::Int(v) => v.is_none(),
        Value::BigInt(v) => v.is_none(),
        Value::TinyUnsigned(v) => v.is_none(),
        Value::SmallUnsigned(v) => v.is_none(),
        Value::Unsigned(v) => v.is_none(),
        Value::BigUnsigned(v) => v.is_none(),
        Value::Float(v) => v.is_none(),
        Value::Double(v) => v.is_none(),
        Value::Char(v) => v.is_none(),
        Value::String(v) => v.is_none(),
        Value::Bytes(v) => v.is_none(),
        Value::Json(v) => v.is_none(),
        _ => false,
    }
}

/// Trait for mapping Rust types to their corresponding `sea_query::Value`
/// variant.
///
/// Implemented for the standard scalar types an entity field can carry.
/// Fixture and test code uses it to build field values without spelling
/// out `Value` variants.
///
/// # Example
///
/// ```
/// use sea_query::Value;
/// use tiderow::value::ValueType;
///
/// let value = 42i32.into_value();
/// assert!(matches!(value, Value::Int(Some(42))));
///
/// let back = i32::from_value(value);
/// assert_eq!(back, Some(42));
/// ```
pub trait ValueType: Sized {
    /// Convert this value into a `sea_query::Value`.
    fn into_value(self) -> Value;

    /// Convert a `sea_query::Value` into this type, if possible.
    ///
    /// Returns `None` if the value doesn't match the expected variant or
    /// is null.
    fn from_value(value: Value) -> Option<Self>;

    /// The null variant for this type.
    fn null_value() -> Value;
}

macro_rules! impl_value_type {
    ($rust:ty, $variant:ident) => {
        impl ValueType for $rust {
            fn into_value(self) -> Value {
                Value::$variant(Some(self.into()))
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(Some(v)) => Some(v.into()),
                    _ => None,
                }
            }

            fn null_value() -> Value {
                Value::$variant(None)
            }
        }
    };
}

impl_value_type!(bool, Bool);
impl_value_type!(i8, TinyInt);
impl_value_type!(i16, SmallInt);
impl_value_type!(i32, Int);
impl_value_type!(i64, BigInt);
impl_value_type!(u8, TinyUnsigned);
impl_value_type!(u16, SmallUnsigned);
impl_value_type!(u32, Unsigned);
impl_value_type!(u64, BigUnsigned);
impl_value_type!(f32, Float);
impl_value_type!(f64, Double);
impl_value_type!(String, String);

impl ValueType for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Bytes(Some(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bytes(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Bytes(None)
    }
}

impl ValueType for serde_json::Value {
    fn into_value(self) -> Value {
        Value::Json(Some(Box::new(self)))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Json(Some(v)) => Some(*v),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::Json(None)
    }
}

// Uuid, timestamp, and decimal values ride as strings in
// `sea_query::Value`.

impl ValueType for uuid::Uuid {
    fn into_value(self) -> Value {
        Value::String(Some(self.to_string()))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(Some(v)) => v.parse().ok(),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::String(None)
    }
}

impl ValueType for chrono::DateTime<chrono::Utc> {
    fn into_value(self) -> Value {
        Value::String(Some(self.to_rfc3339()))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(Some(v)) => chrono::DateTime::parse_from_rfc3339(&v)
                .ok()
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::String(None)
    }
}

impl ValueType for rust_decimal::Decimal {
    fn into_value(self) -> Value {
        Value::String(Some(self.to_string()))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(Some(v)) => v.parse().ok(),
            _ => None,
        }
    }

    fn null_value() -> Value {
        Value::String(None)
    }
}

impl<T: ValueType> ValueType for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => T::null_value(),
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        if is_null(&value) {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }

    fn null_value() -> Value {
        T::null_value()
    }
}

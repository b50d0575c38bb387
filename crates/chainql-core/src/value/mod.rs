
use std::{cmp::Ordering, fmt};

///
/// ValueType
///
/// Runtime type surface the SQL layer needs: what a column decodes into and
/// how an attribute is described in external-chain metadata.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ValueType {
    Boolean,
    Integer,
    Text,
    ByteArray,
    Rowid,
    /// Reference to a row of the named entity.
    Entity(String),
    Nullable(Box<Self>),
}

impl ValueType {
    #[must_use]
    pub fn entity(name: impl Into<String>) -> Self {
        Self::Entity(name.into())
    }

    #[must_use]
    pub fn nullable(inner: Self) -> Self {
        match inner {
            Self::Nullable(_) => inner,
            other => Self::Nullable(Box::new(other)),
        }
    }

    /// Stable tag used by external-chain metadata tables.
    #[must_use]
    pub fn meta_tag(&self) -> String {
        match self {
            Self::Boolean => "sys:boolean".to_string(),
            Self::Integer => "sys:integer".to_string(),
            Self::Text => "sys:text".to_string(),
            Self::ByteArray => "sys:byte_array".to_string(),
            Self::Rowid => "sys:rowid".to_string(),
            Self::Entity(name) => format!("class:{name}"),
            Self::Nullable(inner) => format!("{}?", inner.meta_tag()),
        }
    }

    /// Target entity name when this type references an entity.
    #[must_use]
    pub fn entity_name(&self) -> Option<&str> {
        match self {
            Self::Entity(name) => Some(name),
            Self::Nullable(inner) => inner.entity_name(),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::Integer => write!(f, "integer"),
            Self::Text => write!(f, "text"),
            Self::ByteArray => write!(f, "byte_array"),
            Self::Rowid => write!(f, "rowid"),
            Self::Entity(name) => write!(f, "{name}"),
            Self::Nullable(inner) => write!(f, "{inner}?"),
        }
    }
}

///
/// EntityValue
/// A reference to one row of an entity.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct EntityValue {
    pub entity: String,
    pub rowid: i64,
}

///
/// TupleField
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TupleField {
    pub name: Option<String>,
    pub value: Value,
}

///
/// Value
///
/// Null    → absence (SQL NULL, or an empty single-cardinality result).
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Rowid(i64),
    Entity(EntityValue),
    Tuple(Vec<TupleField>),
    List(Vec<Self>),
}

impl Value {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn entity(entity: impl Into<String>, rowid: i64) -> Self {
        Self::Entity(EntityValue {
            entity: entity.into(),
            rowid,
        })
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Scalar values can be bound as SQL parameters and compared in SQL.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        !matches!(self, Self::Tuple(_) | Self::List(_))
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) | Self::Rowid(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Row id of an entity reference (or a bare rowid).
    #[must_use]
    pub const fn rowid(&self) -> Option<i64> {
        match self {
            Self::Rowid(v) => Some(*v),
            Self::Entity(e) => Some(e.rowid),
            _ => None,
        }
    }

    /// Equality as SQL would evaluate it between two non-null scalars.
    ///
    /// Returns `None` when either side is null or the pair is not comparable,
    /// in which case the comparison cannot be decided without the database.
    #[must_use]
    pub fn sql_eq(&self, other: &Self) -> Option<bool> {
        self.sql_cmp(other).map(Ordering::is_eq)
    }

    /// Ordering as SQL would evaluate it between two non-null scalars.
    #[must_use]
    pub fn sql_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) | (Self::Rowid(a), Self::Rowid(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::Entity(a), Self::Entity(b)) if a.entity == b.entity => {
                Some(a.rowid.cmp(&b.rowid))
            }
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => write!(f, "x\"{}\"", hex::encode(v)),
            Self::Rowid(v) => write!(f, "rowid[{v}]"),
            Self::Entity(e) => write!(f, "{}[{}]", e.entity, e.rowid),
            Self::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if let Some(name) = &field.name {
                        write!(f, "{name}=")?;
                    }
                    write!(f, "{}", field.value)?;
                }
                write!(f, ")")
            }
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

use crate::value::ValueType;
use std::fmt::{self, Display};

///
/// AttributeModel
/// Runtime descriptor for one entity attribute (one SQL column).
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeModel {
    /// Attribute name as used in at-expressions.
    pub name: String,
    /// Physical column name.
    pub sql_name: String,
    pub ty: ValueType,
    pub key: bool,
    pub index: bool,
    pub mutable: bool,
}

impl AttributeModel {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        let name = name.into();

        Self {
            sql_name: name.clone(),
            name,
            ty,
            key: false,
            index: false,
            mutable: false,
        }
    }

    #[must_use]
    pub fn with_sql_name(mut self, sql_name: impl Into<String>) -> Self {
        self.sql_name = sql_name.into();
        self
    }

    #[must_use]
    pub const fn key(mut self) -> Self {
        self.key = true;
        self
    }

    #[must_use]
    pub const fn index(mut self) -> Self {
        self.index = true;
        self
    }

    #[must_use]
    pub const fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    /// Whether following this attribute requires a join (relation attribute).
    #[must_use]
    pub fn is_relation(&self) -> bool {
        self.ty.entity_name().is_some()
    }
}

impl Display for AttributeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)?;
        if self.key {
            write!(f, " key")?;
        } else if self.index {
            write!(f, " index")?;
        }
        Ok(())
    }
}

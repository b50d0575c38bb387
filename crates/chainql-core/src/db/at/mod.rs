//! At-expressions: `entity @ { where } ( what ) limit .. offset ..`.
//!
//! [`AtExpr`] is the input shape produced by a compiler. [`AtExpr::compile`]
//! turns it into a [`CompiledAt`] once; [`AtExecutor`] runs the compiled
//! form any number of times.

pub mod cardinality;
pub mod compile;
pub mod executor;
pub mod extras;
pub mod row;

#[cfg(test)]
mod tests;

use crate::{
    db::expr::DbExpr,
    interp::{FrameBlock, RtExprRef, VarSlot},
    model::EntityModel,
    value::ValueType,
};
use derive_more::Display;
use std::sync::Arc;

// re-exports
pub use cardinality::Cardinality;
pub use compile::CompiledAt;
pub use executor::AtExecutor;
pub use extras::{AtExprExtras, ExtrasError, ExtrasValues};

///
/// AtExprId
/// Identity of one at-expression within a compilation unit.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("@{_0}")]
pub struct AtExprId(pub u32);

///
/// AtEntityId
/// A from-entity binding: expression identity plus position in its `from`.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[display("{expr_id}#{id}")]
pub struct AtEntityId {
    pub expr_id: AtExprId,
    pub id: u32,
}

impl AtEntityId {
    #[must_use]
    pub const fn new(expr_id: AtExprId, id: u32) -> Self {
        Self { expr_id, id }
    }
}

///
/// AtEntity
/// One entity bound in the `from` list of an at-expression.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AtEntity {
    pub entity: Arc<EntityModel>,
    pub id: AtEntityId,
}

impl AtEntity {
    #[must_use]
    pub const fn new(entity: Arc<EntityModel>, expr_id: AtExprId, id: u32) -> Self {
        Self {
            entity,
            id: AtEntityId::new(expr_id, id),
        }
    }
}

///
/// SortDirection
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

///
/// AtWhatValue
///

#[derive(Clone, Debug)]
pub enum AtWhatValue {
    /// Selected and decoded as one column of type `ty`.
    Db { expr: DbExpr, ty: ValueType },

    /// Several columns decoded into frame variables, combined by `expr`.
    Complex(ComplexWhat),
}

///
/// ComplexWhat
///
/// A projection value the database cannot compute on its own. Each of
/// `columns` is selected and decoded into its slot of the at-expression's
/// frame block; `expr` then reads those slots.
///

#[derive(Clone, Debug)]
pub struct ComplexWhat {
    pub columns: Vec<(DbExpr, ValueType, VarSlot)>,
    pub expr: RtExprRef,
}

///
/// AtWhatField
///

#[derive(Clone, Debug)]
pub struct AtWhatField {
    pub name: Option<String>,
    pub value: AtWhatValue,
    pub sort: Option<SortDirection>,
    /// Selected (for sorting) but not part of the result.
    pub omit: bool,
}

impl AtWhatField {
    #[must_use]
    pub const fn db(expr: DbExpr, ty: ValueType) -> Self {
        Self {
            name: None,
            value: AtWhatValue::Db { expr, ty },
            sort: None,
            omit: false,
        }
    }

    #[must_use]
    pub const fn complex(complex: ComplexWhat) -> Self {
        Self {
            name: None,
            value: AtWhatValue::Complex(complex),
            sort: None,
            omit: false,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn sort(mut self, direction: SortDirection) -> Self {
        self.sort = Some(direction);
        self
    }

    #[must_use]
    pub const fn omit(mut self) -> Self {
        self.omit = true;
        self
    }
}

///
/// AtExpr
///

#[derive(Clone, Debug)]
pub struct AtExpr {
    pub id: AtExprId,
    pub from: Vec<AtEntity>,
    pub where_: Option<DbExpr>,
    /// Empty selects the from-entities themselves.
    pub what: Vec<AtWhatField>,
    pub cardinality: Cardinality,
    pub extras: AtExprExtras,
    /// Frame block holding the variables of complex projection values.
    pub block: FrameBlock,
}

impl AtExpr {
    #[must_use]
    pub const fn new(id: AtExprId, from: Vec<AtEntity>, cardinality: Cardinality) -> Self {
        Self {
            id,
            from,
            where_: None,
            what: Vec::new(),
            cardinality,
            extras: AtExprExtras::none(),
            block: FrameBlock::new(0, 0),
        }
    }

    #[must_use]
    pub fn filter(mut self, where_: DbExpr) -> Self {
        self.where_ = Some(where_);
        self
    }

    #[must_use]
    pub fn field(mut self, field: AtWhatField) -> Self {
        self.what.push(field);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: RtExprRef) -> Self {
        self.extras.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: RtExprRef) -> Self {
        self.extras.offset = Some(offset);
        self
    }

    #[must_use]
    pub const fn with_block(mut self, block: FrameBlock) -> Self {
        self.block = block;
        self
    }
}

//! Database expressions.
//!
//! [`DbExpr`] is the condition/projection tree a compiler hands to this core.
//! It is reduced once per compilation into a [`RedExpr`]: entity references
//! are replaced by table aliases, joins are allocated, and constant
//! sub-trees are folded. A reduced expression renders to SQL text that is
//! the same on every execution; only the bound parameters change.

mod reduce;
mod when;


use crate::{
    db::at::{AtEntity, AtExpr},
    interp::RtExprRef,
    model::EntityModel,
    value::Value,
};
use std::sync::Arc;

// re-exports
pub use reduce::{RedExpr, conjoin, reduce};

///
/// UnaryOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
}

///
/// BinaryOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl BinaryOp {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Concat => "||",
        }
    }

    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }
}

///
/// SqlFunction
/// Scalar functions available in both supported SQL dialects.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SqlFunction {
    Abs,
    Coalesce,
    Length,
    Lower,
    Upper,
}

impl SqlFunction {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Abs => "ABS",
            Self::Coalesce => "COALESCE",
            Self::Length => "LENGTH",
            Self::Lower => "LOWER",
            Self::Upper => "UPPER",
        }
    }
}

///
/// WhenCase
///
/// One branch of a `when`. For a keyed `when(key)` the conditions are the
/// values compared against the key; otherwise they are boolean conditions,
/// any of which selects the branch.
///

#[derive(Clone, Debug)]
pub struct WhenCase {
    pub conds: Vec<DbExpr>,
    pub value: DbExpr,
}

impl WhenCase {
    #[must_use]
    pub const fn new(conds: Vec<DbExpr>, value: DbExpr) -> Self {
        Self { conds, value }
    }
}

///
/// DbExpr
///

#[derive(Clone, Debug)]
pub enum DbExpr {
    /// Compile-time constant; bound as a parameter.
    Constant(Value),

    /// Value computed by the interpreter at bind time; bound as a parameter.
    Interpreted(RtExprRef),

    /// A from-entity of an enclosing at-expression.
    Entity(AtEntity),

    /// Relation attribute `base.attr` pointing at a `target` row.
    Rel {
        base: Box<Self>,
        attr: String,
        target: Arc<EntityModel>,
    },

    /// Plain attribute `base.attr`; `base` must denote an entity.
    Attr { base: Box<Self>, attr: String },

    Unary { op: UnaryOp, expr: Box<Self> },

    Binary {
        op: BinaryOp,
        left: Box<Self>,
        right: Box<Self>,
    },

    In {
        expr: Box<Self>,
        values: Vec<Self>,
        not: bool,
    },

    Call { func: SqlFunction, args: Vec<Self> },

    When {
        key: Option<Box<Self>>,
        cases: Vec<WhenCase>,
        else_: Option<Box<Self>>,
    },

    /// `[NOT] EXISTS (<at>)`.
    Exists { sub: Box<AtExpr>, not: bool },

    /// `expr [NOT] IN (<at>)`.
    InAt {
        expr: Box<Self>,
        sub: Box<AtExpr>,
        not: bool,
    },

    /// Scalar sub-query `(<at>)`.
    NestedAt(Box<AtExpr>),
}

impl DbExpr {
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    #[must_use]
    pub const fn interpreted(expr: RtExprRef) -> Self {
        Self::Interpreted(expr)
    }

    #[must_use]
    pub const fn entity(at_entity: AtEntity) -> Self {
        Self::Entity(at_entity)
    }

    #[must_use]
    pub fn rel(base: Self, attr: impl Into<String>, target: Arc<EntityModel>) -> Self {
        Self::Rel {
            base: Box::new(base),
            attr: attr.into(),
            target,
        }
    }

    #[must_use]
    pub fn attr(base: Self, attr: impl Into<String>) -> Self {
        Self::Attr {
            base: Box::new(base),
            attr: attr.into(),
        }
    }

    #[must_use]
    pub fn unary(op: UnaryOp, expr: Self) -> Self {
        Self::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    #[must_use]
    pub fn binary(op: BinaryOp, left: Self, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn equals(left: Self, right: Self) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        Self::binary(BinaryOp::And, left, right)
    }

    #[must_use]
    pub fn in_list(expr: Self, values: Vec<Self>, not: bool) -> Self {
        Self::In {
            expr: Box::new(expr),
            values,
            not,
        }
    }

    #[must_use]
    pub const fn call(func: SqlFunction, args: Vec<Self>) -> Self {
        Self::Call { func, args }
    }

    /// Keyed `when(key) { ... }`.
    #[must_use]
    pub fn when_keyed(key: Self, cases: Vec<WhenCase>, else_: Option<Self>) -> Self {
        Self::When {
            key: Some(Box::new(key)),
            cases,
            else_: else_.map(Box::new),
        }
    }

    /// General `when { cond -> value; ... }`.
    #[must_use]
    pub fn when(cases: Vec<WhenCase>, else_: Option<Self>) -> Self {
        Self::When {
            key: None,
            cases,
            else_: else_.map(Box::new),
        }
    }

    #[must_use]
    pub fn exists(sub: AtExpr, not: bool) -> Self {
        Self::Exists {
            sub: Box::new(sub),
            not,
        }
    }

    #[must_use]
    pub fn in_at(expr: Self, sub: AtExpr, not: bool) -> Self {
        Self::InAt {
            expr: Box::new(expr),
            sub: Box::new(sub),
            not,
        }
    }

    #[must_use]
    pub fn nested(sub: AtExpr) -> Self {
        Self::NestedAt(Box::new(sub))
    }
}

//! Core of the chainql runtime: entity-to-SQL mapping, at-expression
//! compilation and execution, and the chain context they run against.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod interp;
pub mod model;
pub mod obs;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

///
/// CONSTANTS
///

pub use db::sql::MAX_SQL_PARAMS;
pub use interp::frame::DEFAULT_FRAME_CAPACITY;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, executors, drivers, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{
            at::{AtEntity, AtExpr, AtExprId, AtWhatField, Cardinality, SortDirection},
            expr::{BinaryOp, DbExpr, UnaryOp},
        },
        model::{AttributeModel, EntityModel, ExternalChainRef},
        value::{Value, ValueType},
    };
}

//! At-expression read path: SQL generation, expression lowering and execution.
//!
//! - `sql`: entity-to-table mapping, parameterized statements, alias scopes, driver seam
//! - `expr`: condition trees and their reduction to SQL
//! - `at`: at-expression model, compiler, extras, row decoding and executor
//! - `response`: cardinality enforcement and result shaping

pub mod at;
pub mod expr;
pub mod response;
pub mod sql;

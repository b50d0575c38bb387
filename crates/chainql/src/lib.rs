//! ## Crate layout
//! - `core`: entity-to-SQL mapping, at-expression compilation and execution,
//!   chain linking, configuration and observability.
//! - `error`: the public error type callers match on.
//! - `session`: one linked database context with its executor.
//!
//! The `prelude` module mirrors the vocabulary needed to build and run
//! at-expressions.

pub use chainql_core as core;

pub mod error;
pub mod session;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use error::Error;
pub use session::Session;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{Error, Session};
    pub use chainql_core::{
        config::RuntimeConfig,
        interp::{ConstantExpr, Frame},
        obs::{metrics_report, metrics_reset_all},
        prelude::*,
    };
}

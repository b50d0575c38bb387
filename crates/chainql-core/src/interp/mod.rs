//! Interpreter seam.
//!
//! The general-purpose interpreter lives outside this crate. The at-expression
//! core only needs two things from it: a bounded variable frame with block
//! push/pop, and expressions it can evaluate against that frame (limit/offset,
//! runtime SQL parameters, complex projection values).

pub mod expr;
pub mod frame;

pub use expr::{ConstantExpr, FnExpr, RtExpr, RtExprRef, VarExpr};
pub use frame::{Frame, FrameBlock, VarSlot};

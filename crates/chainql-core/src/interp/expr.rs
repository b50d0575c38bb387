use crate::{
    error::InternalError,
    interp::frame::{Frame, VarSlot},
    value::Value,
};
use std::{fmt, sync::Arc};

///
/// RtExpr
/// An interpreted (non-SQL) expression evaluated against the current frame.
///

pub trait RtExpr: fmt::Debug + Send + Sync {
    fn evaluate(&self, frame: &mut Frame) -> Result<Value, InternalError>;
}

pub type RtExprRef = Arc<dyn RtExpr>;

///
/// ConstantExpr
///

#[derive(Debug)]
pub struct ConstantExpr(pub Value);

impl ConstantExpr {
    #[must_use]
    pub fn shared(value: impl Into<Value>) -> RtExprRef {
        Arc::new(Self(value.into()))
    }
}

impl RtExpr for ConstantExpr {
    fn evaluate(&self, _: &mut Frame) -> Result<Value, InternalError> {
        Ok(self.0.clone())
    }
}

///
/// VarExpr
/// Reads one frame variable.
///

#[derive(Debug)]
pub struct VarExpr(pub VarSlot);

impl VarExpr {
    #[must_use]
    pub fn shared(slot: VarSlot) -> RtExprRef {
        Arc::new(Self(slot))
    }
}

impl RtExpr for VarExpr {
    fn evaluate(&self, frame: &mut Frame) -> Result<Value, InternalError> {
        frame.get(self.0).cloned()
    }
}

type EvalFn = dyn Fn(&mut Frame) -> Result<Value, InternalError> + Send + Sync;

///
/// FnExpr
/// Host-provided expression; the label is only used for diagnostics.
///

pub struct FnExpr {
    label: &'static str,
    f: Box<EvalFn>,
}

impl FnExpr {
    #[must_use]
    pub fn shared(
        label: &'static str,
        f: impl Fn(&mut Frame) -> Result<Value, InternalError> + Send + Sync + 'static,
    ) -> RtExprRef {
        Arc::new(Self {
            label,
            f: Box::new(f),
        })
    }
}

impl fmt::Debug for FnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnExpr({})", self.label)
    }
}

impl RtExpr for FnExpr {
    fn evaluate(&self, frame: &mut Frame) -> Result<Value, InternalError> {
        (self.f)(frame)
    }
}

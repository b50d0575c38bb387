use crate::{
    error::{ErrorClass, ErrorDetail, ErrorOrigin, InternalError},
    interp::{Frame, RtExprRef},
    value::Value,
};
use thiserror::Error as ThisError;

///
/// ExtrasError
///

#[derive(Debug, ThisError)]
pub enum ExtrasError {
    #[error("negative limit: {value}")]
    NegativeLimit { value: i64 },

    #[error("negative offset: {value}")]
    NegativeOffset { value: i64 },
}

impl ExtrasError {
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::NegativeLimit { value } => format!("at:limit:negative:{value}"),
            Self::NegativeOffset { value } => format!("at:offset:negative:{value}"),
        }
    }
}

impl From<ExtrasError> for InternalError {
    fn from(err: ExtrasError) -> Self {
        Self {
            class: ErrorClass::InvalidArgument,
            origin: ErrorOrigin::Executor,
            message: err.to_string(),
            detail: Some(ErrorDetail::Extras(err)),
        }
    }
}

///
/// ExtrasValues
/// Evaluated `limit` / `offset` of one execution.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExtrasValues {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ExtrasValues {
    /// A zero limit: the query cannot return anything.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.limit, Some(0))
    }
}

///
/// AtExprExtras
/// `limit` / `offset` expressions, evaluated by the interpreter per call.
///

#[derive(Clone, Debug, Default)]
pub struct AtExprExtras {
    pub limit: Option<RtExprRef>,
    pub offset: Option<RtExprRef>,
}

impl AtExprExtras {
    #[must_use]
    pub const fn none() -> Self {
        Self {
            limit: None,
            offset: None,
        }
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.limit.is_none() && self.offset.is_none()
    }

    /// Evaluate limit, then offset.
    ///
    /// A zero limit means nothing will be fetched, so the offset expression
    /// is not evaluated at all.
    pub fn evaluate(&self, frame: &mut Frame) -> Result<ExtrasValues, InternalError> {
        let limit = self
            .limit
            .as_ref()
            .map(|expr| eval_count(expr, frame, "limit"))
            .transpose()?;

        if limit == Some(0) {
            return Ok(ExtrasValues {
                limit,
                offset: None,
            });
        }

        let offset = self
            .offset
            .as_ref()
            .map(|expr| eval_count(expr, frame, "offset"))
            .transpose()?;

        Ok(ExtrasValues { limit, offset })
    }
}

fn eval_count(expr: &RtExprRef, frame: &mut Frame, what: &str) -> Result<u64, InternalError> {
    let value = match expr.evaluate(frame)? {
        Value::Int(v) => v,
        other => {
            return Err(InternalError::executor_invariant(format!(
                "{what} must evaluate to an integer, got {other}"
            )));
        }
    };

    u64::try_from(value).map_err(|_| {
        if what == "limit" {
            ExtrasError::NegativeLimit { value }.into()
        } else {
            ExtrasError::NegativeOffset { value }.into()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::{ConstantExpr, FnExpr};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn counting(value: i64, calls: &Arc<AtomicUsize>) -> RtExprRef {
        let calls = Arc::clone(calls);
        FnExpr::shared("counting", move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Int(value))
        })
    }

    #[test]
    fn zero_limit_skips_offset() {
        let calls = Arc::new(AtomicUsize::new(0));
        let extras = AtExprExtras {
            limit: Some(ConstantExpr::shared(0_i64)),
            offset: Some(counting(5, &calls)),
        };

        let values = extras.evaluate(&mut Frame::new()).expect("extras");

        assert!(values.is_empty());
        assert_eq!(values.offset, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn offset_is_evaluated_after_nonzero_limit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let extras = AtExprExtras {
            limit: Some(ConstantExpr::shared(3_i64)),
            offset: Some(counting(5, &calls)),
        };

        let values = extras.evaluate(&mut Frame::new()).expect("extras");

        assert_eq!(
            values,
            ExtrasValues {
                limit: Some(3),
                offset: Some(5)
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn negative_values_are_rejected() {
        let limit = AtExprExtras {
            limit: Some(ConstantExpr::shared(-1_i64)),
            offset: None,
        };
        let err = limit.evaluate(&mut Frame::new()).unwrap_err();
        assert_eq!(err.code(), "at:limit:negative:-1");
        assert_eq!(err.class, ErrorClass::InvalidArgument);

        let offset = AtExprExtras {
            limit: None,
            offset: Some(ConstantExpr::shared(-7_i64)),
        };
        let err = offset.evaluate(&mut Frame::new()).unwrap_err();
        assert_eq!(err.code(), "at:offset:negative:-7");
    }

    #[test]
    fn non_integer_is_an_invariant_violation() {
        let extras = AtExprExtras {
            limit: Some(ConstantExpr::shared("ten")),
            offset: None,
        };
        let err = extras.evaluate(&mut Frame::new()).unwrap_err();

        assert!(err.is_invariant_violation());
    }
}

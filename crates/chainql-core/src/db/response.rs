use crate::error::{ErrorClass, ErrorDetail, ErrorOrigin, InternalError};
use thiserror::Error as ThisError;

///
/// ResponseError
/// Row count of a result does not satisfy its cardinality.
///

#[derive(Debug, ThisError)]
pub enum ResponseError {
    #[error("no records found")]
    NotFound,

    #[error("multiple records found: {count}")]
    NotUnique { count: u64 },
}

impl ResponseError {
    /// Number of rows actually returned.
    #[must_use]
    pub const fn count(&self) -> u64 {
        match self {
            Self::NotFound => 0,
            Self::NotUnique { count } => *count,
        }
    }

    #[must_use]
    pub fn code(&self) -> String {
        format!("at:wrong_count:{}", self.count())
    }

    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound => ErrorClass::NotFound,
            Self::NotUnique { .. } => ErrorClass::Conflict,
        }
    }
}

impl From<ResponseError> for InternalError {
    fn from(err: ResponseError) -> Self {
        Self {
            class: err.class(),
            origin: ErrorOrigin::Response,
            message: err.to_string(),
            detail: Some(ErrorDetail::Response(err)),
        }
    }
}

use crate::{
    chain::InitError,
    db::{at::ExtrasError, response::ResponseError, sql::SqlError},
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// The public surface converts it into `chainql::Error`.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `origin`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a query-origin invariant violation.
    pub(crate) fn query_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Query,
            message.into(),
        )
    }

    /// Construct an executor-origin invariant violation.
    pub(crate) fn executor_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Executor,
            message.into(),
        )
    }

    /// Construct an interpreter-origin invariant violation.
    pub(crate) fn interpreter_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Interpreter,
            message.into(),
        )
    }

    /// Stable machine-readable error code.
    ///
    /// Runtime data errors carry the codes the runtime reports to clients
    /// (`at:wrong_count:2`, `sql:too_many_params:32768`, ...). Errors without
    /// structured detail fall back to `<origin>:<class>`.
    #[must_use]
    pub fn code(&self) -> String {
        match &self.detail {
            Some(detail) => detail.code(),
            None => format!("{}:{}", self.origin, self.class),
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }

    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self.class, ErrorClass::InvariantViolation)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Init(InitError),

    #[error("{0}")]
    Response(ResponseError),

    #[error("{0}")]
    Sql(SqlError),

    #[error("{0}")]
    Extras(ExtrasError),
}

impl ErrorDetail {
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::Init(err) => err.code(),
            Self::Response(err) => err.code(),
            Self::Sql(err) => err.code(),
            Self::Extras(err) => err.code(),
        }
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Execution context could not be built; nothing may run against it.
    Initialization,
    /// The caller fed this core an impossible shape.
    InvariantViolation,
    NotFound,
    Conflict,
    InvalidArgument,
    Unsupported,
    Driver,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Initialization => "initialization",
            Self::InvariantViolation => "invariant_violation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidArgument => "invalid_argument",
            Self::Unsupported => "unsupported",
            Self::Driver => "driver",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Config,
    Chain,
    Sql,
    Query,
    Response,
    Executor,
    Interpreter,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Config => "config",
            Self::Chain => "chain",
            Self::Sql => "sql",
            Self::Query => "query",
            Self::Response => "response",
            Self::Executor => "executor",
            Self::Interpreter => "interpreter",
        };
        write!(f, "{label}")
    }
}

use chainql_core::error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy and the runtime's
/// machine-readable code.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,

    /// Stable code such as `at:wrong_count:2` or `external_chain_no_rid`.
    pub code: String,
    pub message: String,
}

impl Error {
    pub fn new(
        kind: ErrorKind,
        origin: ErrorOrigin,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            origin,
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let code = err.code();
        Self::new(err.class.into(), err.origin.into(), code, err.message)
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers of the runtime.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// The execution context could not be built.
    Init,

    Query(QueryErrorKind),

    /// The database driver failed.
    Store,

    /// The caller cannot remediate this.
    Internal,
}

impl From<ErrorClass> for ErrorKind {
    fn from(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Initialization => Self::Init,
            ErrorClass::NotFound => Self::Query(QueryErrorKind::NotFound),
            ErrorClass::Conflict => Self::Query(QueryErrorKind::NotUnique),
            ErrorClass::InvalidArgument => Self::Query(QueryErrorKind::InvalidArgument),
            ErrorClass::Unsupported => Self::Query(QueryErrorKind::Unsupported),
            ErrorClass::Driver => Self::Store,
            ErrorClass::InvariantViolation | ErrorClass::Internal => Self::Internal,
        }
    }
}

///
/// QueryErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum QueryErrorKind {
    /// A value computed at runtime is out of range (negative limit, too many
    /// parameters).
    InvalidArgument,

    /// A value cannot be bound to a statement.
    Unsupported,

    /// Exactly-one or one-or-more expression matched nothing.
    NotFound,

    /// At-most-one expression matched several rows.
    NotUnique,
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Config,
    Chain,
    Sql,
    Query,
    Response,
    Executor,
    Interpreter,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Chain => Self::Chain,
            CoreErrorOrigin::Sql => Self::Sql,
            CoreErrorOrigin::Query => Self::Query,
            CoreErrorOrigin::Response => Self::Response,
            CoreErrorOrigin::Executor => Self::Executor,
            CoreErrorOrigin::Interpreter => Self::Interpreter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainql_core::db::{
        at::Cardinality,
        sql::{MAX_SQL_PARAMS, ParameterizedSql},
    };
    use chainql_core::value::Value;

    #[test]
    fn cardinality_violation_keeps_its_code() {
        let internal: InternalError = Cardinality::ZeroOne.check(2).unwrap_err().into();

        let err = Error::from(internal);

        assert_eq!(err.kind, ErrorKind::Query(QueryErrorKind::NotUnique));
        assert_eq!(err.origin, ErrorOrigin::Response);
        assert_eq!(err.code, "at:wrong_count:2");
        assert_eq!(err.to_string(), "multiple records found: 2");
    }

    #[test]
    fn parameter_overflow_is_an_invalid_argument() {
        let internal =
            ParameterizedSql::new("", vec![Value::Null; MAX_SQL_PARAMS + 1]).unwrap_err();

        let err = Error::from(internal);

        assert_eq!(err.kind, ErrorKind::Query(QueryErrorKind::InvalidArgument));
        assert_eq!(err.origin, ErrorOrigin::Sql);
        assert_eq!(err.code, "sql:too_many_params:32768");
    }

    #[test]
    fn invariant_violations_are_internal() {
        let internal = InternalError::new(
            ErrorClass::InvariantViolation,
            CoreErrorOrigin::Query,
            "alias not found",
        );

        let err = Error::from(internal);

        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.code, "query:invariant_violation");
    }

    #[test]
    fn error_survives_json() {
        let err = Error::new(
            ErrorKind::Init,
            ErrorOrigin::Chain,
            "external_chain_no_rid",
            "external chain 'payments' not found",
        );

        let json = serde_json::to_string(&err).expect("serialize");
        let back: Error = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back, err);
        assert!(json.contains("\"Chain\""));
    }
}

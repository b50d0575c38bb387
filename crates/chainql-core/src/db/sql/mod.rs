pub mod alias;
pub mod builder;
pub mod context;
pub mod driver;
pub mod mapping;


use crate::error::{ErrorClass, ErrorDetail, ErrorOrigin, InternalError};
use thiserror::Error as ThisError;

// re-exports
pub use alias::{AliasAllocator, TableAlias};
pub use builder::{MAX_SQL_PARAMS, ParameterizedSql, SqlBuilder};
pub use context::{FromEntity, FromInfo, FromJoin, ScopeId, SqlGenContext, SqlGenTree};
pub use driver::{SqlExecutor, SqlRow, SqlValue, SqliteExecutor};
pub use mapping::EntitySqlMapping;

///
/// SqlError
/// Failures raised while building or running a statement.
///

#[derive(Debug, ThisError)]
pub enum SqlError {
    #[error("SQL query is too big, too many parameters: {count} (max: {MAX_SQL_PARAMS})")]
    TooManyParams { count: usize },

    #[error("value cannot be bound as a SQL parameter: {value}")]
    UnbindableValue { value: String },

    #[error("sql driver error: {message}")]
    Driver { message: String },
}

impl SqlError {
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::TooManyParams { count } => format!("sql:too_many_params:{count}"),
            Self::UnbindableValue { .. } => "sql:unbindable_param".to_string(),
            Self::Driver { .. } => "sql:driver".to_string(),
        }
    }

    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::TooManyParams { .. } => ErrorClass::InvalidArgument,
            Self::UnbindableValue { .. } => ErrorClass::Unsupported,
            Self::Driver { .. } => ErrorClass::Driver,
        }
    }
}

impl From<SqlError> for InternalError {
    fn from(err: SqlError) -> Self {
        Self {
            class: err.class(),
            origin: ErrorOrigin::Sql,
            message: err.to_string(),
            detail: Some(ErrorDetail::Sql(err)),
        }
    }
}

impl From<rusqlite::Error> for InternalError {
    fn from(err: rusqlite::Error) -> Self {
        SqlError::Driver {
            message: err.to_string(),
        }
        .into()
    }
}

use crate::{
    db::sql::{
        SqlError,
        driver::{SqlExecutor, SqlRow},
    },
    error::InternalError,
    value::Value,
};
use std::fmt::{self, Display};

/// Hard ceiling on bound parameters per statement.
///
/// The PostgreSQL wire protocol encodes the parameter count as a signed
/// 16-bit integer; drivers leave the connection in a broken state past it.
pub const MAX_SQL_PARAMS: usize = 32767;

///
/// ParameterizedSql
///
/// Immutable statement text plus its ordered positional (`?`) parameters.
/// Built once, executed any number of times.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParameterizedSql {
    sql: String,
    params: Vec<Value>,
}

impl ParameterizedSql {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Result<Self, InternalError> {
        check_param_count(params.len())?;

        Ok(Self {
            sql: sql.into(),
            params,
        })
    }

    /// Build a statement with a [`SqlBuilder`].
    pub fn generate(
        f: impl FnOnce(&mut SqlBuilder) -> Result<(), InternalError>,
    ) -> Result<Self, InternalError> {
        let mut builder = SqlBuilder::new();
        f(&mut builder)?;
        builder.build()
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    #[must_use]
    pub const fn param_count(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Run a statement that returns no rows; yields the affected row count.
    pub fn execute(&self, exec: &dyn SqlExecutor) -> Result<u64, InternalError> {
        check_param_count(self.params.len())?;
        exec.execute(&self.sql, &self.params)
    }

    /// Run a query, handing every row to `on_row`.
    pub fn execute_query(
        &self,
        exec: &dyn SqlExecutor,
        mut on_row: impl FnMut(&dyn SqlRow) -> Result<(), InternalError>,
    ) -> Result<(), InternalError> {
        check_param_count(self.params.len())?;
        exec.query(&self.sql, &self.params, &mut on_row)
    }
}

impl Display for ParameterizedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            write!(f, " [")?;
            for (i, param) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{param}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

fn check_param_count(count: usize) -> Result<(), InternalError> {
    if count > MAX_SQL_PARAMS {
        return Err(SqlError::TooManyParams { count }.into());
    }

    Ok(())
}

///
/// SqlBuilder
/// Accumulates statement text and positional parameters.
///

#[derive(Debug, Default)]
pub struct SqlBuilder {
    sql: String,
    params: Vec<Value>,
}

impl SqlBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    #[must_use]
    pub const fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Append raw SQL text.
    pub fn append(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Append a double-quoted identifier.
    pub fn append_name(&mut self, name: &str) {
        self.sql.push('"');
        self.sql.push_str(&name.replace('"', "\"\""));
        self.sql.push('"');
    }

    /// Append `alias."column"`.
    pub fn append_column(&mut self, alias: &str, column: &str) {
        self.sql.push_str(alias);
        self.sql.push('.');
        self.append_name(column);
    }

    /// Bind a positional parameter.
    pub fn append_value(&mut self, value: Value) {
        self.sql.push('?');
        self.params.push(value);
    }

    /// Splice another statement, text and parameters.
    pub fn append_sql(&mut self, sql: &ParameterizedSql) {
        self.sql.push_str(&sql.sql);
        self.params.extend(sql.params.iter().cloned());
    }

    /// Append `items` separated by `sep`, rendering each with `f`.
    pub fn append_list<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        sep: &str,
        mut f: impl FnMut(&mut Self, T) -> Result<(), InternalError>,
    ) -> Result<(), InternalError> {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.append(sep);
            }
            f(self, item)?;
        }
        Ok(())
    }

    pub fn build(self) -> Result<ParameterizedSql, InternalError> {
        ParameterizedSql::new(self.sql, self.params)
    }
}

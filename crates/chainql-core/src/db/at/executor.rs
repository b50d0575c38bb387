use crate::{
    chain::SqlContext,
    db::{
        at::CompiledAt,
        sql::{ParameterizedSql, SqlExecutor, SqlValue},
    },
    error::InternalError,
    interp::Frame,
    model::EntityModel,
    obs::sink::{self, MetricsEvent, Span},
    value::Value,
};
use tracing::{debug, warn};

///
/// AtExecutor
///
/// Runs compiled at-expressions against one connection.
/// Every call evaluates limit/offset first; a zero limit never reaches the
/// database.
///

#[derive(Clone, Copy)]
pub struct AtExecutor<'a> {
    exec: &'a dyn SqlExecutor,
    debug: bool,
}

impl<'a> AtExecutor<'a> {
    #[must_use]
    pub const fn new(exec: &'a dyn SqlExecutor) -> Self {
        Self { exec, debug: false }
    }

    /// Log every statement with its parameters.
    #[must_use]
    pub const fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn debug_log(&self, compiled: &CompiledAt, sql: &ParameterizedSql) {
        if self.debug {
            debug!(at = %compiled.id(), entity = compiled.label(), sql = %sql, "at-expression statement");
        }
    }

    /// Evaluate `compiled` in `frame`.
    ///
    /// Multi-row cardinalities yield a [`Value::List`]; single-row ones yield
    /// the element itself, or [`Value::Null`] when zero rows are allowed and
    /// none came back.
    pub fn evaluate(&self, frame: &mut Frame, compiled: &CompiledAt) -> Result<Value, InternalError> {
        let mut span = Span::new(compiled.label());
        let extras = compiled.extras().evaluate(frame)?;

        let mut rows = Vec::new();
        if extras.is_empty() {
            sink::record(MetricsEvent::LimitShortCircuit {
                entity: compiled.label(),
            });
        } else {
            frame.block(compiled.block(), |frame| {
                let sql = compiled.build_sql(frame, &extras)?;
                sink::record(MetricsEvent::SqlStatement {
                    params: sql.param_count() as u64,
                });
                self.debug_log(compiled, &sql);

                let decoder = compiled.decoder();
                sql.execute_query(self.exec, |row| {
                    rows.push(decoder.decode(frame, row)?);
                    Ok(())
                })
            })?;
        }

        let count = rows.len();
        span.set_rows(count as u64);

        let cardinality = compiled.cardinality();
        if let Err(err) = cardinality.check(count) {
            sink::record(MetricsEvent::CardinalityViolation {
                entity: compiled.label(),
                count: err.count(),
            });
            warn!(
                at = %compiled.id(),
                entity = compiled.label(),
                %cardinality,
                count,
                "at-expression cardinality violated"
            );

            return Err(err.into());
        }

        if cardinality.allows_many() {
            return Ok(Value::List(rows));
        }

        Ok(rows.pop().unwrap_or(Value::Null))
    }

    /// Row ids of `entity` rows matching `where_`, where `where_` refers to
    /// the entity table as `A`.
    ///
    /// Rows of external chains above the linked height are not returned.
    pub fn existing_rowids(
        &self,
        sql_ctx: &SqlContext,
        entity: &EntityModel,
        where_: &ParameterizedSql,
    ) -> Result<Vec<i64>, InternalError> {
        let sql = entity.mapping.select_existing_objects(sql_ctx, where_)?;
        sink::record(MetricsEvent::SqlStatement {
            params: sql.param_count() as u64,
        });
        if self.debug {
            debug!(entity = %entity.name, sql = %sql, "existing rowids statement");
        }

        let mut rowids = Vec::new();
        sql.execute_query(self.exec, |row| {
            match row.value(0)? {
                SqlValue::Integer(rowid) => rowids.push(rowid),
                other => {
                    return Err(InternalError::executor_invariant(format!(
                        "row id of {} is not an integer: {other:?}",
                        entity.name
                    )));
                }
            }
            Ok(())
        })?;

        Ok(rowids)
    }
}


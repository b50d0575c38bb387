use crate::Error;
use chainql_core::{
    chain::SqlContext,
    config::RuntimeConfig,
    db::{
        at::{AtExecutor, AtExpr, CompiledAt},
        sql::{ParameterizedSql, SqlExecutor},
    },
    interp::Frame,
    model::EntityModel,
    value::Value,
};
use std::sync::Arc;

///
/// Session
/// A linked [`SqlContext`] bound to the executor it was initialized against.
///

pub struct Session<'a> {
    exec: &'a dyn SqlExecutor,
    sql_ctx: SqlContext,
    debug: bool,
    frame_capacity: usize,
}

impl<'a> Session<'a> {
    /// Link external chains, check their metadata and bind the result to
    /// `exec`.
    pub fn open(
        config: &RuntimeConfig,
        exec: &'a dyn SqlExecutor,
        entities: &[Arc<EntityModel>],
    ) -> Result<Self, Error> {
        let sql_ctx = SqlContext::initialize(config, exec, entities)?;

        Ok(Self {
            exec,
            sql_ctx,
            debug: config.debug,
            frame_capacity: config.frame_capacity,
        })
    }

    #[must_use]
    pub const fn sql_context(&self) -> &SqlContext {
        &self.sql_ctx
    }

    pub fn compile(&self, expr: &AtExpr) -> Result<CompiledAt, Error> {
        Ok(expr.compile(&self.sql_ctx)?)
    }

    /// Compile and evaluate `expr` in a fresh frame.
    pub fn at(&self, expr: &AtExpr) -> Result<Value, Error> {
        let compiled = self.compile(expr)?;
        let mut frame = Frame::with_capacity(self.frame_capacity);

        self.evaluate(&mut frame, &compiled)
    }

    /// Evaluate an already compiled expression in the caller's frame.
    pub fn evaluate(&self, frame: &mut Frame, compiled: &CompiledAt) -> Result<Value, Error> {
        Ok(self.executor().evaluate(frame, compiled)?)
    }

    /// Row ids of `entity` matching `where_`, restricted to rows visible at
    /// the linked height for external entities.
    pub fn existing_rowids(
        &self,
        entity: &EntityModel,
        where_: &ParameterizedSql,
    ) -> Result<Vec<i64>, Error> {
        Ok(self
            .executor()
            .existing_rowids(&self.sql_ctx, entity, where_)?)
    }

    fn executor(&self) -> AtExecutor<'a> {
        AtExecutor::new(self.exec).debug(self.debug)
    }
}

use crate::{
    chain::SqlContext,
    db::{
        at::{
            AtExpr, AtExprId, AtWhatValue, Cardinality, SortDirection,
            extras::{AtExprExtras, ExtrasValues},
            row::{FieldDecoder, RowDecoder},
        },
        expr::{DbExpr, RedExpr, conjoin, reduce},
        sql::{FromInfo, ParameterizedSql, SqlBuilder, SqlGenContext, SqlGenTree},
    },
    error::InternalError,
    interp::{Frame, FrameBlock, VarSlot},
    obs::sink::{self, MetricsEvent},
    value::{Value, ValueType},
};
use tracing::debug;

///
/// CompiledJoin
///

#[derive(Clone, Debug)]
struct CompiledJoin {
    table: String,
    alias: String,
    rowid: &'static str,
    base: String,
    column: String,
}

///
/// CompiledFrom
/// One from-entity table and the joins hanging off it.
///

#[derive(Clone, Debug)]
struct CompiledFrom {
    table: String,
    alias: String,
    joins: Vec<CompiledJoin>,
}

///
/// CompiledAt
///
/// An at-expression with every alias, join and table name fixed. Rendering
/// produces the same SQL text on every call; interpreted parameters and
/// limit/offset are evaluated per call.
///

#[derive(Clone, Debug)]
pub struct CompiledAt {
    id: AtExprId,
    label: String,
    from: Vec<CompiledFrom>,
    from_info: FromInfo,
    select: Vec<RedExpr>,
    where_: Option<RedExpr>,
    order_by: Vec<(RedExpr, SortDirection)>,
    extras: AtExprExtras,
    decoder: RowDecoder,
    cardinality: Cardinality,
    block: FrameBlock,
    aliases: u32,
}

impl AtExpr {
    /// Compile into a reusable [`CompiledAt`].
    pub fn compile(&self, sql_ctx: &SqlContext) -> Result<CompiledAt, InternalError> {
        let mut tree = SqlGenTree::new();
        let mut compiled = {
            let mut ctx = tree.root(self.id, &self.from)?;
            compile_scope(self, &mut ctx, sql_ctx, true)?
        };
        compiled.aliases = tree.allocated();

        let joins = compiled.join_count();
        sink::record(MetricsEvent::AtCompiled {
            aliases: u64::from(compiled.aliases),
            joins: joins as u64,
        });
        debug!(
            at = %self.id,
            entity = %compiled.label,
            aliases = compiled.aliases,
            joins,
            "at-expression compiled"
        );

        Ok(compiled)
    }
}

/// Compile a nested at-expression in a child scope of `ctx`.
pub(crate) fn compile_sub(
    sub: &AtExpr,
    ctx: &mut SqlGenContext<'_>,
    sql_ctx: &SqlContext,
) -> Result<CompiledAt, InternalError> {
    let mut sub_ctx = ctx.create_sub(sub.id, &sub.from)?;
    compile_scope(sub, &mut sub_ctx, sql_ctx, false)
}

fn compile_scope(
    at: &AtExpr,
    ctx: &mut SqlGenContext<'_>,
    sql_ctx: &SqlContext,
    top: bool,
) -> Result<CompiledAt, InternalError> {
    let Some(first) = at.from.first() else {
        return Err(InternalError::query_invariant(format!(
            "at-expression {} has no from-entities",
            at.id
        )));
    };

    // where: the caller's condition, then the visibility rules of each
    // from-entity's mapping
    let mut where_ = at
        .where_
        .as_ref()
        .map(|w| reduce(w, ctx, sql_ctx))
        .transpose()?;

    for at_entity in &at.from {
        if let Some(extra) = at_entity
            .entity
            .mapping
            .extra_where_expr(sql_ctx, at_entity)?
        {
            let extra = reduce(&extra, ctx, sql_ctx)?;
            where_ = Some(match where_ {
                Some(prev) => conjoin(prev, extra),
                None => extra,
            });
        }
    }
    let where_ = where_.filter(|w| w.bool_constant() != Some(true));

    // what
    let mut select = Vec::new();
    let mut fields = Vec::new();
    let mut order_by = Vec::new();

    if at.what.is_empty() {
        let named = at.from.len() > 1;
        for at_entity in &at.from {
            select.push(reduce(&DbExpr::entity(at_entity.clone()), ctx, sql_ctx)?);
            fields.push(FieldDecoder::Column {
                name: named.then(|| at_entity.entity.name.clone()),
                ty: ValueType::entity(at_entity.entity.name.clone()),
                omit: false,
            });
        }
    }

    for field in &at.what {
        match &field.value {
            AtWhatValue::Db { expr, ty } => {
                let red = reduce(expr, ctx, sql_ctx)?;
                if let Some(direction) = field.sort {
                    order_by.push((red.clone(), direction));
                }
                select.push(red);
                fields.push(FieldDecoder::Column {
                    name: field.name.clone(),
                    ty: ty.clone(),
                    omit: field.omit,
                });
            }
            AtWhatValue::Complex(complex) => {
                if field.sort.is_some() {
                    return Err(InternalError::query_invariant(
                        "complex projection values cannot be sorted",
                    ));
                }

                let mut columns = Vec::with_capacity(complex.columns.len());
                for (expr, ty, slot) in &complex.columns {
                    check_slot(at, *slot)?;
                    select.push(reduce(expr, ctx, sql_ctx)?);
                    columns.push((ty.clone(), *slot));
                }

                fields.push(FieldDecoder::Complex {
                    name: field.name.clone(),
                    columns,
                    expr: complex.expr.clone(),
                    omit: field.omit,
                });
            }
        }
    }

    // Without an explicit sort, rows come back in from-entity row id order
    // so every node returns the same sequence. Unordered sub-queries only
    // need it when limit/offset picks a window.
    if order_by.is_empty() && (top || !at.extras.is_none()) {
        for at_entity in &at.from {
            let rowid = reduce(&DbExpr::entity(at_entity.clone()), ctx, sql_ctx)?;
            order_by.push((rowid, SortDirection::Asc));
        }
    }

    let from_info = ctx.from_info();
    let from = compile_from(&from_info, sql_ctx)?;

    Ok(CompiledAt {
        id: at.id,
        label: first.entity.name.clone(),
        from,
        from_info,
        select,
        where_,
        order_by,
        extras: at.extras.clone(),
        decoder: RowDecoder::new(fields)?,
        cardinality: at.cardinality,
        block: at.block,
        aliases: ctx.allocated(),
    })
}

fn check_slot(at: &AtExpr, slot: VarSlot) -> Result<(), InternalError> {
    let block = at.block;
    if slot.0 < block.offset || slot.0 >= block.offset + block.size {
        return Err(InternalError::query_invariant(format!(
            "variable {slot} is outside the block of at-expression {}",
            at.id
        )));
    }

    Ok(())
}

fn compile_from(
    from_info: &FromInfo,
    sql_ctx: &SqlContext,
) -> Result<Vec<CompiledFrom>, InternalError> {
    from_info
        .entities
        .iter()
        .map(|entity| {
            let joins = entity
                .joins
                .iter()
                .map(|join| {
                    let mapping = &join.alias.entity().mapping;
                    Ok(CompiledJoin {
                        table: mapping.table(sql_ctx)?,
                        alias: join.alias.name().to_string(),
                        rowid: mapping.rowid_column(),
                        base: join.base.name().to_string(),
                        column: join.column.clone(),
                    })
                })
                .collect::<Result<_, InternalError>>()?;

            Ok(CompiledFrom {
                table: entity.alias.entity().mapping.table(sql_ctx)?,
                alias: entity.alias.name().to_string(),
                joins,
            })
        })
        .collect()
}

impl CompiledAt {
    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn id(&self) -> AtExprId {
        self.id
    }

    /// Name of the first from-entity; used for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub const fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    #[must_use]
    pub const fn block(&self) -> FrameBlock {
        self.block
    }

    #[must_use]
    pub const fn extras(&self) -> &AtExprExtras {
        &self.extras
    }

    #[must_use]
    pub const fn from_info(&self) -> &FromInfo {
        &self.from_info
    }

    /// Joins of the outermost FROM clause.
    #[must_use]
    pub fn join_count(&self) -> usize {
        self.from_info.join_count()
    }

    /// Aliases allocated for the whole statement, sub-queries included.
    #[must_use]
    pub const fn alias_count(&self) -> u32 {
        self.aliases
    }

    /// Number of selected columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.decoder.width()
    }

    pub(crate) const fn decoder(&self) -> &RowDecoder {
        &self.decoder
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Render the statement for already evaluated `extras`.
    pub fn build_sql(
        &self,
        frame: &mut Frame,
        extras: &ExtrasValues,
    ) -> Result<ParameterizedSql, InternalError> {
        let mut b = SqlBuilder::new();
        self.render(frame, &mut b, extras)?;
        b.build()
    }

    /// Render as a sub-query, evaluating its own limit/offset.
    pub(crate) fn render_nested(
        &self,
        frame: &mut Frame,
        b: &mut SqlBuilder,
    ) -> Result<(), InternalError> {
        let extras = self.extras.evaluate(frame)?;
        self.render(frame, b, &extras)
    }

    fn render(
        &self,
        frame: &mut Frame,
        b: &mut SqlBuilder,
        extras: &ExtrasValues,
    ) -> Result<(), InternalError> {
        b.append("SELECT ");
        b.append_list(&self.select, ", ", |b, expr| expr.to_sql(frame, b))?;

        b.append(" FROM ");
        b.append_list(&self.from, ", ", |b, from| {
            b.append_name(&from.table);
            b.append(" ");
            b.append(&from.alias);
            for join in &from.joins {
                b.append(" INNER JOIN ");
                b.append_name(&join.table);
                b.append(" ");
                b.append(&join.alias);
                b.append(" ON ");
                b.append_column(&join.alias, join.rowid);
                b.append(" = ");
                b.append_column(&join.base, &join.column);
            }
            Ok(())
        })?;

        if let Some(where_) = &self.where_ {
            b.append(" WHERE ");
            where_.to_sql(frame, b)?;
        }

        if !self.order_by.is_empty() {
            b.append(" ORDER BY ");
            b.append_list(&self.order_by, ", ", |b, (expr, direction)| {
                expr.to_sql(frame, b)?;
                b.append(match direction {
                    SortDirection::Asc => " ASC",
                    SortDirection::Desc => " DESC",
                });
                Ok(())
            })?;
        }

        // Clause presence depends only on the compiled shape, never on the
        // evaluated values, so the text stays stable between calls.
        if self.extras.limit.is_some() || self.extras.offset.is_some() {
            b.append(" LIMIT ");
            b.append_value(Value::Int(extras.limit.map_or(i64::MAX, clamp_i64)));
        }
        if self.extras.offset.is_some() {
            b.append(" OFFSET ");
            b.append_value(Value::Int(extras.offset.map_or(0, clamp_i64)));
        }

        Ok(())
    }
}

fn clamp_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

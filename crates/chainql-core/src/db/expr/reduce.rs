use crate::{
    chain::SqlContext,
    db::{
        at::compile::{CompiledAt, compile_sub},
        expr::{BinaryOp, DbExpr, SqlFunction, UnaryOp, when::lower_when},
        sql::{ParameterizedSql, SqlBuilder, SqlGenContext, TableAlias},
    },
    error::InternalError,
    interp::{Frame, RtExprRef},
    model::EntityModel,
    value::Value,
};
use std::cmp::Ordering;

///
/// RedExpr
///
/// A [`DbExpr`] after alias allocation and constant folding. Immutable and
/// reusable; [`RedExpr::to_sql`] evaluates the interpreted parameters of one
/// execution.
///

#[derive(Clone, Debug)]
pub enum RedExpr {
    Constant(Value),
    Param(RtExprRef),
    Column {
        alias: TableAlias,
        column: String,
    },
    IsNull {
        expr: Box<Self>,
        not: bool,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Self>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Self>,
        right: Box<Self>,
    },
    In {
        expr: Box<Self>,
        values: Vec<Self>,
        not: bool,
    },
    Call {
        func: SqlFunction,
        args: Vec<Self>,
    },
    Case {
        cases: Vec<(Self, Self)>,
        else_: Option<Box<Self>>,
    },
    KeyedCase {
        key: Box<Self>,
        cases: Vec<(Vec<Self>, Self)>,
        else_: Option<Box<Self>>,
    },
    Exists {
        sub: Box<CompiledAt>,
        not: bool,
    },
    InSelect {
        expr: Box<Self>,
        sub: Box<CompiledAt>,
        not: bool,
    },
    Select(Box<CompiledAt>),
}

impl RedExpr {
    #[must_use]
    pub const fn as_constant(&self) -> Option<&Value> {
        match self {
            Self::Constant(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn bool_constant(&self) -> Option<bool> {
        match self {
            Self::Constant(Value::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Whether rendering this expression emits a nested `SELECT`.
    #[must_use]
    pub fn contains_select(&self) -> bool {
        match self {
            Self::Constant(_) | Self::Param(_) | Self::Column { .. } => false,
            Self::IsNull { expr, .. } | Self::Unary { expr, .. } => expr.contains_select(),
            Self::Binary { left, right, .. } => left.contains_select() || right.contains_select(),
            Self::In { expr, values, .. } => {
                expr.contains_select() || values.iter().any(Self::contains_select)
            }
            Self::Call { args, .. } => args.iter().any(Self::contains_select),
            Self::Case { cases, else_ } => {
                cases
                    .iter()
                    .any(|(cond, value)| cond.contains_select() || value.contains_select())
                    || else_.as_ref().is_some_and(|e| e.contains_select())
            }
            Self::KeyedCase { key, cases, else_ } => {
                key.contains_select()
                    || cases.iter().any(|(values, value)| {
                        values.iter().any(Self::contains_select) || value.contains_select()
                    })
                    || else_.as_ref().is_some_and(|e| e.contains_select())
            }
            Self::Exists { .. } | Self::InSelect { .. } | Self::Select(_) => true,
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Render into `b`, binding constants and interpreted parameters.
    pub fn to_sql(&self, frame: &mut Frame, b: &mut SqlBuilder) -> Result<(), InternalError> {
        match self {
            Self::Constant(value) => b.append_value(value.clone()),
            Self::Param(expr) => {
                let value = expr.evaluate(frame)?;
                b.append_value(value);
            }
            Self::Column { alias, column } => b.append_column(alias.name(), column),
            Self::IsNull { expr, not } => {
                b.append("(");
                expr.to_sql(frame, b)?;
                b.append(if *not { " IS NOT NULL)" } else { " IS NULL)" });
            }
            Self::Unary { op, expr } => {
                b.append(match op {
                    UnaryOp::Not => "NOT (",
                    UnaryOp::Neg => "-(",
                });
                expr.to_sql(frame, b)?;
                b.append(")");
            }
            Self::Binary { op, left, right } => {
                b.append("(");
                left.to_sql(frame, b)?;
                b.append(" ");
                b.append(op.sql());
                b.append(" ");
                right.to_sql(frame, b)?;
                b.append(")");
            }
            Self::In { expr, values, not } => {
                b.append("(");
                expr.to_sql(frame, b)?;
                b.append(if *not { " NOT IN (" } else { " IN (" });
                b.append_list(values, ", ", |b, v| v.to_sql(frame, b))?;
                b.append("))");
            }
            Self::Call { func, args } => {
                b.append(func.sql());
                b.append("(");
                b.append_list(args, ", ", |b, arg| arg.to_sql(frame, b))?;
                b.append(")");
            }
            Self::Case { cases, else_ } => {
                b.append("CASE");
                for (cond, value) in cases {
                    b.append(" WHEN ");
                    cond.to_sql(frame, b)?;
                    b.append(" THEN ");
                    value.to_sql(frame, b)?;
                }
                if let Some(else_) = else_ {
                    b.append(" ELSE ");
                    else_.to_sql(frame, b)?;
                }
                b.append(" END");
            }
            Self::KeyedCase { key, cases, else_ } => {
                // Interpreted parts of the key are evaluated once; the
                // rendered key is spliced into every branch test.
                let key = ParameterizedSql::generate(|kb| key.to_sql(frame, kb))?;

                b.append("CASE");
                for (values, value) in cases {
                    b.append(" WHEN (");
                    b.append_sql(&key);
                    b.append(" IN (");
                    b.append_list(values, ", ", |b, v| v.to_sql(frame, b))?;
                    b.append(")) THEN ");
                    value.to_sql(frame, b)?;
                }
                if let Some(else_) = else_ {
                    b.append(" ELSE ");
                    else_.to_sql(frame, b)?;
                }
                b.append(" END");
            }
            Self::Exists { sub, not } => {
                b.append(if *not { "NOT EXISTS (" } else { "EXISTS (" });
                sub.render_nested(frame, b)?;
                b.append(")");
            }
            Self::InSelect { expr, sub, not } => {
                b.append("(");
                expr.to_sql(frame, b)?;
                b.append(if *not { " NOT IN (" } else { " IN (" });
                sub.render_nested(frame, b)?;
                b.append("))");
            }
            Self::Select(sub) => {
                b.append("(");
                sub.render_nested(frame, b)?;
                b.append(")");
            }
        }

        Ok(())
    }
}

// ----------------------------------------------------------------------
// Reduction
// ----------------------------------------------------------------------

/// Reduce `expr` within the scope `ctx`, allocating the joins it traverses.
pub fn reduce(
    expr: &DbExpr,
    ctx: &mut SqlGenContext<'_>,
    sql_ctx: &SqlContext,
) -> Result<RedExpr, InternalError> {
    let red = match expr {
        DbExpr::Constant(value) => RedExpr::Constant(value.clone()),
        DbExpr::Interpreted(expr) => RedExpr::Param(expr.clone()),

        DbExpr::Entity(at_entity) => {
            let alias = ctx.entity_alias(at_entity)?;
            let column = alias.entity().mapping.rowid_column().to_string();
            RedExpr::Column { alias, column }
        }

        // A relation used as a value is the row id stored on the base table;
        // no join is needed until one of the target's attributes is read.
        DbExpr::Rel { base, attr, .. } => {
            let alias = entity_alias_of(base, ctx)?;
            let column = attr_column(alias.entity(), attr)?;
            RedExpr::Column { alias, column }
        }

        DbExpr::Attr { base, attr } => {
            let alias = entity_alias_of(base, ctx)?;
            let column = attr_column(alias.entity(), attr)?;
            RedExpr::Column { alias, column }
        }

        DbExpr::Unary { op, expr } => fold_unary(*op, reduce(expr, ctx, sql_ctx)?),

        DbExpr::Binary { op, left, right } => {
            let left = reduce(left, ctx, sql_ctx)?;
            let right = reduce(right, ctx, sql_ctx)?;
            fold_binary(*op, left, right)
        }

        DbExpr::In { expr, values, not } => {
            let expr = reduce(expr, ctx, sql_ctx)?;
            let values = values
                .iter()
                .map(|v| reduce(v, ctx, sql_ctx))
                .collect::<Result<Vec<_>, _>>()?;
            fold_in(expr, values, *not)
        }

        DbExpr::Call { func, args } => RedExpr::Call {
            func: *func,
            args: args
                .iter()
                .map(|arg| reduce(arg, ctx, sql_ctx))
                .collect::<Result<_, _>>()?,
        },

        DbExpr::When { key, cases, else_ } => {
            let key = key
                .as_ref()
                .map(|key| reduce(key, ctx, sql_ctx))
                .transpose()?;

            let mut reduced = Vec::with_capacity(cases.len());
            for case in cases {
                let conds = case
                    .conds
                    .iter()
                    .map(|c| reduce(c, ctx, sql_ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                reduced.push((conds, reduce(&case.value, ctx, sql_ctx)?));
            }

            let else_ = else_
                .as_ref()
                .map(|e| reduce(e, ctx, sql_ctx))
                .transpose()?;

            lower_when(key, reduced, else_)?
        }

        DbExpr::Exists { sub, not } => RedExpr::Exists {
            sub: Box::new(compile_sub(sub, ctx, sql_ctx)?),
            not: *not,
        },

        DbExpr::InAt { expr, sub, not } => {
            let expr = reduce(expr, ctx, sql_ctx)?;
            let sub = single_column(compile_sub(sub, ctx, sql_ctx)?)?;
            RedExpr::InSelect {
                expr: Box::new(expr),
                sub: Box::new(sub),
                not: *not,
            }
        }

        DbExpr::NestedAt(sub) => {
            RedExpr::Select(Box::new(single_column(compile_sub(sub, ctx, sql_ctx)?)?))
        }
    };

    Ok(red)
}

// Table alias of the entity `expr` denotes, joining through relations.
fn entity_alias_of(
    expr: &DbExpr,
    ctx: &mut SqlGenContext<'_>,
) -> Result<TableAlias, InternalError> {
    match expr {
        DbExpr::Entity(at_entity) => ctx.entity_alias(at_entity),
        DbExpr::Rel { base, attr, target } => {
            let base = entity_alias_of(base, ctx)?;
            let column = attr_column(base.entity(), attr)?;
            ctx.rel_alias(&base, &column, target)
        }
        other => Err(InternalError::query_invariant(format!(
            "expression does not denote an entity: {other:?}"
        ))),
    }
}

fn attr_column(entity: &EntityModel, attr: &str) -> Result<String, InternalError> {
    entity
        .attribute(attr)
        .map(|a| a.sql_name.clone())
        .ok_or_else(|| {
            InternalError::query_invariant(format!(
                "entity '{}' has no attribute '{attr}'",
                entity.name
            ))
        })
}

fn single_column(sub: CompiledAt) -> Result<CompiledAt, InternalError> {
    if sub.column_count() != 1 {
        return Err(InternalError::query_invariant(format!(
            "sub-query must select exactly one column, found {}",
            sub.column_count()
        )));
    }

    Ok(sub)
}

// ----------------------------------------------------------------------
// Folding
// ----------------------------------------------------------------------

/// `left AND right`, folded.
#[must_use]
pub fn conjoin(left: RedExpr, right: RedExpr) -> RedExpr {
    fold_binary(BinaryOp::And, left, right)
}

fn fold_unary(op: UnaryOp, expr: RedExpr) -> RedExpr {
    let folded = match (op, expr.as_constant()) {
        (UnaryOp::Not, Some(Value::Bool(v))) => Some(Value::Bool(!v)),
        (UnaryOp::Neg, Some(Value::Int(v))) => v.checked_neg().map(Value::Int),
        _ => None,
    };

    folded.map_or_else(
        || RedExpr::Unary {
            op,
            expr: Box::new(expr),
        },
        RedExpr::Constant,
    )
}

fn fold_binary(op: BinaryOp, left: RedExpr, right: RedExpr) -> RedExpr {
    match op {
        BinaryOp::And => match (left.bool_constant(), right.bool_constant()) {
            (Some(false), _) | (_, Some(false)) => RedExpr::Constant(Value::Bool(false)),
            (Some(true), _) => right,
            (_, Some(true)) => left,
            _ => binary(op, left, right),
        },
        BinaryOp::Or => match (left.bool_constant(), right.bool_constant()) {
            (Some(true), _) | (_, Some(true)) => RedExpr::Constant(Value::Bool(true)),
            (Some(false), _) => right,
            (_, Some(false)) => left,
            _ => binary(op, left, right),
        },
        BinaryOp::Eq | BinaryOp::Ne
            if left.as_constant().is_some_and(Value::is_null)
                || right.as_constant().is_some_and(Value::is_null) =>
        {
            let not = op == BinaryOp::Ne;
            if let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) {
                return RedExpr::Constant(Value::Bool((l == r) != not));
            }

            let expr = if left.as_constant().is_some() {
                right
            } else {
                left
            };
            RedExpr::IsNull {
                expr: Box::new(expr),
                not,
            }
        }
        _ => {
            let folded = match (left.as_constant(), right.as_constant()) {
                (Some(l), Some(r)) => fold_constants(op, l, r),
                _ => None,
            };
            folded.map_or_else(|| binary(op, left, right), RedExpr::Constant)
        }
    }
}

fn fold_constants(op: BinaryOp, left: &Value, right: &Value) -> Option<Value> {
    if op.is_comparison() {
        let ord = left.sql_cmp(right)?;
        let result = match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::Ne => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::Le => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            BinaryOp::Ge => ord != Ordering::Less,
            _ => return None,
        };
        return Some(Value::Bool(result));
    }

    match (op, left, right) {
        (BinaryOp::Add, Value::Int(l), Value::Int(r)) => l.checked_add(*r).map(Value::Int),
        (BinaryOp::Sub, Value::Int(l), Value::Int(r)) => l.checked_sub(*r).map(Value::Int),
        (BinaryOp::Mul, Value::Int(l), Value::Int(r)) => l.checked_mul(*r).map(Value::Int),
        (BinaryOp::Div, Value::Int(l), Value::Int(r)) => l.checked_div(*r).map(Value::Int),
        (BinaryOp::Mod, Value::Int(l), Value::Int(r)) => l.checked_rem(*r).map(Value::Int),
        (BinaryOp::Concat, Value::Text(l), Value::Text(r)) => Some(Value::Text(format!("{l}{r}"))),
        _ => None,
    }
}

fn fold_in(expr: RedExpr, values: Vec<RedExpr>, not: bool) -> RedExpr {
    if values.is_empty() {
        return RedExpr::Constant(Value::Bool(not));
    }

    if let Some(key) = expr.as_constant().filter(|k| k.is_scalar() && !k.is_null()) {
        let mut decided = Some(false);
        for value in &values {
            match value.as_constant().and_then(|v| key.sql_eq(v)) {
                Some(true) => return RedExpr::Constant(Value::Bool(!not)),
                Some(false) => {}
                None => decided = None,
            }
        }
        if decided.is_some() {
            return RedExpr::Constant(Value::Bool(not));
        }
    }

    RedExpr::In {
        expr: Box::new(expr),
        values,
        not,
    }
}

fn binary(op: BinaryOp, left: RedExpr, right: RedExpr) -> RedExpr {
    RedExpr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

use crate::{
    db::expr::{BinaryOp, reduce::RedExpr},
    error::InternalError,
    value::Value,
};

// How a branch relates to the values known at compile time.
enum CaseMatch<T> {
    Always,
    Never,
    Maybe(T),
}

type Branches<T> = (Vec<(T, RedExpr)>, Option<RedExpr>);

/// Lower a reduced `when` into a `CASE` expression.
///
/// Branches are scanned in order. The first branch known to match becomes
/// the result (or the `ELSE` of the branches before it) and everything after
/// it is unreachable; branches known not to match are dropped.
pub(super) fn lower_when(
    key: Option<RedExpr>,
    cases: Vec<(Vec<RedExpr>, RedExpr)>,
    else_: Option<RedExpr>,
) -> Result<RedExpr, InternalError> {
    match key {
        Some(key) => lower_keyed(key, cases, else_),
        None => lower_general(cases, else_),
    }
}

fn lower_general(
    cases: Vec<(Vec<RedExpr>, RedExpr)>,
    else_: Option<RedExpr>,
) -> Result<RedExpr, InternalError> {
    let (branches, tail) = scan(cases, else_, general_match)?;
    if branches.is_empty() {
        return Ok(tail.unwrap_or(RedExpr::Constant(Value::Null)));
    }

    Ok(RedExpr::Case {
        cases: branches,
        else_: tail.map(Box::new),
    })
}

// The key is kept once and rendered once per statement; each branch only
// carries the values it is tested against.
fn lower_keyed(
    key: RedExpr,
    cases: Vec<(Vec<RedExpr>, RedExpr)>,
    else_: Option<RedExpr>,
) -> Result<RedExpr, InternalError> {
    let (branches, tail) = scan(cases, else_, |values| keyed_match(&key, values))?;
    if branches.is_empty() {
        return Ok(tail.unwrap_or(RedExpr::Constant(Value::Null)));
    }

    // A sub-select declares its aliases where it is rendered; repeating it
    // would declare them more than once in one statement.
    if branches.len() > 1 && key.contains_select() {
        return Err(InternalError::query_invariant(format!(
            "when key with a nested at-expression is tested by {} branches",
            branches.len()
        )));
    }

    Ok(RedExpr::KeyedCase {
        key: Box::new(key),
        cases: branches,
        else_: tail.map(Box::new),
    })
}

fn scan<T>(
    cases: Vec<(Vec<RedExpr>, RedExpr)>,
    else_: Option<RedExpr>,
    mut decide: impl FnMut(Vec<RedExpr>) -> CaseMatch<T>,
) -> Result<Branches<T>, InternalError> {
    let mut branches = Vec::with_capacity(cases.len());
    let mut tail = else_;

    for (conds, value) in cases {
        if conds.is_empty() {
            return Err(InternalError::query_invariant(
                "when branch has no conditions",
            ));
        }

        match decide(conds) {
            CaseMatch::Always => {
                tail = Some(value);
                break;
            }
            CaseMatch::Never => {}
            CaseMatch::Maybe(residual) => branches.push((residual, value)),
        }
    }

    Ok((branches, tail))
}

// Values the key must still be tested against, with constant comparisons
// decided here.
//
// A non-scalar constant on either side cannot be compared in SQL; such a
// branch counts as matched.
fn keyed_match(key: &RedExpr, values: Vec<RedExpr>) -> CaseMatch<Vec<RedExpr>> {
    let key_const = key.as_constant();
    if key_const.is_some_and(|k| !k.is_scalar()) {
        return CaseMatch::Always;
    }

    let mut residual = Vec::with_capacity(values.len());
    for value in values {
        let decided = match (key_const, value.as_constant()) {
            (_, Some(v)) if !v.is_scalar() => Some(true),
            (Some(k), Some(v)) => Some(k.sql_eq(v) == Some(true)),
            _ => None,
        };

        match decided {
            Some(true) => return CaseMatch::Always,
            Some(false) => {}
            None => residual.push(value),
        }
    }

    if residual.is_empty() {
        CaseMatch::Never
    } else {
        CaseMatch::Maybe(residual)
    }
}

fn general_match(conds: Vec<RedExpr>) -> CaseMatch<RedExpr> {
    let mut residual: Option<RedExpr> = None;

    for cond in conds {
        match cond.bool_constant() {
            Some(true) => return CaseMatch::Always,
            Some(false) => {}
            None => {
                residual = Some(match residual {
                    Some(prev) => RedExpr::Binary {
                        op: BinaryOp::Or,
                        left: Box::new(prev),
                        right: Box::new(cond),
                    },
                    None => cond,
                });
            }
        }
    }

    residual.map_or(CaseMatch::Never, CaseMatch::Maybe)
}

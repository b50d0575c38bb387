use crate::{
    db::sql::{SqlRow, SqlValue},
    error::InternalError,
    interp::{Frame, RtExprRef, VarSlot},
    value::{TupleField, Value, ValueType},
};

/// Convert one raw column value into a runtime value of type `ty`.
///
/// SQL `NULL` decodes to [`Value::Null`] for every type; a scalar
/// sub-query over zero rows yields `NULL` even for non-nullable types.
pub fn decode_value(raw: SqlValue, ty: &ValueType) -> Result<Value, InternalError> {
    let value = match (raw, ty) {
        (SqlValue::Null, _) => Value::Null,
        (raw, ValueType::Nullable(inner)) => decode_value(raw, inner)?,
        (SqlValue::Integer(v), ValueType::Boolean) => Value::Bool(v != 0),
        (SqlValue::Integer(v), ValueType::Integer) => Value::Int(v),
        (SqlValue::Integer(v), ValueType::Rowid) => Value::Rowid(v),
        (SqlValue::Integer(v), ValueType::Entity(name)) => Value::entity(name.clone(), v),
        (SqlValue::Text(v), ValueType::Text) => Value::Text(v),
        (SqlValue::Blob(v), ValueType::ByteArray) => Value::Bytes(v),
        (raw, ty) => {
            return Err(InternalError::executor_invariant(format!(
                "cannot decode column value {raw:?} as {ty}"
            )));
        }
    };

    Ok(value)
}

///
/// FieldDecoder
///

#[derive(Clone, Debug)]
pub(crate) enum FieldDecoder {
    /// One column decoded directly.
    Column {
        name: Option<String>,
        ty: ValueType,
        omit: bool,
    },

    /// Several columns decoded into frame slots, then combined by `expr`.
    Complex {
        name: Option<String>,
        columns: Vec<(ValueType, VarSlot)>,
        expr: RtExprRef,
        omit: bool,
    },
}

impl FieldDecoder {
    fn width(&self) -> usize {
        match self {
            Self::Column { .. } => 1,
            Self::Complex { columns, .. } => columns.len(),
        }
    }

    const fn omit(&self) -> bool {
        match self {
            Self::Column { omit, .. } | Self::Complex { omit, .. } => *omit,
        }
    }

    fn name(&self) -> Option<String> {
        match self {
            Self::Column { name, .. } | Self::Complex { name, .. } => name.clone(),
        }
    }
}

///
/// RowDecoder
///
/// Turns one result row into the at-expression's element value: the single
/// kept field itself, or a tuple of all kept fields.
///

#[derive(Clone, Debug)]
pub(crate) struct RowDecoder {
    fields: Vec<FieldDecoder>,
    kept: usize,
}

impl RowDecoder {
    pub(crate) fn new(fields: Vec<FieldDecoder>) -> Result<Self, InternalError> {
        let kept = fields.iter().filter(|f| !f.omit()).count();
        if kept == 0 {
            return Err(InternalError::query_invariant(
                "at-expression projection has no result fields",
            ));
        }

        Ok(Self { fields, kept })
    }

    /// Total number of selected columns.
    pub(crate) fn width(&self) -> usize {
        self.fields.iter().map(FieldDecoder::width).sum()
    }

    pub(crate) fn decode(&self, frame: &mut Frame, row: &dyn SqlRow) -> Result<Value, InternalError> {
        if row.column_count() != self.width() {
            return Err(InternalError::executor_invariant(format!(
                "result row has {} columns, expected {}",
                row.column_count(),
                self.width()
            )));
        }

        let mut values = Vec::with_capacity(self.kept);
        let mut column = 0;

        for field in &self.fields {
            let value = match field {
                FieldDecoder::Column { ty, .. } => {
                    let value = decode_value(row.value(column)?, ty)?;
                    column += 1;
                    value
                }
                FieldDecoder::Complex { columns, expr, .. } => {
                    for (ty, slot) in columns {
                        frame.set(*slot, decode_value(row.value(column)?, ty)?)?;
                        column += 1;
                    }
                    expr.evaluate(frame)?
                }
            };

            if !field.omit() {
                values.push(TupleField {
                    name: field.name(),
                    value,
                });
            }
        }

        if values.len() == 1 {
            return Ok(values.remove(0).value);
        }

        Ok(Value::Tuple(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_decodes_for_every_type() {
        for ty in [
            ValueType::Integer,
            ValueType::entity("user"),
            ValueType::nullable(ValueType::Text),
        ] {
            assert_eq!(decode_value(SqlValue::Null, &ty).unwrap(), Value::Null);
        }
    }

    #[test]
    fn typed_columns_decode() {
        assert_eq!(
            decode_value(SqlValue::Integer(1), &ValueType::Boolean).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            decode_value(SqlValue::Integer(4), &ValueType::entity("company")).unwrap(),
            Value::entity("company", 4)
        );
        assert_eq!(
            decode_value(
                SqlValue::Text("x".into()),
                &ValueType::nullable(ValueType::Text)
            )
            .unwrap(),
            Value::text("x")
        );
    }

    #[test]
    fn mismatched_column_is_an_invariant_violation() {
        let err = decode_value(SqlValue::Text("x".into()), &ValueType::Integer).unwrap_err();

        assert!(err.is_invariant_violation());
    }

    #[test]
    fn decoder_requires_a_kept_field() {
        let omitted = FieldDecoder::Column {
            name: None,
            ty: ValueType::Integer,
            omit: true,
        };

        assert!(RowDecoder::new(vec![omitted]).is_err());
    }
}

use crate::{
    chain::{InitError, SqlContext},
    db::sql::{ParameterizedSql, SqlBuilder, SqlExecutor, SqlValue},
    error::InternalError,
    model::{EntityModel, entity::LOG_TRANSACTION_ATTR},
    value::Value,
};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

// Class row as published by an external chain.
struct MetaClass {
    id: i64,
    log: bool,
}

/// Validate every `meta_check` external entity against the metadata its
/// chain publishes.
///
/// The external class must exist under the entity's mount name, be a log
/// class, and carry every declared attribute with the same type.
pub fn check_external_meta(
    exec: &dyn SqlExecutor,
    ctx: &SqlContext,
    entities: &[Arc<EntityModel>],
) -> Result<(), InternalError> {
    for entity in entities {
        let Some(external) = entity.external.as_ref().filter(|ext| ext.meta_check) else {
            continue;
        };
        if entity.mapping.is_system_entity() {
            continue;
        }

        let chain = external.chain.name();
        let mapping = ctx.chain_mapping(Some(&external.chain))?;

        let class = load_class(exec, &mapping.meta_classes_table(), &entity.mount_name)?
            .ok_or_else(|| InitError::MetaNoEntity {
                chain: chain.to_string(),
                entity: entity.name.clone(),
            })?;

        if entity.flags.log && !class.log {
            return Err(InitError::MetaNoLog {
                chain: chain.to_string(),
                entity: entity.name.clone(),
            }
            .into());
        }

        let attrs = load_attributes(exec, &mapping.meta_attributes_table(), class.id)?;

        for attr in &entity.attributes {
            if attr.name == LOG_TRANSACTION_ATTR {
                continue;
            }

            let actual = attrs.get(&attr.name).ok_or_else(|| InitError::MetaNoAttr {
                chain: chain.to_string(),
                entity: entity.name.clone(),
                attr: attr.name.clone(),
            })?;

            let expected = attr.ty.meta_tag();
            if *actual != expected {
                return Err(InitError::MetaAttrType {
                    chain: chain.to_string(),
                    entity: entity.name.clone(),
                    attr: attr.name.clone(),
                    expected,
                    actual: actual.clone(),
                }
                .into());
            }
        }

        debug!(chain, entity = %entity.name, "external metadata checked");
    }

    Ok(())
}

fn load_class(
    exec: &dyn SqlExecutor,
    table: &str,
    name: &str,
) -> Result<Option<MetaClass>, InternalError> {
    let mut b = SqlBuilder::new();
    b.append(r#"SELECT "id", "log" FROM "#);
    b.append_name(table);
    b.append(r#" WHERE "name" = "#);
    b.append_value(Value::text(name));
    let sql = b.build()?;

    let mut class = None;
    sql.execute_query(exec, |row| {
        let (SqlValue::Integer(id), SqlValue::Integer(log)) = (row.value(0)?, row.value(1)?)
        else {
            return Err(InternalError::executor_invariant(format!(
                "malformed row in {table}"
            )));
        };
        class = Some(MetaClass { id, log: log != 0 });
        Ok(())
    })?;

    Ok(class)
}

fn load_attributes(
    exec: &dyn SqlExecutor,
    table: &str,
    class_id: i64,
) -> Result<HashMap<String, String>, InternalError> {
    let sql = ParameterizedSql::generate(|b| {
        b.append(r#"SELECT "name", "type" FROM "#);
        b.append_name(table);
        b.append(r#" WHERE "class_id" = "#);
        b.append_value(Value::Int(class_id));
        Ok(())
    })?;

    let mut attrs = HashMap::new();
    sql.execute_query(exec, |row| {
        let (SqlValue::Text(name), SqlValue::Text(ty)) = (row.value(0)?, row.value(1)?) else {
            return Err(InternalError::executor_invariant(format!(
                "malformed row in {table}"
            )));
        };
        attrs.insert(name, ty);
        Ok(())
    })?;

    Ok(attrs)
}

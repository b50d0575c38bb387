use crate::{
    chain::{ChainSqlMapping, InitError, LinkedChain},
    db::sql::{ParameterizedSql, SqlExecutor, SqlValue},
    error::InternalError,
    value::Value,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

///
/// ExternalChainSpec
/// An external chain as declared by the application: local name + RID.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExternalChainSpec {
    pub name: String,
    pub rid: Vec<u8>,
}

impl ExternalChainSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, rid: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            rid: rid.into(),
        }
    }
}

///
/// ChainResolver
/// Maps a blockchain RID to the database chain id.
///

pub trait ChainResolver {
    fn chain_id(&self, rid: &[u8]) -> Result<Option<i64>, InternalError>;
}

///
/// HeightProvider
/// Height an external chain is pinned at for the current execution.
///

pub trait HeightProvider {
    fn height(&self, name: &str, chain_id: i64) -> Result<Option<i64>, InternalError>;
}

///
/// SqlChainResolver
/// Reads the node's `blockchains` registry.
///

pub struct SqlChainResolver<'a> {
    exec: &'a dyn SqlExecutor,
}

impl<'a> SqlChainResolver<'a> {
    #[must_use]
    pub const fn new(exec: &'a dyn SqlExecutor) -> Self {
        Self { exec }
    }
}

impl ChainResolver for SqlChainResolver<'_> {
    fn chain_id(&self, rid: &[u8]) -> Result<Option<i64>, InternalError> {
        let sql = ParameterizedSql::new(
            r#"SELECT "chain_iid" FROM "blockchains" WHERE "blockchain_rid" = ?"#,
            vec![Value::Bytes(rid.to_vec())],
        )?;

        query_single_int(self.exec, &sql)
    }
}

///
/// SqlHeightProvider
/// Current height of the external chain, read from its blocks table.
///

pub struct SqlHeightProvider<'a> {
    exec: &'a dyn SqlExecutor,
}

impl<'a> SqlHeightProvider<'a> {
    #[must_use]
    pub const fn new(exec: &'a dyn SqlExecutor) -> Self {
        Self { exec }
    }
}

impl HeightProvider for SqlHeightProvider<'_> {
    fn height(&self, _: &str, chain_id: i64) -> Result<Option<i64>, InternalError> {
        let sql = ParameterizedSql::generate(|b| {
            b.append(r#"SELECT MAX("block_height") FROM "#);
            b.append_name(&ChainSqlMapping::new(chain_id).blocks_table());
            Ok(())
        })?;

        query_single_int(self.exec, &sql)
    }
}

///
/// ConfigHeights
/// Heights fixed by configuration, keyed by chain name.
///

#[derive(Clone, Debug, Default)]
pub struct ConfigHeights {
    heights: BTreeMap<String, i64>,
}

impl ConfigHeights {
    #[must_use]
    pub const fn new(heights: BTreeMap<String, i64>) -> Self {
        Self { heights }
    }

    /// Ask `fallback` for chains without a configured height.
    #[must_use]
    pub const fn with_fallback<P: HeightProvider>(self, fallback: P) -> FallbackHeights<P> {
        FallbackHeights {
            primary: self,
            fallback,
        }
    }
}

impl HeightProvider for ConfigHeights {
    fn height(&self, name: &str, _: i64) -> Result<Option<i64>, InternalError> {
        Ok(self.heights.get(name).copied())
    }
}

///
/// FallbackHeights
///

pub struct FallbackHeights<P> {
    primary: ConfigHeights,
    fallback: P,
}

impl<P: HeightProvider> HeightProvider for FallbackHeights<P> {
    fn height(&self, name: &str, chain_id: i64) -> Result<Option<i64>, InternalError> {
        match self.primary.height(name, chain_id)? {
            Some(height) => Ok(Some(height)),
            None => self.fallback.height(name, chain_id),
        }
    }
}

/// Resolve every declared external chain.
///
/// Fails on the first chain that shares a RID with an earlier one, is not
/// known to the node, or has no height.
pub fn link_chains(
    specs: &[ExternalChainSpec],
    resolver: &dyn ChainResolver,
    heights: &dyn HeightProvider,
) -> Result<Vec<LinkedChain>, InternalError> {
    let mut seen: HashMap<&[u8], &str> = HashMap::new();
    let mut linked = Vec::with_capacity(specs.len());

    for spec in specs {
        if let Some(first) = seen.insert(&spec.rid, &spec.name) {
            return Err(InitError::DuplicateRid {
                first: first.to_string(),
                second: spec.name.clone(),
                rid: hex::encode(&spec.rid),
            }
            .into());
        }

        let chain_id = resolver
            .chain_id(&spec.rid)?
            .ok_or_else(|| InitError::NoRid {
                name: spec.name.clone(),
                rid: hex::encode(&spec.rid),
            })?;

        let height = heights
            .height(&spec.name, chain_id)?
            .ok_or_else(|| InitError::NoHeight {
                name: spec.name.clone(),
            })?;

        debug!(chain = %spec.name, chain_id, height, "external chain linked");

        linked.push(LinkedChain {
            name: spec.name.clone(),
            chain_id,
            rid: spec.rid.clone(),
            height,
            sql_mapping: ChainSqlMapping::new(chain_id),
        });
    }

    Ok(linked)
}

// First column of the first row as an integer; `None` for no row or NULL.
fn query_single_int(
    exec: &dyn SqlExecutor,
    sql: &ParameterizedSql,
) -> Result<Option<i64>, InternalError> {
    let mut result = None;

    sql.execute_query(exec, |row| {
        if result.is_none() {
            result = match row.value(0)? {
                SqlValue::Integer(v) => Some(v),
                SqlValue::Null => None,
                other => {
                    return Err(InternalError::executor_invariant(format!(
                        "expected an integer column, got {other:?}"
                    )));
                }
            };
        }
        Ok(())
    })?;

    Ok(result)
}

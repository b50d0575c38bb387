//! Chain context: the local chain's table prefix plus every linked external
//! chain, resolved once when an execution context is initialized.
//!
//! Nothing here is lazily repaired. If any external chain cannot be linked,
//! or its metadata does not match the application's view of it, no
//! [`SqlContext`] is produced and nothing may run.

mod link;
mod meta;


use crate::{
    config::RuntimeConfig,
    db::sql::SqlExecutor,
    error::{ErrorClass, ErrorDetail, ErrorOrigin, InternalError},
    model::{EntityModel, ExternalChainRef},
};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error as ThisError;
use tracing::info;

// re-exports
pub use link::{
    ChainResolver, ConfigHeights, ExternalChainSpec, FallbackHeights, HeightProvider,
    SqlChainResolver, SqlHeightProvider, link_chains,
};
pub use meta::check_external_meta;

///
/// ChainSqlMapping
/// Table naming of one chain: every table is prefixed with `c<chain_id>.`.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChainSqlMapping {
    chain_id: i64,
}

impl ChainSqlMapping {
    #[must_use]
    pub const fn new(chain_id: i64) -> Self {
        Self { chain_id }
    }

    #[must_use]
    pub const fn chain_id(&self) -> i64 {
        self.chain_id
    }

    #[must_use]
    pub fn full_name(&self, name: &str) -> String {
        format!("c{}.{name}", self.chain_id)
    }

    #[must_use]
    pub fn transactions_table(&self) -> String {
        self.full_name("transactions")
    }

    #[must_use]
    pub fn blocks_table(&self) -> String {
        self.full_name("blocks")
    }

    #[must_use]
    pub fn meta_classes_table(&self) -> String {
        self.full_name("sys.classes")
    }

    #[must_use]
    pub fn meta_attributes_table(&self) -> String {
        self.full_name("sys.attributes")
    }
}

///
/// LinkedChain
/// An external chain resolved to its database id, pinned at `height`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkedChain {
    pub name: String,
    pub chain_id: i64,
    pub rid: Vec<u8>,
    pub height: i64,
    pub sql_mapping: ChainSqlMapping,
}

///
/// SystemEntities
/// `transaction` and `block` models of one chain.
///

#[derive(Clone, Debug)]
pub struct SystemEntities {
    pub transaction: Arc<EntityModel>,
    pub block: Arc<EntityModel>,
}

impl SystemEntities {
    #[must_use]
    pub fn new(chain: Option<ExternalChainRef>) -> Self {
        Self {
            transaction: EntityModel::transaction(chain.clone()).into_shared(),
            block: EntityModel::block(chain).into_shared(),
        }
    }
}

///
/// SqlContext
///
/// Runtime chain context shared by SQL generation and execution.
///

#[derive(Clone, Debug)]
pub struct SqlContext {
    main: ChainSqlMapping,
    main_system: SystemEntities,
    linked: BTreeMap<ExternalChainRef, (LinkedChain, SystemEntities)>,
}

impl SqlContext {
    /// Context of a chain with no external links.
    #[must_use]
    pub fn local(chain_id: i64) -> Self {
        Self {
            main: ChainSqlMapping::new(chain_id),
            main_system: SystemEntities::new(None),
            linked: BTreeMap::new(),
        }
    }

    /// Build a context from already-linked chains.
    ///
    /// Every chain referenced by one of `entities` must be among `linked`.
    pub fn new(
        chain_id: i64,
        linked: Vec<LinkedChain>,
        entities: &[Arc<EntityModel>],
    ) -> Result<Self, InternalError> {
        let mut ctx = Self::local(chain_id);

        for chain in linked {
            let chain_ref = ExternalChainRef::new(chain.name.clone());
            let system = SystemEntities::new(Some(chain_ref.clone()));
            ctx.linked.insert(chain_ref, (chain, system));
        }

        for entity in entities {
            if let Some(chain) = entity.mapping.chain()
                && !ctx.linked.contains_key(chain)
            {
                return Err(InitError::Unlinked {
                    chain: chain.to_string(),
                    entity: entity.name.clone(),
                }
                .into());
            }
        }

        Ok(ctx)
    }

    /// Link every configured external chain, check external metadata and
    /// build the context.
    pub fn initialize(
        config: &RuntimeConfig,
        exec: &dyn SqlExecutor,
        entities: &[Arc<EntityModel>],
    ) -> Result<Self, InternalError> {
        let specs = config.external_specs()?;
        let resolver = SqlChainResolver::new(exec);
        let heights = config
            .config_heights()
            .with_fallback(SqlHeightProvider::new(exec));

        let linked = link_chains(&specs, &resolver, &heights)?;
        let ctx = Self::new(config.chain_id, linked, entities)?;
        check_external_meta(exec, &ctx, entities)?;

        info!(
            chain_id = config.chain_id,
            linked = ctx.linked.len(),
            "sql context initialized"
        );

        Ok(ctx)
    }

    #[must_use]
    pub const fn main_chain_mapping(&self) -> &ChainSqlMapping {
        &self.main
    }

    pub fn linked_chain(&self, chain: &ExternalChainRef) -> Result<&LinkedChain, InternalError> {
        self.linked
            .get(chain)
            .map(|(linked, _)| linked)
            .ok_or_else(|| unlinked(chain))
    }

    pub fn linked_chains(&self) -> impl Iterator<Item = &LinkedChain> {
        self.linked.values().map(|(linked, _)| linked)
    }

    /// Table mapping of the local chain (`None`) or a linked one.
    pub fn chain_mapping(
        &self,
        chain: Option<&ExternalChainRef>,
    ) -> Result<&ChainSqlMapping, InternalError> {
        match chain {
            None => Ok(&self.main),
            Some(chain) => Ok(&self.linked_chain(chain)?.sql_mapping),
        }
    }

    /// System entities of the local chain (`None`) or a linked one.
    pub fn system_entities(
        &self,
        chain: Option<&ExternalChainRef>,
    ) -> Result<&SystemEntities, InternalError> {
        match chain {
            None => Ok(&self.main_system),
            Some(chain) => self
                .linked
                .get(chain)
                .map(|(_, system)| system)
                .ok_or_else(|| unlinked(chain)),
        }
    }
}

// Lookups after a successful `SqlContext::new` cannot miss; reaching this is
// a model that bypassed initialization.
fn unlinked(chain: &ExternalChainRef) -> InternalError {
    InternalError::executor_invariant(format!("external chain '{chain}' is not linked"))
}

///
/// InitError
/// Execution-context initialization failures.
///

#[derive(Debug, ThisError)]
pub enum InitError {
    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("external chains '{first}' and '{second}' have the same RID {rid}")]
    DuplicateRid {
        first: String,
        second: String,
        rid: String,
    },

    #[error("external chain '{name}' not found (RID {rid})")]
    NoRid { name: String, rid: String },

    #[error("no height for external chain '{name}'")]
    NoHeight { name: String },

    #[error("external chain '{chain}' used by entity '{entity}' is not linked")]
    Unlinked { chain: String, entity: String },

    #[error("entity '{entity}' not found in external chain '{chain}'")]
    MetaNoEntity { chain: String, entity: String },

    #[error("attribute '{entity}.{attr}' not found in external chain '{chain}'")]
    MetaNoAttr {
        chain: String,
        entity: String,
        attr: String,
    },

    #[error(
        "attribute '{entity}.{attr}' type mismatch in external chain '{chain}': expected {expected}, actual {actual}"
    )]
    MetaAttrType {
        chain: String,
        entity: String,
        attr: String,
        expected: String,
        actual: String,
    },

    #[error("entity '{entity}' in external chain '{chain}' is not a log entity")]
    MetaNoLog { chain: String, entity: String },
}

impl InitError {
    #[must_use]
    pub fn code(&self) -> String {
        let code = match self {
            Self::Config { .. } => "config_invalid",
            Self::DuplicateRid { .. } => "external_chain_dup_rid",
            Self::NoRid { .. } => "external_chain_no_rid",
            Self::NoHeight { .. } => "external_chain_no_height",
            Self::Unlinked { .. } => "external_chain_unlinked",
            Self::MetaNoEntity { .. } => "external_meta_no_entity",
            Self::MetaNoAttr { .. } => "external_meta_no_attr",
            Self::MetaAttrType { .. } => "external_meta_attr_type",
            Self::MetaNoLog { .. } => "external_meta_nolog",
        };

        code.to_string()
    }

    const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Config { .. } => ErrorOrigin::Config,
            _ => ErrorOrigin::Chain,
        }
    }
}

impl From<InitError> for InternalError {
    fn from(err: InitError) -> Self {
        Self {
            class: ErrorClass::Initialization,
            origin: err.origin(),
            message: err.to_string(),
            detail: Some(ErrorDetail::Init(err)),
        }
    }
}

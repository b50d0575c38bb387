use crate::{
    db::sql::mapping::{BLOCK_ROWID_COLUMN, EntitySqlMapping, TX_ROWID_COLUMN},
    model::attribute::AttributeModel,
    value::ValueType,
};
use derive_more::Display;
use std::sync::Arc;

/// Name of the implicit attribute every log entity carries.
pub const LOG_TRANSACTION_ATTR: &str = "transaction";

pub const TRANSACTION_ENTITY: &str = "transaction";
pub const BLOCK_ENTITY: &str = "block";

///
/// ExternalChainRef
/// Name of an external chain as declared by the application.
///

#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ExternalChainRef(pub String);

impl ExternalChainRef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

///
/// ExternalEntityRef
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExternalEntityRef {
    pub chain: ExternalChainRef,
    /// Validate the entity against the external chain's metadata at link time.
    pub meta_check: bool,
}

///
/// EntityFlags
///

#[expect(clippy::struct_excessive_bools)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EntityFlags {
    pub is_object: bool,
    pub can_create: bool,
    pub can_update: bool,
    pub can_delete: bool,
    pub log: bool,
}

impl EntityFlags {
    /// Flags of a plain, fully mutable entity.
    #[must_use]
    pub const fn regular() -> Self {
        Self {
            is_object: false,
            can_create: true,
            can_update: true,
            can_delete: true,
            log: false,
        }
    }

    /// Flags of a read-only entity (system and external tables).
    #[must_use]
    pub const fn read_only(log: bool) -> Self {
        Self {
            is_object: false,
            can_create: false,
            can_update: false,
            can_delete: false,
            log,
        }
    }
}

///
/// EntityModel
///
/// Runtime model for one entity: attributes, flags and the SQL mapping.
/// Built once at application load; shared through `Arc`.
///

#[derive(Clone, Debug)]
pub struct EntityModel {
    pub name: String,
    pub mount_name: String,
    pub flags: EntityFlags,
    pub attributes: Vec<AttributeModel>,
    pub external: Option<ExternalEntityRef>,
    pub mapping: EntitySqlMapping,
}

impl EntityModel {
    /// Regular local entity mounted under its own name.
    #[must_use]
    pub fn regular(name: impl Into<String>) -> Self {
        let name = name.into();

        Self {
            mount_name: name.clone(),
            mapping: EntitySqlMapping::Regular {
                mount_name: name.clone(),
            },
            name,
            flags: EntityFlags::regular(),
            attributes: Vec::new(),
            external: None,
        }
    }

    /// Read-only log entity living on an external chain.
    #[must_use]
    pub fn external(name: impl Into<String>, chain: ExternalChainRef, meta_check: bool) -> Self {
        let name = name.into();
        let mut model = Self {
            mount_name: name.clone(),
            mapping: EntitySqlMapping::External {
                mount_name: name.clone(),
                chain: chain.clone(),
            },
            name,
            flags: EntityFlags::read_only(true),
            attributes: Vec::new(),
            external: Some(ExternalEntityRef { chain, meta_check }),
        };
        model.push_transaction_attr();

        model
    }

    /// System `transaction` entity, local or of a linked chain.
    #[must_use]
    pub fn transaction(chain: Option<ExternalChainRef>) -> Self {
        Self {
            name: TRANSACTION_ENTITY.to_string(),
            mount_name: "transactions".to_string(),
            flags: EntityFlags::read_only(false),
            attributes: vec![
                AttributeModel::new("tx_rid", ValueType::ByteArray).key(),
                AttributeModel::new("tx_hash", ValueType::ByteArray),
                AttributeModel::new("tx_data", ValueType::ByteArray),
                AttributeModel::new(BLOCK_ENTITY, ValueType::entity(BLOCK_ENTITY))
                    .with_sql_name(BLOCK_ROWID_COLUMN),
            ],
            external: chain.clone().map(|chain| ExternalEntityRef {
                chain,
                meta_check: false,
            }),
            mapping: EntitySqlMapping::Transaction { chain },
        }
    }

    /// System `block` entity, local or of a linked chain.
    #[must_use]
    pub fn block(chain: Option<ExternalChainRef>) -> Self {
        Self {
            name: BLOCK_ENTITY.to_string(),
            mount_name: "blocks".to_string(),
            flags: EntityFlags::read_only(false),
            attributes: vec![
                AttributeModel::new("block_height", ValueType::Integer).key(),
                AttributeModel::new("block_rid", ValueType::ByteArray).key(),
                AttributeModel::new("timestamp", ValueType::Integer),
            ],
            external: chain.clone().map(|chain| ExternalEntityRef {
                chain,
                meta_check: false,
            }),
            mapping: EntitySqlMapping::Block { chain },
        }
    }

    #[must_use]
    pub fn with_mount_name(mut self, mount_name: impl Into<String>) -> Self {
        let mount_name = mount_name.into();
        match &mut self.mapping {
            EntitySqlMapping::Regular { mount_name: m }
            | EntitySqlMapping::External { mount_name: m, .. } => m.clone_from(&mount_name),
            EntitySqlMapping::Transaction { .. } | EntitySqlMapping::Block { .. } => {}
        }
        self.mount_name = mount_name;
        self
    }

    #[must_use]
    pub fn attr(mut self, attribute: AttributeModel) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Mark the entity as a log entity; adds the implicit `transaction` attribute.
    #[must_use]
    pub fn log(mut self) -> Self {
        if !self.flags.log {
            self.flags.log = true;
            self.flags.can_update = false;
            self.push_transaction_attr();
        }
        self
    }

    #[must_use]
    pub const fn object(mut self) -> Self {
        self.flags.is_object = true;
        self
    }

    #[must_use]
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeModel> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    #[must_use]
    pub const fn is_external(&self) -> bool {
        self.external.is_some()
    }

    fn push_transaction_attr(&mut self) {
        if self.attribute(LOG_TRANSACTION_ATTR).is_none() {
            self.attributes.push(AttributeModel::new(
                LOG_TRANSACTION_ATTR,
                ValueType::entity(TRANSACTION_ENTITY),
            ));
        }
    }
}

impl PartialEq for EntityModel {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.mapping == other.mapping
    }
}

impl Eq for EntityModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entities_get_an_implicit_transaction_attribute() {
        let model = EntityModel::regular("payment").log();
        let attr = model.attribute(LOG_TRANSACTION_ATTR).expect("transaction attr");

        assert_eq!(attr.ty, ValueType::entity(TRANSACTION_ENTITY));
        assert!(model.flags.log);
        assert!(!model.flags.can_update);

        let twice = model.log();
        assert_eq!(twice.attributes.len(), 1);
    }

    #[test]
    fn mount_name_follows_into_mapping() {
        let model = EntityModel::regular("user").with_mount_name("app.user");

        assert_eq!(
            model.mapping,
            EntitySqlMapping::Regular {
                mount_name: "app.user".to_string()
            }
        );
    }

    #[test]
    fn transaction_block_attribute_maps_to_block_iid() {
        let tx = EntityModel::transaction(None);
        let attr = tx.attribute(BLOCK_ENTITY).expect("block attr");

        assert_eq!(attr.sql_name, BLOCK_ROWID_COLUMN);
        assert!(attr.is_relation());
        assert_eq!(tx.mapping.rowid_column(), TX_ROWID_COLUMN);
    }
}

use crate::{
    chain::{ChainSqlMapping, LinkedChain, SqlContext},
    db::{
        at::{AtEntity, AtExpr, AtExprId, Cardinality},
        expr::DbExpr,
    },
    model::{AttributeModel, EntityModel, ExternalChainRef},
    value::ValueType,
};
use std::sync::Arc;

///
/// Fixture
///
/// `company` / `user` on the local chain `c0`, plus `payment`, a log entity
/// of the external chain `payments` (chain id 3) linked at height 100.
///

pub(crate) struct Fixture {
    pub(crate) company: Arc<EntityModel>,
    pub(crate) user: Arc<EntityModel>,
    pub(crate) payment: Arc<EntityModel>,
    pub(crate) sql_ctx: SqlContext,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let company = EntityModel::regular("company")
            .attr(AttributeModel::new("name", ValueType::Text).key())
            .attr(AttributeModel::new("city", ValueType::Text))
            .into_shared();

        let user = EntityModel::regular("user")
            .attr(AttributeModel::new("name", ValueType::Text))
            .attr(AttributeModel::new("company", ValueType::entity("company")).index())
            .attr(AttributeModel::new("score", ValueType::Integer).mutable())
            .into_shared();

        let payment = EntityModel::external("payment", ExternalChainRef::new("payments"), false)
            .attr(AttributeModel::new("amount", ValueType::Integer))
            .into_shared();

        let linked = vec![LinkedChain {
            name: "payments".to_string(),
            chain_id: 3,
            rid: vec![0xaa, 0xbb],
            height: 100,
            sql_mapping: ChainSqlMapping::new(3),
        }];
        let entities = [company.clone(), user.clone(), payment.clone()];
        let sql_ctx = SqlContext::new(0, linked, &entities).expect("fixture context");

        Self {
            company,
            user,
            payment,
            sql_ctx,
        }
    }

    /// `user @* {}` with a single from-entity bound to `id`.
    pub(crate) fn users(&self, id: u32) -> (AtExpr, AtEntity) {
        at(&self.user, id, Cardinality::ZeroMany)
    }

    /// `user.company.<attr>` for the given user binding.
    pub(crate) fn company_attr(&self, user: &AtEntity, attr: &str) -> DbExpr {
        DbExpr::attr(
            DbExpr::rel(DbExpr::entity(user.clone()), "company", self.company.clone()),
            attr,
        )
    }
}

/// Single-entity at-expression `entity <card> {}` with id `id`.
pub(crate) fn at(
    entity: &Arc<EntityModel>,
    id: u32,
    cardinality: Cardinality,
) -> (AtExpr, AtEntity) {
    let at_entity = AtEntity::new(entity.clone(), AtExprId(id), 0);
    let expr = AtExpr::new(AtExprId(id), vec![at_entity.clone()], cardinality);

    (expr, at_entity)
}

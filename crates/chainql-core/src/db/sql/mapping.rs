use crate::{
    chain::SqlContext,
    db::{
        at::AtEntity,
        expr::{BinaryOp, DbExpr},
        sql::builder::{ParameterizedSql, SqlBuilder},
    },
    error::InternalError,
    model::{
        ExternalChainRef,
        entity::{BLOCK_ENTITY, LOG_TRANSACTION_ATTR},
    },
    value::Value,
};

pub const ROWID_COLUMN: &str = "rowid";
pub const TX_ROWID_COLUMN: &str = "tx_iid";
pub const BLOCK_ROWID_COLUMN: &str = "block_iid";
pub const BLOCK_HEIGHT_COLUMN: &str = "block_height";

///
/// EntitySqlMapping
///
/// How a logical entity maps onto a physical table of the shared database,
/// and which rows of it are visible to the current chain.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntitySqlMapping {
    /// Local application table.
    Regular { mount_name: String },

    /// Log entity of a linked external chain, pinned to the link height.
    External {
        mount_name: String,
        chain: ExternalChainRef,
    },

    /// `transactions` system table, local or of a linked chain.
    Transaction { chain: Option<ExternalChainRef> },

    /// `blocks` system table, local or of a linked chain.
    Block { chain: Option<ExternalChainRef> },
}

impl EntitySqlMapping {
    #[must_use]
    pub const fn rowid_column(&self) -> &'static str {
        match self {
            Self::Regular { .. } | Self::External { .. } => ROWID_COLUMN,
            Self::Transaction { .. } => TX_ROWID_COLUMN,
            Self::Block { .. } => BLOCK_ROWID_COLUMN,
        }
    }

    /// Whether the schema migrator creates this table.
    #[must_use]
    pub const fn auto_create_table(&self) -> bool {
        matches!(self, Self::Regular { .. })
    }

    #[must_use]
    pub const fn is_system_entity(&self) -> bool {
        matches!(self, Self::Transaction { .. } | Self::Block { .. })
    }

    /// Chain whose tables this mapping reads, `None` for the local chain.
    #[must_use]
    pub const fn chain(&self) -> Option<&ExternalChainRef> {
        match self {
            Self::Regular { .. } => None,
            Self::External { chain, .. } => Some(chain),
            Self::Transaction { chain } | Self::Block { chain } => chain.as_ref(),
        }
    }

    /// Physical table name, e.g. `c0.user`.
    pub fn table(&self, sql_ctx: &SqlContext) -> Result<String, InternalError> {
        let name = match self {
            Self::Regular { mount_name } => sql_ctx.main_chain_mapping().full_name(mount_name),
            Self::External { mount_name, chain } => sql_ctx
                .linked_chain(chain)?
                .sql_mapping
                .full_name(mount_name),
            Self::Transaction { chain } => {
                sql_ctx.chain_mapping(chain.as_ref())?.transactions_table()
            }
            Self::Block { chain } => sql_ctx.chain_mapping(chain.as_ref())?.blocks_table(),
        };

        Ok(name)
    }

    /// Visibility predicate for `at_entity`, if this mapping restricts rows.
    ///
    /// Linked chains keep growing after they were linked; rows are visible
    /// only up to the link height so re-running a query reproduces the same
    /// result.
    pub fn extra_where_expr(
        &self,
        sql_ctx: &SqlContext,
        at_entity: &AtEntity,
    ) -> Result<Option<DbExpr>, InternalError> {
        let Some(chain) = self.chain() else {
            return Ok(None);
        };

        let height = sql_ctx.linked_chain(chain)?.height;
        let system = sql_ctx.system_entities(Some(chain))?;
        let entity = DbExpr::entity(at_entity.clone());

        let block = match self {
            Self::Regular { .. } => return Ok(None),
            Self::External { .. } => {
                let tx = DbExpr::rel(
                    entity,
                    LOG_TRANSACTION_ATTR,
                    system.transaction.clone(),
                );
                DbExpr::rel(tx, BLOCK_ENTITY, system.block.clone())
            }
            Self::Transaction { .. } => DbExpr::rel(entity, BLOCK_ENTITY, system.block.clone()),
            Self::Block { .. } => entity,
        };

        Ok(Some(DbExpr::binary(
            BinaryOp::Le,
            DbExpr::attr(block, BLOCK_HEIGHT_COLUMN),
            DbExpr::constant(Value::Int(height)),
        )))
    }

    /// Standalone `SELECT <rowid>` of rows matching `where_sql`, for schema
    /// migration tooling. `where_sql` refers to the entity table as `A` and
    /// its parameters are spliced in place.
    ///
    /// Height-restricted mappings derive the block join here on their own
    /// instead of going through [`Self::extra_where_expr`].
    pub fn select_existing_objects(
        &self,
        sql_ctx: &SqlContext,
        where_sql: &ParameterizedSql,
    ) -> Result<ParameterizedSql, InternalError> {
        let table = self.table(sql_ctx)?;
        let rowid = self.rowid_column();
        let mut b = SqlBuilder::new();

        b.append("SELECT ");
        b.append_column("A", rowid);
        b.append(" FROM ");
        b.append_name(&table);
        b.append(" A");

        let height = match self.chain() {
            Some(chain) => Some(sql_ctx.linked_chain(chain)?.height),
            None => None,
        };

        match (self, height) {
            (Self::External { chain, .. }, Some(height)) => {
                let mapping = &sql_ctx.linked_chain(chain)?.sql_mapping;
                b.append(" INNER JOIN ");
                b.append_name(&mapping.transactions_table());
                b.append(" T ON ");
                b.append_column("T", TX_ROWID_COLUMN);
                b.append(" = ");
                b.append_column("A", LOG_TRANSACTION_ATTR);
                b.append(" INNER JOIN ");
                b.append_name(&mapping.blocks_table());
                b.append(" B ON ");
                b.append_column("B", BLOCK_ROWID_COLUMN);
                b.append(" = ");
                b.append_column("T", BLOCK_ROWID_COLUMN);
                append_height_filter(&mut b, "B", height, where_sql);
            }
            (Self::Transaction { chain: Some(chain) }, Some(height)) => {
                let mapping = &sql_ctx.linked_chain(chain)?.sql_mapping;
                b.append(" INNER JOIN ");
                b.append_name(&mapping.blocks_table());
                b.append(" B ON ");
                b.append_column("B", BLOCK_ROWID_COLUMN);
                b.append(" = ");
                b.append_column("A", BLOCK_ROWID_COLUMN);
                append_height_filter(&mut b, "B", height, where_sql);
            }
            (Self::Block { chain: Some(_) }, Some(height)) => {
                append_height_filter(&mut b, "A", height, where_sql);
            }
            _ => {
                b.append(" WHERE ");
                b.append_sql(where_sql);
            }
        }

        b.build()
    }
}

fn append_height_filter(
    b: &mut SqlBuilder,
    blocks_alias: &str,
    height: i64,
    where_sql: &ParameterizedSql,
) {
    b.append(" WHERE ");
    b.append_column(blocks_alias, BLOCK_HEIGHT_COLUMN);
    b.append(" <= ");
    b.append_value(Value::Int(height));
    b.append(" AND (");
    b.append_sql(where_sql);
    b.append(")");
}

use crate::{
    db::{
        at::{AtEntity, AtEntityId, AtExprId},
        sql::alias::{AliasAllocator, TableAlias},
    },
    error::InternalError,
    model::EntityModel,
};
use derive_more::Display;
use std::{collections::HashMap, sync::Arc};

///
/// ScopeId
/// Index of one scope in a [`SqlGenTree`] arena.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[display("scope#{_0}")]
pub struct ScopeId(usize);

///
/// FromJoin
/// One `INNER JOIN` through a relation attribute.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FromJoin {
    pub base: TableAlias,
    /// Column on `base` holding the target row id.
    pub column: String,
    pub alias: TableAlias,
}

///
/// FromEntity
/// A from-entity and the joins hanging off it, in creation order.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FromEntity {
    pub at_id: AtEntityId,
    pub alias: TableAlias,
    pub joins: Vec<FromJoin>,
}

///
/// FromInfo
/// FROM-clause shape of one scope.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FromInfo {
    pub entities: Vec<FromEntity>,
}

impl FromInfo {
    #[must_use]
    pub fn join_count(&self) -> usize {
        self.entities.iter().map(|e| e.joins.len()).sum()
    }

    /// Every alias in the clause: from-entities first, then their joins.
    #[must_use]
    pub fn aliases(&self) -> Vec<&TableAlias> {
        self.entities
            .iter()
            .flat_map(|e| std::iter::once(&e.alias).chain(e.joins.iter().map(|j| &j.alias)))
            .collect()
    }
}

// Alias + join table of one from-entity.
#[derive(Debug)]
struct EntityTable {
    at_id: AtEntityId,
    alias: TableAlias,
    joins: Vec<FromJoin>,
    join_index: HashMap<(String, String), TableAlias>,
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    expr_id: AtExprId,
    tables: Vec<EntityTable>,
}

///
/// SqlGenTree
///
/// Arena of SQL generation scopes for one top-level at-expression. Scopes
/// point at their parent by index; all of them draw aliases from the one
/// allocator owned here. Created per compilation and dropped afterwards.
///

#[derive(Debug, Default)]
pub struct SqlGenTree {
    allocator: AliasAllocator,
    scopes: Vec<Scope>,
    // alias name -> (owning scope, table slot within it)
    alias_owner: HashMap<String, (ScopeId, usize)>,
}

impl SqlGenTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of aliases allocated across the whole tree.
    #[must_use]
    pub const fn allocated(&self) -> u32 {
        self.allocator.allocated()
    }

    /// Open the top-level scope.
    pub fn root(
        &mut self,
        expr_id: AtExprId,
        entities: &[AtEntity],
    ) -> Result<SqlGenContext<'_>, InternalError> {
        if !self.scopes.is_empty() {
            return Err(InternalError::query_invariant(
                "sql generation tree already has a root scope",
            ));
        }

        let scope = self.push_scope(None, expr_id, entities)?;
        Ok(SqlGenContext { tree: self, scope })
    }

    fn push_scope(
        &mut self,
        parent: Option<ScopeId>,
        expr_id: AtExprId,
        entities: &[AtEntity],
    ) -> Result<ScopeId, InternalError> {
        if let Some(owner) = parent.and_then(|p| self.find_scope(p, expr_id)) {
            return Err(InternalError::query_invariant(format!(
                "at-expression {expr_id} is already bound in {owner}"
            )));
        }

        let scope_id = ScopeId(self.scopes.len());
        let mut tables: Vec<EntityTable> = Vec::with_capacity(entities.len());

        for at_entity in entities {
            if at_entity.id.expr_id != expr_id {
                return Err(InternalError::query_invariant(format!(
                    "entity {} is bound to at-expression {}, not {expr_id}",
                    at_entity.id, at_entity.id.expr_id
                )));
            }
            if tables.iter().any(|t| t.at_id == at_entity.id) {
                return Err(InternalError::query_invariant(format!(
                    "entity {} is bound twice in at-expression {expr_id}",
                    at_entity.id
                )));
            }

            let alias = self.allocator.allocate(&at_entity.entity, expr_id);
            self.alias_owner
                .insert(alias.name().to_string(), (scope_id, tables.len()));
            tables.push(EntityTable {
                at_id: at_entity.id,
                alias,
                joins: Vec::new(),
                join_index: HashMap::new(),
            });
        }

        self.scopes.push(Scope {
            parent,
            expr_id,
            tables,
        });

        Ok(scope_id)
    }

    // Walk from `start` to the root looking for the scope bound to `expr_id`.
    fn find_scope(&self, start: ScopeId, expr_id: AtExprId) -> Option<ScopeId> {
        let mut current = Some(start);
        while let Some(id) = current {
            let scope = &self.scopes[id.0];
            if scope.expr_id == expr_id {
                return Some(id);
            }
            current = scope.parent;
        }
        None
    }

    fn is_visible(&self, from: ScopeId, target: ScopeId) -> bool {
        let mut current = Some(from);
        while let Some(id) = current {
            if id == target {
                return true;
            }
            current = self.scopes[id.0].parent;
        }
        false
    }
}

///
/// SqlGenContext
///
/// Handle on one scope of a [`SqlGenTree`]. Sub-queries (EXISTS, IN, nested
/// at-expressions) open child scopes with [`SqlGenContext::create_sub`] and
/// may reference entities and joins of every ancestor.
///

#[derive(Debug)]
pub struct SqlGenContext<'t> {
    tree: &'t mut SqlGenTree,
    scope: ScopeId,
}

impl SqlGenContext<'_> {
    #[must_use]
    pub const fn scope(&self) -> ScopeId {
        self.scope
    }

    #[must_use]
    pub fn expr_id(&self) -> AtExprId {
        self.tree.scopes[self.scope.0].expr_id
    }

    #[must_use]
    pub const fn allocated(&self) -> u32 {
        self.tree.allocated()
    }

    /// Open a child scope that shares this tree's alias allocator.
    pub fn create_sub(
        &mut self,
        expr_id: AtExprId,
        entities: &[AtEntity],
    ) -> Result<SqlGenContext<'_>, InternalError> {
        let scope = self.tree.push_scope(Some(self.scope), expr_id, entities)?;

        Ok(SqlGenContext {
            tree: &mut *self.tree,
            scope,
        })
    }

    /// Alias of a from-entity bound by this scope or one of its ancestors.
    pub fn entity_alias(&self, at_entity: &AtEntity) -> Result<TableAlias, InternalError> {
        let expr_id = at_entity.id.expr_id;
        let owner = self.tree.find_scope(self.scope, expr_id).ok_or_else(|| {
            InternalError::query_invariant(format!(
                "at-expression {expr_id} is not visible from {}",
                self.scope
            ))
        })?;

        self.tree.scopes[owner.0]
            .tables
            .iter()
            .find(|t| t.at_id == at_entity.id)
            .map(|t| t.alias.clone())
            .ok_or_else(|| {
                InternalError::query_invariant(format!(
                    "entity {} is not bound in at-expression {expr_id}",
                    at_entity.id
                ))
            })
    }

    /// Alias of the entity reached from `base` through relation column
    /// `column`; the join is created on first use and reused afterwards.
    pub fn rel_alias(
        &mut self,
        base: &TableAlias,
        column: &str,
        target: &Arc<EntityModel>,
    ) -> Result<TableAlias, InternalError> {
        let (owner, slot) = self
            .tree
            .alias_owner
            .get(base.name())
            .copied()
            .ok_or_else(|| {
                InternalError::query_invariant(format!("unknown table alias {base}"))
            })?;

        if !self.tree.is_visible(self.scope, owner) {
            return Err(InternalError::query_invariant(format!(
                "table alias {base} is not visible from {}",
                self.scope
            )));
        }

        let key = (base.name().to_string(), column.to_string());
        if let Some(alias) = self.tree.scopes[owner.0].tables[slot].join_index.get(&key) {
            return Ok(alias.clone());
        }

        let expr_id = self.tree.scopes[owner.0].expr_id;
        let alias = self.tree.allocator.allocate(target, expr_id);
        self.tree
            .alias_owner
            .insert(alias.name().to_string(), (owner, slot));

        let table = &mut self.tree.scopes[owner.0].tables[slot];
        table.join_index.insert(key, alias.clone());
        table.joins.push(FromJoin {
            base: base.clone(),
            column: column.to_string(),
            alias: alias.clone(),
        });

        Ok(alias)
    }

    /// FROM-clause shape of this scope.
    #[must_use]
    pub fn from_info(&self) -> FromInfo {
        let entities = self.tree.scopes[self.scope.0]
            .tables
            .iter()
            .map(|t| FromEntity {
                at_id: t.at_id,
                alias: t.alias.clone(),
                joins: t.joins.clone(),
            })
            .collect();

        FromInfo { entities }
    }
}

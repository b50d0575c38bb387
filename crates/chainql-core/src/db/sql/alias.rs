use crate::{db::at::AtExprId, model::EntityModel};
use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
    sync::Arc,
};

///
/// AliasAllocator
///
/// Monotonic alias counter shared by one tree of SQL generation scopes.
/// Names are never reused, so every alias in a statement is distinct no
/// matter how deeply sub-queries nest.
///

#[derive(Debug, Default)]
pub struct AliasAllocator {
    next: u32,
}

impl AliasAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Number of aliases handed out so far.
    #[must_use]
    pub const fn allocated(&self) -> u32 {
        self.next
    }

    pub fn allocate(&mut self, entity: &Arc<EntityModel>, expr_id: AtExprId) -> TableAlias {
        let name = format!("A{:02}", self.next);
        self.next += 1;

        TableAlias {
            entity: Arc::clone(entity),
            expr_id,
            name,
        }
    }
}

///
/// TableAlias
/// `(entity, expr id, generated name)`; identity is the name.
///

#[derive(Clone, Debug)]
pub struct TableAlias {
    entity: Arc<EntityModel>,
    expr_id: AtExprId,
    name: String,
}

impl TableAlias {
    #[must_use]
    pub const fn entity(&self) -> &Arc<EntityModel> {
        &self.entity
    }

    #[must_use]
    pub const fn expr_id(&self) -> AtExprId {
        self.expr_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for TableAlias {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TableAlias {}

impl Hash for TableAlias {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Display for TableAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

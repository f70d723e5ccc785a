//! Entities and lexical scopes
//!
//! An entity is a resolved declaration: variable, function, constant or
//! parameter. Entities live in one arena per compilation; scope nodes form
//! a tree (arena + parent index) whose root is the top-level scope. Name
//! lookup walks parent links. Codegen later assigns each entity a storage
//! location (frame offset or symbol).

use crate::ast::Storage;
use crate::error::Location;
use crate::types::TypeId;
use std::collections::HashMap;

pub type EntityId = usize;
pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Variable,
    Function,
    Constant,
    Param,
}

/// Storage location assigned by codegen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemRef {
    /// Offset from %ebp: parameters positive, locals negative.
    Frame(i32),
    /// Assembly symbol of a global or function.
    Symbol(String),
}

#[derive(Debug)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub storage: Storage,
    pub location: Location,
    /// True once a definition (not just a declaration) was seen.
    pub defined: bool,
    /// Resolved type, filled by the type resolver.
    pub ty: Option<TypeId>,
    /// Folded value for constants, filled by the type resolver.
    pub const_value: Option<i64>,
    /// Filled by codegen storage assignment.
    pub mem: Option<MemRef>,
}

impl Entity {
    /// Internal linkage: no `.globl` in the emitted assembly.
    pub fn is_private(&self) -> bool {
        self.storage == Storage::Static
    }

    pub fn type_id(&self) -> TypeId {
        self.ty.expect("entity type not resolved")
    }
}

#[derive(Debug, Default)]
pub struct EntityTable {
    entities: Vec<Entity>,
}

impl EntityTable {
    pub fn new() -> Self {
        EntityTable::default()
    }

    pub fn add(
        &mut self,
        name: &str,
        kind: EntityKind,
        storage: Storage,
        defined: bool,
        location: Location,
    ) -> EntityId {
        self.entities.push(Entity {
            name: name.to_string(),
            kind,
            storage,
            location,
            defined,
            ty: None,
            const_value: None,
            mem: None,
        });
        self.entities.len() - 1
    }

    pub fn get(&self, id: EntityId) -> &Entity {
        &self.entities[id]
    }

    pub fn get_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter().enumerate()
    }
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    names: HashMap<String, EntityId>,
}

/// The scope tree. Index 0 is the top-level scope of the unit.
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

pub const TOP_SCOPE: ScopeId = 0;

impl ScopeTree {
    pub fn new() -> Self {
        ScopeTree {
            scopes: vec![Scope {
                parent: None,
                names: HashMap::new(),
            }],
        }
    }

    pub fn push_child(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.push(Scope {
            parent: Some(parent),
            names: HashMap::new(),
        });
        self.scopes.len() - 1
    }

    /// Insert a name into `scope`. On a duplicate in the same scope the
    /// existing entity id is returned as the error value.
    pub fn define(
        &mut self,
        scope: ScopeId,
        name: &str,
        entity: EntityId,
    ) -> Result<(), EntityId> {
        match self.scopes[scope].names.get(name) {
            Some(&existing) => Err(existing),
            None => {
                self.scopes[scope].names.insert(name.to_string(), entity);
                Ok(())
            }
        }
    }

    /// Look `name` up in `scope`, walking parents. Shadowing falls out of
    /// stopping at the innermost hit.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<EntityId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(&entity) = self.scopes[id].names.get(name) {
                return Some(entity);
            }
            current = self.scopes[id].parent;
        }
        None
    }

    /// Lookup confined to one scope, no parent walk.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<EntityId> {
        self.scopes[scope].names.get(name).copied()
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        ScopeTree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_var(entities: &mut EntityTable, name: &str) -> EntityId {
        entities.add(
            name,
            EntityKind::Variable,
            Storage::Auto,
            true,
            Location::none(),
        )
    }

    #[test]
    fn test_lookup_walks_parents() {
        let mut entities = EntityTable::new();
        let mut scopes = ScopeTree::new();
        let x = add_var(&mut entities, "x");
        scopes.define(TOP_SCOPE, "x", x).unwrap();
        let inner = scopes.push_child(TOP_SCOPE);
        let innermost = scopes.push_child(inner);
        assert_eq!(scopes.lookup(innermost, "x"), Some(x));
        assert_eq!(scopes.lookup(innermost, "y"), None);
    }

    #[test]
    fn test_shadowing_across_scopes() {
        let mut entities = EntityTable::new();
        let mut scopes = ScopeTree::new();
        let outer = add_var(&mut entities, "x");
        let shadow = add_var(&mut entities, "x");
        scopes.define(TOP_SCOPE, "x", outer).unwrap();
        let inner = scopes.push_child(TOP_SCOPE);
        scopes.define(inner, "x", shadow).unwrap();
        assert_eq!(scopes.lookup(inner, "x"), Some(shadow));
        assert_eq!(scopes.lookup(TOP_SCOPE, "x"), Some(outer));
    }

    #[test]
    fn test_duplicate_in_same_scope_is_rejected() {
        let mut entities = EntityTable::new();
        let mut scopes = ScopeTree::new();
        let first = add_var(&mut entities, "x");
        let second = add_var(&mut entities, "x");
        scopes.define(TOP_SCOPE, "x", first).unwrap();
        assert_eq!(scopes.define(TOP_SCOPE, "x", second), Err(first));
    }
}

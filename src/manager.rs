//! The builder: a scoped, contextual factory for entities that atomically
//! registers each one (and any children it introduces) into a shared
//! registry (`§4.4`).

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeSet;
use std::rc::Rc;

use serde_json::Value;

use crate::entity::{
    BuildContext, Entity, EntityRef, FunctionEntity, IndexEntity, SchemaEntity, TableEntity, TriggerEntity,
};
use crate::error::Result;
use crate::registry::Registry;
use crate::syntax::Syntax;

/// A scoped factory over a shared [`Registry`]. `Manager::create_root`
/// starts a tree of managers; `after` and `with_schema` derive scoped
/// children that share the same underlying registry but carry their own
/// current-schema and current-dependency-set context, mirroring the
/// teacher's own pattern of deriving narrow, context-carrying handles from a
/// shared backing store rather than threading that context through every
/// call site by hand.
#[derive(Clone)]
pub struct Manager {
    syntax: Syntax,
    schema: Option<EntityRef>,
    dependencies: BTreeSet<EntityRef>,
    registry: Rc<RefCell<Registry>>,
}

impl BuildContext for Manager {
    fn syntax(&self) -> Syntax {
        self.syntax
    }

    fn schema_ref(&self) -> Option<&EntityRef> {
        self.schema.as_ref()
    }

    fn dependency_refs(&self) -> &BTreeSet<EntityRef> {
        &self.dependencies
    }
}

impl Manager {
    pub fn create_root(syntax: Syntax) -> Self {
        Self {
            syntax,
            schema: None,
            dependencies: BTreeSet::new(),
            registry: Rc::new(RefCell::new(Registry::new())),
        }
    }

    /// Borrow the underlying registry read-only.
    pub fn registry(&self) -> Ref<'_, Registry> {
        self.registry.borrow()
    }

    fn registry_mut(&self) -> RefMut<'_, Registry> {
        self.registry.borrow_mut()
    }

    pub fn get(&self, r: &EntityRef) -> Option<Entity> {
        self.registry().get_entity(r).cloned()
    }

    /// A child manager whose factory calls carry `entities` as their
    /// current explicit dependency set, until further scoped.
    pub fn after(&self, entities: &[&Entity]) -> Self {
        Self {
            syntax: self.syntax,
            schema: self.schema.clone(),
            dependencies: entities.iter().map(|e| e.entity_ref().clone()).collect(),
            registry: Rc::clone(&self.registry),
        }
    }

    /// A child manager scoped to `schema`, inheriting the current
    /// dependency set.
    pub fn with_schema(&self, schema: &SchemaEntity) -> Self {
        Self {
            syntax: self.syntax,
            schema: Some(schema.entity_ref.clone()),
            dependencies: self.dependencies.clone(),
            registry: Rc::clone(&self.registry),
        }
    }

    pub fn schema(&self, name: &str) -> Result<SchemaEntity> {
        let bundle = SchemaEntity::create(self, name);
        let main = self.registry_mut().register_bundle(bundle)?;
        match main {
            Entity::Schema(s) => Ok(s),
            _ => unreachable!("SchemaEntity::create always builds an Entity::Schema"),
        }
    }

    pub fn table(
        &self,
        name: &str,
        columns: impl IntoIterator<Item = (String, String)>,
        additional: impl IntoIterator<Item = String>,
    ) -> Result<TableEntity> {
        let bundle = TableEntity::create(self, name, columns, additional);
        let main = self.registry_mut().register_bundle(bundle)?;
        match main {
            Entity::Table(t) => Ok(t),
            _ => unreachable!("TableEntity::create always builds an Entity::Table"),
        }
    }

    pub fn index(
        &self,
        name: &str,
        on: &str,
        using: &str,
        expressions: impl IntoIterator<Item = String>,
    ) -> Result<IndexEntity> {
        let bundle = IndexEntity::create(self, name, on, using, expressions);
        let main = self.registry_mut().register_bundle(bundle)?;
        match main {
            Entity::Index(i) => Ok(i),
            _ => unreachable!("IndexEntity::create always builds an Entity::Index"),
        }
    }

    pub fn function(
        &self,
        name: &str,
        args: impl IntoIterator<Item = (String, String)>,
        returns: &str,
        language: &str,
        body: &str,
    ) -> Result<FunctionEntity> {
        let bundle = FunctionEntity::create(self, name, args, returns, language, body);
        let main = self.registry_mut().register_bundle(bundle)?;
        match main {
            Entity::Function(f) => Ok(f),
            _ => unreachable!("FunctionEntity::create always builds an Entity::Function"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn trigger(
        &self,
        name: &str,
        before: Option<&str>,
        after: Option<&str>,
        instead_of: Option<&str>,
        on: &str,
        function: Option<&str>,
        procedure: Option<&str>,
    ) -> Result<TriggerEntity> {
        let bundle = TriggerEntity::create(self, name, before, after, instead_of, on, function, procedure)?;
        let main = self.registry_mut().register_bundle(bundle)?;
        match main {
            Entity::Trigger(t) => Ok(t),
            _ => unreachable!("TriggerEntity::create always builds an Entity::Trigger"),
        }
    }

    /// Re-register an entity under its existing ref with an updated
    /// definition (`§4.4`).
    pub fn update_refs(&self, entity: Entity) -> Result<()> {
        self.registry_mut().update_node(entity)
    }

    /// Export every exportable (`Entity::manage_export`) entity as a dict,
    /// in topological order.
    pub fn export_dicts(&self) -> Result<Vec<Value>> {
        let registry = self.registry();
        let ordered = registry.iter_topological()?;
        Ok(ordered.into_iter().filter(|e| e.manage_export()).map(Entity::to_dict).collect())
    }

    /// Import a set of previously exported dicts into this manager's
    /// registry. Dicts are registered one bundle at a time via
    /// [`Entity::from_dict`] and [`Registry::register_bundle`], so the
    /// caller is responsible for providing them in an order where a dict's
    /// dependencies have already been imported (the order `export_dicts`
    /// produces satisfies this).
    pub fn import_dicts(&self, dicts: impl IntoIterator<Item = Value>) -> Result<()> {
        for dict in dicts {
            let bundle = Entity::from_dict(self.syntax, &dict)?;
            self.registry_mut().register_bundle(bundle)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn after_scopes_dependencies_without_losing_schema() {
        let root = Manager::create_root(Syntax::default());
        let public = root.schema("public").unwrap();
        let scoped = root.with_schema(&public);
        let user = scoped
            .table("user", [("id".to_string(), "bigint primary key".to_string())], [])
            .unwrap();

        let after_user = scoped.after(&[&Entity::Table(user.clone())]);
        assert_eq!(after_user.schema_ref(), Some(&public.entity_ref));
        assert!(after_user.dependency_refs().contains(&user.entity_ref));
    }

    #[test]
    fn export_then_import_round_trips() {
        let root = Manager::create_root(Syntax::default());
        let public = root.schema("public").unwrap();
        root.with_schema(&public)
            .table("user", [("id".to_string(), "bigint primary key".to_string())], [])
            .unwrap();

        let dicts = root.export_dicts().unwrap();

        let reimported = Manager::create_root(Syntax::default());
        reimported.import_dicts(dicts).unwrap();

        assert!(reimported.get(&public.entity_ref).is_some());
    }
}

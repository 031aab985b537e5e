use std::collections::BTreeSet;
use std::fmt;

use serde_json::{json, Value};

use super::{dict_deps, dict_str, make_ref, Bundle, BuildContext, Entity, EntityKind, EntityRef};
use crate::error::Result;
use crate::syntax::{Syntax, TaggedText};

/// An index on a table. Plain `DBEntity`: unlike `Table`/`Function`, indexes
/// carry no schema field and get no schema fallback — they're never
/// referenced by identifier from other entities, only by ref.
#[derive(Debug, Clone)]
pub struct IndexEntity {
    pub entity_ref: EntityRef,
    pub explicit_deps: BTreeSet<EntityRef>,
    pub name: String,
    pub on: TaggedText,
    pub using: TaggedText,
    pub expressions: Vec<TaggedText>,
}

impl IndexEntity {
    pub fn create(
        ctx: &impl BuildContext,
        name: &str,
        on: &str,
        using: &str,
        expressions: impl IntoIterator<Item = String>,
    ) -> Bundle {
        let syntax = ctx.syntax();
        let entity_ref = make_ref(EntityKind::Index, name, None);
        Bundle::single(Entity::Index(Self {
            entity_ref,
            explicit_deps: ctx.dependency_refs().clone(),
            name: name.to_string(),
            on: TaggedText::parse(syntax, on),
            using: TaggedText::parse(syntax, using),
            expressions: expressions.into_iter().map(|e| TaggedText::parse(syntax, e)).collect(),
        }))
    }

    pub fn inferred_dependencies(&self) -> BTreeSet<EntityRef> {
        let mut refs: BTreeSet<EntityRef> = self.on.refs().iter().cloned().map(EntityRef::new).collect();
        refs.extend(self.using.refs().iter().cloned().map(EntityRef::new));
        for expr in &self.expressions {
            refs.extend(expr.refs().iter().cloned().map(EntityRef::new));
        }
        refs
    }

    pub fn to_dict(&self) -> Value {
        json!({
            "__type__": "Index",
            "ref": self.entity_ref.as_str(),
            "name": self.name,
            "on": self.on.clean(),
            "using": self.using.clean(),
            "expressions": self.expressions.iter().map(TaggedText::clean).collect::<Vec<_>>(),
            "dependencies": self.explicit_deps.union(&self.inferred_dependencies()).map(EntityRef::as_str).collect::<Vec<_>>(),
        })
    }

    pub fn from_dict(syntax: Syntax, data: &Value) -> Result<Self> {
        let deps = dict_deps(data);
        let expressions = data
            .get("expressions")
            .and_then(Value::as_array)
            .map(|vs| {
                vs.iter()
                    .filter_map(Value::as_str)
                    .map(|s| TaggedText::from_clean(syntax, s, BTreeSet::new()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            entity_ref: EntityRef::new(dict_str(data, "ref")?),
            explicit_deps: deps.into_iter().map(EntityRef::new).collect(),
            name: dict_str(data, "name")?,
            on: TaggedText::from_clean(syntax, dict_str(data, "on")?, BTreeSet::new()),
            using: TaggedText::from_clean(syntax, dict_str(data, "using")?, BTreeSet::new()),
            expressions,
        })
    }
}

impl fmt::Display for IndexEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entity_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Manager;

    #[test]
    fn create_infers_dependency_from_on_clause() {
        let root = Manager::create_root(Syntax::default());
        let public = root.schema("public").unwrap();
        let scoped = root.with_schema(&public);
        let user = scoped
            .table("user", [("email".to_string(), "text not null".to_string())], [])
            .unwrap();
        let idx = scoped
            .index("idx_user_email", &user.tag(), "btree", ["email".to_string()])
            .unwrap();
        assert!(idx.inferred_dependencies().contains(&user.entity_ref));
    }
}

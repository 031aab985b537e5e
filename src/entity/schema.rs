use std::collections::BTreeSet;
use std::fmt;

use serde_json::{json, Value};

use super::{dict_str, make_ref, Bundle, BuildContext, Entity, EntityKind, EntityRef};
use crate::error::Result;
use crate::syntax::{Syntax, TaggedText};

/// A Postgres schema (namespace). Carries no dependencies of its own — every
/// other schema-dependent entity depends on it instead, not the reverse.
#[derive(Debug, Clone)]
pub struct SchemaEntity {
    pub entity_ref: EntityRef,
    pub name: String,
    identifier: TaggedText,
}

impl SchemaEntity {
    pub fn create(ctx: &impl BuildContext, name: &str) -> Bundle {
        let entity_ref = make_ref(EntityKind::Schema, name, None);
        let identifier = TaggedText::identifier(ctx.syntax(), &[name], vec![entity_ref.as_str().to_string()]);
        Bundle::single(Entity::Schema(Self { entity_ref, name: name.to_string(), identifier }))
    }

    /// The tagged identifier text, for interpolating this schema into
    /// another entity's SQL fragment (e.g. a table's `CREATE TABLE
    /// <tag>.foo`).
    pub fn tag(&self) -> String {
        self.identifier.format_with_refs()
    }

    pub fn to_dict(&self) -> Value {
        json!({
            "__type__": "Schema",
            "ref": self.entity_ref.as_str(),
            "name": self.name,
            "dependencies": Vec::<String>::new(),
        })
    }

    pub fn from_dict(data: &Value) -> Result<Self> {
        let entity_ref = EntityRef::new(dict_str(data, "ref")?);
        let name = dict_str(data, "name")?;
        let identifier = TaggedText::from_clean(Syntax::default(), name.clone(), BTreeSet::new());
        Ok(Self { entity_ref, name, identifier })
    }
}

impl fmt::Display for SchemaEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Manager;

    #[test]
    fn create_assigns_unprefixed_ref() {
        let root = Manager::create_root(Syntax::default());
        let public = root.schema("public").unwrap();
        assert_eq!(public.entity_ref.as_str(), "Schema:public");
    }
}

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use serde_json::{json, Value};

use super::{dict_deps, dict_ref_opt, dict_str, make_ref, Bundle, BuildContext, Entity, EntityKind, EntityRef};
use crate::error::Result;
use crate::syntax::{Syntax, TaggedText};

const ARGS_HASH_LEN: usize = 16;

/// Hash the argument type sequence (in declared order) into the short,
/// deterministic disambiguator a function's ref carries, so that two
/// functions sharing a name but differing in signature get distinct refs
/// rather than colliding (`§3`, per-variant essentials for `Function`).
fn args_disambiguator(args: &IndexMap<String, TaggedText>) -> String {
    let joined = args.values().map(TaggedText::clean).collect::<Vec<_>>().join("\u{1}");
    let digest = blake3::hash(joined.as_bytes());
    digest.to_hex()[..ARGS_HASH_LEN].to_string()
}

/// A SQL function (or stored procedure body), schema-dependent like `Table`.
#[derive(Debug, Clone)]
pub struct FunctionEntity {
    pub entity_ref: EntityRef,
    pub schema: Option<EntityRef>,
    pub explicit_deps: BTreeSet<EntityRef>,
    pub name: String,
    pub args: IndexMap<String, TaggedText>,
    pub returns: TaggedText,
    pub language: String,
    pub body: TaggedText,
    identifier: TaggedText,
}

impl FunctionEntity {
    /// `args` is an ordered list of `(name, type expression)`; the
    /// disambiguator folded into the ref is derived from the type sequence
    /// alone, so renaming an argument without changing its type keeps the
    /// same ref.
    pub fn create(
        ctx: &impl BuildContext,
        name: &str,
        args: impl IntoIterator<Item = (String, String)>,
        returns: &str,
        language: &str,
        body: &str,
    ) -> Bundle {
        let syntax = ctx.syntax();
        let schema = ctx.schema_ref().cloned();
        let args: IndexMap<String, TaggedText> =
            args.into_iter().map(|(n, ty)| (n, TaggedText::parse(syntax, ty))).collect();
        let disambiguator = args_disambiguator(&args);
        let entity_ref = make_ref(EntityKind::Function, &format!("{name}.{disambiguator}"), schema.as_ref());
        let identifier = TaggedText::identifier(syntax, &[name], vec![entity_ref.as_str().to_string()]);

        Bundle::single(Entity::Function(Self {
            entity_ref,
            schema,
            explicit_deps: ctx.dependency_refs().clone(),
            name: name.to_string(),
            args,
            returns: TaggedText::parse(syntax, returns),
            language: language.to_string(),
            body: TaggedText::parse(syntax, body),
            identifier,
        }))
    }

    pub fn inferred_dependencies(&self) -> BTreeSet<EntityRef> {
        let mut refs: BTreeSet<EntityRef> = BTreeSet::new();
        for ty in self.args.values() {
            refs.extend(ty.refs().iter().cloned().map(EntityRef::new));
        }
        refs.extend(self.returns.refs().iter().cloned().map(EntityRef::new));
        refs.extend(self.body.refs().iter().cloned().map(EntityRef::new));
        refs
    }

    pub fn tag(&self) -> String {
        self.identifier.format_with_refs()
    }

    pub fn to_dict(&self) -> Value {
        let explicit_and_schema: BTreeSet<EntityRef> =
            crate::entity::effective_with_schema_fallback(&self.explicit_deps, &self.inferred_dependencies(), self.schema.as_ref());
        json!({
            "__type__": "Function",
            "ref": self.entity_ref.as_str(),
            "schema": self.schema.as_ref().map(EntityRef::as_str),
            "name": self.name,
            "args": self.args.iter().map(|(n, t)| json!({"name": n, "type": t.clean()})).collect::<Vec<_>>(),
            "returns": self.returns.clean(),
            "language": self.language,
            "body": self.body.clean(),
            "dependencies": explicit_and_schema.iter().map(EntityRef::as_str).collect::<Vec<_>>(),
        })
    }

    pub fn from_dict(syntax: Syntax, data: &Value) -> Result<Self> {
        let entity_ref = EntityRef::new(dict_str(data, "ref")?);
        let name = dict_str(data, "name")?;
        let args: IndexMap<String, TaggedText> = data
            .get("args")
            .and_then(Value::as_array)
            .map(|vs| {
                vs.iter()
                    .filter_map(|v| {
                        let n = v.get("name")?.as_str()?.to_string();
                        let t = v.get("type")?.as_str()?.to_string();
                        Some((n, TaggedText::from_clean(syntax, t, BTreeSet::new())))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let identifier = TaggedText::identifier(syntax, &[&name], vec![entity_ref.as_str().to_string()]);
        Ok(Self {
            entity_ref,
            schema: dict_ref_opt(data, "schema"),
            explicit_deps: dict_deps(data).into_iter().map(EntityRef::new).collect(),
            name,
            args,
            returns: TaggedText::from_clean(syntax, dict_str(data, "returns")?, BTreeSet::new()),
            language: dict_str(data, "language")?,
            body: TaggedText::from_clean(syntax, dict_str(data, "body")?, BTreeSet::new()),
            identifier,
        })
    }
}

impl fmt::Display for FunctionEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_argument_types_produce_distinct_refs() {
        let syntax = Syntax::default();
        let a = IndexMap::from([("x".to_string(), TaggedText::parse(syntax, "int"))]);
        let b = IndexMap::from([("x".to_string(), TaggedText::parse(syntax, "text"))]);
        assert_ne!(args_disambiguator(&a), args_disambiguator(&b));
    }

    #[test]
    fn renaming_an_argument_does_not_change_the_disambiguator() {
        let syntax = Syntax::default();
        let a = IndexMap::from([("x".to_string(), TaggedText::parse(syntax, "int"))]);
        let b = IndexMap::from([("y".to_string(), TaggedText::parse(syntax, "int"))]);
        assert_eq!(args_disambiguator(&a), args_disambiguator(&b));
    }
}

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{json, Value};

use super::{dict_deps, dict_str, make_ref, Bundle, BuildContext, Entity, EntityKind, EntityRef};
use crate::error::{Error, Result};
use crate::syntax::{Syntax, TaggedText};

/// A trigger bound to a table. Plain `DBEntity`, like `Index`: no schema
/// field, no schema fallback.
///
/// `before`/`after`/`instead_of` each carry the trigger's event clause (e.g.
/// `"insert or update"`) when that's the timing the trigger fires at, and are
/// `None` otherwise — exactly one of the three is required (`§3`). The event
/// text itself is meaningful (it's what a rendering layer turns into
/// `BEFORE INSERT OR UPDATE ...`), so it's carried and compared field by
/// field rather than collapsed into a timing marker.
#[derive(Debug, Clone)]
pub struct TriggerEntity {
    pub entity_ref: EntityRef,
    pub explicit_deps: BTreeSet<EntityRef>,
    pub name: String,
    pub before: Option<TaggedText>,
    pub after: Option<TaggedText>,
    pub instead_of: Option<TaggedText>,
    pub on: TaggedText,
    pub function: Option<TaggedText>,
    pub procedure: Option<TaggedText>,
}

impl TriggerEntity {
    /// Validates that exactly one of `before`/`after`/`instead_of` and
    /// exactly one of `function`/`procedure` is given.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        ctx: &impl BuildContext,
        name: &str,
        before: Option<&str>,
        after: Option<&str>,
        instead_of: Option<&str>,
        on: &str,
        function: Option<&str>,
        procedure: Option<&str>,
    ) -> Result<Bundle> {
        if function.is_some() == procedure.is_some() {
            return Err(Error::Construction(
                "trigger must set exactly one of function or procedure".to_string(),
            ));
        }
        let timing_count = [before.is_some(), after.is_some(), instead_of.is_some()]
            .into_iter()
            .filter(|b| *b)
            .count();
        if timing_count != 1 {
            return Err(Error::Construction(
                "trigger must set exactly one of before, after or instead_of".to_string(),
            ));
        }

        let syntax = ctx.syntax();
        let entity_ref = make_ref(EntityKind::Trigger, name, None);
        Ok(Bundle::single(Entity::Trigger(Self {
            entity_ref,
            explicit_deps: ctx.dependency_refs().clone(),
            name: name.to_string(),
            before: before.map(|b| TaggedText::parse(syntax, b)),
            after: after.map(|a| TaggedText::parse(syntax, a)),
            instead_of: instead_of.map(|i| TaggedText::parse(syntax, i)),
            on: TaggedText::parse(syntax, on),
            function: function.map(|f| TaggedText::parse(syntax, f)),
            procedure: procedure.map(|p| TaggedText::parse(syntax, p)),
        })))
    }

    pub fn inferred_dependencies(&self) -> BTreeSet<EntityRef> {
        let mut refs: BTreeSet<EntityRef> = self.on.refs().iter().cloned().map(EntityRef::new).collect();
        for text in [&self.before, &self.after, &self.instead_of, &self.function, &self.procedure] {
            if let Some(t) = text {
                refs.extend(t.refs().iter().cloned().map(EntityRef::new));
            }
        }
        refs
    }

    pub fn to_dict(&self) -> Value {
        json!({
            "__type__": "Trigger",
            "ref": self.entity_ref.as_str(),
            "name": self.name,
            "before": self.before.as_ref().map(TaggedText::clean),
            "after": self.after.as_ref().map(TaggedText::clean),
            "instead_of": self.instead_of.as_ref().map(TaggedText::clean),
            "on": self.on.clean(),
            "function": self.function.as_ref().map(TaggedText::clean).unwrap_or_default(),
            "procedure": self.procedure.as_ref().map(TaggedText::clean).unwrap_or_default(),
            "dependencies": self.explicit_deps.union(&self.inferred_dependencies()).map(EntityRef::as_str).collect::<Vec<_>>(),
        })
    }

    pub fn from_dict(syntax: Syntax, data: &Value) -> Result<Self> {
        let opt_field = |key: &str| -> Option<TaggedText> {
            data.get(key).and_then(Value::as_str).map(|s| TaggedText::from_clean(syntax, s, BTreeSet::new()))
        };
        Ok(Self {
            entity_ref: EntityRef::new(dict_str(data, "ref")?),
            explicit_deps: dict_deps(data).into_iter().map(EntityRef::new).collect(),
            name: dict_str(data, "name")?,
            before: opt_field("before"),
            after: opt_field("after"),
            instead_of: opt_field("instead_of"),
            on: TaggedText::from_clean(syntax, dict_str(data, "on")?, BTreeSet::new()),
            function: opt_field("function").filter(|t| !t.clean().is_empty()),
            procedure: opt_field("procedure").filter(|t| !t.clean().is_empty()),
        })
    }
}

impl fmt::Display for TriggerEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entity_ref)
    }
}

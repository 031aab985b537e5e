//! The entity graph: a tagged union of the five kinds of schema object this
//! crate knows how to plan migrations for, plus the bookkeeping types
//! (`EntityRef`, `EntityKind`, `Bundle`) shared by all of them.
//!
//! Each variant module (`schema`, `table`, `index`, `function`, `trigger`)
//! owns its own struct and `create` constructor; this module owns the
//! dispatch surface (`Entity`) that the registry, manager and comparators
//! actually operate on.

mod function;
mod index;
mod schema;
mod table;
mod trigger;

pub use function::FunctionEntity;
pub use index::IndexEntity;
pub use schema::SchemaEntity;
pub use table::{ColumnEntity, TableEntity};
pub use trigger::TriggerEntity;

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::syntax::Syntax;

/// The narrow view of a `Manager` that variant constructors need: the active
/// sentinel syntax, the current schema scope and the current dependency set
/// established by `after(...)`. Kept separate from `Manager` itself so that
/// `entity` never depends on `manager` — only the reverse.
pub trait BuildContext {
    fn syntax(&self) -> Syntax;
    fn schema_ref(&self) -> Option<&EntityRef>;
    fn dependency_refs(&self) -> &BTreeSet<EntityRef>;
}

/// The five entity kinds, used as the first segment of every ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Schema,
    Table,
    Column,
    Index,
    Function,
    Trigger,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Schema => "Schema",
            EntityKind::Table => "Table",
            EntityKind::Column => "Column",
            EntityKind::Index => "Index",
            EntityKind::Function => "Function",
            EntityKind::Trigger => "Trigger",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content-addressed, deterministic identifier for an entity:
/// `[<schema-ref>|]<Kind>:<name>[.<disambiguator>]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct EntityRef(String);

impl EntityRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for EntityRef {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Build a bare (non-schema-prefixed) ref: `<Kind>:<name>`.
fn bare_ref(kind: EntityKind, name: &str) -> String {
    format!("{}:{}", kind.as_str(), name)
}

/// Build a ref, prefixing it with the owning schema's ref when present.
pub(crate) fn make_ref(kind: EntityKind, name: &str, schema: Option<&EntityRef>) -> EntityRef {
    let bare = bare_ref(kind, name);
    match schema {
        Some(s) => EntityRef::new(format!("{}|{}", s.as_str(), bare)),
        None => EntityRef::new(bare),
    }
}

/// Build a column ref: `<table-ref>|Column:<name>`.
pub(crate) fn make_column_ref(table_ref: &EntityRef, name: &str) -> EntityRef {
    EntityRef::new(format!("{}|{}", table_ref.as_str(), bare_ref(EntityKind::Column, name)))
}

/// The effective-dependency fallback shared by schema-dependent variants
/// (`Table`, `Function`): if explicit and inferred dependencies are both
/// empty, fall back to depending on the containing schema.
pub(crate) fn effective_with_schema_fallback(
    explicit: &BTreeSet<EntityRef>,
    inferred: &BTreeSet<EntityRef>,
    schema: Option<&EntityRef>,
) -> BTreeSet<EntityRef> {
    let union: BTreeSet<EntityRef> = explicit.union(inferred).cloned().collect();
    if union.is_empty() {
        if let Some(s) = schema {
            return std::iter::once(s.clone()).collect();
        }
    }
    union
}

/// One entity plus the child entities its construction also introduces
/// (today, only `Table` introduces children: its `Column`s). Registered
/// atomically by the manager: either every entity in the bundle lands in the
/// registry, or none of them do.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub main: Entity,
    pub children: Vec<Entity>,
}

impl Bundle {
    pub fn single(main: Entity) -> Self {
        Self { main, children: Vec::new() }
    }

    pub fn with_children(main: Entity, children: Vec<Entity>) -> Self {
        Self { main, children }
    }

    pub fn all(&self) -> impl Iterator<Item = &Entity> {
        std::iter::once(&self.main).chain(self.children.iter())
    }
}

/// The tagged union of schema objects this crate can plan migrations for.
#[derive(Debug, Clone)]
pub enum Entity {
    Schema(SchemaEntity),
    Table(TableEntity),
    Column(ColumnEntity),
    Index(IndexEntity),
    Function(FunctionEntity),
    Trigger(TriggerEntity),
}

impl Entity {
    pub fn entity_ref(&self) -> &EntityRef {
        match self {
            Entity::Schema(e) => &e.entity_ref,
            Entity::Table(e) => &e.entity_ref,
            Entity::Column(e) => &e.entity_ref,
            Entity::Index(e) => &e.entity_ref,
            Entity::Function(e) => &e.entity_ref,
            Entity::Trigger(e) => &e.entity_ref,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Schema(_) => EntityKind::Schema,
            Entity::Table(_) => EntityKind::Table,
            Entity::Column(_) => EntityKind::Column,
            Entity::Index(_) => EntityKind::Index,
            Entity::Function(_) => EntityKind::Function,
            Entity::Trigger(_) => EntityKind::Trigger,
        }
    }

    pub fn explicit_dependencies(&self) -> BTreeSet<EntityRef> {
        match self {
            Entity::Schema(_) => BTreeSet::new(),
            Entity::Table(e) => e.explicit_deps.clone(),
            Entity::Column(e) => e.explicit_dependencies(),
            Entity::Index(e) => e.explicit_deps.clone(),
            Entity::Function(e) => e.explicit_deps.clone(),
            Entity::Trigger(e) => e.explicit_deps.clone(),
        }
    }

    pub fn inferred_dependencies(&self) -> BTreeSet<EntityRef> {
        match self {
            Entity::Schema(_) => BTreeSet::new(),
            Entity::Table(e) => e.inferred_dependencies(),
            Entity::Column(e) => e.inferred_dependencies(),
            Entity::Index(e) => e.inferred_dependencies(),
            Entity::Function(e) => e.inferred_dependencies(),
            Entity::Trigger(e) => e.inferred_dependencies(),
        }
    }

    /// Union of explicit and inferred dependencies, with the schema fallback
    /// applied for `Table` and `Function` (`§3`).
    pub fn effective_dependencies(&self) -> BTreeSet<EntityRef> {
        match self {
            Entity::Schema(_) => BTreeSet::new(),
            Entity::Table(e) => {
                effective_with_schema_fallback(&e.explicit_deps, &e.inferred_dependencies(), e.schema.as_ref())
            }
            Entity::Column(e) => e.effective_dependencies(),
            Entity::Index(e) => e.explicit_deps.union(&e.inferred_dependencies()).cloned().collect(),
            Entity::Function(e) => {
                effective_with_schema_fallback(&e.explicit_deps, &e.inferred_dependencies(), e.schema.as_ref())
            }
            Entity::Trigger(e) => e.explicit_deps.union(&e.inferred_dependencies()).cloned().collect(),
        }
    }

    /// Whether this entity is exported/imported as a standalone dict
    /// (`§6`). Columns are not: they travel as part of their owning
    /// `Table`'s dict.
    pub fn manage_export(&self) -> bool {
        !matches!(self, Entity::Column(_))
    }

    pub fn to_dict(&self) -> Value {
        match self {
            Entity::Schema(e) => e.to_dict(),
            Entity::Table(e) => e.to_dict(),
            Entity::Column(e) => e.to_dict(),
            Entity::Index(e) => e.to_dict(),
            Entity::Function(e) => e.to_dict(),
            Entity::Trigger(e) => e.to_dict(),
        }
    }

    /// Reconstruct an entity (and, for a `Table`, its `Column` children) from
    /// a previously-exported dict, as a [`Bundle`] ready for
    /// `Registry::register_bundle`. `syntax` is used only to attach to
    /// reconstructed `TaggedText` fields for any future re-rendering; the
    /// dict's `dependencies` list is trusted directly rather than
    /// re-inferred (`§3`).
    pub fn from_dict(syntax: Syntax, data: &Value) -> Result<Bundle> {
        let type_tag = data
            .get("__type__")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Construction("dict missing __type__".to_string()))?;

        Ok(match type_tag {
            "Schema" => Bundle::single(Entity::Schema(SchemaEntity::from_dict(data)?)),
            "Table" => {
                let (table, columns) = TableEntity::from_dict(syntax, data)?;
                Bundle::with_children(Entity::Table(table), columns.into_iter().map(Entity::Column).collect())
            }
            "Column" => Bundle::single(Entity::Column(ColumnEntity::from_dict(syntax, data)?)),
            "Index" => Bundle::single(Entity::Index(IndexEntity::from_dict(syntax, data)?)),
            "Function" => Bundle::single(Entity::Function(FunctionEntity::from_dict(syntax, data)?)),
            "Trigger" => Bundle::single(Entity::Trigger(TriggerEntity::from_dict(syntax, data)?)),
            other => return Err(Error::Construction(format!("unknown __type__: {other}"))),
        })
    }
}

pub(crate) fn dict_deps(data: &Value) -> BTreeSet<String> {
    data.get("dependencies")
        .and_then(Value::as_array)
        .map(|vals| vals.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

pub(crate) fn dict_str(data: &Value, key: &str) -> Result<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Construction(format!("dict missing field {key:?}")))
}

pub(crate) fn dict_ref(data: &Value, key: &str) -> Result<EntityRef> {
    dict_str(data, key).map(EntityRef::new)
}

pub(crate) fn dict_ref_opt(data: &Value, key: &str) -> Option<EntityRef> {
    data.get(key).and_then(Value::as_str).map(EntityRef::new)
}

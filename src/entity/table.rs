use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use serde_json::{json, Value};

use super::{
    dict_deps, dict_ref, dict_ref_opt, dict_str, effective_with_schema_fallback, make_column_ref, make_ref, Bundle,
    BuildContext, Entity, EntityKind, EntityRef,
};
use crate::error::Result;
use crate::syntax::{Syntax, TaggedText};

/// A single column of a `Table`. Registered as its own entity so that a
/// column's own comparator (`§4.5`) decides its `ALTER`, rather than the
/// owning table's comparator inspecting a column list.
///
/// Never exported standalone (`Entity::manage_export` is `false` for
/// `Column`): it travels inside its owning table's dict (`§6`).
#[derive(Debug, Clone)]
pub struct ColumnEntity {
    pub entity_ref: EntityRef,
    pub table_ref: EntityRef,
    pub name: String,
    pub definition: TaggedText,
    identifier: TaggedText,
}

impl ColumnEntity {
    fn create(syntax: Syntax, table_ref: &EntityRef, name: &str, definition: &str) -> Self {
        let entity_ref = make_column_ref(table_ref, name);
        let identifier = TaggedText::identifier(syntax, &[name], vec![entity_ref.as_str().to_string()]);
        Self {
            entity_ref,
            table_ref: table_ref.clone(),
            name: name.to_string(),
            definition: TaggedText::parse(syntax, definition),
            identifier,
        }
    }

    /// The tagged identifier text, for interpolating this column into
    /// another entity's SQL fragment (e.g. a foreign key reference).
    pub fn tag(&self) -> String {
        self.identifier.format_with_refs()
    }

    pub fn explicit_dependencies(&self) -> BTreeSet<EntityRef> {
        std::iter::once(self.table_ref.clone()).collect()
    }

    pub fn inferred_dependencies(&self) -> BTreeSet<EntityRef> {
        self.definition.refs().iter().cloned().map(EntityRef::new).collect()
    }

    pub fn effective_dependencies(&self) -> BTreeSet<EntityRef> {
        let mut deps = self.explicit_dependencies();
        deps.extend(self.inferred_dependencies());
        deps
    }

    pub fn to_dict(&self) -> Value {
        json!({
            "__type__": "Column",
            "ref": self.entity_ref.as_str(),
            "table_ref": self.table_ref.as_str(),
            "name": self.name,
            "definition": self.definition.clean(),
            "dependencies": self.effective_dependencies().iter().map(EntityRef::as_str).collect::<Vec<_>>(),
        })
    }

    pub fn from_dict(syntax: Syntax, data: &Value) -> Result<Self> {
        let entity_ref = EntityRef::new(dict_str(data, "ref")?);
        let name = dict_str(data, "name")?;
        let identifier = TaggedText::identifier(syntax, &[&name], vec![entity_ref.as_str().to_string()]);
        Ok(Self {
            entity_ref,
            table_ref: dict_ref(data, "table_ref")?,
            name,
            definition: TaggedText::from_clean(syntax, dict_str(data, "definition")?, dict_deps(data)),
            identifier,
        })
    }
}

impl fmt::Display for ColumnEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A table, identified within its (optional) owning schema. The columns are
/// registered as independent `Column` entities; `TableEntity` itself keeps
/// only their refs (in declared order) and the definition text of any
/// table-level constraint (`.additional(...)`, e.g. a composite primary key).
#[derive(Debug, Clone)]
pub struct TableEntity {
    pub entity_ref: EntityRef,
    pub schema: Option<EntityRef>,
    pub explicit_deps: BTreeSet<EntityRef>,
    pub name: String,
    pub columns: IndexMap<String, EntityRef>,
    pub additional: Vec<TaggedText>,
    /// Cached dicts of the columns above, kept alongside the refs so
    /// `to_dict` can embed full column definitions without a registry
    /// round-trip; refreshed whenever this table is rebuilt via `create` or
    /// `from_dict`.
    column_dicts: Vec<Value>,
    identifier: TaggedText,
}

impl TableEntity {
    /// `columns` is an ordered list of `(name, raw definition text)`, in
    /// declared order — the order columns would appear in a `CREATE TABLE`.
    /// `additional` holds raw table-level constraint expressions
    /// (composite primary/unique keys and the like) that don't belong to any
    /// single column.
    pub fn create(
        ctx: &impl BuildContext,
        name: &str,
        columns: impl IntoIterator<Item = (String, String)>,
        additional: impl IntoIterator<Item = String>,
    ) -> Bundle {
        let syntax = ctx.syntax();
        let schema = ctx.schema_ref().cloned();
        let entity_ref = make_ref(EntityKind::Table, name, schema.as_ref());
        let identifier = TaggedText::identifier(syntax, &[name], vec![entity_ref.as_str().to_string()]);

        let mut column_entities = Vec::new();
        let mut column_refs = IndexMap::new();
        let mut column_dicts = Vec::new();
        for (col_name, definition) in columns {
            let column = ColumnEntity::create(syntax, &entity_ref, &col_name, &definition);
            column_refs.insert(col_name, column.entity_ref.clone());
            column_dicts.push(column.to_dict());
            column_entities.push(Entity::Column(column));
        }

        let additional: Vec<TaggedText> =
            additional.into_iter().map(|expr| TaggedText::parse(syntax, expr)).collect();

        let table = Self {
            entity_ref,
            schema,
            explicit_deps: ctx.dependency_refs().clone(),
            name: name.to_string(),
            columns: column_refs,
            additional,
            column_dicts,
            identifier,
        };

        Bundle::with_children(Entity::Table(table), column_entities)
    }

    pub fn inferred_dependencies(&self) -> BTreeSet<EntityRef> {
        self.additional.iter().flat_map(|t| t.refs().iter().cloned().map(EntityRef::new)).collect()
    }

    pub fn column_ref(&self, name: &str) -> Option<&EntityRef> {
        self.columns.get(name)
    }

    pub fn tag(&self) -> String {
        self.identifier.format_with_refs()
    }

    pub fn to_dict(&self) -> Value {
        let explicit_and_schema =
            effective_with_schema_fallback(&self.explicit_deps, &self.inferred_dependencies(), self.schema.as_ref());
        json!({
            "__type__": "Table",
            "ref": self.entity_ref.as_str(),
            "schema": self.schema.as_ref().map(EntityRef::as_str),
            "name": self.name,
            // Full column dicts are embedded here rather than just names:
            // `Column` is never exported standalone (`manage_export` is
            // `false` for it), so this is the only place its definition
            // survives a round trip.
            "columns": self.column_dicts.clone(),
            "additional": self.additional.iter().map(TaggedText::clean).collect::<Vec<_>>(),
            "dependencies": explicit_and_schema.iter().map(EntityRef::as_str).collect::<Vec<_>>(),
        })
    }

    /// Reconstruct a table and its columns from a previously exported dict.
    /// Returns the table paired with its reconstructed `Column` entities, in
    /// declared order, since a `Table` dict is the only place that
    /// information survives (`§6`).
    pub fn from_dict(syntax: Syntax, data: &Value) -> Result<(Self, Vec<ColumnEntity>)> {
        let entity_ref = EntityRef::new(dict_str(data, "ref")?);
        let schema = dict_ref_opt(data, "schema");
        let name = dict_str(data, "name")?;

        let column_dicts: Vec<Value> = data.get("columns").and_then(Value::as_array).cloned().unwrap_or_default();
        let mut columns = IndexMap::new();
        let mut column_entities = Vec::new();
        for column_dict in &column_dicts {
            let column = ColumnEntity::from_dict(syntax, column_dict)?;
            columns.insert(column.name.clone(), column.entity_ref.clone());
            column_entities.push(column);
        }

        let additional = data
            .get("additional")
            .and_then(Value::as_array)
            .map(|vs| {
                vs.iter()
                    .filter_map(Value::as_str)
                    .map(|s| TaggedText::from_clean(syntax, s, BTreeSet::new()))
                    .collect()
            })
            .unwrap_or_default();
        let identifier = TaggedText::identifier(syntax, &[&name], vec![entity_ref.as_str().to_string()]);
        let table = Self {
            entity_ref,
            schema,
            explicit_deps: dict_deps(data).into_iter().map(EntityRef::new).collect(),
            name,
            columns,
            column_dicts,
            additional,
            identifier,
        };
        Ok((table, column_entities))
    }
}

impl fmt::Display for TableEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Manager;

    #[test]
    fn column_ref_is_nested_under_table_ref() {
        let root = Manager::create_root(Syntax::default());
        let public = root.schema("public").unwrap();
        let scoped = root.with_schema(&public);
        let user = scoped
            .table("user", [("id".to_string(), "bigint primary key".to_string())], [])
            .unwrap();
        let id_ref = user.column_ref("id").unwrap();
        assert_eq!(id_ref.as_str(), "Schema:public|Table:user|Column:id");
    }

    #[test]
    fn column_definitions_infer_dependencies() {
        let root = Manager::create_root(Syntax::default());
        let public = root.schema("public").unwrap();
        let scoped = root.with_schema(&public);
        let user = scoped
            .table("user", [("id".to_string(), "bigint primary key".to_string())], [])
            .unwrap();
        let id_ref = user.column_ref("id").unwrap().clone();
        let Entity::Column(id) = scoped.get(&id_ref).unwrap() else { unreachable!() };

        let post = scoped
            .table("post", [("author_id".to_string(), format!("bigint references {}", id.tag()))], [])
            .unwrap();
        let author_id_ref = post.column_ref("author_id").unwrap().clone();
        let Entity::Column(author_id) = scoped.get(&author_id_ref).unwrap() else { unreachable!() };
        assert!(author_id.effective_dependencies().contains(&id_ref));
    }
}

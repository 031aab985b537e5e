//! Per-variant comparators: pure functions from an optional old entity and
//! its new replacement to a [`MutationKind`]. These implement the
//! field-by-field rules of `§4.5` rather than the degenerate
//! "always-UNCHANGED" shortcuts the comparators this crate's Python
//! ancestor collapsed to during a later refactor.

use crate::entity::{ColumnEntity, Entity, FunctionEntity, IndexEntity, SchemaEntity, TableEntity, TriggerEntity};

/// What a planner needs to do with an entity to turn the old state into the
/// new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Absent on the old side: emit a `CREATE`.
    Create,
    /// No observable difference: emit nothing.
    Unchanged,
    /// In place modifiable: emit an `ALTER`.
    Alter,
    /// Not modifiable in place: must be dropped and recreated.
    Recreate,
}

/// Compare an entity's old and new definitions. `old` is `None` when the
/// entity has no counterpart in the old registry (a brand new ref).
pub fn compare(old: Option<&Entity>, new: &Entity) -> MutationKind {
    match (old, new) {
        (None, _) => MutationKind::Create,
        (Some(Entity::Schema(o)), Entity::Schema(n)) => compare_schema(o, n),
        (Some(Entity::Table(o)), Entity::Table(n)) => compare_table(o, n),
        (Some(Entity::Column(o)), Entity::Column(n)) => compare_column(o, n),
        (Some(Entity::Index(o)), Entity::Index(n)) => compare_index(o, n),
        (Some(Entity::Function(o)), Entity::Function(n)) => compare_function(o, n),
        (Some(Entity::Trigger(o)), Entity::Trigger(n)) => compare_trigger(o, n),
        (Some(old), new) => {
            // Ref stability (`§3`) guarantees the same ref always names the
            // same kind; a mismatch here means a caller built two
            // registries with a ref reused across kinds.
            tracing::warn!(ref = %new.entity_ref(), old_kind = %old.kind(), new_kind = %new.kind(), "entity kind changed under a stable ref");
            MutationKind::Recreate
        }
    }
}

fn compare_schema(old: &SchemaEntity, new: &SchemaEntity) -> MutationKind {
    if old.name != new.name {
        MutationKind::Alter
    } else {
        MutationKind::Unchanged
    }
}

/// Column set changes surface entirely through each `Column`'s own
/// comparator; a table's own comparator only ever looks at non-column-list
/// changes — its name and its table-level constraint expressions (`§9`,
/// Column ALTER open question).
fn compare_table(old: &TableEntity, new: &TableEntity) -> MutationKind {
    if old.name != new.name || old.additional != new.additional {
        MutationKind::Alter
    } else {
        MutationKind::Unchanged
    }
}

fn compare_column(old: &ColumnEntity, new: &ColumnEntity) -> MutationKind {
    if old.name != new.name || old.definition != new.definition {
        MutationKind::Alter
    } else {
        MutationKind::Unchanged
    }
}

/// An index's shape isn't modifiable in place: any change to what it's on,
/// its access method, or its expressions forces a drop and recreate.
fn compare_index(old: &IndexEntity, new: &IndexEntity) -> MutationKind {
    if old.on != new.on || old.using != new.using || old.expressions != new.expressions {
        MutationKind::Recreate
    } else {
        MutationKind::Unchanged
    }
}

/// Besides its own declared fields, a function's inferred dependency refs
/// are compared directly: under the hash-disambiguated ref scheme (`§3`), a
/// callee whose signature changed gets a brand new ref with unchanged clean
/// text (a call site still reads `callee()`), so a plain field comparison
/// would miss the rebind entirely.
fn compare_function(old: &FunctionEntity, new: &FunctionEntity) -> MutationKind {
    if old.args != new.args
        || old.returns != new.returns
        || old.language != new.language
        || old.body != new.body
        || old.inferred_dependencies() != new.inferred_dependencies()
    {
        MutationKind::Alter
    } else {
        MutationKind::Unchanged
    }
}

/// A trigger's definition isn't modifiable in place: any change forces a
/// drop and recreate. This includes a change to its inferred dependency
/// refs alone: a `function`/`procedure` call naming a different ref (e.g.
/// the callee's signature — and so its hash-disambiguated ref — changed)
/// doesn't move the trigger's clean text, so it wouldn't otherwise be
/// noticed here, but the trigger still has to be dropped and rebuilt
/// pointing at the new ref.
fn compare_trigger(old: &TriggerEntity, new: &TriggerEntity) -> MutationKind {
    if old.before != new.before
        || old.after != new.after
        || old.instead_of != new.instead_of
        || old.on != new.on
        || old.function != new.function
        || old.procedure != new.procedure
        || old.inferred_dependencies() != new.inferred_dependencies()
    {
        MutationKind::Recreate
    } else {
        MutationKind::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Manager;
    use crate::syntax::Syntax;

    #[test]
    fn new_entity_is_create() {
        let ctx = Manager::create_root(Syntax::default());
        let bundle = SchemaEntity::create(&ctx, "public");
        assert_eq!(compare(None, &bundle.main), MutationKind::Create);
    }

    #[test]
    fn renaming_a_schema_is_alter() {
        let ctx = Manager::create_root(Syntax::default());
        let old = match SchemaEntity::create(&ctx, "public").main {
            Entity::Schema(s) => s,
            _ => unreachable!(),
        };
        let new = match SchemaEntity::create(&ctx, "app").main {
            Entity::Schema(s) => s,
            _ => unreachable!(),
        };
        assert_eq!(
            compare(Some(&Entity::Schema(old)), &Entity::Schema(new)),
            MutationKind::Alter
        );
    }

    #[test]
    fn unchanged_index_stays_unchanged() {
        let ctx = Manager::create_root(Syntax::default());
        let old = match IndexEntity::create(&ctx, "idx", "user", "btree", ["email".to_string()]).main {
            Entity::Index(i) => i,
            _ => unreachable!(),
        };
        let new = match IndexEntity::create(&ctx, "idx", "user", "btree", ["email".to_string()]).main {
            Entity::Index(i) => i,
            _ => unreachable!(),
        };
        assert_eq!(
            compare(Some(&Entity::Index(old)), &Entity::Index(new)),
            MutationKind::Unchanged
        );
    }

    #[test]
    fn changed_index_using_forces_recreate() {
        let ctx = Manager::create_root(Syntax::default());
        let old = match IndexEntity::create(&ctx, "idx", "user", "btree", ["email".to_string()]).main {
            Entity::Index(i) => i,
            _ => unreachable!(),
        };
        let new = match IndexEntity::create(&ctx, "idx", "user", "hash", ["email".to_string()]).main {
            Entity::Index(i) => i,
            _ => unreachable!(),
        };
        assert_eq!(
            compare(Some(&Entity::Index(old)), &Entity::Index(new)),
            MutationKind::Recreate
        );
    }

    #[test]
    fn adding_a_table_level_constraint_is_alter() {
        let root = Manager::create_root(Syntax::default());
        let public = root.schema("public").unwrap();
        let scoped = root.with_schema(&public);
        let old = scoped
            .table("pair", [("a".to_string(), "bigint".to_string()), ("b".to_string(), "bigint".to_string())], [])
            .unwrap();
        let new = match TableEntity::create(
            &scoped,
            "pair",
            [("a".to_string(), "bigint".to_string()), ("b".to_string(), "bigint".to_string())],
            ["primary key (a, b)".to_string()],
        )
        .main
        {
            Entity::Table(t) => t,
            _ => unreachable!(),
        };
        assert_eq!(compare(Some(&Entity::Table(old)), &Entity::Table(new)), MutationKind::Alter);
    }

    /// A callee's signature change gives it a new, hash-disambiguated ref
    /// (`§3`) without moving a caller's *clean* text at all — the trigger's
    /// own comparator must still notice via the dependency ref set, not the
    /// field text, or Scenario 3 (`§8`) never propagates.
    #[test]
    fn trigger_recreates_when_only_its_function_dependency_ref_changes() {
        let root = Manager::create_root(Syntax::default());
        let public = root.schema("public").unwrap();
        let scoped = root.with_schema(&public);
        let user = scoped.table("user", [("id".to_string(), "bigint primary key".to_string())], []).unwrap();

        let old_fn = scoped
            .function("handle", [("a".to_string(), "bigint".to_string())], "trigger", "plpgsql", "begin end;")
            .unwrap();
        let new_fn = scoped
            .function(
                "handle",
                [("a".to_string(), "bigint".to_string()), ("b".to_string(), "text".to_string())],
                "trigger",
                "plpgsql",
                "begin end;",
            )
            .unwrap();
        assert_ne!(old_fn.entity_ref, new_fn.entity_ref);

        let old_trigger = match TriggerEntity::create(
            &scoped,
            "trg",
            None,
            Some("insert"),
            None,
            &user.tag(),
            Some(&format!("{}()", old_fn.tag())),
            None,
        )
        .unwrap()
        .main
        {
            Entity::Trigger(t) => t,
            _ => unreachable!(),
        };
        let new_trigger = match TriggerEntity::create(
            &scoped,
            "trg",
            None,
            Some("insert"),
            None,
            &user.tag(),
            Some(&format!("{}()", new_fn.tag())),
            None,
        )
        .unwrap()
        .main
        {
            Entity::Trigger(t) => t,
            _ => unreachable!(),
        };

        // Clean text is identical on both sides; only the tagged ref differs.
        assert_eq!(old_trigger.function, new_trigger.function);
        assert_eq!(
            compare(Some(&Entity::Trigger(old_trigger)), &Entity::Trigger(new_trigger)),
            MutationKind::Recreate
        );
    }
}

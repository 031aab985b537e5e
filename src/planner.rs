//! The migration planner: diffs an old registry against a new one and
//! produces an ordered list of `CREATE`/`ALTER`/`DROP` operations (`§4.6`).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::comparator::{compare, MutationKind};
use crate::entity::EntityRef;
use crate::error::Result;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Create,
    Alter,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub op: OpKind,
    pub entity_ref: EntityRef,
}

/// Compute the ordered operation plan that turns `old` into `new`.
///
/// Proceeds in five passes, in the order `§4.6` describes:
///
/// 1. Classify each new-side entity's intrinsic mutation by comparing it
///    against its old-side counterpart (or `CREATE` if it has none).
/// 2. Propagate forced `RECREATE` along dependency edges: an entity whose
///    own fields are unchanged still has to be recreated if anything it
///    depends on is being recreated.
/// 3. Emit `DROP`s for every recreated new-side entity, in reverse
///    new-topological order (dependants dropped before their dependencies).
/// 4. Walk the new topological order forward. For every entity that also
///    existed on the old side, chain-drop any of its old-side dependants
///    that have no home on the new side and whose own dependants have all
///    already been dropped; then emit the entity's own `CREATE`/`ALTER`
///    (nothing for `UNCHANGED`, a lone `CREATE` for a forced `RECREATE`
///    since its paired `DROP` already went out in step 3).
/// 5. Sweep whatever is left standing on the old side with no new-side
///    counterpart and drop it, in reverse old-topological order.
pub fn plan(old: &Registry, new: &Registry) -> Result<Vec<Operation>> {
    let new_topo = new.iter_topological()?;

    let mut intrinsic: BTreeMap<EntityRef, MutationKind> = BTreeMap::new();
    for entity in &new_topo {
        let old_entity = old.get_entity(entity.entity_ref());
        intrinsic.insert(entity.entity_ref().clone(), compare(old_entity, entity));
    }

    let mut final_kind: BTreeMap<EntityRef, MutationKind> = BTreeMap::new();
    for entity in &new_topo {
        let r = entity.entity_ref();
        let forced_recreate = entity
            .effective_dependencies()
            .iter()
            .any(|d| matches!(final_kind.get(d), Some(MutationKind::Recreate)));
        let own = intrinsic[r];
        let resolved = if forced_recreate && matches!(own, MutationKind::Unchanged | MutationKind::Alter) {
            MutationKind::Recreate
        } else {
            own
        };
        final_kind.insert(r.clone(), resolved);
    }

    let mut ops = Vec::new();
    let mut dropped: BTreeSet<EntityRef> = BTreeSet::new();

    // Step 3: drop every recreated new-side entity, dependants-first.
    for entity in new_topo.iter().rev() {
        let r = entity.entity_ref();
        if final_kind[r] == MutationKind::Recreate {
            tracing::debug!(ref = %r, "planning recreate drop");
            ops.push(Operation { op: OpKind::Drop, entity_ref: r.clone() });
            dropped.insert(r.clone());
        }
    }

    // Step 4: forward walk, chain-dropping stale old-side dependants, then
    // emitting each entity's own operation.
    for entity in &new_topo {
        let r = entity.entity_ref();

        if old.contains(r) {
            for (_, child) in old.iter_branches(r) {
                if dropped.contains(&child) || new.contains(&child) {
                    continue;
                }
                let child_dependants = old.dependants_of(&child);
                if child_dependants.iter().all(|d| dropped.contains(d)) {
                    tracing::debug!(ref = %child, "chain-dropping stale dependant");
                    ops.push(Operation { op: OpKind::Drop, entity_ref: child.clone() });
                    dropped.insert(child.clone());
                }
            }
        }

        match final_kind[r] {
            MutationKind::Create | MutationKind::Recreate => {
                ops.push(Operation { op: OpKind::Create, entity_ref: r.clone() });
            }
            MutationKind::Alter => {
                ops.push(Operation { op: OpKind::Alter, entity_ref: r.clone() });
            }
            MutationKind::Unchanged => {}
        }
    }

    // Step 5: sweep old-only entities with no new-side counterpart.
    let old_topo = old.iter_topological()?;
    for entity in old_topo.iter().rev() {
        let r = entity.entity_ref();
        if !new.contains(r) && !dropped.contains(r) {
            tracing::debug!(ref = %r, "planning standalone drop");
            ops.push(Operation { op: OpKind::Drop, entity_ref: r.clone() });
            dropped.insert(r.clone());
        }
    }

    Ok(ops)
}

//! Turns two inventories into an ordered, validated plan
//!
//! Both sides are keyed by their slash-separated relative path. A path
//! only on the local side becomes an upload, a path only on the remote side
//! becomes a delete (when requested), and a shared path is handed to the
//! [`Comparator`] once to pick between upload and skip.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::compare::Comparator;
use crate::error::{Result, SyncError};
use crate::types::{
    remote_key, LocalFile, Operation, OperationKind, OperationStats, RemoteObject,
};

pub const REASON_NEW: &str = "new file";
pub const REASON_MODIFIED: &str = "modified";
pub const REASON_EXTRA: &str = "extra remote file";
pub const REASON_UNCHANGED: &str = "unchanged";

/// Builds plans using a comparator for shared paths
#[derive(Clone)]
pub struct Planner {
    comparator: Arc<dyn Comparator>,
}

impl Planner {
    pub fn new(comparator: Arc<dyn Comparator>) -> Self {
        Self { comparator }
    }

    /// Compute the operations that make `prefix` mirror `local_root`.
    ///
    /// Comparator failures abort planning. The result is sorted but not
    /// validated; see [`validate_plan`].
    pub fn plan(
        &self,
        local_root: &Path,
        locals: &[LocalFile],
        remotes: &[RemoteObject],
        prefix: &str,
        delete_extra: bool,
    ) -> Result<Vec<Operation>> {
        let local_map = local_inventory(local_root, locals);
        let remote_map = remote_inventory(prefix, remotes);

        let mut operations = Vec::with_capacity(local_map.len() + remote_map.len());
        let mut unchanged: Vec<(&LocalFile, &RemoteObject)> = Vec::new();

        for (rel, local) in &local_map {
            match remote_map.get(rel) {
                None => operations.push(Operation::upload(
                    &local.path,
                    remote_key(prefix, rel),
                    local.size,
                    REASON_NEW,
                )),
                Some(remote) => {
                    let changed = self
                        .comparator
                        .has_changed(local, remote)
                        .map_err(|e| comparison_error(rel, e))?;
                    if changed {
                        operations.push(Operation::upload(
                            &local.path,
                            remote.key.clone(),
                            local.size,
                            REASON_MODIFIED,
                        ));
                    } else {
                        unchanged.push((local, remote));
                    }
                }
            }
        }

        if delete_extra {
            for (rel, remote) in &remote_map {
                if !local_map.contains_key(rel) {
                    operations.push(Operation::delete(
                        remote.key.clone(),
                        remote.size,
                        REASON_EXTRA,
                    ));
                }
            }
        }

        for (local, remote) in unchanged {
            operations.push(Operation::skip(
                &local.path,
                remote.key.clone(),
                local.size,
                REASON_UNCHANGED,
            ));
        }

        sort_operations(&mut operations);

        let stats = OperationStats::from_operations(&operations);
        tracing::info!(
            "Planned {} upload(s) ({} bytes), {} delete(s), {} skip(s) using {} comparator",
            stats.uploads.count,
            stats.uploads.bytes,
            stats.deletes.count,
            stats.skips.count,
            self.comparator.name()
        );

        Ok(operations)
    }
}

fn comparison_error(rel: &str, err: SyncError) -> SyncError {
    match err {
        err @ SyncError::Comparison { .. } => err,
        other => SyncError::Comparison {
            path: rel.to_string(),
            message: other.to_string(),
        },
    }
}

fn local_inventory<'a>(root: &Path, locals: &'a [LocalFile]) -> BTreeMap<String, &'a LocalFile> {
    let mut map = BTreeMap::new();
    for local in locals {
        match local.relative_to(root) {
            Some(rel) => {
                map.insert(rel, local);
            }
            None => tracing::warn!(
                "Ignoring {}: not under {}",
                local.path.display(),
                root.display()
            ),
        }
    }
    map
}

/// Remote objects by relative path.
///
/// Keys such as `site/a.txt` and `site//a.txt` share a relative path. The
/// first one listed wins; later ones are left alone and never deleted.
fn remote_inventory<'a>(
    prefix: &str,
    remotes: &'a [RemoteObject],
) -> BTreeMap<String, &'a RemoteObject> {
    let mut map: BTreeMap<String, &'a RemoteObject> = BTreeMap::new();
    for remote in remotes {
        let Some(rel) = remote.relative_key(prefix) else {
            tracing::debug!("Ignoring {}: no path below prefix {:?}", remote.key, prefix);
            continue;
        };
        match map.entry(rel.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(remote);
            }
            Entry::Occupied(kept) => tracing::warn!(
                "Ignoring {}: maps to {:?} like {}",
                remote.key,
                kept.key(),
                kept.get().key
            ),
        }
    }
    map
}

/// Order by priority, then upload < delete < skip. Stable.
pub fn sort_operations(operations: &mut [Operation]) {
    operations.sort_by_key(|op| (op.priority, op.kind.order()));
}

/// Reject empty plans and plans that upload and delete the same key
pub fn validate_plan(operations: &[Operation]) -> Result<()> {
    if operations.is_empty() {
        return Err(SyncError::EmptyPlan);
    }

    let uploads: HashSet<&str> = operations
        .iter()
        .filter(|op| op.kind == OperationKind::Upload)
        .map(|op| op.remote_key.as_str())
        .collect();

    if let Some(conflict) = operations
        .iter()
        .find(|op| op.kind == OperationKind::Delete && uploads.contains(op.remote_key.as_str()))
    {
        return Err(SyncError::PlanConflict(conflict.remote_key.clone()));
    }

    Ok(())
}

/// Selection criteria for [`filter_operations`]
#[derive(Debug, Clone, Default)]
pub struct OperationFilter {
    /// Keep only these kinds (all kinds when `None`)
    pub kinds: Option<Vec<OperationKind>>,
    /// Inclusive lower size bound
    pub min_size: Option<u64>,
    /// Inclusive upper size bound
    pub max_size: Option<u64>,
}

impl OperationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(mut self, kinds: &[OperationKind]) -> Self {
        self.kinds = Some(kinds.to_vec());
        self
    }

    pub fn size_range(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_size = min;
        self.max_size = max;
        self
    }

    pub fn matches(&self, op: &Operation) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&op.kind) {
                return false;
            }
        }
        if self.min_size.is_some_and(|min| op.size < min) {
            return false;
        }
        if self.max_size.is_some_and(|max| op.size > max) {
            return false;
        }
        true
    }
}

/// Copy out the operations matching `filter`, preserving order
pub fn filter_operations(operations: &[Operation], filter: &OperationFilter) -> Vec<Operation> {
    operations
        .iter()
        .filter(|op| filter.matches(op))
        .cloned()
        .collect()
}

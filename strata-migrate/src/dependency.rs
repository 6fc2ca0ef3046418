//! Foreign-key dependency ordering of tables.
//!
//! A referenced table always precedes the tables that reference it. When
//! local and remote orders are merged, a table that is being renamed keeps
//! its new name right after its old one so operations addressing either
//! name sort consistently within one migration.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::rename::RenameContext;
use crate::snapshot::SchemaSnapshot;

/// Foreign-key edges as `(dependent, referenced)` pairs.
///
/// Self references and references to tables outside the snapshot are ignored.
pub fn foreign_key_edges(snapshot: &SchemaSnapshot) -> Vec<(String, String)> {
    let mut edges = BTreeSet::new();
    for table in snapshot.tables.values() {
        for referenced in table.referenced_tables() {
            if snapshot.tables.contains_key(referenced) {
                edges.insert((table.name.clone(), referenced.to_string()));
            }
        }
    }
    edges.into_iter().collect()
}

/// Topologically sort the snapshot's tables, referenced tables first.
///
/// Ties are broken by name. Tables caught in a reference cycle are appended
/// by name once every acyclic table has been placed.
pub fn topological_order(snapshot: &SchemaSnapshot) -> Vec<String> {
    let mut in_degree: BTreeMap<&str, usize> =
        snapshot.tables.keys().map(|name| (name.as_str(), 0)).collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    let edges = foreign_key_edges(snapshot);
    for (dependent, referenced) in &edges {
        if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
            *degree += 1;
        }
        dependents
            .entry(referenced.as_str())
            .or_default()
            .push(dependent.as_str());
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(in_degree.len());

    while let Some(name) = ready.pop_first() {
        order.push(name.to_string());
        for &dependent in dependents.get(name).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() < in_degree.len() {
        let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let cyclic: Vec<&str> = in_degree
            .keys()
            .copied()
            .filter(|name| !placed.contains(name))
            .collect();
        debug!(tables = ?cyclic, "foreign key cycle, appending tables by name");
        order.extend(cyclic.into_iter().map(String::from));
    }

    order
}

/// Merge remote and local dependency orders.
///
/// The union keeps first-seen order (remote first). For every table renamed
/// in `schema`, the new name is moved directly after the old name.
pub fn sort_table_dependencies(
    remote_order: &[String],
    local_order: &[String],
    renames: &RenameContext,
    schema: &str,
) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(remote_order.len() + local_order.len());
    for name in remote_order.iter().chain(local_order) {
        if !merged.contains(name) {
            merged.push(name.clone());
        }
    }

    for (from, to) in renames.table_pairs(schema) {
        let Some(from_pos) = merged.iter().position(|n| *n == from) else {
            continue;
        };
        if let Some(to_pos) = merged.iter().position(|n| *n == to) {
            merged.remove(to_pos);
        }
        let from_pos = merged.iter().position(|n| *n == from).unwrap_or(from_pos);
        merged.insert(from_pos + 1, to);
    }

    merged
}

/// Order in which `removed` tables of `remote` can be dropped: dependents first.
pub fn drop_order(remote: &SchemaSnapshot, removed: &[String]) -> Vec<String> {
    let mut order: Vec<String> = topological_order(remote)
        .into_iter()
        .filter(|name| removed.contains(name))
        .collect();
    order.reverse();
    order
}

/// Resolved table positions used when sorting changesets.
#[derive(Debug, Clone, Default)]
pub struct TableOrder {
    /// Merged dependency order of remote and local tables.
    pub order: Vec<String>,
    /// Drop order of removed tables.
    pub drops: Vec<String>,
}

impl TableOrder {
    /// Position of a table in the merged order.
    pub fn position(&self, table: &str) -> Option<usize> {
        self.order.iter().position(|t| t == table)
    }

    /// Position of a table in the drop order.
    pub fn drop_position(&self, table: &str) -> Option<usize> {
        self.drops.iter().position(|t| t == table)
    }
}

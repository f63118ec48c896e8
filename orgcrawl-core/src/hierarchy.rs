//! Rebuild the organisation tree from unit records.
//!
//! Every unit record contributes two edges: its superior unit hangs under the
//! tree root, and the unit itself hangs under its superior. Edges arrive in
//! arbitrary order, so the tree is grown outward from the root one layer per
//! round. A unit whose parent never joins the tree is reported as an orphan
//! instead of stalling the loop.

use orgcrawl_scanner::{UnitKind, UnitRecord};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

pub const TREE_HEADER: [&str; 3] = ["机构", "上级", "类型"];

/// A pending (child, parent, category) relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitEdge {
    pub child: String,
    pub parent: String,
    pub kind: UnitKind,
}

/// Derive the two edges of every record, in record order.
pub fn derive_edges(root: &str, records: &[UnitRecord]) -> Vec<UnitEdge> {
    let mut edges = Vec::with_capacity(records.len() * 2);
    for record in records {
        edges.push(UnitEdge {
            child: record.superior().to_string(),
            parent: root.to_string(),
            kind: record.kind(),
        });
        edges.push(UnitEdge {
            child: record.name().to_string(),
            parent: record.superior().to_string(),
            kind: record.kind(),
        });
    }
    edges
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRow {
    pub unit: String,
    pub parent: String,
    pub category: String,
}

/// Rooted unit hierarchy in breadth-first layer order. The first row is
/// always the root with an empty parent and category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTree {
    rows: Vec<TreeRow>,
}

impl UnitTree {
    pub fn new(root: &str) -> Self {
        Self {
            rows: vec![TreeRow {
                unit: root.to_string(),
                parent: String::new(),
                category: String::new(),
            }],
        }
    }

    pub fn root(&self) -> &str {
        &self.rows[0].unit
    }

    pub fn rows(&self) -> &[TreeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn parent_of(&self, unit: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.unit == unit)
            .map(|row| row.parent.as_str())
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.rows.iter().any(|row| row.unit == unit)
    }

    pub fn to_fields(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| vec![row.unit.clone(), row.parent.clone(), row.category.clone()])
            .collect()
    }

    fn push(&mut self, unit: &str, parent: &str, kind: UnitKind) {
        self.rows.push(TreeRow {
            unit: unit.to_string(),
            parent: parent.to_string(),
            category: kind.label().to_string(),
        });
    }
}

/// Units whose parent chain never reaches the root.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct OrphanEdgeError {
    pub orphans: Vec<UnitEdge>,
}

impl fmt::Display for OrphanEdgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unit(s) never reached the root:", self.orphans.len())?;
        for edge in &self.orphans {
            write!(f, " {} (parent '{}')", edge.child, edge.parent)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub tree: UnitTree,
    pub orphans: Vec<UnitEdge>,
    pub rounds: usize,
}

impl Resolution {
    pub fn into_result(self) -> Result<UnitTree, OrphanEdgeError> {
        if self.orphans.is_empty() {
            Ok(self.tree)
        } else {
            Err(OrphanEdgeError {
                orphans: self.orphans,
            })
        }
    }
}

pub struct HierarchyResolver {
    root: String,
}

impl HierarchyResolver {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Resolve builtin and sub-unit records into a tree.
    ///
    /// Sub-unit edges are registered first, so a builtin record overwrites a
    /// sub-unit record's edge for the same child. Within each set the last
    /// record wins.
    pub fn resolve(&self, builtin: &[UnitRecord], sub: &[UnitRecord]) -> Resolution {
        let mut edges = derive_edges(&self.root, sub);
        edges.extend(derive_edges(&self.root, builtin));
        self.resolve_edges(edges)
    }

    pub fn resolve_edges(&self, edges: Vec<UnitEdge>) -> Resolution {
        // Discovery order drives the scan order, which keeps output stable.
        let mut order: Vec<String> = Vec::new();
        let mut known: HashSet<String> = HashSet::new();
        known.insert(self.root.clone());
        let mut pending: HashMap<String, (String, UnitKind)> = HashMap::new();

        for edge in edges {
            for name in [&edge.child, &edge.parent] {
                if known.insert(name.clone()) {
                    order.push(name.clone());
                }
            }
            if edge.child == self.root || edge.child == edge.parent {
                debug!(child = %edge.child, parent = %edge.parent, "Ignoring self edge");
                continue;
            }
            pending.insert(edge.child, (edge.parent, edge.kind));
        }

        let mut tree = UnitTree::new(&self.root);
        let mut seen: HashSet<String> = HashSet::from([self.root.clone()]);
        let fuel = order.len() + 1;
        let mut rounds = 0;

        while !pending.is_empty() && rounds < fuel {
            rounds += 1;
            let mut layer: Vec<String> = Vec::new();

            for unit in &order {
                if let Some((parent, kind)) = pending.get(unit)
                    && seen.contains(parent)
                {
                    tree.push(unit, parent, *kind);
                    layer.push(unit.clone());
                }
            }

            if layer.is_empty() {
                break;
            }
            debug!(round = rounds, resolved = layer.len(), "Resolved tree layer");
            for unit in layer {
                pending.remove(&unit);
                seen.insert(unit);
            }
        }

        let orphans: Vec<UnitEdge> = order
            .iter()
            .filter_map(|unit| {
                pending.get(unit).map(|(parent, kind)| UnitEdge {
                    child: unit.clone(),
                    parent: parent.clone(),
                    kind: *kind,
                })
            })
            .collect();

        if !orphans.is_empty() {
            warn!(orphans = orphans.len(), "Some units never reached the tree root");
        }

        Resolution {
            tree,
            orphans,
            rounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "市政府";

    fn record(kind: UnitKind, name: &str, superior: &str) -> UnitRecord {
        let mut row = vec![name.to_string()];
        row.extend(std::iter::repeat_n("...".to_string(), 5));
        row.push(superior.to_string());
        UnitRecord::from_row(kind, row).unwrap()
    }

    fn edge(child: &str, parent: &str) -> UnitEdge {
        UnitEdge {
            child: child.to_string(),
            parent: parent.to_string(),
            kind: UnitKind::Builtin,
        }
    }

    fn row(unit: &str, parent: &str, category: &str) -> TreeRow {
        TreeRow {
            unit: unit.to_string(),
            parent: parent.to_string(),
            category: category.to_string(),
        }
    }

    #[test]
    fn test_end_to_end_example() {
        let builtin = vec![record(UnitKind::Builtin, "办公室", "市政府办公室")];
        let sub = vec![record(UnitKind::Subordinate, "某局", "市政府")];

        let resolution = HierarchyResolver::new(ROOT).resolve(&builtin, &sub);
        assert!(resolution.orphans.is_empty());

        let rows = resolution.tree.rows();
        assert_eq!(rows[0], row("市政府", "", ""));
        assert!(rows.contains(&row("市政府办公室", "市政府", "内设机构")));
        assert!(rows.contains(&row("办公室", "市政府办公室", "内设机构")));
        assert!(rows.contains(&row("某局", "市政府", "下属单位")));
        assert_eq!(rows.len(), 4);

        let pos = |unit: &str| rows.iter().position(|r| r.unit == unit).unwrap();
        assert!(pos("市政府办公室") < pos("办公室"));
    }

    #[test]
    fn test_two_edges_per_record() {
        let edges = derive_edges(ROOT, &[record(UnitKind::Subordinate, "某局", "某委")]);
        assert_eq!(edges.len(), 2);
        assert_eq!((edges[0].child.as_str(), edges[0].parent.as_str()), ("某委", ROOT));
        assert_eq!((edges[1].child.as_str(), edges[1].parent.as_str()), ("某局", "某委"));
    }

    #[test]
    fn test_parent_listed_after_child_still_resolves() {
        let edges = vec![edge("科室", "处"), edge("处", "局"), edge("局", ROOT)];
        let resolution = HierarchyResolver::new(ROOT).resolve_edges(edges);

        let units: Vec<&str> = resolution.tree.rows().iter().map(|r| r.unit.as_str()).collect();
        assert_eq!(units, vec![ROOT, "局", "处", "科室"]);
        assert_eq!(resolution.rounds, 3);
    }

    #[test]
    fn test_orphan_is_reported_without_hanging() {
        let edges = vec![edge("甲", ROOT), edge("X", "Y-missing")];
        // Y-missing is itself only ever a parent, never a child
        let resolution = HierarchyResolver::new(ROOT).resolve_edges(edges);

        assert!(resolution.tree.contains("甲"));
        assert!(!resolution.tree.contains("X"));
        assert_eq!(resolution.orphans, vec![edge("X", "Y-missing")]);

        let err = resolution.into_result().unwrap_err();
        assert!(err.to_string().contains("X (parent 'Y-missing')"));
    }

    #[test]
    fn test_cycle_detached_from_root_is_orphaned() {
        let edges = vec![edge("A", "B"), edge("B", "A"), edge("C", ROOT)];
        let resolution = HierarchyResolver::new(ROOT).resolve_edges(edges);

        let orphaned: Vec<&str> = resolution.orphans.iter().map(|e| e.child.as_str()).collect();
        assert_eq!(orphaned, vec!["A", "B"]);
        assert_eq!(resolution.tree.len(), 2);
    }

    #[test]
    fn test_last_record_wins_and_builtin_overrides_sub() {
        let sub = vec![
            record(UnitKind::Subordinate, "综合科", "旧局"),
            record(UnitKind::Subordinate, "综合科", "新局"),
        ];
        let resolution = HierarchyResolver::new(ROOT).resolve(&[], &sub);
        assert_eq!(resolution.tree.parent_of("综合科"), Some("新局"));

        let builtin = vec![record(UnitKind::Builtin, "综合科", "办公室")];
        let resolution = HierarchyResolver::new(ROOT).resolve(&builtin, &sub);
        assert_eq!(resolution.tree.parent_of("综合科"), Some("办公室"));
        let kept = resolution
            .tree
            .rows()
            .iter()
            .find(|r| r.unit == "综合科")
            .unwrap();
        assert_eq!(kept.category, "内设机构");
    }

    #[test]
    fn test_self_edges_never_duplicate_root() {
        let sub = vec![record(UnitKind::Subordinate, "市政府", "市政府")];
        let resolution = HierarchyResolver::new(ROOT).resolve(&[], &sub);
        assert_eq!(resolution.tree.len(), 1);
        assert!(!resolution.tree.is_empty());
        assert!(resolution.orphans.is_empty());
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let builtin = vec![
            record(UnitKind::Builtin, "一科", "办公室"),
            record(UnitKind::Builtin, "二科", "办公室"),
            record(UnitKind::Builtin, "秘书处", "一科"),
        ];
        let sub = vec![record(UnitKind::Subordinate, "中心", "某局")];
        let resolver = HierarchyResolver::new(ROOT);

        assert_eq!(resolver.resolve(&builtin, &sub), resolver.resolve(&builtin, &sub));
    }

    #[test]
    fn test_tree_invariants_on_generated_forest() {
        // A small deterministic forest with broken branches mixed in.
        let mut edges = Vec::new();
        for i in 0..40usize {
            let child = format!("u{}", i);
            let parent = match i % 7 {
                0 => ROOT.to_string(),
                6 => format!("ghost{}", i),
                _ => format!("u{}", (i * 5 + 3) % 40),
            };
            edges.push(edge(&child, &parent));
        }
        edges.reverse();

        let resolution = HierarchyResolver::new(ROOT).resolve_edges(edges);
        let rows = resolution.tree.rows();

        let mut units = HashSet::new();
        for (i, r) in rows.iter().enumerate() {
            assert!(units.insert(r.unit.as_str()), "duplicate unit {}", r.unit);
            if i > 0 {
                assert!(
                    rows[..i].iter().any(|earlier| earlier.unit == r.parent),
                    "{} placed before its parent {}",
                    r.unit,
                    r.parent
                );
            }
        }
        for orphan in &resolution.orphans {
            assert!(!units.contains(orphan.child.as_str()));
        }
        assert_eq!(rows.len() - 1 + resolution.orphans.len(), 40);
    }
}

//! Module dependency graph.
//!
//! Nodes live in an arena indexed by [`NodeId`]; edges are kept in discovery
//! order so two builds of the same tree produce the same graph.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;

use crate::classify::ModuleKind;
use crate::load::RawContent;
use crate::scan::ExportSurface;

/// Index of a module in the graph arena.
pub type NodeId = usize;

/// Canonical, root-relative module identity with forward slashes.
///
/// Two specifiers that reach the same file compare equal here, which is what
/// deduplicates the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleIdentity(String);

impl ModuleIdentity {
    /// Build an identity from a canonical absolute path and the project root.
    ///
    /// Paths outside the root keep their absolute form; everything is stored
    /// with forward slashes so identities serialize identically across
    /// platforms.
    #[must_use]
    pub fn from_paths(root: &Path, absolute: &Path) -> Self {
        let rel = absolute.strip_prefix(root).unwrap_or(absolute);
        Self(gantry_util::paths::normalize_slashes(rel))
    }

    /// Build an identity from an already root-relative string.
    #[must_use]
    pub fn from_rooted(rooted: impl Into<String>) -> Self {
        Self(rooted.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a reference reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// Declared import, materialized eagerly with the importer.
    Static,
    /// Runtime request, present in the bundle but instantiated on demand.
    Dynamic,
}

/// One resolved reference between two graph nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub from: NodeId,
    /// The specifier as written in the importer.
    pub specifier: String,
    pub to: NodeId,
    pub kind: EdgeKind,
}

/// A discovered module with its classified kind and loaded content.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub identity: ModuleIdentity,
    pub kind: ModuleKind,
    pub content: RawContent,
    /// Export surface for script kinds, `None` for assets.
    pub exports: Option<ExportSurface>,
}

/// The module dependency graph for one build.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    records: Vec<ModuleRecord>,
    identity_to_id: FxHashMap<ModuleIdentity, NodeId>,
    edges: Vec<DependencyEdge>,
    entry: Option<NodeId>,
}

impl ModuleGraph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a module, returning its ID.
    ///
    /// Idempotent: inserting an identity that is already present returns the
    /// existing ID and drops the new record.
    pub fn insert(&mut self, record: ModuleRecord) -> NodeId {
        if let Some(&id) = self.identity_to_id.get(&record.identity) {
            return id;
        }
        let id = self.records.len();
        self.identity_to_id.insert(record.identity.clone(), id);
        self.records.push(record);
        id
    }

    /// Look up a node by identity.
    #[must_use]
    pub fn id_of(&self, identity: &ModuleIdentity) -> Option<NodeId> {
        self.identity_to_id.get(identity).copied()
    }

    /// Get a module by ID.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&ModuleRecord> {
        self.records.get(id)
    }

    /// Identity of a node. IDs handed out by [`Self::insert`] are always
    /// valid for the graph they came from.
    #[must_use]
    pub fn identity_of(&self, id: NodeId) -> &ModuleIdentity {
        &self.records[id].identity
    }

    /// Record a resolved reference. Edge order is discovery order.
    pub fn record_edge(&mut self, from: NodeId, specifier: &str, to: NodeId, kind: EdgeKind) {
        self.edges.push(DependencyEdge {
            from,
            specifier: specifier.to_string(),
            to,
            kind,
        });
    }

    /// All edges in discovery order.
    #[must_use]
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Find the target of a specifier written in the given node, if resolved.
    #[must_use]
    pub fn edge_target(&self, from: NodeId, specifier: &str) -> Option<NodeId> {
        self.edges
            .iter()
            .find(|e| e.from == from && e.specifier == specifier)
            .map(|e| e.to)
    }

    pub fn set_entry(&mut self, id: NodeId) {
        self.entry = Some(id);
    }

    #[must_use]
    pub fn entry(&self) -> Option<NodeId> {
        self.entry
    }

    /// Number of modules in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over all modules in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ModuleRecord)> {
        self.records.iter().enumerate()
    }

    /// Nodes reachable from the entry over static edges only.
    fn static_reachable(&self) -> FxHashSet<NodeId> {
        let mut reachable = FxHashSet::default();
        let Some(entry) = self.entry else {
            return reachable;
        };
        let mut queue = VecDeque::new();
        reachable.insert(entry);
        queue.push_back(entry);
        while let Some(id) = queue.pop_front() {
            for edge in &self.edges {
                if edge.from == id && edge.kind == EdgeKind::Static && reachable.insert(edge.to) {
                    queue.push_back(edge.to);
                }
            }
        }
        reachable
    }

    /// Static materialization order for the entry's dependency chain.
    ///
    /// Dependencies come before dependents, the entry comes last, and nodes
    /// reachable only through dynamic edges are excluded. Members of an
    /// accepted cycle are appended in discovery order since no topological
    /// position exists for them.
    #[must_use]
    pub fn static_order(&self) -> Vec<NodeId> {
        let Some(entry) = self.entry else {
            return Vec::new();
        };
        let reachable = self.static_reachable();
        let n = self.records.len();

        // Dedupe parallel edges so one emit decrements one pending count.
        let mut pending = vec![0usize; n];
        let mut dependents: Vec<Vec<NodeId>> = vec![Vec::new(); n];
        let mut seen = FxHashSet::default();
        for edge in &self.edges {
            if edge.kind != EdgeKind::Static
                || !reachable.contains(&edge.from)
                || !reachable.contains(&edge.to)
                || !seen.insert((edge.from, edge.to))
            {
                continue;
            }
            dependents[edge.to].push(edge.from);
            pending[edge.from] += 1;
        }

        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for id in 0..n {
            if reachable.contains(&id) && pending[id] == 0 {
                queue.push_back(id);
            }
        }

        let mut order = Vec::with_capacity(reachable.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for &dependent in &dependents[id] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        // Accepted cycles leave their members unordered; append them in
        // discovery order.
        if order.len() < reachable.len() {
            for id in 0..n {
                if reachable.contains(&id) && !order.contains(&id) {
                    order.push(id);
                }
            }
        }

        // The entry executes after everything it depends on, even when an
        // accepted cycle disturbed the tail of the order.
        if let Some(pos) = order.iter().position(|&id| id == entry) {
            order.remove(pos);
            order.push(entry);
        }

        order
    }

    /// Detect a cycle made entirely of static edges between modern modules.
    ///
    /// Such a cycle needs live-binding semantics and is rejected. Cycles with
    /// a legacy node or a dynamic edge in them are fine and return `None`.
    /// Member identities come back in discovery order.
    #[must_use]
    pub fn find_modern_static_cycle(&self) -> Option<Vec<ModuleIdentity>> {
        let n = self.records.len();
        let is_modern =
            |id: NodeId| self.records[id].kind == ModuleKind::ModernScript;

        let mut pending = vec![0usize; n];
        let mut dependents: Vec<Vec<NodeId>> = vec![Vec::new(); n];
        let mut seen = FxHashSet::default();
        for edge in &self.edges {
            if edge.kind != EdgeKind::Static
                || !is_modern(edge.from)
                || !is_modern(edge.to)
                || !seen.insert((edge.from, edge.to))
            {
                continue;
            }
            dependents[edge.to].push(edge.from);
            pending[edge.from] += 1;
        }

        let mut queue: VecDeque<NodeId> = (0..n).filter(|&id| pending[id] == 0).collect();
        let mut emitted = 0usize;
        while let Some(id) = queue.pop_front() {
            emitted += 1;
            for &dependent in &dependents[id] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }
        if emitted == n {
            return None;
        }

        // Leftovers are cycle members plus their dependents. Walk unmet
        // dependency edges from the lowest leftover until a node repeats;
        // that loop is the cycle itself.
        let stuck: FxHashSet<NodeId> = (0..n).filter(|&id| pending[id] > 0).collect();
        let start = (0..n).find(|id| stuck.contains(id))?;
        let mut path: Vec<NodeId> = Vec::new();
        let mut position: FxHashMap<NodeId, usize> = FxHashMap::default();
        let mut current = start;
        loop {
            if let Some(&at) = position.get(&current) {
                let mut members: Vec<NodeId> = path[at..].to_vec();
                members.sort_unstable();
                return Some(
                    members
                        .into_iter()
                        .map(|id| self.records[id].identity.clone())
                        .collect(),
                );
            }
            position.insert(current, path.len());
            path.push(current);
            current = self.edges.iter().find_map(|e| {
                (e.from == current
                    && e.kind == EdgeKind::Static
                    && is_modern(e.to)
                    && stuck.contains(&e.to))
                .then_some(e.to)
            })?;
        }
    }
}

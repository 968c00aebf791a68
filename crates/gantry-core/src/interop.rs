//! Format interop synthesis.
//!
//! For every edge crossing the legacy/modern boundary, a wrapper module is
//! synthesized so the consumer observes a shape native to its own format.
//! Same-format and asset edges get no wrapper.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::classify::ModuleKind;
use crate::error::BuildError;
use crate::graph::{ModuleGraph, ModuleIdentity, NodeId};

/// Which direction a wrapper bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShimKind {
    /// Legacy importer of a modern module: the modern exports are exposed as
    /// one aggregate record with named keys and a `default` slot.
    NamespaceAggregate,
    /// Modern importer of a legacy module: the legacy exported value becomes
    /// the default export of a synthetic modern module. Keys of the value
    /// are not promoted to named exports.
    DefaultOnly,
}

/// One synthesized wrapper, shipped in the bundle beside the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimRecord {
    /// The module being wrapped.
    pub target: ModuleIdentity,
    pub kind: ShimKind,
    /// Names exposed on the aggregate, star re-exports expanded. Empty for
    /// `DefaultOnly`.
    pub names: Vec<String>,
    pub has_default: bool,
    /// Wrapper source consumed by the runtime loader.
    pub source: String,
}

/// Synthesize wrappers for every format-crossing edge in the graph.
///
/// One wrapper per (target, direction); order follows the first crossing
/// edge in discovery order.
pub fn synthesize_interops(graph: &ModuleGraph) -> Result<Vec<ShimRecord>, BuildError> {
    let mut shims = Vec::new();
    let mut seen: FxHashSet<(NodeId, ShimKind)> = FxHashSet::default();

    for edge in graph.edges() {
        let (Some(from), Some(to)) = (graph.get(edge.from), graph.get(edge.to)) else {
            continue;
        };
        let Some(kind) = crossing_kind(from.kind, to.kind) else {
            continue;
        };
        if !seen.insert((edge.to, kind)) {
            continue;
        }
        let shim = match kind {
            ShimKind::NamespaceAggregate => {
                aggregate_shim(graph, edge.to, &from.identity, &to.identity)?
            }
            ShimKind::DefaultOnly => default_shim(&to.identity)?,
        };
        shims.push(shim);
    }

    Ok(shims)
}

fn crossing_kind(from: ModuleKind, to: ModuleKind) -> Option<ShimKind> {
    match (from, to) {
        (ModuleKind::LegacyScript, ModuleKind::ModernScript) => Some(ShimKind::NamespaceAggregate),
        (ModuleKind::ModernScript, ModuleKind::LegacyScript) => Some(ShimKind::DefaultOnly),
        _ => None,
    }
}

fn aggregate_shim(
    graph: &ModuleGraph,
    target: NodeId,
    crossed_from: &ModuleIdentity,
    target_identity: &ModuleIdentity,
) -> Result<ShimRecord, BuildError> {
    let record = graph
        .get(target)
        .ok_or_else(|| BuildError::internal(format!("missing node for {target_identity}")))?;
    let surface = record.exports.clone().unwrap_or_default();

    if surface.default_count > 1 {
        return Err(BuildError::Interop {
            from: crossed_from.clone(),
            to: target_identity.clone(),
            reason: format!(
                "{} default-export declarations cannot fill the aggregate's single default slot",
                surface.default_count
            ),
        });
    }

    let mut names = Vec::new();
    let mut seen_names = FxHashSet::default();
    let mut visited = FxHashSet::default();
    collect_aggregate_names(graph, target, &mut names, &mut seen_names, &mut visited);

    let has_default = surface.default_count == 1;
    let source = render_aggregate(target_identity, &names, has_default)?;
    Ok(ShimRecord {
        target: target_identity.clone(),
        kind: ShimKind::NamespaceAggregate,
        names,
        has_default,
        source,
    })
}

/// Merge named exports across `export * from` chains. The default slot never
/// propagates through a star re-export.
fn collect_aggregate_names(
    graph: &ModuleGraph,
    node: NodeId,
    names: &mut Vec<String>,
    seen_names: &mut FxHashSet<String>,
    visited: &mut FxHashSet<NodeId>,
) {
    if !visited.insert(node) {
        return;
    }
    let Some(surface) = graph.get(node).and_then(|r| r.exports.as_ref()) else {
        return;
    };
    for name in &surface.names {
        if seen_names.insert(name.clone()) {
            names.push(name.clone());
        }
    }
    for specifier in &surface.star_from {
        if let Some(star_target) = graph.edge_target(node, specifier) {
            let star_kind = graph.get(star_target).map(|r| r.kind);
            if star_kind == Some(ModuleKind::ModernScript) {
                collect_aggregate_names(graph, star_target, names, seen_names, visited);
            }
        }
    }
}

fn default_shim(target_identity: &ModuleIdentity) -> Result<ShimRecord, BuildError> {
    let source = render_default_only(target_identity)?;
    Ok(ShimRecord {
        target: target_identity.clone(),
        kind: ShimKind::DefaultOnly,
        names: Vec::new(),
        has_default: true,
        source,
    })
}

/// Escape an identity for embedding in wrapper source.
fn js_string(identity: &ModuleIdentity) -> Result<String, BuildError> {
    serde_json::to_string(identity.as_str())
        .map_err(|e| BuildError::internal(format!("failed to escape identity: {e}")))
}

fn render_aggregate(
    target: &ModuleIdentity,
    names: &[String],
    has_default: bool,
) -> Result<String, BuildError> {
    let escaped = js_string(target)?;

    let mut fields = String::new();
    for name in names {
        fields.push_str(&format!("  {name}: __gantry_ns__.{name},\n"));
    }
    if has_default {
        fields.push_str("  default: __gantry_ns__.default,\n");
    }

    Ok(format!(
        r#"// aggregate view of a modern module for legacy importers
const __gantry_ns__ = __gantry.require({escaped});
module.exports = {{
{fields}}};
"#
    ))
}

fn render_default_only(target: &ModuleIdentity) -> Result<String, BuildError> {
    let escaped = js_string(target)?;
    Ok(format!(
        r#"// default-only view of a legacy module for modern importers
const __gantry_value__ = __gantry.require({escaped});
export default __gantry_value__;
"#
    ))
}

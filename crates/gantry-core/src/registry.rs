//! Runtime-facing module registry.
//!
//! Wraps a decoded [`Bundle`] as a table of thunks: every module in the
//! manifest has a slot, but nothing is materialized until asked for. The
//! external runtime loader drives instantiation through identity lookups,
//! so dynamic-edge targets stay cold until the first request reaches them.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::classify::ModuleKind;
use crate::emit::{Bundle, PayloadRef};
use crate::error::BuildError;
use crate::graph::{EdgeKind, ModuleIdentity};
use crate::interop::{ShimKind, ShimRecord};
use crate::load::RawContent;

/// A materialized module, produced on first request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInstance {
    pub identity: ModuleIdentity,
    pub kind: ModuleKind,
    pub content: RawContent,
}

/// Lookup table over a bundle with one lazily-filled slot per module.
///
/// All payload segment bounds are validated at construction, so
/// instantiation itself cannot fail and never re-reads the container.
#[derive(Debug)]
pub struct ModuleRegistry {
    bundle: Bundle,
    index: FxHashMap<ModuleIdentity, usize>,
    edge_index: FxHashMap<(ModuleIdentity, String), usize>,
    shim_index: FxHashMap<(ModuleIdentity, ShimKind), usize>,
    slots: Vec<OnceLock<ModuleInstance>>,
}

impl ModuleRegistry {
    /// Build a registry over a decoded bundle.
    ///
    /// Fails with [`BuildError::Container`] if any manifest record points
    /// outside the payload segment or at a duplicate identity.
    pub fn new(bundle: Bundle) -> Result<Self, BuildError> {
        let mut index = FxHashMap::default();
        for (slot, record) in bundle.manifest.iter().enumerate() {
            if let PayloadRef::Segment { offset, len } = record.payload {
                let end = offset.checked_add(len).ok_or_else(|| BuildError::Container {
                    reason: format!("payload range overflows for '{}'", record.identity),
                })?;
                if end > bundle.payload.len() as u64 {
                    return Err(BuildError::Container {
                        reason: format!(
                            "payload range {offset}..{end} for '{}' exceeds segment of {} bytes",
                            record.identity,
                            bundle.payload.len()
                        ),
                    });
                }
            }
            if index.insert(record.identity.clone(), slot).is_some() {
                return Err(BuildError::Container {
                    reason: format!("duplicate manifest identity '{}'", record.identity),
                });
            }
        }

        let edge_index = bundle
            .edges
            .iter()
            .enumerate()
            .map(|(i, edge)| ((edge.from.clone(), edge.specifier.clone()), i))
            .collect();

        let shim_index = bundle
            .interops
            .iter()
            .enumerate()
            .map(|(i, shim)| ((shim.target.clone(), shim.kind), i))
            .collect();

        let slots = bundle.manifest.iter().map(|_| OnceLock::new()).collect();

        Ok(Self {
            bundle,
            index,
            edge_index,
            shim_index,
            slots,
        })
    }

    /// The bundle's entry module identity.
    #[must_use]
    pub fn entry(&self) -> &ModuleIdentity {
        &self.bundle.entry
    }

    /// Number of modules in the registry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether an identity is present in the bundle at all.
    #[must_use]
    pub fn contains(&self, identity: &ModuleIdentity) -> bool {
        self.index.contains_key(identity)
    }

    /// Whether a module has already been materialized.
    #[must_use]
    pub fn is_instantiated(&self, identity: &ModuleIdentity) -> bool {
        self.index
            .get(identity)
            .is_some_and(|&slot| self.slots[slot].get().is_some())
    }

    /// Materialize a module, or return the already-materialized instance.
    ///
    /// Fails only when the identity is not in the bundle.
    pub fn instantiate(&self, identity: &ModuleIdentity) -> Result<&ModuleInstance, BuildError> {
        let &slot = self
            .index
            .get(identity)
            .ok_or_else(|| BuildError::Container {
                reason: format!("module '{identity}' is not in the bundle"),
            })?;
        Ok(self.slots[slot].get_or_init(|| self.materialize(slot)))
    }

    /// Materialize the entry's static closure in initialization order,
    /// returning the entry instance. Dynamic-edge targets are left cold.
    pub fn instantiate_entry(&self) -> Result<&ModuleInstance, BuildError> {
        for identity in &self.bundle.static_order {
            self.instantiate(identity)?;
        }
        self.instantiate(&self.bundle.entry)
    }

    /// Map a specifier as written in `importer` back to the identity the
    /// build resolved it to. Covers both static and dynamic edges.
    #[must_use]
    pub fn resolve_request(
        &self,
        importer: &ModuleIdentity,
        specifier: &str,
    ) -> Option<&ModuleIdentity> {
        let key = (importer.clone(), specifier.to_string());
        self.edge_index
            .get(&key)
            .map(|&i| &self.bundle.edges[i].to)
    }

    /// Edge kind the build recorded for a request, if any.
    #[must_use]
    pub fn request_kind(&self, importer: &ModuleIdentity, specifier: &str) -> Option<EdgeKind> {
        let key = (importer.clone(), specifier.to_string());
        self.edge_index.get(&key).map(|&i| self.bundle.edges[i].kind)
    }

    /// Interop wrapper for a target in the given direction, if one was
    /// synthesized at build time.
    #[must_use]
    pub fn shim_for(&self, target: &ModuleIdentity, kind: ShimKind) -> Option<&ShimRecord> {
        self.shim_index
            .get(&(target.clone(), kind))
            .map(|&i| &self.bundle.interops[i])
    }

    /// Static initialization order, entry last.
    #[must_use]
    pub fn static_order(&self) -> &[ModuleIdentity] {
        &self.bundle.static_order
    }

    fn materialize(&self, slot: usize) -> ModuleInstance {
        let record = &self.bundle.manifest[slot];
        let content = match &record.payload {
            PayloadRef::Inline(text) => RawContent::Text(text.clone()),
            // Bounds were validated in `new`, so the slice is in range.
            PayloadRef::Segment { offset, len } => {
                let start = *offset as usize;
                let end = start + *len as usize;
                RawContent::Bytes(self.bundle.payload[start..end].to_vec())
            }
        };
        ModuleInstance {
            identity: record.identity.clone(),
            kind: record.kind,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{self, ManifestRecord};
    use crate::graph::{ModuleGraph, ModuleRecord};

    fn record(identity: &str, kind: ModuleKind, content: RawContent) -> ModuleRecord {
        ModuleRecord {
            identity: ModuleIdentity::from_rooted(identity),
            kind,
            content,
            exports: None,
        }
    }

    fn sample_bundle() -> Bundle {
        let mut graph = ModuleGraph::new();
        let entry = graph.insert(record(
            "app.mjs",
            ModuleKind::ModernScript,
            RawContent::Text("import \"./eager.mjs\";".to_string()),
        ));
        let eager = graph.insert(record(
            "eager.mjs",
            ModuleKind::ModernScript,
            RawContent::Text("export const a = 1;".to_string()),
        ));
        let lazy = graph.insert(record(
            "lazy.mjs",
            ModuleKind::ModernScript,
            RawContent::Text("export const b = 2;".to_string()),
        ));
        let blob = graph.insert(record(
            "data.bin",
            ModuleKind::BinaryAsset,
            RawContent::Bytes(vec![0, 1, 2, 10]),
        ));
        graph.set_entry(entry);
        graph.record_edge(entry, "./eager.mjs", eager, EdgeKind::Static);
        graph.record_edge(entry, "./lazy.mjs", lazy, EdgeKind::Dynamic);
        graph.record_edge(entry, "./data.bin", blob, EdgeKind::Dynamic);
        emit::emit(&graph, Vec::new()).unwrap()
    }

    #[test]
    fn test_instantiation_is_lazy() {
        let registry = ModuleRegistry::new(sample_bundle()).unwrap();
        let lazy = ModuleIdentity::from_rooted("lazy.mjs");

        assert!(!registry.is_instantiated(&lazy));
        registry.instantiate(&lazy).unwrap();
        assert!(registry.is_instantiated(&lazy));
    }

    #[test]
    fn test_instantiate_entry_leaves_dynamic_targets_cold() {
        let registry = ModuleRegistry::new(sample_bundle()).unwrap();
        registry.instantiate_entry().unwrap();

        assert!(registry.is_instantiated(&ModuleIdentity::from_rooted("app.mjs")));
        assert!(registry.is_instantiated(&ModuleIdentity::from_rooted("eager.mjs")));
        assert!(!registry.is_instantiated(&ModuleIdentity::from_rooted("lazy.mjs")));
        assert!(!registry.is_instantiated(&ModuleIdentity::from_rooted("data.bin")));
    }

    #[test]
    fn test_instantiate_twice_returns_same_content() {
        let registry = ModuleRegistry::new(sample_bundle()).unwrap();
        let lazy = ModuleIdentity::from_rooted("lazy.mjs");

        let first = registry.instantiate(&lazy).unwrap().clone();
        let second = registry.instantiate(&lazy).unwrap();
        assert_eq!(&first, second);
    }

    #[test]
    fn test_binary_payload_is_byte_exact() {
        let registry = ModuleRegistry::new(sample_bundle()).unwrap();
        let blob = ModuleIdentity::from_rooted("data.bin");

        let instance = registry.instantiate(&blob).unwrap();
        assert_eq!(instance.kind, ModuleKind::BinaryAsset);
        assert_eq!(instance.content, RawContent::Bytes(vec![0, 1, 2, 10]));
    }

    #[test]
    fn test_resolve_request_covers_dynamic_edges() {
        let registry = ModuleRegistry::new(sample_bundle()).unwrap();
        let app = ModuleIdentity::from_rooted("app.mjs");

        let target = registry.resolve_request(&app, "./lazy.mjs").unwrap();
        assert_eq!(target.as_str(), "lazy.mjs");
        assert_eq!(
            registry.request_kind(&app, "./lazy.mjs"),
            Some(EdgeKind::Dynamic)
        );
        assert!(registry.resolve_request(&app, "./missing.mjs").is_none());
    }

    #[test]
    fn test_unknown_identity_fails() {
        let registry = ModuleRegistry::new(sample_bundle()).unwrap();
        let err = registry
            .instantiate(&ModuleIdentity::from_rooted("ghost.mjs"))
            .unwrap_err();
        assert!(matches!(err, BuildError::Container { .. }));
    }

    #[test]
    fn test_new_rejects_out_of_range_segment() {
        let mut bundle = sample_bundle();
        bundle.manifest.push(ManifestRecord {
            identity: ModuleIdentity::from_rooted("bad.bin"),
            kind: ModuleKind::BinaryAsset,
            payload: PayloadRef::Segment {
                offset: 0,
                len: bundle.payload.len() as u64 + 1,
            },
        });

        let err = ModuleRegistry::new(bundle).unwrap_err();
        assert!(matches!(err, BuildError::Container { .. }));
    }

    #[test]
    fn test_new_rejects_duplicate_identity() {
        let mut bundle = sample_bundle();
        bundle.manifest.push(ManifestRecord {
            identity: ModuleIdentity::from_rooted("app.mjs"),
            kind: ModuleKind::ModernScript,
            payload: PayloadRef::Inline(String::new()),
        });

        let err = ModuleRegistry::new(bundle).unwrap_err();
        match err {
            BuildError::Container { reason } => assert!(reason.contains("duplicate")),
            other => panic!("expected container error, got {other}"),
        }
    }

    #[test]
    fn test_round_trip_through_container_bytes() {
        let bundle = sample_bundle();
        let bytes = bundle.to_bytes().unwrap();
        let registry = ModuleRegistry::new(Bundle::from_bytes(&bytes).unwrap()).unwrap();

        let instance = registry
            .instantiate(&ModuleIdentity::from_rooted("data.bin"))
            .unwrap();
        assert_eq!(instance.content, RawContent::Bytes(vec![0, 1, 2, 10]));
    }
}

//! Build orchestration.
//!
//! Wave-based traversal from the entry module: scan the current frontier
//! for references, resolve them, load every unseen target in parallel,
//! then record edges in discovery order. After traversal the graph goes
//! through cycle admission, interop synthesis, and emission.

use std::path::Path;

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::classify;
use crate::config::BundleConfig;
use crate::emit::{self, Bundle};
use crate::error::{BuildError, BuildFailure, Diagnostic};
use crate::graph::{EdgeKind, ModuleGraph, ModuleIdentity, ModuleRecord, NodeId};
use crate::interop;
use crate::load::{self, RawContent};
use crate::resolve::SpecifierResolver;
use crate::scan;

/// Successful build output: the bundle plus non-fatal observations.
#[derive(Debug)]
pub struct BuildReport {
    pub bundle: Bundle,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolve, load, and bundle everything reachable from `entry`.
///
/// `entry` may be absolute or relative to the configured root.
pub fn build_bundle(config: &BundleConfig, entry: &Path) -> Result<BuildReport, BuildFailure> {
    GraphBuilder::new(config)?.build(entry)
}

/// One resolved reference waiting for its target to enter the graph.
struct PendingEdge {
    from: NodeId,
    specifier: String,
    to: ModuleIdentity,
    kind: EdgeKind,
}

/// Drives one build from entry resolution to emission.
pub struct GraphBuilder<'a> {
    config: &'a BundleConfig,
    resolver: SpecifierResolver,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a BundleConfig) -> Result<Self, BuildFailure> {
        let resolver = SpecifierResolver::new(config).map_err(BuildFailure::from)?;
        Ok(Self {
            config,
            resolver,
            diagnostics: Vec::new(),
        })
    }

    pub fn build(mut self, entry: &Path) -> Result<BuildReport, BuildFailure> {
        debug!(entry = %entry.display(), "Resolving entry module");
        let entry_identity = match self.resolver.resolve_entry(entry) {
            Ok(identity) => identity,
            Err(e) => return Err(BuildFailure::new(vec![e], self.diagnostics)),
        };

        let mut graph = ModuleGraph::new();
        let entry_id = match self.load_record(&entry_identity) {
            Ok((record, diagnostic)) => {
                self.diagnostics.extend(diagnostic);
                let id = graph.insert(record);
                graph.set_entry(id);
                id
            }
            Err(e) => return Err(BuildFailure::new(vec![e], self.diagnostics)),
        };

        let mut errors: Vec<BuildError> = Vec::new();
        let mut frontier = vec![entry_id];
        let mut wave = 0usize;
        while !frontier.is_empty() && errors.is_empty() {
            wave += 1;
            debug!(wave, modules = frontier.len(), "Scanning wave");
            frontier = self.traverse_wave(&mut graph, &frontier, &mut errors);
        }

        if !errors.is_empty() {
            return Err(BuildFailure::new(errors, self.diagnostics));
        }

        if let Some(cycle) = graph.find_modern_static_cycle() {
            return Err(BuildFailure::new(
                vec![BuildError::Graph { cycle }],
                self.diagnostics,
            ));
        }

        let interops = match interop::synthesize_interops(&graph) {
            Ok(shims) => shims,
            Err(e) => return Err(BuildFailure::new(vec![e], self.diagnostics)),
        };

        let bundle = match emit::emit(&graph, interops) {
            Ok(bundle) => bundle,
            Err(e) => return Err(BuildFailure::new(vec![e], self.diagnostics)),
        };

        info!(
            modules = bundle.manifest.len(),
            edges = bundle.edges.len(),
            interops = bundle.interops.len(),
            fingerprint = %bundle.fingerprint,
            "Bundle assembled"
        );

        Ok(BuildReport {
            bundle,
            diagnostics: self.diagnostics,
        })
    }

    /// Scan one frontier, load every unseen target in parallel, then record
    /// edges in discovery order. Returns the next frontier.
    fn traverse_wave(
        &mut self,
        graph: &mut ModuleGraph,
        frontier: &[NodeId],
        errors: &mut Vec<BuildError>,
    ) -> Vec<NodeId> {
        let mut pending: Vec<PendingEdge> = Vec::new();
        let mut seen_edges: FxHashSet<(NodeId, String, EdgeKind)> = FxHashSet::default();

        for &from in frontier {
            let Some(record) = graph.get(from) else {
                continue;
            };
            if !record.kind.is_script() {
                continue;
            }
            let Some(source) = record.content.as_text() else {
                continue;
            };
            let importer = record.identity.clone();
            let result = scan::scan_references(source);

            for unsupported in result.unsupported {
                self.diagnostics.push(Diagnostic::UnsupportedPattern {
                    specifier: unsupported.specifier,
                    line: unsupported.line,
                });
            }

            for reference in result.refs {
                let kind = reference.kind.edge_kind();
                match self.resolve_reference(&importer, &reference) {
                    Ok(resolved) => {
                        for (specifier, to) in resolved {
                            if seen_edges.insert((from, specifier.clone(), kind)) {
                                pending.push(PendingEdge {
                                    from,
                                    specifier,
                                    to,
                                    kind,
                                });
                            }
                        }
                    }
                    Err(e) => errors.push(e),
                }
            }
        }

        let mut new_identities: Vec<ModuleIdentity> = Vec::new();
        let mut wave_seen: FxHashSet<ModuleIdentity> = FxHashSet::default();
        for edge in &pending {
            if graph.id_of(&edge.to).is_none() && wave_seen.insert(edge.to.clone()) {
                new_identities.push(edge.to.clone());
            }
        }

        debug!(
            refs = pending.len(),
            unseen = new_identities.len(),
            "Loading wave targets"
        );

        let loader = &*self;
        let loaded: Vec<Result<(ModuleRecord, Option<Diagnostic>), BuildError>> = new_identities
            .par_iter()
            .map(|identity| loader.load_record(identity))
            .collect();

        let mut next = Vec::with_capacity(loaded.len());
        for outcome in loaded {
            match outcome {
                Ok((record, diagnostic)) => {
                    self.diagnostics.extend(diagnostic);
                    next.push(graph.insert(record));
                }
                Err(e) => errors.push(e),
            }
        }

        // Edges land in reference discovery order once targets exist. A
        // failed load leaves its edges out; the error already covers it.
        for edge in pending {
            if let Some(to) = graph.id_of(&edge.to) {
                graph.record_edge(edge.from, &edge.specifier, to, edge.kind);
            }
        }

        next
    }

    /// Resolve one scanned reference to concrete (specifier, identity)
    /// pairs. Template patterns expand to every matching file.
    fn resolve_reference(
        &mut self,
        importer: &ModuleIdentity,
        reference: &scan::Reference,
    ) -> Result<Vec<(String, ModuleIdentity)>, BuildError> {
        if let Some(pattern) = &reference.pattern {
            return self.expand_pattern(importer, reference, pattern);
        }
        let identity = self.resolver.resolve(&reference.specifier, importer)?;
        Ok(vec![(reference.specifier.clone(), identity)])
    }

    /// Enumerate files matching a single-hole template. Matches resolve
    /// like ordinary specifiers, sorted for stable edge order, and a
    /// template that matches nothing is a resolution error.
    fn expand_pattern(
        &mut self,
        importer: &ModuleIdentity,
        reference: &scan::Reference,
        pattern: &scan::PatternParts,
    ) -> Result<Vec<(String, ModuleIdentity)>, BuildError> {
        // A hole spanning directories cannot be enumerated with one
        // directory listing.
        if pattern.suffix.contains('/') {
            self.diagnostics.push(Diagnostic::UnsupportedPattern {
                specifier: reference.specifier.clone(),
                line: reference.line,
            });
            return Ok(Vec::new());
        }

        let (dir_part, name_prefix) = match pattern.prefix.rfind('/') {
            Some(pos) => pattern.prefix.split_at(pos + 1),
            None => ("", pattern.prefix.as_str()),
        };

        let probe = format!("{}{}", pattern.prefix, pattern.suffix);
        let base = if self.resolver.is_root_scoped(&probe) {
            self.resolver.root().to_path_buf()
        } else {
            self.resolver.base_dir(importer)
        };
        let dir = base.join(dir_part);

        let mut names: Vec<String> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| {
                name.len() >= name_prefix.len() + pattern.suffix.len()
                    && name.starts_with(name_prefix)
                    && name.ends_with(&pattern.suffix)
            })
            .collect();
        names.sort();

        if names.is_empty() {
            return Err(BuildError::Resolve {
                specifier: reference.specifier.clone(),
                importer: Some(importer.as_str().to_string()),
                tried: vec![dir],
            });
        }

        debug!(
            specifier = %reference.specifier,
            matches = names.len(),
            "Expanded dynamic template"
        );

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let concrete = format!("{dir_part}{name}");
            let identity = self.resolver.resolve(&concrete, importer)?;
            out.push((concrete, identity));
        }
        Ok(out)
    }

    /// Read, classify, and decode one module. Scripts also get their export
    /// surface scanned here so interop synthesis never re-reads sources.
    fn load_record(
        &self,
        identity: &ModuleIdentity,
    ) -> Result<(ModuleRecord, Option<Diagnostic>), BuildError> {
        let bytes = load::read_bytes(self.resolver.root(), identity)?;
        let known = Path::new(identity.as_str())
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.config.kind_for_extension(ext));

        match known {
            Some(kind) => {
                let content = load::decode_content(identity, kind, bytes)?;
                let exports = if kind.is_script() {
                    content.as_text().map(scan::scan_exports)
                } else {
                    None
                };
                Ok((
                    ModuleRecord {
                        identity: identity.clone(),
                        kind,
                        content,
                        exports,
                    },
                    None,
                ))
            }
            None => {
                let text = load::decode_text(identity, bytes)?;
                let (kind, ambiguous) = classify::classify_script(&text);
                let diagnostic = ambiguous.then(|| Diagnostic::ClassificationAmbiguity {
                    identity: identity.clone(),
                    defaulted_to: kind,
                });
                let exports = Some(scan::scan_exports(&text));
                Ok((
                    ModuleRecord {
                        identity: identity.clone(),
                        kind,
                        content: RawContent::Text(text),
                        exports,
                    },
                    diagnostic,
                ))
            }
        }
    }
}

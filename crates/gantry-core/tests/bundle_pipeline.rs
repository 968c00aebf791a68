//! End-to-end pipeline tests: real files on disk, through build, container
//! encoding, and registry instantiation.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use gantry_core::{
    build_bundle, BuildError, BuildFailure, BuildReport, Bundle, BundleConfig, EdgeKind,
    ModuleIdentity, ModuleKind, ModuleRegistry, PayloadRef, RawContent, ShimKind,
};

fn project(files: &[(&str, &[u8])]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }
    dir
}

fn build(dir: &TempDir, entry: &str) -> Result<BuildReport, BuildFailure> {
    let config = BundleConfig::new(dir.path().to_path_buf());
    build_bundle(&config, Path::new(entry))
}

fn ident(s: &str) -> ModuleIdentity {
    ModuleIdentity::from_rooted(s)
}

#[test]
fn test_identical_trees_build_identical_containers() {
    let files: &[(&str, &[u8])] = &[
        (
            "app.mjs",
            b"import { greet } from \"./lib.mjs\";\nimport \"./icon.bin\";\nexport { greet };",
        ),
        ("lib.mjs", b"export const greet = \"hi\";"),
        ("icon.bin", &[7, 8, 9]),
    ];

    let first = build(&project(files), "app.mjs").unwrap().bundle;
    let second = build(&project(files), "app.mjs").unwrap().bundle;

    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.to_bytes().unwrap(), second.to_bytes().unwrap());

    let edges_a: Vec<_> = first.edges.iter().map(|e| e.specifier.clone()).collect();
    let edges_b: Vec<_> = second.edges.iter().map(|e| e.specifier.clone()).collect();
    assert_eq!(edges_a, edges_b);
}

#[test]
fn test_distinct_specifiers_same_file_one_record() {
    let dir = project(&[
        (
            "app.mjs",
            b"import \"./a.mjs\";\nimport \"./b.mjs\";",
        ),
        ("a.mjs", b"import { u } from \"./util\";"),
        ("b.mjs", b"import { u } from \"./util.mjs\";"),
        ("util.mjs", b"export const u = 1;"),
    ]);

    let bundle = build(&dir, "app.mjs").unwrap().bundle;
    assert_eq!(bundle.manifest.len(), 4);
    let util_records = bundle
        .manifest
        .iter()
        .filter(|r| r.identity.as_str() == "util.mjs")
        .count();
    assert_eq!(util_records, 1);

    // Both edges point at the single node despite different spellings.
    let targets: Vec<&str> = bundle
        .edges
        .iter()
        .filter(|e| e.specifier.contains("util"))
        .map(|e| e.to.as_str())
        .collect();
    assert_eq!(targets, vec!["util.mjs", "util.mjs"]);
}

#[test]
fn test_modern_cycle_rejected() {
    let dir = project(&[
        (
            "x.mjs",
            b"import { y } from \"./y.mjs\";\nexport const x = 1;",
        ),
        (
            "y.mjs",
            b"import { x } from \"./x.mjs\";\nexport const y = 2;",
        ),
    ]);

    let failure = build(&dir, "x.mjs").unwrap_err();
    match &failure.errors[0] {
        BuildError::Graph { cycle } => {
            let members: Vec<&str> = cycle.iter().map(|m| m.as_str()).collect();
            assert_eq!(members, vec!["x.mjs", "y.mjs"]);
        }
        other => panic!("expected graph error, got {other}"),
    }
}

#[test]
fn test_cycle_with_legacy_leg_accepted() {
    let dir = project(&[
        (
            "x.mjs",
            b"import wrapped from \"./y.cjs\";\nexport const x = 1;",
        ),
        ("y.cjs", b"const x = require(\"./x.mjs\");\nmodule.exports = x;"),
    ]);

    let report = build(&dir, "x.mjs").unwrap();
    let order: Vec<&str> = report
        .bundle
        .static_order
        .iter()
        .map(|m| m.as_str())
        .collect();
    assert_eq!(order.len(), 2);
    assert_eq!(order.last().copied(), Some("x.mjs"));
}

#[test]
fn test_dynamic_target_shipped_lazy() {
    let dir = project(&[
        (
            "app.mjs",
            b"export async function load() { return import(\"./lazy.mjs\"); }",
        ),
        ("lazy.mjs", b"export const later = true;"),
    ]);

    let bundle = build(&dir, "app.mjs").unwrap().bundle;
    assert_eq!(bundle.manifest.len(), 2);
    assert_eq!(bundle.static_order.len(), 1);
    assert_eq!(bundle.static_order[0].as_str(), "app.mjs");

    let registry = ModuleRegistry::new(bundle).unwrap();
    registry.instantiate_entry().unwrap();
    assert!(!registry.is_instantiated(&ident("lazy.mjs")));

    let target = registry
        .resolve_request(&ident("app.mjs"), "./lazy.mjs")
        .unwrap()
        .clone();
    assert_eq!(registry.request_kind(&ident("app.mjs"), "./lazy.mjs"), Some(EdgeKind::Dynamic));
    registry.instantiate(&target).unwrap();
    assert!(registry.is_instantiated(&ident("lazy.mjs")));
}

#[test]
fn test_binary_code_resolves_from_root_at_every_depth() {
    let dir = project(&[
        (
            "app.mjs",
            b"import \"./a/b/c/deep.mjs\";\nimport \"./other/sibling.mjs\";",
        ),
        ("a/b/c/deep.mjs", b"import \"./native/engine.wasm\";"),
        ("other/sibling.mjs", b"import \"./native/engine.wasm\";"),
        ("native/engine.wasm", &[0x00, 0x61, 0x73, 0x6d]),
    ]);

    let bundle = build(&dir, "app.mjs").unwrap().bundle;
    let wasm_records: Vec<_> = bundle
        .manifest
        .iter()
        .filter(|r| r.kind == ModuleKind::BinaryCode)
        .collect();
    assert_eq!(wasm_records.len(), 1);
    assert_eq!(wasm_records[0].identity.as_str(), "native/engine.wasm");

    let wasm_edges: Vec<&str> = bundle
        .edges
        .iter()
        .filter(|e| e.specifier.ends_with(".wasm"))
        .map(|e| e.to.as_str())
        .collect();
    assert_eq!(wasm_edges, vec!["native/engine.wasm", "native/engine.wasm"]);
}

#[test]
fn test_interop_shapes_both_directions() {
    let dir = project(&[
        (
            "app.mjs",
            b"import answer from \"./value.cjs\";\nimport \"./consumer.cjs\";",
        ),
        ("value.cjs", b"module.exports = 42;"),
        ("consumer.cjs", b"const pair = require(\"./pair.mjs\");"),
        ("pair.mjs", b"export const a = 1;\nexport const b = 2;"),
    ]);

    let bundle = build(&dir, "app.mjs").unwrap().bundle;

    let aggregate = bundle
        .interops
        .iter()
        .find(|s| s.kind == ShimKind::NamespaceAggregate)
        .expect("missing aggregate shim");
    assert_eq!(aggregate.target.as_str(), "pair.mjs");
    assert_eq!(aggregate.names, vec!["a", "b"]);
    assert!(!aggregate.has_default);

    let default_only: Vec<&str> = bundle
        .interops
        .iter()
        .filter(|s| s.kind == ShimKind::DefaultOnly)
        .map(|s| s.target.as_str())
        .collect();
    assert!(default_only.contains(&"value.cjs"));
    let value_shim = bundle
        .interops
        .iter()
        .find(|s| s.target.as_str() == "value.cjs")
        .unwrap();
    assert!(value_shim.source.contains("export default"));
}

#[test]
fn test_legacy_require_of_modern_default() {
    let dir = project(&[
        (
            "app.mjs",
            b"import greeting from \"./greeting.mjs\";\nimport cjsMessage from \"./old.cjs\";\nexport { greeting, cjsMessage };",
        ),
        (
            "greeting.mjs",
            b"const first = \"Hello Jane Smith\";\nconst second = \"Hello John Smith\";\nexport default first + \" and \" + second;",
        ),
        (
            "old.cjs",
            b"const greeting = require(\"./greeting.mjs\");\nmodule.exports = \"CJS: \" + greeting.default;",
        ),
    ]);

    let bundle = build(&dir, "app.mjs").unwrap().bundle;

    let aggregate = bundle
        .interops
        .iter()
        .find(|s| s.target.as_str() == "greeting.mjs")
        .expect("modern module required from legacy code needs a shim");
    assert_eq!(aggregate.kind, ShimKind::NamespaceAggregate);
    assert!(aggregate.has_default);
    assert!(aggregate.source.contains("default"));

    let registry = ModuleRegistry::new(bundle).unwrap();
    let old = registry.instantiate(&ident("old.cjs")).unwrap();
    match &old.content {
        RawContent::Text(text) => assert!(text.contains("CJS: ")),
        RawContent::Bytes(_) => panic!("script payload must be text"),
    }
    let target = registry
        .resolve_request(&ident("old.cjs"), "./greeting.mjs")
        .unwrap();
    assert_eq!(target.as_str(), "greeting.mjs");
}

#[test]
fn test_binary_asset_bytes_survive_unchanged() {
    let dir = project(&[
        ("app.mjs", b"import \"./img/blob.bin\";"),
        ("img/blob.bin", &[0, 1, 2, 10]),
    ]);

    let bundle = build(&dir, "app.mjs").unwrap().bundle;
    let record = bundle
        .manifest
        .iter()
        .find(|r| r.identity.as_str() == "img/blob.bin")
        .unwrap();
    assert_eq!(record.kind, ModuleKind::BinaryAsset);
    assert!(matches!(record.payload, PayloadRef::Segment { len: 4, .. }));

    // Through container encode/decode and registry materialization.
    let bytes = bundle.to_bytes().unwrap();
    let registry = ModuleRegistry::new(Bundle::from_bytes(&bytes).unwrap()).unwrap();
    let instance = registry.instantiate(&ident("img/blob.bin")).unwrap();
    assert_eq!(instance.content, RawContent::Bytes(vec![0, 1, 2, 10]));
}

#[test]
fn test_template_requests_resolve_at_runtime() {
    let dir = project(&[
        (
            "app.mjs",
            b"export async function pick(code) { return import(`./lang/${code}.json`); }",
        ),
        ("lang/en.json", b"{\"hello\": \"hello\"}"),
        ("lang/fr.json", b"{\"hello\": \"bonjour\"}"),
    ]);

    let bundle = build(&dir, "app.mjs").unwrap().bundle;
    assert_eq!(bundle.manifest.len(), 3);
    assert_eq!(bundle.static_order.len(), 1);

    let registry = ModuleRegistry::new(bundle).unwrap();
    let en = registry
        .resolve_request(&ident("app.mjs"), "./lang/en.json")
        .unwrap()
        .clone();
    let instance = registry.instantiate(&en).unwrap();
    assert_eq!(instance.kind, ModuleKind::StructuredData);
    match &instance.content {
        RawContent::Text(text) => assert!(text.contains("hello")),
        RawContent::Bytes(_) => panic!("structured data must decode to text"),
    }
    assert!(!registry.is_instantiated(&ident("lang/fr.json")));
}

#[test]
fn test_conflicting_defaults_fail_interop() {
    let dir = project(&[
        ("app.mjs", b"import \"./consumer.cjs\";"),
        ("consumer.cjs", b"const bad = require(\"./bad.mjs\");"),
        (
            "bad.mjs",
            b"const x = 1;\nexport default 1;\nexport { x as default };",
        ),
    ]);

    let failure = build(&dir, "app.mjs").unwrap_err();
    match &failure.errors[0] {
        BuildError::Interop { from, to, .. } => {
            assert_eq!(from.as_str(), "consumer.cjs");
            assert_eq!(to.as_str(), "bad.mjs");
        }
        other => panic!("expected interop error, got {other}"),
    }
}

#[test]
fn test_malformed_structured_data_fails_build() {
    let dir = project(&[
        ("app.mjs", b"import \"./cfg.json\";"),
        ("cfg.json", b"{\"unterminated\": "),
    ]);

    let failure = build(&dir, "app.mjs").unwrap_err();
    assert!(matches!(failure.errors[0], BuildError::Parse { .. }));
}

#[test]
fn test_extension_rule_override() {
    // A project can route an extension to a different kind.
    let dir = project(&[
        ("app.mjs", b"import \"./notes.data\";"),
        ("notes.data", b"plain text, not json"),
    ]);

    let config = BundleConfig::new(dir.path().to_path_buf())
        .with_rule("data", ModuleKind::TextAsset);
    let bundle = build_bundle(&config, Path::new("app.mjs")).unwrap().bundle;

    let record = bundle
        .manifest
        .iter()
        .find(|r| r.identity.as_str() == "notes.data")
        .unwrap();
    assert_eq!(record.kind, ModuleKind::TextAsset);
    assert!(matches!(record.payload, PayloadRef::Inline(_)));
}

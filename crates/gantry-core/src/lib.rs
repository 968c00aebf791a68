#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]

pub mod builder;
pub mod classify;
pub mod config;
pub mod emit;
pub mod error;
pub mod graph;
pub mod interop;
pub mod load;
pub mod registry;
pub mod resolve;
pub mod scan;

pub use builder::{build_bundle, BuildReport, GraphBuilder};
pub use classify::ModuleKind;
pub use config::{BundleConfig, ExtensionRule};
pub use emit::{Bundle, EdgeRecord, ManifestRecord, PayloadRef, BUNDLE_FORMAT_VERSION};
pub use error::{BuildError, BuildFailure, Diagnostic};
pub use graph::{DependencyEdge, EdgeKind, ModuleGraph, ModuleIdentity, ModuleRecord, NodeId};
pub use interop::{ShimKind, ShimRecord};
pub use load::RawContent;
pub use registry::{ModuleInstance, ModuleRegistry};
pub use resolve::SpecifierResolver;

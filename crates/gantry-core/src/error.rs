use std::path::PathBuf;
use thiserror::Error;

use crate::classify::ModuleKind;
use crate::graph::ModuleIdentity;

/// Fatal build errors. Any of these aborts bundle emission.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot resolve '{specifier}'{}: tried {}", importer_suffix(.importer), join_candidates(.tried))]
    Resolve {
        specifier: String,
        importer: Option<String>,
        tried: Vec<PathBuf>,
    },

    #[error("Failed to load {identity}: {source}")]
    Load {
        identity: ModuleIdentity,
        #[source]
        source: std::io::Error,
    },

    #[error("Module {identity} is not valid UTF-8 text")]
    Decode { identity: ModuleIdentity },

    #[error("Failed to parse {identity}: {source}")]
    Parse {
        identity: ModuleIdentity,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported static cycle between modern modules: {}", format_cycle(.cycle))]
    Graph { cycle: Vec<ModuleIdentity> },

    #[error("Cannot bridge {from} -> {to}: {reason}")]
    Interop {
        from: ModuleIdentity,
        to: ModuleIdentity,
        reason: String,
    },

    #[error("Malformed bundle container: {reason}")]
    Container { reason: String },

    #[error("{0}")]
    Internal(String),
}

impl BuildError {
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

fn importer_suffix(importer: &Option<String>) -> String {
    match importer {
        Some(from) => format!(" from {from}"),
        None => String::new(),
    }
}

fn join_candidates(tried: &[PathBuf]) -> String {
    tried
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_cycle(cycle: &[ModuleIdentity]) -> String {
    cycle
        .iter()
        .map(ModuleIdentity::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Non-fatal findings accumulated during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Script content carried no recognizable format markers; the classifier
    /// fell back to the documented default.
    ClassificationAmbiguity {
        identity: ModuleIdentity,
        defaulted_to: ModuleKind,
    },

    /// A dynamic reference whose shape the expander cannot enumerate. The
    /// reference is skipped, not fatal.
    UnsupportedPattern {
        specifier: String,
        line: Option<u32>,
    },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClassificationAmbiguity {
                identity,
                defaulted_to,
            } => write!(
                f,
                "{identity}: no format markers found, treating as {}",
                defaulted_to.as_str()
            ),
            Self::UnsupportedPattern { specifier, line } => match line {
                Some(line) => {
                    write!(f, "unsupported dynamic pattern '{specifier}' at line {line}")
                }
                None => write!(f, "unsupported dynamic pattern '{specifier}'"),
            },
        }
    }
}

/// Everything that went wrong in one build: fatal errors batched per
/// traversal wave, plus any diagnostics collected before the failure.
#[derive(Error, Debug)]
#[error("build failed with {} error(s)", .errors.len())]
pub struct BuildFailure {
    pub errors: Vec<BuildError>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildFailure {
    #[must_use]
    pub fn new(errors: Vec<BuildError>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            errors,
            diagnostics,
        }
    }
}

impl From<BuildError> for BuildFailure {
    fn from(error: BuildError) -> Self {
        Self {
            errors: vec![error],
            diagnostics: Vec::new(),
        }
    }
}

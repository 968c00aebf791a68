use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::classify::ModuleKind;

/// Build configuration for a single bundle run.
///
/// Threaded explicitly through the resolver and classifier so concurrent
/// builds never share state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Project root. Root-relative specifiers resolve against this.
    pub root: PathBuf,

    /// Extension-to-kind overrides, checked before the built-in table.
    pub rules: Vec<ExtensionRule>,

    /// Candidate extensions probed for extensionless specifiers, in order.
    pub probe_extensions: Vec<String>,
}

/// One extension-to-kind override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionRule {
    /// Extension without the leading dot, e.g. `"mjs"`.
    pub extension: String,
    pub kind: ModuleKind,
}

impl BundleConfig {
    /// Create a config rooted at the given project directory.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            rules: Vec::new(),
            probe_extensions: vec!["js".to_string(), "mjs".to_string(), "cjs".to_string()],
        }
    }

    /// Add an extension-to-kind override.
    #[must_use]
    pub fn with_rule(mut self, extension: &str, kind: ModuleKind) -> Self {
        self.rules.push(ExtensionRule {
            extension: extension.trim_start_matches('.').to_string(),
            kind,
        });
        self
    }

    /// Replace the probe list for extensionless specifiers.
    #[must_use]
    pub fn with_probe_extensions(mut self, extensions: &[&str]) -> Self {
        self.probe_extensions = extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_string())
            .collect();
        self
    }

    /// Map a file extension to a module kind.
    ///
    /// Overrides win over the built-in table. Returns `None` for extensions
    /// whose kind can only be decided by inspecting content (plain `.js`).
    #[must_use]
    pub fn kind_for_extension(&self, extension: &str) -> Option<ModuleKind> {
        let ext = extension.to_lowercase();
        for rule in &self.rules {
            if rule.extension == ext {
                return Some(rule.kind);
            }
        }
        ModuleKind::from_extension(&ext)
    }
}

//! Specifier resolution.
//!
//! Maps specifiers to module identities with pure path algebra. Content is
//! never inspected here.
//!
//! ## Policy
//!
//! - Relative specifiers resolve against the importer's directory.
//! - Specifiers whose extension maps to binary code resolve against the
//!   project root no matter how deeply the importer is nested.
//! - Extensionless specifiers probe the configured extension list in order,
//!   after checking the bare path itself.

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::classify::ModuleKind;
use crate::config::BundleConfig;
use crate::error::BuildError;
use crate::graph::ModuleIdentity;

/// Per-build specifier resolver with a resolution cache.
#[derive(Debug)]
pub struct SpecifierResolver {
    config: BundleConfig,
    /// Cached (specifier, importer) resolutions.
    cache: RwLock<FxHashMap<(String, String), ModuleIdentity>>,
}

impl SpecifierResolver {
    /// Create a resolver for one build. The project root is canonicalized
    /// here so identity derivation is stable for the whole build.
    pub fn new(config: &BundleConfig) -> Result<Self, BuildError> {
        let root = dunce::canonicalize(&config.root)?;
        let mut config = config.clone();
        config.root = root;
        Ok(Self {
            config,
            cache: RwLock::default(),
        })
    }

    /// The canonical project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Resolve the build entry point. Relative paths are taken from the
    /// project root.
    pub fn resolve_entry(&self, entry: &Path) -> Result<ModuleIdentity, BuildError> {
        let target = if entry.is_absolute() {
            entry.to_path_buf()
        } else {
            self.config.root.join(entry)
        };
        self.first_existing(&entry.display().to_string(), None, self.candidates_for(&target))
    }

    /// Resolve a specifier written in the given importer.
    ///
    /// Idempotent: the same (specifier, importer) pair always yields the
    /// same identity within a build.
    pub fn resolve(
        &self,
        specifier: &str,
        importer: &ModuleIdentity,
    ) -> Result<ModuleIdentity, BuildError> {
        let cache_key = (specifier.to_string(), importer.as_str().to_string());
        if let Some(cached) = self.cache.read().unwrap().get(&cache_key) {
            return Ok(cached.clone());
        }

        let identity = self.resolve_uncached(specifier, importer)?;

        self.cache
            .write()
            .unwrap()
            .insert(cache_key, identity.clone());

        Ok(identity)
    }

    fn resolve_uncached(
        &self,
        specifier: &str,
        importer: &ModuleIdentity,
    ) -> Result<ModuleIdentity, BuildError> {
        let target = if self.is_root_scoped(specifier) {
            self.config.root.join(specifier.trim_start_matches("./"))
        } else {
            self.base_dir(importer).join(specifier)
        };
        self.first_existing(specifier, Some(importer), self.candidates_for(&target))
    }

    /// Binary-code specifiers resolve against the project root regardless of
    /// importer nesting.
    pub(crate) fn is_root_scoped(&self, specifier: &str) -> bool {
        Path::new(specifier)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.config.kind_for_extension(ext))
            == Some(ModuleKind::BinaryCode)
    }

    /// Directory that relative specifiers written in `importer` resolve from.
    pub(crate) fn base_dir(&self, importer: &ModuleIdentity) -> PathBuf {
        let importer_path = self.config.root.join(importer.as_str());
        importer_path
            .parent()
            .unwrap_or(&self.config.root)
            .to_path_buf()
    }

    fn candidates_for(&self, target: &Path) -> Vec<PathBuf> {
        let mut candidates = vec![target.to_path_buf()];
        if target.extension().is_none() {
            for ext in &self.config.probe_extensions {
                candidates.push(PathBuf::from(format!("{}.{ext}", target.display())));
            }
        }
        candidates
    }

    fn first_existing(
        &self,
        specifier: &str,
        importer: Option<&ModuleIdentity>,
        candidates: Vec<PathBuf>,
    ) -> Result<ModuleIdentity, BuildError> {
        for candidate in &candidates {
            if candidate.is_file() {
                let canonical = dunce::canonicalize(candidate)?;
                return Ok(ModuleIdentity::from_paths(&self.config.root, &canonical));
            }
        }
        Err(BuildError::Resolve {
            specifier: specifier.to_string(),
            importer: importer.map(|i| i.as_str().to_string()),
            tried: candidates,
        })
    }
}

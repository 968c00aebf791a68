use serde::{Deserialize, Serialize};

/// What a module is, decided once at discovery and fixed for the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    /// ESM-style script with named bindings and a default slot.
    ModernScript,
    /// CommonJS-style script with a single exported value.
    LegacyScript,
    /// Compiled bytecode, kept as opaque bytes.
    BinaryCode,
    /// Character data served verbatim.
    TextAsset,
    /// Raw bytes served verbatim.
    BinaryAsset,
    /// JSON content, validated at load.
    StructuredData,
}

impl ModuleKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModernScript => "modern-script",
            Self::LegacyScript => "legacy-script",
            Self::BinaryCode => "binary-code",
            Self::TextAsset => "text-asset",
            Self::BinaryAsset => "binary-asset",
            Self::StructuredData => "structured-data",
        }
    }

    /// True for the two script kinds that participate in interop.
    #[must_use]
    pub fn is_script(&self) -> bool {
        matches!(self, Self::ModernScript | Self::LegacyScript)
    }

    /// True for kinds whose payload is opaque bytes, never decoded as text.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::BinaryCode | Self::BinaryAsset)
    }

    /// Built-in extension table. `None` means the extension alone does not
    /// decide the kind and content must be inspected.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mjs" => Some(Self::ModernScript),
            "cjs" => Some(Self::LegacyScript),
            "wasm" => Some(Self::BinaryCode),
            "json" => Some(Self::StructuredData),
            "txt" | "css" | "html" | "htm" | "svg" | "md" => Some(Self::TextAsset),
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "ico" | "bin" | "woff" | "woff2" => {
                Some(Self::BinaryAsset)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide a script's format from its source text.
///
/// ESM markers win over CommonJS markers so a modern module that mentions
/// `require` in a string or comment stays modern. Returns the kind and
/// whether the content was ambiguous (no markers at all), in which case the
/// kind is the legacy default.
#[must_use]
pub fn classify_script(source: &str) -> (ModuleKind, bool) {
    // "import(" without a space is a dynamic import and valid in both
    // formats, so only whole-word static forms count as modern markers.
    let has_modern = source.contains("import ") || source.contains("export ");
    if has_modern {
        return (ModuleKind::ModernScript, false);
    }

    let has_legacy = source.contains("module.exports")
        || source.contains("exports.")
        || source.contains("require(");
    if has_legacy {
        return (ModuleKind::LegacyScript, false);
    }

    (ModuleKind::LegacyScript, true)
}

//! Module content loading.
//!
//! Reads bytes once per identity and decodes them according to kind. Binary
//! kinds stay opaque; nothing here ever transcodes them.

use std::path::Path;

use crate::classify::ModuleKind;
use crate::error::BuildError;
use crate::graph::ModuleIdentity;

/// Loaded module content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawContent {
    /// Decoded character data (scripts, text assets, structured data).
    Text(String),
    /// Opaque bytes (binary assets and binary code).
    Bytes(Vec<u8>),
}

impl RawContent {
    /// The content as bytes, text encoded as UTF-8.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    /// The content as text, `None` for binary payloads.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Bytes(_) => None,
        }
    }
}

/// Read a module's bytes from disk.
///
/// Identities are root-relative, so the read goes through the project root.
pub fn read_bytes(root: &Path, identity: &ModuleIdentity) -> Result<Vec<u8>, BuildError> {
    std::fs::read(root.join(identity.as_str())).map_err(|source| BuildError::Load {
        identity: identity.clone(),
        source,
    })
}

/// Decode bytes as UTF-8 text.
pub fn decode_text(identity: &ModuleIdentity, bytes: Vec<u8>) -> Result<String, BuildError> {
    String::from_utf8(bytes).map_err(|_| BuildError::Decode {
        identity: identity.clone(),
    })
}

/// Decode bytes for a module whose kind is already known.
///
/// Structured data is parsed once here so malformed JSON fails the build at
/// load time instead of surfacing inside the runtime loader.
pub fn decode_content(
    identity: &ModuleIdentity,
    kind: ModuleKind,
    bytes: Vec<u8>,
) -> Result<RawContent, BuildError> {
    match kind {
        ModuleKind::BinaryCode | ModuleKind::BinaryAsset => Ok(RawContent::Bytes(bytes)),
        ModuleKind::StructuredData => {
            let text = decode_text(identity, bytes)?;
            serde_json::from_str::<serde_json::Value>(&text).map_err(|source| {
                BuildError::Parse {
                    identity: identity.clone(),
                    source,
                }
            })?;
            Ok(RawContent::Text(text))
        }
        ModuleKind::ModernScript | ModuleKind::LegacyScript | ModuleKind::TextAsset => {
            Ok(RawContent::Text(decode_text(identity, bytes)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> ModuleIdentity {
        ModuleIdentity::from_rooted(s)
    }

    #[test]
    fn test_decode_binary_stays_opaque() {
        let bytes = vec![0u8, 1, 2, 10];
        let content = decode_content(&ident("blob.bin"), ModuleKind::BinaryAsset, bytes.clone())
            .unwrap();
        assert_eq!(content, RawContent::Bytes(bytes));
    }

    #[test]
    fn test_decode_invalid_utf8_binary_ok() {
        // Bytes that are not UTF-8 are fine for binary kinds.
        let bytes = vec![0xff, 0xfe, 0x00];
        let content =
            decode_content(&ident("mod.wasm"), ModuleKind::BinaryCode, bytes.clone()).unwrap();
        assert_eq!(content.as_bytes(), &bytes[..]);
    }

    #[test]
    fn test_decode_invalid_utf8_text_fails() {
        let err = decode_content(&ident("notes.txt"), ModuleKind::TextAsset, vec![0xff, 0xfe])
            .unwrap_err();
        assert!(matches!(err, BuildError::Decode { .. }));
    }

    #[test]
    fn test_decode_structured_data_validates() {
        let ok = decode_content(
            &ident("config.json"),
            ModuleKind::StructuredData,
            br#"{"name": "en"}"#.to_vec(),
        );
        assert!(ok.is_ok());

        let err = decode_content(
            &ident("config.json"),
            ModuleKind::StructuredData,
            b"{not json".to_vec(),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Parse { .. }));
    }

    #[test]
    fn test_read_missing_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_bytes(dir.path(), &ident("missing.mjs")).unwrap_err();
        assert!(matches!(err, BuildError::Load { .. }));
    }
}

//! Bundle assembly and the binary container format.
//!
//! A bundle is a single artifact holding every module the traversal
//! discovered: decoded text payloads inline in a JSON manifest, binary
//! payloads in a trailing byte segment, plus the dependency edges, the
//! static initialization order, and any interop shims. The container
//! layout is `magic | version | header length | JSON header | payload`.

use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::classify::ModuleKind;
use crate::error::BuildError;
use crate::graph::{EdgeKind, ModuleGraph, ModuleIdentity};
use crate::interop::ShimRecord;
use crate::load::RawContent;

/// First four bytes of every bundle container.
pub const BUNDLE_MAGIC: &[u8; 4] = b"GNTY";

/// Version stamp for the container layout. Readers reject anything else.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Where a module's payload lives inside the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadRef {
    /// Decoded text carried directly in the manifest.
    Inline(String),
    /// Byte range into the container's payload segment.
    Segment { offset: u64, len: u64 },
}

/// One module in the bundle manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub identity: ModuleIdentity,
    pub kind: ModuleKind,
    pub payload: PayloadRef,
}

/// One dependency edge, recorded by identity instead of node ID so the
/// bundle is self-describing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: ModuleIdentity,
    pub specifier: String,
    pub to: ModuleIdentity,
    pub kind: EdgeKind,
}

/// A fully assembled bundle.
///
/// The manifest lists modules in discovery order. `static_order` is the
/// initialization sequence for the static closure of the entry, with the
/// entry last. `payload` holds the concatenated binary segments and is
/// not part of the JSON header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub entry: ModuleIdentity,
    pub manifest: Vec<ManifestRecord>,
    pub static_order: Vec<ModuleIdentity>,
    pub edges: Vec<EdgeRecord>,
    pub interops: Vec<ShimRecord>,
    /// Content fingerprint over everything that affects runtime behavior.
    pub fingerprint: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

fn container(reason: impl Into<String>) -> BuildError {
    BuildError::Container {
        reason: reason.into(),
    }
}

/// Assemble a bundle from a completed graph and its interop shims.
///
/// Text payloads are inlined, binary payloads are appended to the payload
/// segment in discovery order, so two identical graphs produce identical
/// bundles byte for byte.
pub fn emit(graph: &ModuleGraph, interops: Vec<ShimRecord>) -> Result<Bundle, BuildError> {
    let entry_id = graph
        .entry()
        .ok_or_else(|| BuildError::internal("cannot emit a bundle without an entry module"))?;
    let entry = graph.identity_of(entry_id).clone();

    let mut manifest = Vec::with_capacity(graph.len());
    let mut payload: Vec<u8> = Vec::new();
    for (_, record) in graph.iter() {
        let payload_ref = match &record.content {
            RawContent::Text(text) => PayloadRef::Inline(text.clone()),
            RawContent::Bytes(bytes) => {
                let offset = payload.len() as u64;
                payload.extend_from_slice(bytes);
                PayloadRef::Segment {
                    offset,
                    len: bytes.len() as u64,
                }
            }
        };
        manifest.push(ManifestRecord {
            identity: record.identity.clone(),
            kind: record.kind,
            payload: payload_ref,
        });
    }

    let static_order: Vec<ModuleIdentity> = graph
        .static_order()
        .iter()
        .map(|&id| graph.identity_of(id).clone())
        .collect();

    let edges: Vec<EdgeRecord> = graph
        .edges()
        .iter()
        .map(|edge| EdgeRecord {
            from: graph.identity_of(edge.from).clone(),
            specifier: edge.specifier.clone(),
            to: graph.identity_of(edge.to).clone(),
            kind: edge.kind,
        })
        .collect();

    let fingerprint = fingerprint(&entry, &manifest, &static_order, &edges, &interops, &payload);

    Ok(Bundle {
        entry,
        manifest,
        static_order,
        edges,
        interops,
        fingerprint,
        payload,
    })
}

/// Hash of a canonical encoding of the bundle contents.
///
/// Record encodings are computed in parallel and concatenated in manifest
/// order, so the digest only depends on content, never on scheduling.
fn fingerprint(
    entry: &ModuleIdentity,
    manifest: &[ManifestRecord],
    static_order: &[ModuleIdentity],
    edges: &[EdgeRecord],
    interops: &[ShimRecord],
    payload: &[u8],
) -> String {
    let record_chunks: Vec<Vec<u8>> = manifest.par_iter().map(encode_record).collect();

    let chunk_total: usize = record_chunks.iter().map(Vec::len).sum();
    let mut buf = Vec::with_capacity(chunk_total + payload.len() + 256);

    buf.extend_from_slice(b"gantry-bundle-v1\0");
    buf.extend_from_slice(b"entry:");
    push_str_field(&mut buf, entry.as_str());

    push_count(&mut buf, manifest.len());
    for chunk in &record_chunks {
        buf.extend_from_slice(chunk);
    }

    push_count(&mut buf, static_order.len());
    for identity in static_order {
        push_str_field(&mut buf, identity.as_str());
    }

    push_count(&mut buf, edges.len());
    for edge in edges {
        push_str_field(&mut buf, edge.from.as_str());
        push_str_field(&mut buf, &edge.specifier);
        push_str_field(&mut buf, edge.to.as_str());
        buf.push(match edge.kind {
            EdgeKind::Static => 0,
            EdgeKind::Dynamic => 1,
        });
    }

    push_count(&mut buf, interops.len());
    for shim in interops {
        push_str_field(&mut buf, shim.target.as_str());
        push_str_field(&mut buf, &shim.source);
    }

    push_count(&mut buf, payload.len());
    buf.extend_from_slice(payload);

    gantry_util::hash::blake3_bytes(&buf)
}

fn encode_record(record: &ManifestRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(record.identity.as_str().len() + 64);
    push_str_field(&mut buf, record.identity.as_str());
    push_str_field(&mut buf, record.kind.as_str());
    match &record.payload {
        PayloadRef::Inline(text) => {
            buf.push(0);
            push_count(&mut buf, text.len());
            buf.extend_from_slice(text.as_bytes());
        }
        PayloadRef::Segment { offset, len } => {
            buf.push(1);
            buf.extend_from_slice(&offset.to_le_bytes());
            buf.extend_from_slice(&len.to_le_bytes());
        }
    }
    buf
}

fn push_str_field(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
}

fn push_count(buf: &mut Vec<u8>, count: usize) {
    buf.extend_from_slice(&(count as u64).to_le_bytes());
}

impl Bundle {
    /// Encode the bundle into its single-artifact container form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BuildError> {
        let header = serde_json::to_vec(self)
            .map_err(|e| BuildError::internal(format!("failed to encode bundle header: {e}")))?;

        let mut out = Vec::with_capacity(16 + header.len() + self.payload.len());
        out.extend_from_slice(BUNDLE_MAGIC);
        out.extend_from_slice(&BUNDLE_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(header.len() as u64).to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Decode a container produced by [`Bundle::to_bytes`].
    ///
    /// Every length is bounds-checked before use, so arbitrary input fails
    /// with a [`BuildError::Container`] instead of a panic.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BuildError> {
        let magic = bytes
            .get(..4)
            .ok_or_else(|| container("truncated before magic"))?;
        if magic != BUNDLE_MAGIC {
            return Err(container("not a bundle: bad magic"));
        }

        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(
            bytes
                .get(4..8)
                .ok_or_else(|| container("truncated before version"))?,
        );
        let version = u32::from_le_bytes(version_bytes);
        if version != BUNDLE_FORMAT_VERSION {
            return Err(container(format!(
                "unsupported container version {version}, expected {BUNDLE_FORMAT_VERSION}"
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(
            bytes
                .get(8..16)
                .ok_or_else(|| container("truncated before header length"))?,
        );
        let header_len = usize::try_from(u64::from_le_bytes(len_bytes))
            .map_err(|_| container("header length does not fit in memory"))?;
        let header_end = 16usize
            .checked_add(header_len)
            .ok_or_else(|| container("header length overflows"))?;

        let header = bytes
            .get(16..header_end)
            .ok_or_else(|| container("truncated inside header"))?;
        let mut bundle: Bundle = serde_json::from_slice(header)
            .map_err(|e| container(format!("header is not valid JSON: {e}")))?;

        bundle.payload = bytes[header_end..].to_vec();
        Ok(bundle)
    }

    /// Write the container to disk, replacing any existing file atomically.
    pub fn write_to(&self, path: &Path) -> Result<(), BuildError> {
        let bytes = self.to_bytes()?;
        gantry_util::fs::atomic_write(path, &bytes)?;
        Ok(())
    }

    /// Read a container back from disk.
    pub fn read_from(path: &Path) -> Result<Self, BuildError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

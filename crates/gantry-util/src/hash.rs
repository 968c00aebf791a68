/// Compute the BLAKE3 hash of a byte slice, returned as a hex string.
#[must_use]
pub fn blake3_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

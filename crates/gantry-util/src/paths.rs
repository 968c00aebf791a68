use std::path::Path;

/// Render a path with forward slashes regardless of platform.
///
/// Module identities and manifest records must compare and serialize the
/// same way on every OS, so all stored paths go through this.
#[must_use]
pub fn normalize_slashes(path: &Path) -> String {
    let s = path.to_string_lossy();
    if s.contains('\\') {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    }
}

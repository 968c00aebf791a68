//! Module reference scanner.
//!
//! Finds import/require/export-from specifiers and the export surface of a
//! script without full parsing. Comments are skipped; line numbers are
//! best-effort.

use rustc_hash::FxHashSet;

use crate::graph::EdgeKind;

/// How a reference was written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// `import ... from "x"` or `import "x"`.
    EsmImport,
    /// `export ... from "x"`.
    EsmExportFrom,
    /// `require("x")`.
    CjsRequire,
    /// `import("x")`, instantiated on demand.
    DynamicImport,
}

impl RefKind {
    #[must_use]
    pub fn is_dynamic(self) -> bool {
        matches!(self, Self::DynamicImport)
    }

    #[must_use]
    pub fn edge_kind(self) -> EdgeKind {
        if self.is_dynamic() {
            EdgeKind::Dynamic
        } else {
            EdgeKind::Static
        }
    }
}

/// Prefix and suffix of a dynamic template specifier with one hole,
/// e.g. `./lang/${code}.json` gives `./lang/` and `.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternParts {
    pub prefix: String,
    pub suffix: String,
}

/// One reference found in source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Specifier exactly as written, template text included.
    pub specifier: String,
    pub kind: RefKind,
    /// Line number (1-indexed, best-effort).
    pub line: Option<u32>,
    /// Set for dynamic template specifiers with exactly one hole.
    pub pattern: Option<PatternParts>,
}

/// A dynamic reference the scanner recognized but cannot enumerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedRef {
    pub specifier: String,
    pub line: Option<u32>,
}

/// Everything one scan pass found.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub refs: Vec<Reference>,
    pub unsupported: Vec<UnsupportedRef>,
}

/// The named exports a script declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSurface {
    /// Named exports in first-appearance order, deduplicated.
    pub names: Vec<String>,
    /// Number of default-export declarations. More than one is a conflict
    /// that surfaces when the module is crossed by a format boundary.
    pub default_count: usize,
    /// Specifiers of `export * from` re-exports, to be expanded through the
    /// graph once targets are known.
    pub star_from: Vec<String>,
}

/// What one import statement scan produced.
#[derive(Debug)]
struct FoundImport {
    specifier: String,
    end: usize,
    dynamic: bool,
    template: bool,
}

/// Scan source code for module references.
///
/// Returns references in first-appearance order, deduplicated by
/// (specifier, static-vs-dynamic) so one specifier can appear both as a
/// static and as a dynamic reference.
#[must_use]
pub fn scan_references(source: &str) -> ScanResult {
    let mut result = ScanResult::default();
    let mut seen: FxHashSet<(String, bool)> = FxHashSet::default();
    let mut line_num: u32 = 1;
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        if chars[i] == '\n' {
            line_num += 1;
            i += 1;
            continue;
        }

        // Skip single-line comments
        if i + 1 < len && chars[i] == '/' && chars[i + 1] == '/' {
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        // Skip block comments
        if i + 1 < len && chars[i] == '/' && chars[i + 1] == '*' {
            i += 2;
            while i + 1 < len && !(chars[i] == '*' && chars[i + 1] == '/') {
                if chars[i] == '\n' {
                    line_num += 1;
                }
                i += 1;
            }
            i += 2;
            continue;
        }

        if matches_keyword(&chars, i, "import") {
            let start_i = i;
            i += 6;
            if let Some(found) = scan_import_statement(&chars, i, &mut line_num) {
                let end = found.end;
                record_import(&mut result, &mut seen, found, line_num);
                i = end;
                continue;
            }
            i = start_i + 1;
            continue;
        }

        if matches_keyword(&chars, i, "export") {
            let start_i = i;
            i += 6;
            if let Some((spec, end)) = scan_export_from(&chars, i, &mut line_num) {
                if !spec.is_empty() && seen.insert((spec.clone(), false)) {
                    result.refs.push(Reference {
                        specifier: spec,
                        kind: RefKind::EsmExportFrom,
                        line: Some(line_num),
                        pattern: None,
                    });
                }
                i = end;
                continue;
            }
            i = start_i + 1;
            continue;
        }

        if matches_keyword(&chars, i, "require") {
            let start_i = i;
            i += 7;
            if let Some((spec, end)) = scan_require_call(&chars, i) {
                if !spec.is_empty() && seen.insert((spec.clone(), false)) {
                    result.refs.push(Reference {
                        specifier: spec,
                        kind: RefKind::CjsRequire,
                        line: Some(line_num),
                        pattern: None,
                    });
                }
                i = end;
                continue;
            }
            i = start_i + 1;
            continue;
        }

        i += 1;
    }

    result
}

fn record_import(
    result: &mut ScanResult,
    seen: &mut FxHashSet<(String, bool)>,
    found: FoundImport,
    line_num: u32,
) {
    let FoundImport {
        specifier,
        dynamic,
        template,
        ..
    } = found;
    if specifier.is_empty() {
        return;
    }

    // A template hole makes the target enumerable only by pattern expansion.
    if dynamic && template && specifier.contains("${") {
        match split_pattern(&specifier) {
            Some(pattern) => {
                if seen.insert((specifier.clone(), true)) {
                    result.refs.push(Reference {
                        specifier,
                        kind: RefKind::DynamicImport,
                        line: Some(line_num),
                        pattern: Some(pattern),
                    });
                }
            }
            None => result.unsupported.push(UnsupportedRef {
                specifier,
                line: Some(line_num),
            }),
        }
        return;
    }

    let kind = if dynamic {
        RefKind::DynamicImport
    } else {
        RefKind::EsmImport
    };
    if seen.insert((specifier.clone(), dynamic)) {
        result.refs.push(Reference {
            specifier,
            kind,
            line: Some(line_num),
            pattern: None,
        });
    }
}

/// Split a template specifier around its single `${...}` hole.
///
/// Returns `None` when the hole never closes or there is more than one.
fn split_pattern(spec: &str) -> Option<PatternParts> {
    let open = spec.find("${")?;
    let close = open + spec[open..].find('}')?;
    if spec[open + 2..].contains("${") {
        return None;
    }
    Some(PatternParts {
        prefix: spec[..open].to_string(),
        suffix: spec[close + 1..].to_string(),
    })
}

/// Check if chars at position match a keyword (with word boundary).
fn matches_keyword(chars: &[char], pos: usize, keyword: &str) -> bool {
    let kw: Vec<char> = keyword.chars().collect();
    let len = kw.len();

    if pos + len > chars.len() {
        return false;
    }

    if pos > 0 && (chars[pos - 1].is_alphanumeric() || chars[pos - 1] == '_') {
        return false;
    }

    for (j, &c) in kw.iter().enumerate() {
        if chars[pos + j] != c {
            return false;
        }
    }

    if pos + len < chars.len() && (chars[pos + len].is_alphanumeric() || chars[pos + len] == '_') {
        return false;
    }

    true
}

/// Scan a quoted string starting at `start`, which must point at the quote.
/// Returns the string content and the position after the closing quote.
fn scan_string(chars: &[char], start: usize) -> Option<(String, usize)> {
    let len = chars.len();
    let quote = *chars.get(start)?;
    if quote != '"' && quote != '\'' && quote != '`' {
        return None;
    }
    let mut i = start + 1;
    let spec_start = i;
    while i < len && chars[i] != quote {
        if chars[i] == '\\' && i + 1 < len {
            i += 2;
            continue;
        }
        i += 1;
    }
    let spec: String = chars[spec_start..i].iter().collect();
    Some((spec, i + 1))
}

fn skip_ws(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

/// Scan an import statement body: either `("...")` for a dynamic import or
/// `... from "..."` / a bare side-effect string for a static one.
fn scan_import_statement(
    chars: &[char],
    start: usize,
    line_num: &mut u32,
) -> Option<FoundImport> {
    let len = chars.len();
    let mut i = start;

    while i < len && chars[i].is_whitespace() {
        if chars[i] == '\n' {
            *line_num += 1;
        }
        i += 1;
    }

    // Dynamic import: import("...")
    if i < len && chars[i] == '(' {
        i = skip_ws(chars, i + 1);
        let template = chars.get(i) == Some(&'`');
        let (specifier, end) = scan_string(chars, i)?;
        return Some(FoundImport {
            specifier,
            end,
            dynamic: true,
            template,
        });
    }

    // Regular import: scan until "from" or a bare side-effect string
    while i < len {
        if chars[i] == '\n' {
            *line_num += 1;
        }

        if matches_keyword(chars, i, "from") {
            i = skip_ws(chars, i + 4);
            if let Some((specifier, end)) = scan_string(chars, i) {
                return Some(FoundImport {
                    specifier,
                    end,
                    dynamic: false,
                    template: false,
                });
            }
            if i >= len {
                break;
            }
        }

        // Side-effect import: import "specifier"
        if chars[i] == '"' || chars[i] == '\'' || chars[i] == '`' {
            let (specifier, end) = scan_string(chars, i)?;
            return Some(FoundImport {
                specifier,
                end,
                dynamic: false,
                template: false,
            });
        }

        if chars[i] == ';' {
            break;
        }

        i += 1;

        // Safety limit to avoid runaway scans
        if i > start + 1000 {
            break;
        }
    }

    None
}

/// Scan an `export ... from "..."` statement.
fn scan_export_from(chars: &[char], start: usize, line_num: &mut u32) -> Option<(String, usize)> {
    let len = chars.len();
    let mut i = start;

    let limit = (start + 500).min(len);
    while i < limit {
        if chars[i] == '\n' {
            *line_num += 1;
        }

        if matches_keyword(chars, i, "from") {
            i = skip_ws(chars, i + 4);
            if let Some(found) = scan_string(chars, i) {
                return Some(found);
            }
            if i >= limit {
                break;
            }
        }

        // A statement boundary before "from" means this export has no
        // specifier (a declaration export).
        if chars[i] == ';' {
            return None;
        }

        i += 1;
    }

    None
}

/// Scan a `require("...")` call.
fn scan_require_call(chars: &[char], start: usize) -> Option<(String, usize)> {
    let len = chars.len();
    let mut i = start;

    while i < len && chars[i].is_whitespace() && chars[i] != '\n' {
        i += 1;
    }

    if i >= len || chars[i] != '(' {
        return None;
    }
    i += 1;

    while i < len && chars[i].is_whitespace() && chars[i] != '\n' {
        i += 1;
    }

    let (spec, mut i) = scan_string(chars, i)?;
    if spec.contains('\n') {
        // Newline in string, likely not a real require
        return None;
    }

    while i < len && chars[i].is_whitespace() && chars[i] != '\n' {
        i += 1;
    }

    if i < len && chars[i] == ')' {
        i += 1;
        return Some((spec, i));
    }

    // Even without closing paren, we got the specifier
    Some((spec, i))
}

/// Scan source code for its export surface.
///
/// Handles declaration exports (`const`/`let`/`var`/`function`/`class`),
/// default exports, brace lists with `as` renames, `export * from` and
/// `export * as ns from`.
#[must_use]
pub fn scan_exports(source: &str) -> ExportSurface {
    let mut surface = ExportSurface::default();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        // Skip single-line comments
        if i + 1 < len && chars[i] == '/' && chars[i + 1] == '/' {
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        // Skip block comments
        if i + 1 < len && chars[i] == '/' && chars[i + 1] == '*' {
            i += 2;
            while i + 1 < len && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            i += 2;
            continue;
        }

        if !matches_keyword(&chars, i, "export") {
            i += 1;
            continue;
        }
        let statement_start = i;
        i = skip_ws(&chars, i + 6);

        if matches_keyword(&chars, i, "default") {
            surface.default_count += 1;
            i += 7;
            continue;
        }

        if i < len && chars[i] == '{' {
            i = scan_brace_list(&chars, i, &mut surface, &mut seen);
            continue;
        }

        if i < len && chars[i] == '*' {
            let mut j = skip_ws(&chars, i + 1);
            if matches_keyword(&chars, j, "as") {
                j = skip_ws(&chars, j + 2);
                if let Some((name, end)) = read_identifier(&chars, j) {
                    push_name(&mut surface, &mut seen, name);
                    i = end;
                    continue;
                }
            } else if matches_keyword(&chars, j, "from") {
                j = skip_ws(&chars, j + 4);
                if let Some((spec, end)) = scan_string(&chars, j) {
                    surface.star_from.push(spec);
                    i = end;
                    continue;
                }
            }
            i = statement_start + 7;
            continue;
        }

        let declared = if matches_keyword(&chars, i, "const") {
            Some(i + 5)
        } else if matches_keyword(&chars, i, "let") || matches_keyword(&chars, i, "var") {
            Some(i + 3)
        } else if matches_keyword(&chars, i, "class") {
            Some(i + 5)
        } else if matches_keyword(&chars, i, "function") {
            Some(skip_generator_star(&chars, i + 8))
        } else if matches_keyword(&chars, i, "async") {
            let j = skip_ws(&chars, i + 5);
            if matches_keyword(&chars, j, "function") {
                Some(skip_generator_star(&chars, j + 8))
            } else {
                None
            }
        } else {
            None
        };

        match declared.and_then(|at| read_identifier(&chars, skip_ws(&chars, at))) {
            Some((name, end)) => {
                push_name(&mut surface, &mut seen, name);
                i = end;
            }
            None => i = statement_start + 7,
        }
    }

    surface
}

fn skip_generator_star(chars: &[char], i: usize) -> usize {
    let i = skip_ws(chars, i);
    if chars.get(i) == Some(&'*') {
        skip_ws(chars, i + 1)
    } else {
        i
    }
}

fn push_name(surface: &mut ExportSurface, seen: &mut FxHashSet<String>, name: String) {
    if name == "default" {
        surface.default_count += 1;
    } else if seen.insert(name.clone()) {
        surface.names.push(name);
    }
}

/// Parse `{ a, b as c, default as d }`, returning the position after `}`.
fn scan_brace_list(
    chars: &[char],
    start: usize,
    surface: &mut ExportSurface,
    seen: &mut FxHashSet<String>,
) -> usize {
    let len = chars.len();
    let mut i = start + 1;
    let mut item = String::new();
    let mut items: Vec<String> = Vec::new();

    while i < len && chars[i] != '}' {
        if chars[i] == ',' {
            items.push(std::mem::take(&mut item));
        } else {
            item.push(chars[i]);
        }
        i += 1;
        if i > start + 500 {
            break;
        }
    }
    items.push(item);
    if i < len && chars[i] == '}' {
        i += 1;
    }

    for raw in items {
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        let name = match tokens.as_slice() {
            [single] => *single,
            [_, "as", renamed] => *renamed,
            _ => continue,
        };
        push_name(surface, seen, name.to_string());
    }

    i
}

fn read_identifier(chars: &[char], start: usize) -> Option<(String, usize)> {
    let len = chars.len();
    let first = *chars.get(start)?;
    if !(first.is_alphabetic() || first == '_' || first == '$') {
        return None;
    }
    let mut i = start;
    let mut name = String::new();
    while i < len && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
        name.push(chars[i]);
        i += 1;
    }
    Some((name, i))
}

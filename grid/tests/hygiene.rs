//! Source hygiene for the grid crate.
//!
//! The engine runs inside the browser where a panic kills the page, and its
//! output is replayed into a shared store, so these tests scan production
//! source (test files excluded) for the patterns that break either. Budgets
//! only go down.

use std::fs;
use std::path::Path;

struct SourceFile {
    /// File name under `src/`, e.g. `engine.rs`.
    name: String,
    content: String,
}

impl SourceFile {
    fn count(&self, pattern: &str) -> usize {
        self.content.lines().filter(|line| line.contains(pattern)).count()
    }
}

fn source_files() -> Vec<SourceFile> {
    let Ok(entries) = fs::read_dir(Path::new("src")) else {
        return Vec::new();
    };
    let mut files: Vec<SourceFile> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|e| e == "rs"))
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            if name.ends_with("_test.rs") {
                return None;
            }
            let content = fs::read_to_string(&path).ok()?;
            Some(SourceFile { name, content })
        })
        .collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}

/// Per-file hits of `pattern`, skipping files without any.
fn hits(files: &[SourceFile], pattern: &str) -> Vec<(String, usize)> {
    files
        .iter()
        .map(|f| (f.name.clone(), f.count(pattern)))
        .filter(|(_, n)| *n > 0)
        .collect()
}

fn report(hits: &[(String, usize)]) -> String {
    hits.iter().map(|(name, n)| format!("  src/{name}: {n}")).collect::<Vec<_>>().join("\n")
}

#[test]
fn sources_are_found() {
    let names: Vec<String> = source_files().into_iter().map(|f| f.name).collect();
    for expected in ["engine.rs", "strokes.rs", "sync.rs", "wasm.rs"] {
        assert!(names.iter().any(|n| n == expected), "missing src/{expected}; run from the crate root");
    }
}

// =============================================================================
// PANICS AND DISCARDS
// =============================================================================

/// A panic inside a wasm call aborts the host page.
const PANICS: &[&str] = &[".unwrap()", ".expect(", "panic!(", "unreachable!(", "todo!(", "unimplemented!("];

/// A dropped error here means a write that silently never reaches the store.
const DISCARDS: &[&str] = &["let _ =", ".ok();"];

#[test]
fn no_panics_in_production_source() {
    let files = source_files();
    for pattern in PANICS {
        let found = hits(&files, pattern);
        assert!(found.is_empty(), "{pattern} in production source:\n{}", report(&found));
    }
}

#[test]
fn no_discarded_results() {
    let files = source_files();
    for pattern in DISCARDS {
        let found = hits(&files, pattern);
        assert!(found.is_empty(), "`{pattern}` discards a result:\n{}", report(&found));
    }
}

/// Defaulting hides missing data. The one allowed use fills an absent error
/// message on a server error frame.
const MAX_UNWRAP_OR_DEFAULT: usize = 1;

#[test]
fn unwrap_or_default_budget() {
    let found = hits(&source_files(), ".unwrap_or_default()");
    let total: usize = found.iter().map(|(_, n)| n).sum();
    assert!(
        total <= MAX_UNWRAP_OR_DEFAULT,
        "unwrap_or_default budget exceeded: {total} > {MAX_UNWRAP_OR_DEFAULT}\n{}",
        report(&found)
    );
}

// =============================================================================
// NUMERIC CASTS
// =============================================================================

/// Files allowed to silence clippy's cast lints, and how often. Pixel and
/// percent math lives in `geom`, glyph resampling in `recognize`, and the
/// host clock conversion in `wasm`.
const CAST_ALLOWS: &[(&str, usize)] = &[("geom.rs", 4), ("recognize.rs", 2), ("wasm.rs", 1)];

#[test]
fn cast_allows_stay_in_numeric_modules() {
    for (name, n) in hits(&source_files(), "#[allow(clippy::cast_") {
        let budget = CAST_ALLOWS.iter().find(|(f, _)| *f == name).map_or(0, |(_, b)| *b);
        assert!(n <= budget, "src/{name} silences cast lints {n} times, budget {budget}");
    }
}

// =============================================================================
// DETERMINISM AND LAYERING
// =============================================================================

/// The engine takes `now_ms` from its caller; only the wasm facade reads a clock.
#[test]
fn only_the_facade_reads_the_clock() {
    let files = source_files();
    for pattern in ["Date::now", "SystemTime", "Instant::now"] {
        let found: Vec<_> = hits(&files, pattern).into_iter().filter(|(name, _)| name != "wasm.rs").collect();
        assert!(found.is_empty(), "{pattern} outside the wasm facade:\n{}", report(&found));
    }
}

/// Browser bindings stay behind the facade so the rest builds and tests natively.
#[test]
fn browser_bindings_stay_in_facade() {
    let files = source_files();
    for pattern in ["wasm_bindgen", "js_sys"] {
        let found: Vec<_> = hits(&files, pattern)
            .into_iter()
            .filter(|(name, _)| name != "wasm.rs" && name != "lib.rs")
            .collect();
        assert!(found.is_empty(), "{pattern} outside the wasm facade:\n{}", report(&found));
    }
}

/// Stroke and grid limits are shared with the server's validation; keep them
/// in one place so the two sides cannot drift apart.
#[test]
fn numeric_limits_live_in_consts() {
    for file in source_files().iter().filter(|f| f.name != "consts.rs") {
        for ty in ["usize", "i64", "f64", "u64", "u32"] {
            let pattern = format!(": {ty} =");
            let n = file.content.lines().filter(|l| l.contains("const ") && l.contains(&pattern)).count();
            assert_eq!(n, 0, "src/{} declares a numeric `{ty}` constant; move it to consts.rs", file.name);
        }
    }
}

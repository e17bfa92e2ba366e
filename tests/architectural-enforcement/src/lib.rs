//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - The conductor core has no UI framework dependency
//! - No sleeping or blocking I/O in async production code
//!
//! The helpers here walk the workspace sources and strip test code, so each
//! rule only has to say what a violation looks like.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["conductor/core/src", "tui/src"];

/// Workspace root (two levels above this crate)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// A production source file with its test modules removed
#[derive(Debug)]
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    /// Lines before the first `#[cfg(test)]`
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Format a violation at a 0-based line index
    #[must_use]
    pub fn violation(&self, idx: usize, what: &str) -> String {
        format!(
            "{}:{} - {}: {}",
            self.path.display(),
            idx + 1,
            what,
            self.lines[idx].trim()
        )
    }
}

/// Every `.rs` file under `dir`, with test code stripped
#[must_use]
pub fn production_sources(dir: &str) -> Vec<SourceFile> {
    let root = workspace_root();
    let base = root.join(dir);
    if !base.exists() {
        return Vec::new();
    }

    let mut files: Vec<SourceFile> = walkdir::WalkDir::new(&base)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter_map(|entry| {
            let content = fs::read_to_string(entry.path()).ok()?;
            let lines = content
                .lines()
                .take_while(|line| line.trim() != "#[cfg(test)]")
                .map(str::to_string)
                .collect();
            let path = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_path_buf();
            Some(SourceFile { path, lines })
        })
        .collect();

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

/// Code portion of a line (before any `//` comment)
#[must_use]
pub fn code_part(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with("//") {
        return "";
    }
    line.split(" //").next().unwrap_or(line)
}

/// For each line, whether it sits inside the body of an `async fn`
///
/// Tracks brace depth from the line that declares the function. Braces in
/// string literals are rare enough in this codebase to ignore.
#[must_use]
pub fn async_body_mask(lines: &[String]) -> Vec<bool> {
    let mut mask = vec![false; lines.len()];
    let mut depth: i64 = 0;
    let mut in_async = false;
    let mut pending = false;

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if !in_async && (code.contains("async fn ") || code.contains("async move")) {
            pending = true;
        }

        for c in code.chars() {
            match c {
                '{' => {
                    if pending {
                        in_async = true;
                        pending = false;
                        depth = 0;
                    }
                    if in_async {
                        depth += 1;
                    }
                }
                // Bodiless trait method
                ';' if pending => pending = false,
                '}' if in_async => {
                    depth -= 1;
                    if depth == 0 {
                        in_async = false;
                        mask[idx] = true;
                    }
                }
                _ => {}
            }
        }

        if in_async {
            mask[idx] = true;
        }
    }

    mask
}

/// Report violations and panic if there are any
///
/// # Panics
///
/// Panics when `violations` is non-empty.
pub fn assert_clean(rule: &str, violations: &[String]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} violation(s) of: {rule}\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &str) -> Vec<String> {
        src.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_workspace_root_has_manifest() {
        assert!(workspace_root().join("Cargo.toml").exists());
    }

    #[test]
    fn test_code_part_drops_comments() {
        assert_eq!(code_part("    // std::fs::read"), "");
        assert_eq!(code_part("let x = 1; // note"), "let x = 1;");
    }

    #[test]
    fn test_async_body_mask() {
        let src = lines(
            "fn sync() {\n    a();\n}\nasync fn run() {\n    if x {\n        b();\n    }\n}\nfn after() {}",
        );
        let mask = async_body_mask(&src);
        assert_eq!(
            mask,
            vec![false, false, false, true, true, true, true, true, false]
        );
    }
}

//! Glob expansion against a workspace root.

use super::escape::escape;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobMode {
    FilesOnly,
    DirectoriesOnly,
    NoExpand,
    ExpandAll,
}

/// Expand `pattern` (raw, unescaped) to matching paths.
///
/// A relative pattern matches under `workspace_root` and yields
/// workspace-relative results; an absolute pattern matches from the
/// filesystem root and yields absolute results. Results are in lexical
/// order, separators normalised to `/`, trailing separators stripped, and
/// each result escaped for template relay.
pub fn expand_glob(workspace_root: &Path, pattern: &str, mode: GlobMode) -> Result<Vec<String>> {
    if mode == GlobMode::NoExpand {
        return Ok(vec![pattern.to_string()]);
    }

    let pattern = pattern.trim();
    let relative = !Path::new(pattern).is_absolute();
    let full_pattern = if relative {
        // the root itself is a literal path, not a pattern
        let root = glob::Pattern::escape(&workspace_root.to_string_lossy());
        format!("{}/{}", root.trim_end_matches(['/', '\\']), pattern)
    } else {
        pattern.to_string()
    };

    let entries = glob::glob(&full_pattern)
        .with_context(|| format!("invalid glob pattern '{}'", pattern))?;

    let mut results = Vec::new();
    for entry in entries {
        let path: PathBuf =
            entry.with_context(|| format!("failed to read a match of '{}'", pattern))?;
        let keep = match mode {
            GlobMode::FilesOnly => path.is_file(),
            GlobMode::DirectoriesOnly => path.is_dir(),
            GlobMode::ExpandAll => true,
            GlobMode::NoExpand => unreachable!(),
        };
        if !keep {
            continue;
        }
        let reported = if relative {
            path.strip_prefix(workspace_root).unwrap_or(&path)
        } else {
            &path
        };
        let mut text = reported.to_string_lossy().replace('\\', "/");
        while text.ends_with('/') {
            text.pop();
        }
        results.push(escape(&text));
    }

    Ok(results)
}

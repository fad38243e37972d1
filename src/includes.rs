//! C/C++ include-dependency analysis.
//!
//! Indexes candidate include directories (non-recursive, files only) and
//! computes, for a translation unit, the subset of those directories its
//! transitive `#include` graph actually needs. Used to trim `-I` sets.
//!
//! Limitations, by design: preprocessor conditionals and macro-formed
//! `#include` directives are ignored, so headers under `#if 0` can enlist
//! extra paths (static over-approximation). Path comparisons are
//! case-sensitive even on case-insensitive filesystems.

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Per-step analyser; all state sits behind one mutex so indexing from
/// parallel file tasks stays consistent.
pub struct IncludeAnalyzer {
    root: PathBuf,
    state: Mutex<AnalyzerState>,
}

#[derive(Default)]
struct AnalyzerState {
    /// basename -> absolute paths of every candidate file with that name
    file_locations: HashMap<String, BTreeSet<PathBuf>>,
    /// enlisted include directories, insertion order preserved
    include_paths: Vec<String>,
    /// file -> Some(direct include dirs) | None when the file is missing
    file_required_paths: HashMap<PathBuf, Option<BTreeSet<String>>>,
    /// file -> headers it includes that were located on disk
    file_dependencies: HashMap<PathBuf, BTreeSet<PathBuf>>,
}

impl IncludeAnalyzer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(AnalyzerState::default()),
        }
    }

    /// Register include directories and index their files. Repeated
    /// enlistment of a directory is a no-op; order of first enlistment is
    /// what `get_paths` results are ordered by.
    pub fn enlist(&self, dirs: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for dir in dirs {
            let key = self.storage_key(dir);
            if state.include_paths.contains(&key) {
                continue;
            }
            let resolved = self.resolve_dir(&key);
            if !resolved.is_dir() {
                // a declared-but-absent directory can never satisfy an include
                state.include_paths.push(key);
                continue;
            }
            let entries = fs::read_dir(&resolved)
                .with_context(|| format!("cannot read include directory '{}'", resolved.display()))?;
            for entry in entries {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                state
                    .file_locations
                    .entry(name)
                    .or_default()
                    .insert(resolved.join(entry.file_name()));
            }
            state.include_paths.push(key);
        }
        Ok(())
    }

    /// The ordered subset of enlisted directories needed by `file` (relative
    /// to `location`) and its transitive includes, or `None` when the seed
    /// file itself is missing.
    pub fn get_paths(&self, location: &Path, file: &str) -> Result<Option<Vec<String>>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let seed = location.join(file);

        self.analyze(&mut state, &seed)?;
        if matches!(state.file_required_paths.get(&seed), Some(None)) {
            return Ok(None);
        }

        // transitive closure over located dependencies
        let mut needed: HashSet<String> = HashSet::new();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut queue = vec![seed];
        while let Some(current) = queue.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            self.analyze(&mut state, &current)?;
            if let Some(Some(direct)) = state.file_required_paths.get(&current) {
                needed.extend(direct.iter().cloned());
            }
            if let Some(deps) = state.file_dependencies.get(&current) {
                queue.extend(deps.iter().cloned());
            }
        }

        Ok(Some(
            state
                .include_paths
                .iter()
                .filter(|p| needed.contains(*p))
                .cloned()
                .collect(),
        ))
    }

    /// Snapshot of the enlisted directories, in enlistment order.
    pub fn enlisted(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .include_paths
            .clone()
    }

    /// An absolute directory inside the root is stored workspace-relative so
    /// matching stays consistent across callers.
    fn storage_key(&self, dir: &str) -> String {
        let normalized = dir.trim().replace('\\', "/");
        let path = Path::new(&normalized);
        if path.is_absolute() {
            if let Ok(rel) = path.strip_prefix(&self.root) {
                return rel.to_string_lossy().replace('\\', "/");
            }
        }
        normalized.trim_end_matches('/').to_string()
    }

    fn resolve_dir(&self, key: &str) -> PathBuf {
        let path = Path::new(key);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Scan one file's includes and record its direct requirements and
    /// located dependencies. Already-analysed files are left untouched.
    fn analyze(&self, state: &mut AnalyzerState, file: &Path) -> Result<()> {
        if state.file_required_paths.contains_key(file) {
            return Ok(());
        }
        if !file.is_file() {
            state.file_required_paths.insert(file.to_path_buf(), None);
            return Ok(());
        }
        let content = fs::read_to_string(file)
            .with_context(|| format!("cannot read '{}'", file.display()))?;

        let mut direct = BTreeSet::new();
        let mut deps = BTreeSet::new();
        let here = file.parent().unwrap_or(Path::new("."));

        for name in scan_includes(&content) {
            // a header next to the includer needs no include path
            let sibling = here.join(&name);
            if sibling.is_file() {
                deps.insert(sibling);
                continue;
            }
            let Some(basename) = Path::new(&name).file_name() else { continue };
            let basename = basename.to_string_lossy().to_string();
            let Some(candidates) = state.file_locations.get(&basename) else {
                continue; // unknown everywhere: a system header, ignored
            };
            // first enlisted path with a matching candidate wins
            let hit = state.include_paths.iter().find_map(|p| {
                let candidate = self.resolve_dir(p).join(&name);
                candidates.contains(&candidate).then_some((p.clone(), candidate))
            });
            if let Some((path, candidate)) = hit {
                direct.insert(path);
                deps.insert(candidate);
            }
        }

        state
            .file_required_paths
            .insert(file.to_path_buf(), Some(direct));
        state.file_dependencies.insert(file.to_path_buf(), deps);
        Ok(())
    }
}

/// Extract `#include` targets, honouring `//` and multi-line `/* */`
/// comments. Only the first non-blank segment of a line is inspected.
pub fn scan_includes(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_block = false;

    for line in content.lines() {
        let mut code = String::new();
        let mut i = 0;
        while i < line.len() {
            if in_block {
                match line[i..].find("*/") {
                    Some(j) => {
                        i += j + 2;
                        in_block = false;
                    }
                    None => i = line.len(),
                }
            } else if line[i..].starts_with("//") {
                break;
            } else if line[i..].starts_with("/*") {
                in_block = true;
                i += 2;
            } else {
                let c = line[i..].chars().next().unwrap_or(' ');
                code.push(c);
                i += c.len_utf8();
            }
        }

        let code = code.trim_start();
        let Some(directive) = code.strip_prefix('#') else { continue };
        let Some(target) = directive.trim_start().strip_prefix("include") else { continue };
        let target = target.trim_start();
        let (open, close) = match target.chars().next() {
            Some('"') => ('"', '"'),
            Some('<') => ('<', '>'),
            _ => continue, // macro-formed include, ignored
        };
        let rest = &target[open.len_utf8()..];
        if let Some(end) = rest.find(close) {
            out.push(rest[..end].to_string());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_basic_includes() {
        let src = "#include \"a.h\"\n#include <b.h>\n  #  include \"c.h\"\n";
        assert_eq!(scan_includes(src), vec!["a.h", "b.h", "c.h"]);
    }

    #[test]
    fn test_scan_line_comments() {
        let src = "// #include \"a.h\"\nint x; // #include \"b.h\"\n#include \"c.h\" // tail\n";
        assert_eq!(scan_includes(src), vec!["c.h"]);
    }

    #[test]
    fn test_scan_block_comments_across_lines() {
        let src = "/* start\n#include \"hidden.h\"\nend */ #include \"seen.h\"\n";
        assert_eq!(scan_includes(src), vec!["seen.h"]);
    }

    #[test]
    fn test_scan_block_comment_opened_mid_line() {
        let src = "int x; /* open\n#include \"hidden.h\"\n*/\n#include \"after.h\"\n";
        assert_eq!(scan_includes(src), vec!["after.h"]);
    }

    #[test]
    fn test_scan_macro_include_ignored() {
        assert!(scan_includes("#include HEADER_MACRO\n").is_empty());
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for sub in ["inc1", "inc2", "inc3", "src"] {
            fs::create_dir(root.join(sub)).unwrap();
        }
        fs::write(root.join("inc1/one.h"), "#include \"two.h\"\n").unwrap();
        fs::write(root.join("inc2/two.h"), "int t;\n").unwrap();
        fs::write(root.join("inc3/unused.h"), "int u;\n").unwrap();
        fs::write(
            root.join("src/main.cpp"),
            "#include \"one.h\"\n#include <cstdio>\nint main() { return 0; }\n",
        )
        .unwrap();
        fs::write(root.join("src/local.h"), "int l;\n").unwrap();
        dir
    }

    #[test]
    fn test_transitive_path_trimming() {
        let dir = tree();
        let analyzer = IncludeAnalyzer::new(dir.path());
        analyzer
            .enlist(&["inc1".into(), "inc2".into(), "inc3".into()])
            .unwrap();
        let paths = analyzer
            .get_paths(&dir.path().join("src"), "main.cpp")
            .unwrap()
            .unwrap();
        assert_eq!(paths, vec!["inc1", "inc2"]);
    }

    #[test]
    fn test_sibling_header_needs_no_path() {
        let dir = tree();
        fs::write(
            dir.path().join("src/main.cpp"),
            "#include \"local.h\"\nint main() {}\n",
        )
        .unwrap();
        let analyzer = IncludeAnalyzer::new(dir.path());
        analyzer.enlist(&["inc1".into(), "inc2".into()]).unwrap();
        let paths = analyzer
            .get_paths(&dir.path().join("src"), "main.cpp")
            .unwrap()
            .unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn test_missing_seed_is_none() {
        let dir = tree();
        let analyzer = IncludeAnalyzer::new(dir.path());
        analyzer.enlist(&["inc1".into()]).unwrap();
        assert!(
            analyzer
                .get_paths(&dir.path().join("src"), "ghost.cpp")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_repeated_calls_are_stable() {
        let dir = tree();
        let analyzer = IncludeAnalyzer::new(dir.path());
        analyzer
            .enlist(&["inc3".into(), "inc1".into(), "inc2".into()])
            .unwrap();
        let first = analyzer
            .get_paths(&dir.path().join("src"), "main.cpp")
            .unwrap()
            .unwrap();
        let second = analyzer
            .get_paths(&dir.path().join("src"), "main.cpp")
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
        // enlistment order, not include order
        assert_eq!(first, vec!["inc1", "inc2"]);
    }

    #[test]
    fn test_include_cycle_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("inc")).unwrap();
        fs::write(root.join("inc/a.h"), "#include \"b.h\"\n").unwrap();
        fs::write(root.join("inc/b.h"), "#include \"a.h\"\n").unwrap();
        fs::write(root.join("main.c"), "#include \"a.h\"\n").unwrap();
        let analyzer = IncludeAnalyzer::new(root);
        analyzer.enlist(&["inc".into()]).unwrap();
        let paths = analyzer.get_paths(root, "main.c").unwrap().unwrap();
        assert_eq!(paths, vec!["inc"]);
    }
}

//! Template expansion engine and variable resolver.
//!
//! Templates are JSON strings in a small mini-language:
//!
//! - `${name}` substitutes a single-valued variable;
//! - `$${name}`, `$${a, b}`, `$${src/**/*.cpp}` produce ordered sequences
//!   (variable, literal list, or glob) that fan out over their enclosing
//!   group;
//! - `(...)` groups a fragment so a multi-value fan-out clones it per value;
//! - `[...]` marks a fragment as a path and applies quoting/normalisation;
//! - `\X` escapes any reserved character.
//!
//! Evaluation is a four-pass rewrite (groups, path groups, single-value
//! variables, multi-value variables) in one of two modes: top-level, which
//! produces a single unescaped string, and sub-template, which may produce a
//! sequence for the caller to fan out over or join.

pub mod brackets;
pub mod escape;
pub mod glob;
pub mod list;

use crate::value::{ResolveCache, ScopeStack, Value, uniq};
use anyhow::{Context, Result, anyhow, bail};
use self::brackets::{BracketMatch, GROUP, MULTI_VAR, PATH_GROUP, SINGLE_VAR, find_matches};
use self::escape::{ESCAPE_CHAR, escape, format_path, unescape};
use self::glob::{GlobMode, expand_glob};
use self::list::{variable_list_join, variable_list_parse};
use std::cell::RefCell;
use std::path::PathBuf;

/// Ambient settings for one expansion call-site.
#[derive(Debug, Clone)]
pub struct ExpandOptions {
    pub workspace_root: PathBuf,
    /// Mode applied when a `$${...}` turns out to be a glob pattern.
    pub glob_mode: GlobMode,
}

impl ExpandOptions {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            glob_mode: GlobMode::ExpandAll,
        }
    }

    pub fn with_glob_mode(mut self, mode: GlobMode) -> Self {
        self.glob_mode = mode;
        self
    }
}

/// While a scope layer's value for `name` is being expanded, lookups of
/// `name` itself see the value accumulated in outer layers instead of
/// recursing.
struct Shadow<'s> {
    name: &'s str,
    outer: Option<&'s Value>,
}

/// Template evaluator over one scope stack, with a per-call-site memo cache.
pub struct Evaluator<'a> {
    scopes: &'a ScopeStack,
    opts: &'a ExpandOptions,
    cache: RefCell<ResolveCache>,
}

impl<'a> Evaluator<'a> {
    pub fn new(scopes: &'a ScopeStack, opts: &'a ExpandOptions) -> Self {
        Self {
            scopes,
            opts,
            cache: RefCell::new(ResolveCache::default()),
        }
    }

    /// Expand a template in top-level mode into a single unescaped string.
    pub fn expand(&self, template: &str) -> Result<String> {
        let value = self
            .expand_passes(template, false, None)
            .with_context(|| format!("while expanding template '{}'", template))?;
        Ok(unescape(&value.join()))
    }

    /// Expand a template in sub-template mode and unescape every item.
    ///
    /// Entry point for list-valued step options such as `fileList`.
    pub fn expand_items(&self, template: &str) -> Result<Vec<String>> {
        let value = self
            .expand_passes(template, true, None)
            .with_context(|| format!("while expanding template '{}'", template))?;
        Ok(value.into_items().iter().map(|s| unescape(s)).collect())
    }

    /// Resolve one variable by name (items remain in escaped template form).
    pub fn resolve_var(&self, name: &str) -> Result<Value> {
        self.resolve(name)
    }

    fn expand_value(&self, text: &str, shadow: Option<&Shadow>) -> Result<Value> {
        self.expand_passes(text, true, shadow)
    }

    fn expand_passes(&self, text: &str, sub: bool, shadow: Option<&Shadow>) -> Result<Value> {
        // pass 1: groups
        let mut out = String::new();
        let mut cursor = 0;
        for m in find_matches(text, &[GROUP], ESCAPE_CHAR)? {
            out.push_str(&text[cursor..m.start]);
            let value = self.expand_value(&m.inner, shadow)?;
            out.push_str(&value.join());
            cursor = m.start + m.outer.len();
        }
        out.push_str(&text[cursor..]);
        let text = out;

        // pass 2: path groups
        let mut out = String::new();
        let mut cursor = 0;
        for m in find_matches(&text, &[PATH_GROUP], ESCAPE_CHAR)? {
            out.push_str(&text[cursor..m.start]);
            let value = self.expand_value(&m.inner, shadow)?;
            let formatted: Vec<String> =
                value.items().iter().map(|p| format_path(p)).collect();
            if sub && value.is_multi() {
                // survive further fan-out in the enclosing sub-template
                out.push_str(&format!("$${{{}}}", variable_list_join(&formatted)));
            } else {
                out.push_str(&formatted.join(" "));
            }
            cursor = m.start + m.outer.len();
        }
        out.push_str(&text[cursor..]);
        let text = out;

        // pass 3: single-value variables
        let mut out = String::new();
        let mut cursor = 0;
        for m in find_matches(&text, &[MULTI_VAR, SINGLE_VAR], ESCAPE_CHAR)? {
            if m.left != SINGLE_VAR.left {
                continue;
            }
            out.push_str(&text[cursor..m.start]);
            let value = self.lookup(m.inner.trim(), shadow)?;
            if sub && value.is_multi() {
                out.push_str(&format!(
                    "$${{{}}}",
                    variable_list_join(value.items())
                ));
            } else {
                out.push_str(&value.join());
            }
            cursor = m.start + m.outer.len();
        }
        out.push_str(&text[cursor..]);
        let text = out;

        // pass 4: multi-value variables
        let matches: Vec<BracketMatch> = find_matches(&text, &[MULTI_VAR, SINGLE_VAR], ESCAPE_CHAR)?
            .into_iter()
            .filter(|m| m.left == MULTI_VAR.left)
            .collect();

        if matches.is_empty() {
            return Ok(Value::Single(text));
        }

        if !sub {
            // top level: each occurrence joins in situ
            let mut out = String::new();
            let mut cursor = 0;
            for m in &matches {
                out.push_str(&text[cursor..m.start]);
                out.push_str(&self.multi_values(&m.inner, shadow)?.join(" "));
                cursor = m.start + m.outer.len();
            }
            out.push_str(&text[cursor..]);
            return Ok(Value::Single(out));
        }

        // sub-template: at most one distinct variable may fan out
        let mut distinct: Vec<(&str, Vec<String>)> = Vec::new();
        for m in &matches {
            if !distinct.iter().any(|(outer, _)| *outer == m.outer) {
                distinct.push((&m.outer, self.multi_values(&m.inner, shadow)?));
            }
        }

        let mut fanned = distinct.iter().filter(|(_, vs)| vs.len() != 1);
        let fan = fanned.next();
        if fanned.next().is_some() {
            bail!(
                "sub-template '{}' contains more than one multi-valued variable",
                text
            );
        }

        let mut working = text.clone();
        for (outer, values) in &distinct {
            if values.len() == 1 {
                working = working.replace(outer, &values[0]);
            }
        }

        match fan {
            Some((outer, values)) => {
                let mut results = Vec::new();
                for value in values {
                    let clone = working.replace(outer, value);
                    results.extend(self.expand_value(&clone, shadow)?.into_items());
                }
                Ok(Value::Multi(uniq(results)))
            }
            // single-valued substitutions may have revealed nested syntax
            None => self.expand_value(&working, shadow),
        }
    }

    /// Produce the ordered sequence for a `$${...}` inner text: a literal
    /// list, a glob pattern, or a variable name — decided by lexical form.
    fn multi_values(&self, inner: &str, shadow: Option<&Shadow>) -> Result<Vec<String>> {
        let inner = inner.trim();
        if contains_unescaped(inner, &[',', '\'']) {
            return variable_list_parse(inner);
        }
        if is_variable_name(inner) {
            return Ok(self.lookup(inner, shadow)?.into_items());
        }
        expand_glob(
            &self.opts.workspace_root,
            &unescape(inner),
            self.opts.glob_mode,
        )
    }

    fn lookup(&self, name: &str, shadow: Option<&Shadow>) -> Result<Value> {
        if let Some(sh) = shadow {
            if sh.name == name {
                return sh.outer.cloned().ok_or_else(|| {
                    anyhow!(
                        "variable '{}' references itself before any outer value exists",
                        name
                    )
                });
            }
        }
        self.resolve(name)
    }

    /// Resolve a variable: `~` paths, `env:` variables, then the scope walk
    /// with memoisation and cycle detection.
    fn resolve(&self, name: &str) -> Result<Value> {
        if let Some(rest) = name.strip_prefix('~') {
            let home = dirs::home_dir().context("could not determine the home directory")?;
            let joined = home.join(rest.trim_start_matches(['/', '\\']));
            return Ok(Value::Single(escape(
                &joined.to_string_lossy().replace('\\', "/"),
            )));
        }
        if let Some(var) = name.strip_prefix("env:") {
            let value = std::env::var(var)
                .with_context(|| format!("environment variable '{}' is not set", var))?;
            return Ok(Value::Single(escape(&value)));
        }

        if let Some(value) = self.cache.borrow().get(name) {
            return Ok(value.clone());
        }
        if !self.cache.borrow_mut().begin(name) {
            bail!("variable '{}' references itself", name);
        }
        let result = self.resolve_scopes(name);
        self.cache.borrow_mut().end(name);
        let value = result?;
        self.cache.borrow_mut().insert(name, value.clone());
        Ok(value)
    }

    /// Walk the scope stack outermost to innermost; every layer's value is a
    /// template expanded with the outer accumulation visible as `name`.
    fn resolve_scopes(&self, name: &str) -> Result<Value> {
        let mut acc: Option<Value> = None;
        for scope in self.scopes.layers() {
            let Some(raw) = scope.get(name) else { continue };
            let shadow = Shadow { name, outer: acc.as_ref() };
            let layered = match raw {
                Value::Single(template) => self.expand_value(template, Some(&shadow))?,
                Value::Multi(templates) => {
                    let mut items = Vec::new();
                    for template in templates {
                        items.extend(
                            self.expand_value(template, Some(&shadow))?.into_items(),
                        );
                    }
                    Value::Multi(items)
                }
            };
            acc = Some(layered);
        }
        acc.ok_or_else(|| anyhow!("unknown variable '{}'", name))
    }
}

/// Variable names are `[A-Za-z0-9_-]+`; anything else inside `$${...}` that
/// is not a list is treated as a glob pattern.
fn is_variable_name(text: &str) -> bool {
    !text.is_empty()
        && (text.starts_with("env:")
            || text.starts_with('~')
            || text
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
}

fn contains_unescaped(text: &str, needles: &[char]) -> bool {
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE_CHAR {
            chars.next();
        } else if needles.contains(&c) {
            return true;
        }
    }
    false
}

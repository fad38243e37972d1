use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A variable value: a single string or an ordered sequence of strings.
///
/// Empty sequences are legal and mean "fan out to nothing".
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Value {
    Single(String),
    Multi(Vec<String>),
}

impl Value {
    pub fn is_multi(&self) -> bool {
        matches!(self, Value::Multi(_))
    }

    /// View the value as a slice of items, a single value being one item.
    pub fn items(&self) -> &[String] {
        match self {
            Value::Single(s) => std::slice::from_ref(s),
            Value::Multi(v) => v.as_slice(),
        }
    }

    pub fn into_items(self) -> Vec<String> {
        match self {
            Value::Single(s) => vec![s],
            Value::Multi(v) => v,
        }
    }

    /// Space-join the items into one string.
    pub fn join(&self) -> String {
        match self {
            Value::Single(s) => s.clone(),
            Value::Multi(v) => v.join(" "),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Single(s.to_string())
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Multi(v)
    }
}

/// One layer of the variable environment.
pub type Scope = HashMap<String, Value>;

/// Ordered list of scopes; later (inner) scopes shadow earlier ones.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    layers: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a scope as the new innermost layer.
    pub fn push(&mut self, scope: Scope) {
        self.layers.push(scope);
    }

    /// Layers in outermost-first order.
    pub fn layers(&self) -> &[Scope] {
        &self.layers
    }
}

/// Per-call-site memoisation cache for the resolver.
///
/// A name is marked in-flight while its scopes are being expanded; a second
/// request for an in-flight name is a reference cycle.
#[derive(Debug, Default)]
pub struct ResolveCache {
    memo: HashMap<String, Value>,
    in_flight: HashSet<String>,
}

impl ResolveCache {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.memo.get(name)
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.memo.insert(name.to_string(), value);
    }

    /// Returns false when the name is already being resolved (a cycle).
    pub fn begin(&mut self, name: &str) -> bool {
        self.in_flight.insert(name.to_string())
    }

    pub fn end(&mut self, name: &str) {
        self.in_flight.remove(name);
    }
}

/// Order-preserving deduplication, applied at sub-template join points.
pub fn uniq(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}

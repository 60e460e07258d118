//! Scoped environment overlays
//!
//! Compilation stages need a different `PATH` and compiler flags per target
//! architecture. Instead of mutating the process environment, the variables
//! live in an [`EnvStack`]: a snapshot of the environment taken once, with
//! overlays pushed on top for the duration of an [`EnvScope`]. Dropping the
//! scope restores the previous layer. Commands receive the effective
//! overrides through [`crate::process::Invocation::envs`].

use std::collections::BTreeMap;
use std::ops::Deref;

/// A set of variable assignments applied on top of a base environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvOverlay {
    /// Create an empty overlay
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style assignment
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Assign a variable, replacing any previous value in this overlay
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Look up a variable set by this overlay
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Variables in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Apply `other` on top of this overlay
    pub fn merge(&mut self, other: &EnvOverlay) {
        for (k, v) in &other.vars {
            self.vars.insert(k.clone(), v.clone());
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvOverlay {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Environment snapshot with a stack of overlays
#[derive(Debug, Clone, Default)]
pub struct EnvStack {
    base: EnvOverlay,
    layers: Vec<EnvOverlay>,
}

impl EnvStack {
    /// Snapshot the current process environment
    pub fn capture() -> Self {
        Self::from_base(std::env::vars().collect())
    }

    /// Build a stack over an explicit base (used by tests)
    pub fn from_base(base: EnvOverlay) -> Self {
        Self {
            base,
            layers: Vec::new(),
        }
    }

    /// Value as originally captured, ignoring overlays
    pub fn original(&self, key: &str) -> Option<&str> {
        self.base.get(key)
    }

    /// Effective value: topmost overlay first, then the base snapshot
    pub fn get(&self, key: &str) -> Option<&str> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(key))
            .or_else(|| self.base.get(key))
    }

    /// All variables overridden by the active overlays, flattened
    pub fn overrides(&self) -> EnvOverlay {
        let mut merged = EnvOverlay::new();
        for layer in &self.layers {
            merged.merge(layer);
        }
        merged
    }

    /// Number of active overlays
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Push an overlay for the lifetime of the returned scope
    pub fn push(&mut self, overlay: EnvOverlay) -> EnvScope<'_> {
        self.layers.push(overlay);
        EnvScope { stack: self }
    }
}

/// Guard restoring the previous environment layer when dropped
#[derive(Debug)]
pub struct EnvScope<'a> {
    stack: &'a mut EnvStack,
}

impl EnvScope<'_> {
    /// Push a nested overlay on top of this scope
    pub fn push(&mut self, overlay: EnvOverlay) -> EnvScope<'_> {
        self.stack.push(overlay)
    }
}

impl Deref for EnvScope<'_> {
    type Target = EnvStack;

    fn deref(&self) -> &EnvStack {
        self.stack
    }
}

impl Drop for EnvScope<'_> {
    fn drop(&mut self) {
        self.stack.layers.pop();
    }
}

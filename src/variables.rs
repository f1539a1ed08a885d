//! Run-scoped variable store and `{name}` template resolution
//!
//! Variables are seeded from configuration and extended by values captured
//! from live responses (for example the identifier returned by a create call).
//! Later endpoints reference them through `{name}` placeholders.

use std::collections::BTreeMap;

/// Mutable name → value table shared by every endpoint of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableStore {
    values: BTreeMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Insert or overwrite a variable; last writer wins
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }

    /// Resolve the first `{name}` placeholder in `template`.
    ///
    /// Every occurrence of that placeholder is replaced by the stored value.
    /// Unknown names, malformed braces and literals come back unchanged, and
    /// the substituted value is never scanned again.
    pub fn resolve(&self, template: &str) -> String {
        let Some(name) = placeholder_name(template) else {
            return template.to_string();
        };

        match self.values.get(name) {
            Some(value) => template.replace(&format!("{{{}}}", name), value),
            None => template.to_string(),
        }
    }
}

/// Text between the first `{` and the first `}` after it
fn placeholder_name(template: &str) -> Option<&str> {
    let start = template.find('{')? + 1;
    let end = template[start..].find('}')? + start;
    let name = &template[start..end];
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

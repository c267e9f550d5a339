//! Variable context for placeholder resolution

use std::collections::{BTreeMap, HashMap};

/// Variables visible to a running workflow.
///
/// Built from the workflow-level `variables` with caller overrides layered on
/// top. Steps of one level share a single immutable context; captured step
/// output is merged in between levels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableContext {
    values: HashMap<String, String>,
}

impl VariableContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge workflow variables with runtime overrides (overrides win)
    pub fn layered<'a>(
        workflow: impl IntoIterator<Item = (&'a String, &'a String)>,
        overrides: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Self {
        let mut ctx = Self::new();
        for (key, value) in workflow.into_iter().chain(overrides) {
            ctx.set(key.clone(), value.clone());
        }
        ctx
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sorted copy of every variable, for reports
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl FromIterator<(String, String)> for VariableContext {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

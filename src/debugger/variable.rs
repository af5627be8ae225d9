//! Scope and variable rendering over the opaque abstract state tree.
//!
//! Each stopped node exposes two scopes: `All` flattens the base value
//! domain (minus analyzer temporaries, plus a synthetic `<locked>` entry
//! for held mutexes), `Raw` exposes the whole state tree. Built arrays are
//! memoized per node and served by `variablesReference`; everything resets
//! at the next stop.

use std::collections::HashMap;

use itertools::Itertools;
use serde_json::Value;

/// Subtree of the state carrying the base value domain.
pub const BASE_DOMAIN_KEY: &str = "base";
/// Subtree listing the mutexes held at the node.
pub const MUTEX_KEY: &str = "mutex";
/// Analyzer-generated temporaries, hidden from the `All` scope.
pub const TEMPORARY_PREFIX: &str = "tmp";

#[derive(Debug, Clone)]
pub struct ScopeEntry {
    pub name: &'static str,
    pub variables_reference: i64,
}

#[derive(Debug, Clone)]
pub struct VariableEntry {
    pub name: String,
    pub value: String,
    /// Zero for leaves; otherwise the reference resolving to the children.
    pub variables_reference: i64,
}

#[derive(Debug)]
pub struct VariableStore {
    next_reference: i64,
    variables: HashMap<i64, Vec<VariableEntry>>,
    node_scopes: HashMap<String, Vec<ScopeEntry>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self {
            next_reference: 1,
            variables: HashMap::new(),
            node_scopes: HashMap::new(),
        }
    }

    /// Forget every built scope and reference.
    pub fn clear(&mut self) {
        self.next_reference = 1;
        self.variables.clear();
        self.node_scopes.clear();
    }

    pub fn cached_scopes(&self, node_id: &str) -> Option<&[ScopeEntry]> {
        self.node_scopes.get(node_id).map(Vec::as_slice)
    }

    /// Build (or return the memoized) scope pair for a node state.
    pub fn scopes_for(&mut self, node_id: &str, state: &Value) -> Vec<ScopeEntry> {
        if let Some(scopes) = self.node_scopes.get(node_id) {
            return scopes.clone();
        }
        let scopes = vec![
            ScopeEntry {
                name: "All",
                variables_reference: self.build_all_scope(state),
            },
            ScopeEntry {
                name: "Raw",
                variables_reference: self.register_value(state),
            },
        ];
        self.node_scopes.insert(node_id.to_string(), scopes.clone());
        scopes
    }

    pub fn variables(&self, reference: i64) -> Option<&[VariableEntry]> {
        self.variables.get(&reference).map(Vec::as_slice)
    }

    fn alloc(&mut self) -> i64 {
        let reference = self.next_reference;
        self.next_reference += 1;
        reference
    }

    /// Materialize a composite value and its children, returning the
    /// reference of the top array.
    fn register_value(&mut self, value: &Value) -> i64 {
        let reference = self.alloc();
        let children = match value {
            Value::Object(map) => map
                .iter()
                .map(|(name, child)| self.entry(name.clone(), child))
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, child)| self.entry(index.to_string(), child))
                .collect(),
            leaf => vec![VariableEntry {
                name: "value".to_string(),
                value: render_leaf(leaf),
                variables_reference: 0,
            }],
        };
        self.variables.insert(reference, children);
        reference
    }

    fn entry(&mut self, name: String, value: &Value) -> VariableEntry {
        match value {
            Value::Object(_) | Value::Array(_) => VariableEntry {
                name,
                value: render_composite(value),
                variables_reference: self.register_value(value),
            },
            leaf => VariableEntry {
                name,
                value: render_leaf(leaf),
                variables_reference: 0,
            },
        }
    }

    fn build_all_scope(&mut self, state: &Value) -> i64 {
        let reference = self.alloc();
        let mut entries = Vec::new();
        if let Some(Value::Object(base)) = state.get(BASE_DOMAIN_KEY) {
            for (name, value) in base {
                if name.starts_with(TEMPORARY_PREFIX) {
                    continue;
                }
                entries.push(self.entry(name.clone(), value));
            }
        }
        if let Some(Value::Array(mutexes)) = state.get(MUTEX_KEY) {
            let held = mutexes.iter().map(render_leaf).join(", ");
            entries.push(VariableEntry {
                name: "<locked>".to_string(),
                value: format!("[{held}]"),
                variables_reference: 0,
            });
        }
        self.variables.insert(reference, entries);
        reference
    }
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

fn render_leaf(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn render_composite(value: &Value) -> String {
    match value {
        Value::Object(map) => format!("{{{} fields}}", map.len()),
        Value::Array(items) => format!("[{} items]", items.len()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn all_scope_hides_temporaries_and_lists_held_mutexes() {
        let mut store = VariableStore::new();
        let state = json!({
            "base": {"x": 5, "tmp__cil_0": 1, "flag": "true"},
            "mutex": ["m1", "m2"],
        });

        let scopes = store.scopes_for("N1", &state);
        let all = scopes.iter().find(|s| s.name == "All").unwrap();
        let variables = store.variables(all.variables_reference).unwrap();

        let names: Vec<&str> = variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["flag", "x", "<locked>"]);
        let locked = variables.last().unwrap();
        assert_eq!(locked.value, "[m1, m2]");
    }

    #[test]
    fn raw_scope_exposes_nested_values_by_reference() {
        let mut store = VariableStore::new();
        let state = json!({"base": {"p": {"inner": 1}}});

        let scopes = store.scopes_for("N1", &state);
        let raw = scopes.iter().find(|s| s.name == "Raw").unwrap();
        let top = store.variables(raw.variables_reference).unwrap();
        assert_eq!(top.len(), 1);
        let base = &top[0];
        assert!(base.variables_reference > 0);

        let base_vars = store.variables(base.variables_reference).unwrap().to_vec();
        assert_eq!(base_vars[0].name, "p");
        let p_vars = store.variables(base_vars[0].variables_reference).unwrap();
        assert_eq!(p_vars[0].name, "inner");
        assert_eq!(p_vars[0].value, "1");
    }

    #[test]
    fn scopes_are_memoized_per_node_until_cleared() {
        let mut store = VariableStore::new();
        let state = json!({"base": {"x": 1}});

        let first = store.scopes_for("N1", &state);
        let second = store.scopes_for("N1", &state);
        assert_eq!(
            first[0].variables_reference,
            second[0].variables_reference
        );

        store.clear();
        assert!(store.cached_scopes("N1").is_none());
    }
}

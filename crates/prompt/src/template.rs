//! Template Interpolation
//!
//! Substitutes `{{key}}` placeholders with typed variable values and keeps a
//! prompt's variable list in step with its template text.
//!
//! No escaping is performed: output is plain text for clipboard/API use and
//! any rendering layer is responsible for HTML escaping.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::variables::{ListFormat, Variable, VariableValue};

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("static regex")
    })
}

/// Render `template`, replacing each `{{key}}` with its effective value.
///
/// Resolution order per key: explicit non-empty value, then the variable's
/// non-empty default, then the empty string. Unknown keys never fail.
pub fn interpolate(
    template: &str,
    values: &HashMap<String, VariableValue>,
    variables: &[Variable],
) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &Captures| {
            resolve_value(&caps[1], values, variables)
        })
        .into_owned()
}

/// Resolve and serialize the value for a single key.
pub fn resolve_value(
    key: &str,
    values: &HashMap<String, VariableValue>,
    variables: &[Variable],
) -> String {
    let explicit = values.get(key);
    match variables.iter().find(|v| v.key == key) {
        Some(variable) => variable
            .effective_value(explicit)
            .map(|value| value.render(variable.list_format()))
            .unwrap_or_default(),
        None => explicit
            .filter(|v| !v.is_empty())
            .map(|value| value.render(ListFormat::default()))
            .unwrap_or_default(),
    }
}

/// Unique placeholder keys in order of first occurrence.
pub fn extract_variable_keys(template: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    placeholder_regex()
        .captures_iter(template)
        .filter_map(|caps| {
            let key = caps[1].to_string();
            seen.insert(key.clone()).then_some(key)
        })
        .collect()
}

/// Reconcile a variable list with the keys occurring in `template`.
///
/// Existing definitions are kept for keys still present, new keys get a
/// plain text variable, and variables whose key disappeared are dropped.
/// The result follows template order.
pub fn sync_variables(template: &str, existing: &[Variable]) -> Vec<Variable> {
    extract_variable_keys(template)
        .into_iter()
        .map(|key| {
            existing
                .iter()
                .find(|v| v.key == key)
                .cloned()
                .unwrap_or_else(|| Variable::text(key))
        })
        .collect()
}

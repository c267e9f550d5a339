//! `${NAME}` placeholder substitution

use super::context::VariableContext;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^${}\s]+)\}").expect("placeholder pattern is valid")
});

/// Replace every `${NAME}` in `text` with its value.
///
/// Placeholders naming an unknown variable are left in place verbatim, so a
/// command can still carry shell-style `${VAR}` references through to the
/// shell.
pub fn substitute<'a>(text: &'a str, variables: &VariableContext) -> Cow<'a, str> {
    PLACEHOLDER.replace_all(text, |caps: &Captures<'_>| match variables.get(&caps[1]) {
        Some(value) => value.to_string(),
        None => caps[0].to_string(),
    })
}

/// Variable names referenced by `text`
fn placeholders(text: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Variable names referenced by `text` that `variables` cannot resolve
pub fn unresolved(text: &str, variables: &VariableContext) -> Vec<String> {
    placeholders(text)
        .into_iter()
        .filter(|name| !variables.contains(name))
        .collect()
}

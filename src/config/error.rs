//! Error types for wflow

use std::path::PathBuf;
use thiserror::Error;

/// Structural errors detected before any step runs.
///
/// A step's non-zero exit is not an error; it is recorded as a failed step
/// inside the workflow result.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("failed to parse workflow '{document}': {message}")]
    Parse { document: String, message: String },

    #[error("step '{step}' depends on unknown step '{dependency}'{}", .suggestion.as_ref().map(|s| format!(", did you mean '{}'?", s)).unwrap_or_default())]
    UnresolvedDependency {
        step: String,
        dependency: String,
        suggestion: Option<String>,
    },

    #[error("cyclic dependency detected among steps: {}", .steps.join(", "))]
    CyclicDependency { steps: Vec<String> },

    #[error("invalid condition on step '{step}' ({expression}): {message}")]
    ConditionSyntax {
        step: String,
        expression: String,
        message: String,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkflowError {
    pub fn parse(document: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            document: document.into(),
            message: message.into(),
        }
    }

    /// Build an unresolved dependency error, suggesting the closest declared step
    pub fn unresolved(step: impl Into<String>, dependency: impl Into<String>, known: &[&str]) -> Self {
        let dependency = dependency.into();
        let suggestion = suggest_correction(&dependency, known);
        Self::UnresolvedDependency {
            step: step.into(),
            dependency,
            suggestion,
        }
    }

    /// Name of the step the error points at, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::UnresolvedDependency { step, .. } | Self::ConditionSyntax { step, .. } => {
                Some(step)
            }
            _ => None,
        }
    }
}

/// Suggest a correction for a typo using Levenshtein distance
pub fn suggest_correction(typo: &str, candidates: &[&str]) -> Option<String> {
    let mut best_match = None;
    let mut best_distance = usize::MAX;
    let max_distance = (typo.chars().count() / 2).max(2);

    for candidate in candidates {
        let distance = levenshtein_distance(typo, candidate);
        if distance < best_distance && distance <= max_distance {
            best_distance = distance;
            best_match = Some(candidate.to_string());
        }
    }

    best_match
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Single rolling row
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut diagonal = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let next = (row[j] + 1).min(row[j - 1] + 1).min(diagonal + cost);
            diagonal = row[j];
            row[j] = next;
        }
    }

    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("build", "biuld"), 2);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }

    #[test]
    fn test_unresolved_suggests_closest_step() {
        let err = WorkflowError::unresolved("deploy", "biuld", &["build", "test", "lint"]);
        let msg = err.to_string();
        assert!(msg.contains("step 'deploy' depends on unknown step 'biuld'"));
        assert!(msg.contains("did you mean 'build'?"));
        assert_eq!(err.step(), Some("deploy"));
    }

    #[test]
    fn test_unresolved_without_suggestion() {
        let err = WorkflowError::unresolved("deploy", "completely_different", &["build"]);
        assert!(!err.to_string().contains("did you mean"));
    }

    #[test]
    fn test_cycle_display_lists_remainder() {
        let err = WorkflowError::CyclicDependency {
            steps: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency detected among steps: a, b");
        assert_eq!(err.step(), None);
    }
}

//! Persisted execution reports

use super::state::{SkipReason, StepStatus, WorkflowResult, WorkflowStep};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TRUNCATION_MARKER: &str = "\n... [truncated]";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// On-disk shape of a run report
#[derive(Debug, Serialize)]
pub struct ExecutionReport<'a> {
    pub workflow: &'a str,
    pub description: &'a str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub cancelled: bool,
    pub dry_run: bool,
    pub levels: &'a [Vec<String>],
    pub steps: Vec<StepReport<'a>>,
    pub variables: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct StepReport<'a> {
    pub name: &'a str,
    pub status: StepStatus,
    pub skip_reason: Option<&'a SkipReason>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub command: Option<&'a str>,
    pub output: Option<String>,
    pub stderr: Option<String>,
    pub error: Option<&'a str>,
}

impl<'a> ExecutionReport<'a> {
    pub fn new(result: &'a WorkflowResult, snippet_len: usize) -> Self {
        Self {
            workflow: &result.workflow,
            description: &result.description,
            started_at: result.started_at,
            finished_at: result.finished_at,
            duration_ms: result.duration.as_millis() as u64,
            success: result.success,
            cancelled: result.cancelled,
            dry_run: result.dry_run,
            levels: &result.levels,
            steps: result
                .steps
                .iter()
                .map(|s| StepReport::new(s, snippet_len))
                .collect(),
            variables: &result.variables,
        }
    }
}

impl<'a> StepReport<'a> {
    fn new(step: &'a WorkflowStep, snippet_len: usize) -> Self {
        Self {
            name: step.name(),
            status: step.status,
            skip_reason: step.skip_reason.as_ref(),
            exit_code: step.exit_code,
            duration_ms: step.duration().as_millis() as u64,
            command: step.command.as_deref(),
            output: snippet(&step.stdout, snippet_len),
            stderr: snippet(&step.stderr, snippet_len),
            error: step.error.as_deref(),
        }
    }
}

/// First `max_chars` characters of `text`, marked when cut
fn snippet(text: &str, max_chars: usize) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => Some(format!("{}{TRUNCATION_MARKER}", &text[..cut])),
        None => Some(text.to_string()),
    }
}

/// Report file name: `<workflow>-<YYYYmmdd-HHMMSS-mmm>.json`
fn report_file_name(result: &WorkflowResult) -> String {
    let safe: String = result
        .workflow
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}-{}.json", safe, result.started_at.format("%Y%m%d-%H%M%S-%3f"))
}

/// Write `result` as pretty JSON into `dir`, creating it if needed
pub fn save_execution_report(
    result: &WorkflowResult,
    dir: &Path,
    snippet_len: usize,
) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir).map_err(|e| ReportError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let path = dir.join(report_file_name(result));
    let json = serde_json::to_string_pretty(&ExecutionReport::new(result, snippet_len))?;
    std::fs::write(&path, json).map_err(|e| ReportError::Io {
        path: path.clone(),
        source: e,
    })?;

    tracing::info!(path = %path.display(), "Saved execution report");
    Ok(path)
}

//! Step execution logic

use super::state::{SkipReason, StepStatus, WorkflowStep};
use crate::cli::signals::CancellationToken;
use crate::config::{Defaults, WorkflowDefinition};
use crate::process::{
    ProcessError, ProcessOutput, Termination, default_shell, run_captured, shell_command,
};
use crate::template::{VariableContext, substitute, unresolved};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A fully resolved command, ready to hand to a [`CommandRunner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub step: String,
    pub command: String,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

/// Runs resolved commands on behalf of the executor
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &CommandInvocation,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput, ProcessError>;
}

/// Runs commands through a system shell
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: Vec<String>,
}

impl ShellRunner {
    pub fn new(shell: Vec<String>) -> Self {
        Self { shell }
    }

    /// Shell from config, or the platform default
    pub fn from_defaults(defaults: &Defaults) -> Self {
        Self::new(defaults.shell.clone().unwrap_or_else(default_shell))
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(default_shell())
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        invocation: &CommandInvocation,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput, ProcessError> {
        let cmd = shell_command(&self.shell, &invocation.command, &invocation.working_dir)?;
        run_captured(cmd, invocation.timeout, cancel).await
    }
}

/// Context for step execution, shared by every step of a run
pub struct ExecutionContext {
    pub workflow: Arc<WorkflowDefinition>,
    pub runner: Arc<dyn CommandRunner>,
    pub dry_run: bool,
    pub default_timeout: Duration,
    pub max_concurrent: usize,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(workflow: Arc<WorkflowDefinition>, runner: Arc<dyn CommandRunner>) -> Self {
        let defaults = Defaults::default();
        Self {
            workflow,
            runner,
            dry_run: false,
            default_timeout: Duration::from_secs(defaults.step_timeout),
            max_concurrent: defaults.max_concurrent,
            cancel: CancellationToken::new(),
        }
    }
}

/// Resolve a step's working directory against the workflow base directory
pub fn resolve_working_dir(
    working_directory: Option<&str>,
    variables: &VariableContext,
    base_dir: &Path,
) -> PathBuf {
    let Some(raw) = working_directory else {
        return base_dir.to_path_buf();
    };
    let substituted = substitute(raw, variables);
    let expanded = PathBuf::from(shellexpand::tilde(substituted.as_ref()).as_ref());
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

/// Execute a single step
///
/// Resolves the command and working directory against `variables`, then
/// either records the dry-run intent or runs the command. Failures are
/// recorded on the returned step, never raised.
pub async fn execute_step(
    mut step: WorkflowStep,
    variables: &VariableContext,
    ctx: &ExecutionContext,
) -> WorkflowStep {
    let name = step.definition.name.clone();
    let command = substitute(&step.definition.command, variables).into_owned();
    let missing = unresolved(&step.definition.command, variables);
    if !missing.is_empty() {
        tracing::debug!(step = %name, variables = ?missing, "Leaving unknown placeholders to the shell");
    }
    let working_dir = resolve_working_dir(
        step.definition.working_directory.as_deref(),
        variables,
        &ctx.workflow.base_dir,
    );
    let timeout = step
        .definition
        .timeout
        .map(Duration::from_secs)
        .unwrap_or(ctx.default_timeout);

    step.command = Some(command.clone());
    step.working_dir = Some(working_dir.clone());

    if ctx.dry_run {
        tracing::info!(
            step = %name,
            command = %command,
            dir = %working_dir.display(),
            "Dry run: would execute"
        );
        step.skip(SkipReason::DryRun);
        return step;
    }

    if ctx.cancel.is_cancelled() {
        tracing::debug!(step = %name, "Run cancelled before step started");
        step.skip(SkipReason::Cancelled);
        return step;
    }

    tracing::info!(step = %name, command = %command, "Running step");
    step.status = StepStatus::Running;
    step.started_at = Some(Utc::now());

    let invocation = CommandInvocation {
        step: name.clone(),
        command,
        working_dir,
        timeout,
    };

    match ctx.runner.run(&invocation, ctx.cancel.clone()).await {
        Ok(output) => apply_output(&mut step, output, timeout),
        Err(e) => {
            tracing::error!(step = %name, error = %e, "Failed to run step");
            step.status = StepStatus::Failed;
            step.error = Some(e.to_string());
        }
    }
    step.finished_at = Some(Utc::now());

    match step.status {
        StepStatus::Success => tracing::info!(
            step = %name,
            duration_ms = step.duration().as_millis() as u64,
            "Step succeeded"
        ),
        _ => tracing::warn!(
            step = %name,
            exit_code = ?step.exit_code,
            error = step.error.as_deref().unwrap_or_default(),
            "Step failed"
        ),
    }

    step
}

fn apply_output(step: &mut WorkflowStep, output: ProcessOutput, timeout: Duration) {
    let success = output.success();
    step.exit_code = output.exit_code;
    step.stdout = output.stdout;
    step.stderr = output.stderr;

    if success {
        step.status = StepStatus::Success;
        return;
    }

    step.status = StepStatus::Failed;
    step.error = Some(match output.termination {
        Termination::TimedOut => format!("timed out after {}s", timeout.as_secs()),
        Termination::Interrupted => "interrupted".to_string(),
        Termination::Exited => match output.exit_code {
            Some(code) => format!("exited with code {code}"),
            None => "terminated without an exit code".to_string(),
        },
    });
}

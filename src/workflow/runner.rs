//! Workflow runner - orchestrates step execution

use super::executor::{CommandRunner, ExecutionContext, ShellRunner, execute_step};
use super::graph::ExecutionPlan;
use super::report::save_execution_report;
use super::state::{ResultBuilder, SkipReason, WorkflowResult};
use crate::cli::signals::CancellationToken;
use crate::config::{EngineConfig, WorkflowDefinition, WorkflowError};
use crate::template::{VariableContext, should_execute_step};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Per-run options supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Resolve and report steps without spawning anything
    pub dry_run: bool,

    /// Variables layered over the workflow's own (overrides win)
    pub overrides: BTreeMap<String, String>,

    /// Where to write the execution report; `None` skips it
    pub report_dir: Option<PathBuf>,

    /// Base directory override for steps without an absolute `working_directory`
    pub base_dir: Option<PathBuf>,

    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn dry_run(mut self, value: bool) -> Self {
        self.dry_run = value;
        self
    }

    pub fn with_override(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Workflow runner
pub struct WorkflowRunner {
    config: Arc<EngineConfig>,
    command_runner: Arc<dyn CommandRunner>,
}

impl WorkflowRunner {
    /// Create a new workflow runner using the configured shell
    pub fn new(config: Arc<EngineConfig>) -> Self {
        let command_runner = Arc::new(ShellRunner::from_defaults(&config.defaults));
        Self {
            config,
            command_runner,
        }
    }

    /// Replace the process primitive, e.g. with a recording double
    pub fn with_command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.command_runner = runner;
        self
    }

    /// Run a workflow
    ///
    /// Structural problems (unknown dependencies, cycles) are returned as
    /// errors before any step runs. Step failures are recorded in the
    /// result.
    pub async fn execute_workflow(
        &self,
        mut definition: WorkflowDefinition,
        options: RunOptions,
    ) -> Result<WorkflowResult, WorkflowError> {
        let plan = ExecutionPlan::build(&definition.steps)?;

        if let Some(dir) = options.base_dir {
            definition.base_dir = dir;
        }
        let workflow = Arc::new(definition);
        let mut variables =
            VariableContext::layered(workflow.variables.iter(), options.overrides.iter());

        let defaults = &self.config.defaults;
        let ctx = Arc::new(ExecutionContext {
            workflow: workflow.clone(),
            runner: self.command_runner.clone(),
            dry_run: options.dry_run,
            default_timeout: Duration::from_secs(defaults.step_timeout),
            max_concurrent: defaults.max_concurrent.max(1),
            cancel: options.cancel,
        });
        let semaphore = Arc::new(Semaphore::new(ctx.max_concurrent));
        let mut builder = ResultBuilder::new(&workflow);

        tracing::info!(
            workflow = %workflow.name,
            steps = workflow.steps.len(),
            levels = plan.levels().len(),
            dry_run = ctx.dry_run,
            "Starting workflow"
        );

        for (level_no, level) in plan.levels().iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                break;
            }

            let snapshot = Arc::new(variables.clone());
            let mut run_set = Vec::with_capacity(level.len());

            for &idx in level {
                let step = &workflow.steps[idx];
                if let Some(dep) = builder.blocking_dependency(idx) {
                    tracing::warn!(step = %step.name, dependency = %dep, "Skipping step, dependency failed");
                    builder.skip(idx, SkipReason::DependencyFailed { step: dep });
                } else if !should_execute_step(step.parsed_condition.as_ref(), &snapshot) {
                    tracing::info!(
                        step = %step.name,
                        condition = step.condition.as_deref().unwrap_or_default(),
                        "Skipping step, condition not met"
                    );
                    builder.skip(idx, SkipReason::Condition);
                } else {
                    run_set.push(idx);
                }
            }

            tracing::debug!(level = level_no, running = run_set.len(), "Starting level");

            let mut handles = Vec::with_capacity(run_set.len());
            for idx in run_set {
                let step = builder.mark_running(idx);
                let ctx = ctx.clone();
                let vars = snapshot.clone();
                let semaphore = semaphore.clone();
                handles.push((
                    idx,
                    tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await;
                        execute_step(step, &vars, &ctx).await
                    }),
                ));
            }

            for (idx, handle) in handles {
                match handle.await {
                    Ok(step) => builder.record(idx, step),
                    Err(e) => {
                        tracing::error!(step = %workflow.steps[idx].name, error = %e, "Step task aborted");
                        builder.fail(idx, format!("step task aborted: {e}"));
                    }
                }
            }

            for &idx in level {
                if builder.step(idx).is_fatal_failure() {
                    let blocked: Vec<&str> = plan
                        .transitive_dependents(idx)
                        .into_iter()
                        .map(|i| workflow.steps[i].name.as_str())
                        .collect();
                    if !blocked.is_empty() {
                        tracing::warn!(
                            step = %workflow.steps[idx].name,
                            blocked = ?blocked,
                            "Failure blocks downstream steps"
                        );
                    }
                }
                if let Some((name, value)) = builder.captured_output(idx) {
                    tracing::debug!(step = %builder.step(idx).name(), variable = %name, "Captured output");
                    variables.set(name, value);
                }
            }
        }

        let cancelled = ctx.cancel.is_cancelled();
        if cancelled {
            tracing::warn!(workflow = %workflow.name, "Workflow cancelled");
            builder.skip_pending(SkipReason::Cancelled);
        }

        let mut result = builder.finish(
            &workflow,
            plan.levels(),
            variables.snapshot(),
            cancelled,
            ctx.dry_run,
        );

        if let Some(dir) = options.report_dir {
            match save_execution_report(&result, &dir, defaults.output_snippet) {
                Ok(path) => result.report_path = Some(path),
                Err(e) => tracing::warn!(error = %e, "Failed to save execution report"),
            }
        }

        tracing::info!(
            workflow = %result.workflow,
            success = result.success,
            duration_ms = result.duration.as_millis() as u64,
            "Workflow finished"
        );

        Ok(result)
    }
}

//! Workflow execution state

use crate::config::{StepDefinition, WorkflowDefinition};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle state of a step within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Skipped,
    Running,
    Success,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepStatus::Pending => "pending",
            StepStatus::Skipped => "skipped",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
        })
    }
}

/// Why a step was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Dry run: the command was resolved but not spawned
    DryRun,
    /// The step's condition evaluated to false
    Condition,
    /// A dependency failed (or was itself skipped for that reason)
    DependencyFailed { step: String },
    /// The run was cancelled before the step started
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DryRun => f.write_str("dry run"),
            SkipReason::Condition => f.write_str("condition not met"),
            SkipReason::DependencyFailed { step } => write!(f, "dependency '{step}' failed"),
            SkipReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Runtime record of one step: its definition plus what happened to it
#[derive(Debug, Clone)]
pub struct WorkflowStep {
    pub definition: StepDefinition,
    pub status: StepStatus,
    pub skip_reason: Option<SkipReason>,

    /// Command after variable substitution
    pub command: Option<String>,

    /// Directory the command ran (or would run) in
    pub working_dir: Option<PathBuf>,

    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowStep {
    pub fn pending(definition: StepDefinition) -> Self {
        Self {
            definition,
            status: StepStatus::Pending,
            skip_reason: None,
            command: None,
            working_dir: None,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Mark skipped for `reason`
    pub fn skip(&mut self, reason: SkipReason) {
        self.status = StepStatus::Skipped;
        self.skip_reason = Some(reason);
    }

    /// Mark failed with `message`, stamping the finish time
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(message.into());
        let now = Utc::now();
        self.started_at.get_or_insert(now);
        self.finished_at = Some(now);
    }

    /// Wall time between start and finish, zero if the step never ran
    pub fn duration(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    /// Whether this step prevents its dependents from running
    pub fn blocks_dependents(&self) -> bool {
        match self.status {
            StepStatus::Failed => !self.definition.continue_on_error,
            StepStatus::Skipped => {
                matches!(self.skip_reason, Some(SkipReason::DependencyFailed { .. }))
            }
            _ => false,
        }
    }

    /// Failed in a way that counts against the workflow
    pub fn is_fatal_failure(&self) -> bool {
        self.status == StepStatus::Failed && !self.definition.continue_on_error
    }
}

/// Accumulates step records during a run
pub(crate) struct ResultBuilder {
    steps: Vec<WorkflowStep>,
    index: HashMap<String, usize>,
    started_at: DateTime<Utc>,
}

impl ResultBuilder {
    pub fn new(workflow: &WorkflowDefinition) -> Self {
        Self {
            steps: workflow
                .steps
                .iter()
                .cloned()
                .map(WorkflowStep::pending)
                .collect(),
            index: workflow
                .steps
                .iter()
                .enumerate()
                .map(|(i, s)| (s.name.clone(), i))
                .collect(),
            started_at: Utc::now(),
        }
    }

    pub fn step(&self, idx: usize) -> &WorkflowStep {
        &self.steps[idx]
    }

    /// First dependency of `idx` (in `depends_on` order) that blocks it
    pub fn blocking_dependency(&self, idx: usize) -> Option<String> {
        self.steps[idx]
            .definition
            .depends_on
            .iter()
            .find(|dep| {
                self.index
                    .get(dep.as_str())
                    .is_some_and(|&d| self.steps[d].blocks_dependents())
            })
            .cloned()
    }

    pub fn skip(&mut self, idx: usize, reason: SkipReason) {
        self.steps[idx].skip(reason);
    }

    /// Flag `idx` as running and hand out a copy for the executing task
    pub fn mark_running(&mut self, idx: usize) -> WorkflowStep {
        self.steps[idx].status = StepStatus::Running;
        self.steps[idx].clone()
    }

    pub fn record(&mut self, idx: usize, step: WorkflowStep) {
        self.steps[idx] = step;
    }

    pub fn fail(&mut self, idx: usize, message: impl Into<String>) {
        self.steps[idx].fail(message);
    }

    /// `(variable, value)` contributed by a successful capturing step
    pub fn captured_output(&self, idx: usize) -> Option<(String, String)> {
        let step = &self.steps[idx];
        match (&step.definition.capture, step.status) {
            (Some(var), StepStatus::Success) => Some((var.clone(), step.stdout.trim().to_string())),
            _ => None,
        }
    }

    /// Skip every step that never got to run
    pub fn skip_pending(&mut self, reason: SkipReason) {
        for step in &mut self.steps {
            if matches!(step.status, StepStatus::Pending | StepStatus::Running) {
                step.skip(reason.clone());
            }
        }
    }

    /// Assemble the final result, steps ordered by `order`
    pub fn finish(
        self,
        workflow: &WorkflowDefinition,
        levels: &[Vec<usize>],
        variables: BTreeMap<String, String>,
        cancelled: bool,
        dry_run: bool,
    ) -> WorkflowResult {
        let finished_at = Utc::now();
        let success = !cancelled && !self.steps.iter().any(WorkflowStep::is_fatal_failure);

        let level_names = levels
            .iter()
            .map(|level| level.iter().map(|&i| self.steps[i].name().to_string()).collect())
            .collect();

        let mut slots: Vec<Option<WorkflowStep>> = self.steps.into_iter().map(Some).collect();
        let steps = levels
            .iter()
            .flatten()
            .filter_map(|&i| slots[i].take())
            .collect();

        WorkflowResult {
            workflow: workflow.name.clone(),
            description: workflow.description.clone(),
            success,
            cancelled,
            dry_run,
            steps,
            levels: level_names,
            started_at: self.started_at,
            finished_at,
            duration: (finished_at - self.started_at).to_std().unwrap_or_default(),
            variables,
            report_path: None,
        }
    }
}

/// Result of executing a workflow
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub workflow: String,
    pub description: String,

    /// No step failed without `continue_on_error` and the run was not cancelled
    pub success: bool,
    pub cancelled: bool,
    pub dry_run: bool,

    /// Step records in schedule order
    pub steps: Vec<WorkflowStep>,

    /// Step names per level
    pub levels: Vec<Vec<String>>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,

    /// Variables as they stood when the run ended
    pub variables: BTreeMap<String, String>,

    /// Where the execution report was written, if anywhere
    pub report_path: Option<PathBuf>,
}

impl WorkflowResult {
    /// Get a specific step's record
    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name() == name)
    }

    pub fn status_of(&self, name: &str) -> Option<StepStatus> {
        self.step(name).map(|s| s.status)
    }

    /// Get list of failed steps
    pub fn failed_steps(&self) -> Vec<&str> {
        self.steps_with(StepStatus::Failed)
    }

    pub fn skipped_steps(&self) -> Vec<&str> {
        self.steps_with(StepStatus::Skipped)
    }

    fn steps_with(&self, status: StepStatus) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.status == status)
            .map(WorkflowStep::name)
            .collect()
    }

    /// Process exit code for this run
    pub fn exit_code(&self) -> i32 {
        if self.success { 0 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "diamond",
            vec![
                StepDefinition::new("A", "true"),
                StepDefinition::new("B", "true").depends_on(["A"]),
                StepDefinition::new("C", "true")
                    .depends_on(["A"])
                    .continue_on_error(true),
                StepDefinition::new("D", "true").depends_on(["B", "C"]),
            ],
        )
    }

    #[test]
    fn test_builder_starts_pending() {
        let builder = ResultBuilder::new(&diamond());
        for i in 0..4 {
            assert_eq!(builder.step(i).status, StepStatus::Pending);
        }
        assert!(builder.blocking_dependency(3).is_none());
    }

    #[test]
    fn test_failure_blocks_dependents() {
        let mut builder = ResultBuilder::new(&diamond());
        builder.fail(0, "exited with code 1");
        assert_eq!(builder.blocking_dependency(1).as_deref(), Some("A"));
        assert_eq!(builder.blocking_dependency(2).as_deref(), Some("A"));
    }

    #[test]
    fn test_continue_on_error_does_not_block() {
        let mut builder = ResultBuilder::new(&diamond());
        builder.fail(2, "exited with code 3");
        assert!(builder.blocking_dependency(3).is_none());
    }

    #[test]
    fn test_dependency_skip_propagates() {
        let mut builder = ResultBuilder::new(&diamond());
        builder.skip(1, SkipReason::DependencyFailed { step: "A".into() });
        assert_eq!(builder.blocking_dependency(3).as_deref(), Some("B"));
    }

    #[test]
    fn test_condition_and_dry_run_skips_do_not_block() {
        let mut builder = ResultBuilder::new(&diamond());
        builder.skip(1, SkipReason::Condition);
        builder.skip(2, SkipReason::DryRun);
        assert!(builder.blocking_dependency(3).is_none());
    }

    #[test]
    fn test_capture_only_on_success() {
        let workflow = WorkflowDefinition::new(
            "capture",
            vec![
                StepDefinition::new("ok", "echo v").capture_as("OUT"),
                StepDefinition::new("bad", "echo v").capture_as("BAD"),
            ],
        );
        let mut builder = ResultBuilder::new(&workflow);

        let mut ok = builder.mark_running(0);
        ok.status = StepStatus::Success;
        ok.stdout = "  v1.2.3\n".into();
        builder.record(0, ok);

        let mut bad = builder.mark_running(1);
        bad.stdout = "partial".into();
        bad.fail("exited with code 1");
        builder.record(1, bad);

        assert_eq!(
            builder.captured_output(0),
            Some(("OUT".to_string(), "v1.2.3".to_string()))
        );
        assert_eq!(builder.captured_output(1), None);
    }

    #[test]
    fn test_finish_orders_by_schedule() {
        let workflow = WorkflowDefinition::new(
            "order",
            vec![
                StepDefinition::new("last", "true").depends_on(["first"]),
                StepDefinition::new("first", "true"),
            ],
        );
        let mut builder = ResultBuilder::new(&workflow);
        for i in 0..2 {
            let mut step = builder.mark_running(i);
            step.status = StepStatus::Success;
            builder.record(i, step);
        }
        let result = builder.finish(&workflow, &[vec![1], vec![0]], BTreeMap::new(), false, false);

        let names: Vec<&str> = result.steps.iter().map(WorkflowStep::name).collect();
        assert_eq!(names, vec!["first", "last"]);
        assert_eq!(result.levels, vec![vec!["first"], vec!["last"]]);
        assert!(result.success);
        assert_eq!(result.exit_code(), 0);
    }

    #[test]
    fn test_finish_success_flag() {
        let workflow = diamond();
        let levels = vec![vec![0], vec![1, 2], vec![3]];

        let mut builder = ResultBuilder::new(&workflow);
        builder.fail(2, "tolerated");
        let result = builder.finish(&workflow, &levels, BTreeMap::new(), false, false);
        assert!(result.success);
        assert_eq!(result.failed_steps(), vec!["C"]);

        let mut builder = ResultBuilder::new(&workflow);
        builder.fail(0, "fatal");
        let result = builder.finish(&workflow, &levels, BTreeMap::new(), false, false);
        assert!(!result.success);
        assert_eq!(result.exit_code(), 1);

        let builder = ResultBuilder::new(&workflow);
        let result = builder.finish(&workflow, &levels, BTreeMap::new(), true, false);
        assert!(!result.success);
        assert!(result.cancelled);
    }

    #[test]
    fn test_skip_pending() {
        let mut builder = ResultBuilder::new(&diamond());
        let mut a = builder.mark_running(0);
        a.status = StepStatus::Success;
        builder.record(0, a);
        builder.skip_pending(SkipReason::Cancelled);

        assert_eq!(builder.step(0).status, StepStatus::Success);
        for i in 1..4 {
            assert_eq!(builder.step(i).skip_reason, Some(SkipReason::Cancelled));
        }
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&StepStatus::Success).unwrap(), "\"success\"");
        let reason = SkipReason::DependencyFailed { step: "A".into() };
        assert_eq!(
            serde_json::to_value(&reason).unwrap(),
            serde_json::json!({"reason": "dependency_failed", "step": "A"})
        );
        assert_eq!(
            serde_json::to_value(SkipReason::DryRun).unwrap(),
            serde_json::json!({"reason": "dry_run"})
        );
        assert_eq!(reason.to_string(), "dependency 'A' failed");
    }

    #[test]
    fn test_duration_without_timestamps_is_zero() {
        let step = WorkflowStep::pending(StepDefinition::new("x", "true"));
        assert_eq!(step.duration(), Duration::ZERO);
    }
}

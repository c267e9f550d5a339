//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON, and quiet output modes.

use crate::config::WorkflowSummary;
use crate::workflow::StepStatus;
use serde::Serialize;
use std::path::PathBuf;

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

/// Events emitted by CLI commands
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    WorkflowStart {
        name: String,
        steps: usize,
        levels: usize,
        dry_run: bool,
    },
    StepComplete {
        name: String,
        status: StepStatus,
        duration_ms: u64,
        exit_code: Option<i32>,
        error: Option<String>,
    },
    StepSkipped {
        name: String,
        reason: String,
        command: Option<String>,
    },
    WorkflowComplete {
        success: bool,
        cancelled: bool,
        duration_ms: u64,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        report: Option<PathBuf>,
    },
    WorkflowError {
        error: String,
    },
    WorkflowList {
        workflows: Vec<WorkflowSummary>,
    },
    Info {
        message: String,
    },
    Debug {
        message: String,
    },
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Emit an event
    fn emit(&self, event: OutputEvent);
}

/// Console output handler
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    /// Create a new console handler
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    fn format_duration(ms: u64) -> String {
        if ms < 1000 {
            format!("{}ms", ms)
        } else {
            format!("{:.1}s", ms as f64 / 1000.0)
        }
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::WorkflowStart {
                name,
                steps,
                levels,
                dry_run,
            } => {
                let mode = if dry_run { " [dry run]" } else { "" };
                eprintln!(
                    "Running workflow '{}' ({} steps in {} levels){}",
                    name, steps, levels, mode
                );
            }
            OutputEvent::StepComplete {
                name,
                status,
                duration_ms,
                exit_code,
                error,
            } => {
                let duration = Self::format_duration(duration_ms);
                if status == StepStatus::Success {
                    eprintln!("  ✓ {} ({})", name, duration);
                } else {
                    let detail = error
                        .or_else(|| exit_code.map(|c| format!("exit code {c}")))
                        .unwrap_or_else(|| status.to_string());
                    eprintln!("  ✗ {} ({}): {}", name, duration, detail);
                }
            }
            OutputEvent::StepSkipped {
                name,
                reason,
                command,
            } => match command {
                Some(command) => eprintln!("  ○ {} ({}): {}", name, reason, command),
                None => eprintln!("  ○ {} ({})", name, reason),
            },
            OutputEvent::WorkflowComplete {
                success,
                cancelled,
                duration_ms,
                succeeded,
                failed,
                skipped,
                report,
            } => {
                eprintln!();
                let counts = format!("{} succeeded, {} failed, {} skipped", succeeded, failed, skipped);
                let duration = Self::format_duration(duration_ms);
                if cancelled {
                    eprintln!("✗ Workflow cancelled ({}) in {}", counts, duration);
                } else if success {
                    eprintln!("✓ Workflow completed successfully ({}) in {}", counts, duration);
                } else {
                    eprintln!("✗ Workflow failed ({}) in {}", counts, duration);
                }
                if let Some(path) = report {
                    eprintln!("Report: {}", path.display());
                }
            }
            OutputEvent::WorkflowError { error } => {
                eprintln!("Error: {}", error);
            }
            OutputEvent::WorkflowList { workflows } => {
                if workflows.is_empty() {
                    println!("No workflows found");
                }
                for wf in workflows {
                    if wf.description.is_empty() {
                        println!("{} ({} steps)", wf.name, wf.steps);
                    } else {
                        println!("{} ({} steps) - {}", wf.name, wf.steps, wf.description);
                    }
                }
            }
            OutputEvent::Info { message } => {
                eprintln!("{}", message);
            }
            OutputEvent::Debug { message } => {
                if self.debug {
                    eprintln!("[debug] {}", message);
                }
            }
        }
    }
}

/// JSON output handler, one event per line
pub struct JsonHandler {
    pretty: bool,
}

impl JsonHandler {
    /// Create a new JSON handler
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn to_json(&self, event: &OutputEvent) -> serde_json::Result<String> {
        if self.pretty {
            serde_json::to_string_pretty(event)
        } else {
            serde_json::to_string(event)
        }
    }
}

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        if matches!(event, OutputEvent::Debug { .. }) {
            return;
        }
        match self.to_json(&event) {
            Ok(s) => println!("{}", s),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize output event"),
        }
    }
}

/// Quiet handler: only errors get through
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, event: OutputEvent) {
        if let OutputEvent::WorkflowError { error } = event {
            eprintln!("Error: {}", error);
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Box::new(JsonHandler::new(false)),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}

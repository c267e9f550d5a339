//! Workflow execution engine for wflow
//!
//! This module handles:
//! - Dependency levels and cycle detection
//! - Step execution through a pluggable [`CommandRunner`]
//! - Level-by-level orchestration with bounded parallelism
//! - Execution reports
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wflow::config::{EngineConfig, load_workflow};
//! use wflow::workflow::{RunOptions, WorkflowRunner};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Arc::new(EngineConfig::load(None)?);
//! let workflow = load_workflow("release", None, &config)?;
//!
//! let runner = WorkflowRunner::new(config.clone());
//! let result = runner
//!     .execute_workflow(workflow, RunOptions::default().with_override("ENV", "staging"))
//!     .await?;
//!
//! if result.success {
//!     println!("Workflow completed successfully!");
//! }
//! # Ok(())
//! # }
//! ```

mod executor;
mod graph;
mod report;
mod runner;
mod state;

pub use executor::{
    CommandInvocation, CommandRunner, ExecutionContext, ShellRunner, execute_step,
    resolve_working_dir,
};
pub use graph::{ExecutionPlan, schedule};
pub use report::{ExecutionReport, ReportError, StepReport, save_execution_report};
pub use runner::{RunOptions, WorkflowRunner};
pub use state::{SkipReason, StepStatus, WorkflowResult, WorkflowStep};

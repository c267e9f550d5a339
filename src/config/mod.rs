//! Configuration types and loading for wflow

mod error;
mod loader;
mod workflow;

pub use error::{WorkflowError, suggest_correction};
pub use loader::{
    Defaults, EngineConfig, PROJECT_DIR, WorkflowSummary, list_workflows, load_workflow,
    load_workflow_file, parse_workflow, resolve_workflow_path,
};
pub use workflow::{DocumentFormat, StepDefinition, WorkflowDefinition};

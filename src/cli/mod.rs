//! CLI module for wflow
//!
//! This module provides:
//! - Command implementations (run, validate, workflows)
//! - Output handlers (console, JSON, quiet)
//! - Signal handling for graceful shutdown
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wflow::cli::{CancellationToken, OutputMode, RunArgs, create_handler, run_workflow};
//! use wflow::config::EngineConfig;
//!
//! # async fn run() -> Result<(), String> {
//! let handler = create_handler(OutputMode::Console, false);
//! let config = Arc::new(EngineConfig::default());
//! let exit_code = run_workflow(
//!     "release",
//!     RunArgs::default(),
//!     None,
//!     config,
//!     CancellationToken::new(),
//!     &*handler,
//! )
//! .await?;
//! # let _ = exit_code;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod output;
pub mod signals;

pub use commands::{RunArgs, list_workflows, parse_var_overrides, run_workflow, validate_workflow};
pub use output::{OutputEvent, OutputHandler, OutputMode, create_handler};
pub use signals::{CancellationToken, FORCED_EXIT_CODE, install_signal_handlers};

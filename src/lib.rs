//! wflow: run declarative multi-step workflows
//!
//! Steps declare dependencies on each other and are grouped into levels;
//! the steps of one level run concurrently, levels run in order.

pub mod cli;
pub mod config;
pub mod logging;
pub mod process;
pub mod template;
pub mod workflow;

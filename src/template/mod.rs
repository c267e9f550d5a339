//! Variable resolution and step conditions for wflow
//!
//! # Features
//!
//! - Variable substitution: `${NAME}`, unknown names left verbatim
//! - Conditions: `${ENV} == 'production'`, `${BRANCH} != "main"`
//!
//! # Example
//!
//! ```
//! use wflow::template::{VariableContext, evaluate_condition, substitute};
//!
//! let mut vars = VariableContext::new();
//! vars.set("ENV", "staging");
//!
//! assert_eq!(substitute("deploy ${ENV} ${TAG}", &vars), "deploy staging ${TAG}");
//! assert!(!evaluate_condition("${ENV} == 'production'", &vars).unwrap());
//! ```

mod conditionals;
mod context;
mod engine;
mod errors;

pub use conditionals::{
    Comparison, Condition, Operand, evaluate_condition, should_execute_step,
};
pub use context::VariableContext;
pub use engine::{substitute, unresolved};
pub use errors::ConditionError;

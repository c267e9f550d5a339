//! Workflow and step definitions

use super::error::WorkflowError;
use crate::template::{Condition, ConditionError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// A loaded workflow, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    /// Workflow name
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Workflow-level variables
    pub variables: BTreeMap<String, String>,

    /// Steps in declaration order
    pub steps: Vec<StepDefinition>,

    /// Document the workflow was loaded from
    pub source: Option<PathBuf>,

    /// Directory steps run in when they don't set `working_directory`
    pub base_dir: PathBuf,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            variables: BTreeMap::new(),
            steps,
            source: None,
            base_dir: PathBuf::from("."),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Find a step by name
    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Configuration for a workflow step
#[derive(Debug, Clone, PartialEq)]
pub struct StepDefinition {
    /// Step name (unique within workflow)
    pub name: String,

    /// Shell command, `run` in the document
    pub command: String,

    /// Directory to run in, relative paths resolve against the base dir
    pub working_directory: Option<String>,

    /// Raw condition expression as written
    pub condition: Option<String>,

    /// Parsed form of `condition`
    pub parsed_condition: Option<Condition>,

    /// Steps this step depends on, duplicates removed
    pub depends_on: Vec<String>,

    /// Don't cascade a failure to dependents
    pub continue_on_error: bool,

    /// Timeout in seconds, overrides the engine default
    pub timeout: Option<u64>,

    /// Variable that receives the step's trimmed stdout
    pub capture: Option<String>,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            working_directory: None,
            condition: None,
            parsed_condition: None,
            depends_on: Vec::new(),
            continue_on_error: false,
            timeout: None,
            capture: None,
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.depends_on.contains(&dep) {
                self.depends_on.push(dep);
            }
        }
        self
    }

    pub fn with_condition(mut self, expr: impl Into<String>) -> Result<Self, ConditionError> {
        let expr = expr.into();
        self.parsed_condition = Condition::parse(&expr)?;
        self.condition = Some(expr);
        Ok(self)
    }

    pub fn continue_on_error(mut self, value: bool) -> Self {
        self.continue_on_error = value;
        self
    }

    pub fn in_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn capture_as(mut self, variable: impl Into<String>) -> Self {
        self.capture = Some(variable.into());
        self
    }
}

/// Document formats the loader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Toml,
    Json,
}

impl DocumentFormat {
    /// Pick a format from the file extension, YAML when unknown
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("toml") => Self::Toml,
            Some("json") => Self::Json,
            _ => Self::Yaml,
        }
    }

    pub const EXTENSIONS: [&'static str; 4] = ["yaml", "yml", "toml", "json"];
}

/// Variable value as written in a document
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum ScalarValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Integer(i) => write!(f, "{i}"),
            ScalarValue::Float(x) => write!(f, "{x}"),
            ScalarValue::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Step entry as it appears in a document
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    name: Option<String>,

    run: Option<String>,

    working_directory: Option<String>,

    #[serde(alias = "if")]
    condition: Option<String>,

    depends_on: Option<OneOrMany>,

    #[serde(default)]
    continue_on_error: bool,

    timeout: Option<u64>,

    capture: Option<String>,
}

/// Workflow document before validation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawWorkflow {
    name: Option<String>,

    #[serde(default)]
    description: Option<String>,

    #[serde(default)]
    variables: BTreeMap<String, ScalarValue>,

    steps: Option<Vec<RawStep>>,
}

impl RawWorkflow {
    pub(crate) fn parse(text: &str, format: DocumentFormat, document: &str) -> Result<Self, WorkflowError> {
        let parsed = match format {
            DocumentFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            DocumentFormat::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            DocumentFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| WorkflowError::parse(document, message))
    }

    /// Validate required fields and build the definition
    pub(crate) fn into_definition(
        self,
        document: &str,
        fallback_name: Option<&str>,
    ) -> Result<WorkflowDefinition, WorkflowError> {
        let name = match self.name.filter(|n| !n.trim().is_empty()) {
            Some(name) => name,
            None => fallback_name
                .map(str::to_string)
                .ok_or_else(|| WorkflowError::parse(document, "missing required key 'name'"))?,
        };

        let raw_steps = self
            .steps
            .ok_or_else(|| WorkflowError::parse(document, "missing required key 'steps'"))?;

        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(raw_steps.len());

        for (index, raw) in raw_steps.into_iter().enumerate() {
            let step_name = raw.name.filter(|n| !n.trim().is_empty()).ok_or_else(|| {
                WorkflowError::parse(
                    document,
                    format!("step #{} is missing required field 'name'", index + 1),
                )
            })?;

            if !seen.insert(step_name.clone()) {
                return Err(WorkflowError::parse(
                    document,
                    format!("duplicate step name '{}'", step_name),
                ));
            }

            let command = raw.run.ok_or_else(|| {
                WorkflowError::parse(
                    document,
                    format!("step '{}' is missing required field 'run'", step_name),
                )
            })?;

            if let Some(ref var) = raw.capture {
                if var.is_empty() || var.contains(|c: char| c.is_whitespace() || "${}".contains(c)) {
                    return Err(WorkflowError::parse(
                        document,
                        format!("step '{}' has invalid capture variable '{}'", step_name, var),
                    ));
                }
            }

            let mut step = StepDefinition::new(step_name, command)
                .depends_on(raw.depends_on.map(OneOrMany::into_vec).unwrap_or_default())
                .continue_on_error(raw.continue_on_error);
            step.working_directory = raw.working_directory;
            step.timeout = raw.timeout;
            step.capture = raw.capture;

            if let Some(expr) = raw.condition {
                let step_name = step.name.clone();
                step = step
                    .with_condition(expr.clone())
                    .map_err(|e| WorkflowError::ConditionSyntax {
                        step: step_name,
                        expression: expr,
                        message: e.to_string(),
                    })?;
            }

            steps.push(step);
        }

        Ok(WorkflowDefinition {
            name,
            description: self.description.unwrap_or_default(),
            variables: self
                .variables
                .into_iter()
                .map(|(k, v)| (k, v.to_string()))
                .collect(),
            steps,
            source: None,
            base_dir: PathBuf::from("."),
        })
    }
}

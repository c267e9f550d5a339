//! Configuration loading with multi-layer merge, workflow loading and discovery

use super::error::WorkflowError;
use super::workflow::{DocumentFormat, RawWorkflow, WorkflowDefinition};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding project-level config and workflows
pub const PROJECT_DIR: &str = ".wflow";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Global defaults
    #[serde(default)]
    pub defaults: Defaults,

    /// Extra directories searched for workflow documents
    #[serde(default)]
    pub workflow_dirs: Vec<PathBuf>,
}

/// Global default settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Per-step timeout in seconds
    #[serde(default = "default_step_timeout")]
    pub step_timeout: u64,

    /// Max steps of one level running at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Shell and flag used to run commands, e.g. ["bash", "-c"]
    pub shell: Option<Vec<String>>,

    /// Where execution reports are written
    pub report_dir: Option<PathBuf>,

    /// Characters of step output kept in reports
    #[serde(default = "default_output_snippet")]
    pub output_snippet: usize,
}

fn default_step_timeout() -> u64 {
    3600
}

fn default_max_concurrent() -> usize {
    4
}

fn default_output_snippet() -> usize {
    2000
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            step_timeout: default_step_timeout(),
            max_concurrent: default_max_concurrent(),
            shell: None,
            report_dir: None,
            output_snippet: default_output_snippet(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/wflow/config.toml
    /// 3. .wflow/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = project_root(project_dir).join(PROJECT_DIR).join("config.toml");
        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/wflow/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("wflow/config.toml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.defaults.step_timeout != default_step_timeout() {
            self.defaults.step_timeout = other.defaults.step_timeout;
        }
        if other.defaults.max_concurrent != default_max_concurrent() {
            self.defaults.max_concurrent = other.defaults.max_concurrent;
        }
        if other.defaults.shell.is_some() {
            self.defaults.shell = other.defaults.shell;
        }
        if other.defaults.report_dir.is_some() {
            self.defaults.report_dir = other.defaults.report_dir;
        }
        if other.defaults.output_snippet != default_output_snippet() {
            self.defaults.output_snippet = other.defaults.output_snippet;
        }

        // Project dirs are searched before user dirs
        let mut merged = other.workflow_dirs;
        for dir in self.workflow_dirs.drain(..) {
            if !merged.contains(&dir) {
                merged.push(dir);
            }
        }
        self.workflow_dirs = merged;
    }

    /// Report directory, falling back to the user data dir
    pub fn report_dir(&self) -> Option<PathBuf> {
        self.defaults
            .report_dir
            .as_ref()
            .map(|p| PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref()))
            .or_else(|| dirs::data_dir().map(|p| p.join("wflow").join("reports")))
    }

    /// Directories searched for named workflows, in priority order
    pub fn workflow_search_dirs(&self, project_dir: Option<&Path>) -> Vec<PathBuf> {
        let root = project_root(project_dir);
        let mut search = vec![root.join(PROJECT_DIR).join("workflows")];
        for dir in &self.workflow_dirs {
            let expanded = PathBuf::from(shellexpand::tilde(&dir.to_string_lossy()).as_ref());
            search.push(if expanded.is_relative() {
                root.join(expanded)
            } else {
                expanded
            });
        }
        if let Some(user_dir) = dirs::config_dir() {
            search.push(user_dir.join("wflow").join("workflows"));
        }
        search
    }
}

fn project_root(project_dir: Option<&Path>) -> PathBuf {
    project_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Parse a workflow document from text
///
/// `fallback_name` is used when the document has no top-level `name`.
pub fn parse_workflow(
    text: &str,
    format: DocumentFormat,
    fallback_name: Option<&str>,
) -> Result<WorkflowDefinition, WorkflowError> {
    let document = fallback_name.unwrap_or("<inline>");
    RawWorkflow::parse(text, format, document)?.into_definition(document, fallback_name)
}

/// Load and validate a workflow document
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WorkflowError::MissingFile {
                path: path.to_path_buf(),
            }
        } else {
            WorkflowError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    let document = path.display().to_string();
    let stem = path.file_stem().and_then(|s| s.to_str());
    let mut workflow = RawWorkflow::parse(&contents, DocumentFormat::from_path(path), &document)?
        .into_definition(&document, stem)?;

    workflow.base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    workflow.source = Some(path.to_path_buf());

    tracing::debug!(
        workflow = %workflow.name,
        path = %path.display(),
        steps = workflow.steps.len(),
        "Loaded workflow"
    );

    Ok(workflow)
}

/// Resolve a workflow reference to a document path
///
/// Search order (first match wins):
/// 1. The reference as a literal path
/// 2. Each search directory, trying `{name}.yaml`, `.yml`, `.toml`, `.json`
pub fn resolve_workflow_path(
    reference: &str,
    project_dir: Option<&Path>,
    config: &EngineConfig,
) -> Result<PathBuf, WorkflowError> {
    let literal = PathBuf::from(reference);
    if literal.is_file() {
        return Ok(literal);
    }

    for dir in config.workflow_search_dirs(project_dir) {
        for ext in DocumentFormat::EXTENSIONS {
            let candidate = dir.join(format!("{}.{}", reference, ext));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(WorkflowError::MissingFile { path: literal })
}

/// Load a workflow by path or by name
pub fn load_workflow(
    reference: &str,
    project_dir: Option<&Path>,
    config: &EngineConfig,
) -> Result<WorkflowDefinition, WorkflowError> {
    let path = resolve_workflow_path(reference, project_dir, config)?;
    load_workflow_file(&path)
}

/// Summary of a discoverable workflow
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    pub steps: usize,
}

/// List every loadable workflow in the search directories without running anything
///
/// A name found in several directories is reported once, from the first one.
pub fn list_workflows(project_dir: Option<&Path>, config: &EngineConfig) -> Vec<WorkflowSummary> {
    let mut found: Vec<WorkflowSummary> = Vec::new();

    for dir in config.workflow_search_dirs(project_dir) {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| DocumentFormat::EXTENSIONS.contains(&e))
            })
            .collect();
        paths.sort();

        for path in paths {
            match load_workflow_file(&path) {
                Ok(wf) => {
                    if found.iter().any(|s| s.name == wf.name) {
                        continue;
                    }
                    found.push(WorkflowSummary {
                        name: wf.name,
                        description: wf.description,
                        path,
                        steps: wf.steps.len(),
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable workflow");
                }
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", contents).unwrap();
        path
    }

    #[test]
    fn test_load_empty_config() {
        let config = EngineConfig::default();
        assert_eq!(config.defaults.step_timeout, 3600);
        assert_eq!(config.defaults.max_concurrent, 4);
        assert_eq!(config.defaults.output_snippet, 2000);
        assert!(config.workflow_dirs.is_empty());
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "config.toml",
            r#"
            workflow_dirs = ["ci/workflows"]

            [defaults]
            step_timeout = 60
            max_concurrent = 2
            shell = ["bash", "-c"]
        "#,
        );

        let config = EngineConfig::load_file(&path).unwrap();
        assert_eq!(config.defaults.step_timeout, 60);
        assert_eq!(config.defaults.max_concurrent, 2);
        assert_eq!(config.defaults.shell, Some(vec!["bash".into(), "-c".into()]));
        assert_eq!(config.workflow_dirs, vec![PathBuf::from("ci/workflows")]);
    }

    #[test]
    fn test_project_config_layer() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            ".wflow/config.toml",
            "[defaults]\nreport_dir = \"/tmp/wflow-reports\"\n",
        );

        let config = EngineConfig::load(Some(dir.path())).unwrap();
        assert_eq!(config.report_dir(), Some(PathBuf::from("/tmp/wflow-reports")));
    }

    #[test]
    fn test_config_rejects_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "config.toml", "[defaults]\ntimeout = 5\n");
        assert!(EngineConfig::load_file(&path).is_err());
    }

    #[test]
    fn test_config_merge() {
        let mut base = EngineConfig::default();
        base.defaults.step_timeout = 30;
        base.workflow_dirs.push("user".into());

        let mut other = EngineConfig::default();
        other.defaults.step_timeout = 90;
        other.defaults.shell = Some(vec!["zsh".into(), "-c".into()]);
        other.workflow_dirs.push("project".into());

        base.merge(other);
        assert_eq!(base.defaults.step_timeout, 90);
        assert!(base.defaults.shell.is_some());
        assert_eq!(
            base.workflow_dirs,
            vec![PathBuf::from("project"), PathBuf::from("user")]
        );
    }

    #[test]
    fn test_load_workflow_file_sets_base_dir_and_name() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "flows/nightly.yaml",
            "steps:\n  - name: a\n    run: echo a\n",
        );

        let wf = load_workflow_file(&path).unwrap();
        assert_eq!(wf.name, "nightly");
        assert_eq!(wf.base_dir, dir.path().join("flows"));
        assert_eq!(wf.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_missing_file_is_distinct() {
        let dir = TempDir::new().unwrap();
        let err = load_workflow_file(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingFile { .. }));
    }

    #[test]
    fn test_resolve_by_name() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            ".wflow/workflows/ci.toml",
            "name = \"ci\"\nsteps = []\n",
        );
        let config = EngineConfig::default();

        assert_eq!(resolve_workflow_path("ci", Some(dir.path()), &config).unwrap(), path);
        assert!(matches!(
            resolve_workflow_path("missing", Some(dir.path()), &config),
            Err(WorkflowError::MissingFile { .. })
        ));
    }

    #[test]
    fn test_list_workflows() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            ".wflow/workflows/build.yaml",
            "name: build\ndescription: Compile\nsteps:\n  - name: a\n    run: make\n",
        );
        write(dir.path(), ".wflow/workflows/broken.yaml", "steps: [oops");
        write(dir.path(), ".wflow/workflows/notes.txt", "not a workflow");
        write(dir.path(), "extra/release.json", r#"{"name":"release","steps":[]}"#);

        let mut config = EngineConfig::default();
        config.workflow_dirs.push("extra".into());

        let listed = list_workflows(Some(dir.path()), &config);
        let names: Vec<_> = listed.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"build"));
        assert!(names.contains(&"release"));
        assert!(!names.contains(&"broken"));

        let build = listed.iter().find(|s| s.name == "build").unwrap();
        assert_eq!(build.description, "Compile");
        assert_eq!(build.steps, 1);
    }

    #[test]
    fn test_parse_workflow_inline() {
        let wf = parse_workflow(
            r#"{"name": "inline", "steps": [{"name": "a", "run": "true"}]}"#,
            DocumentFormat::Json,
            None,
        )
        .unwrap();
        assert_eq!(wf.name, "inline");
        assert_eq!(wf.steps[0].command, "true");
    }
}

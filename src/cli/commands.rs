//! CLI command implementations

use super::output::{OutputEvent, OutputHandler};
use super::signals::CancellationToken;
use crate::config::{EngineConfig, load_workflow};
use crate::workflow::{
    RunOptions, SkipReason, StepStatus, WorkflowResult, WorkflowRunner, schedule,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arguments of `wflow run`
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub dry_run: bool,
    /// `KEY=VALUE` overrides
    pub vars: Vec<String>,
    pub report_dir: Option<PathBuf>,
    pub no_report: bool,
}

/// Run a workflow
pub async fn run_workflow(
    reference: &str,
    args: RunArgs,
    project_dir: Option<&Path>,
    config: Arc<EngineConfig>,
    cancel: CancellationToken,
    handler: &dyn OutputHandler,
) -> Result<i32, String> {
    let overrides = parse_var_overrides(&args.vars)?;

    let workflow = load_workflow(reference, project_dir, &config)
        .map_err(|e| format!("Failed to load workflow '{}': {}", reference, e))?;
    let levels = schedule(&workflow.steps).map_err(|e| e.to_string())?;

    handler.emit(OutputEvent::WorkflowStart {
        name: workflow.name.clone(),
        steps: workflow.steps.len(),
        levels: levels.len(),
        dry_run: args.dry_run,
    });

    let report_dir = if args.no_report {
        None
    } else {
        args.report_dir.or_else(|| config.report_dir())
    };

    let options = RunOptions {
        dry_run: args.dry_run,
        overrides,
        report_dir,
        base_dir: Some(project_dir.map_or_else(|| PathBuf::from("."), Path::to_path_buf)),
        cancel,
    };

    let runner = WorkflowRunner::new(config.clone());
    let result = runner
        .execute_workflow(workflow, options)
        .await
        .map_err(|e| format!("Workflow execution failed: {}", e))?;

    emit_result(&result, handler);
    Ok(result.exit_code())
}

fn emit_result(result: &WorkflowResult, handler: &dyn OutputHandler) {
    for step in &result.steps {
        match (step.status, &step.skip_reason) {
            (StepStatus::Skipped, Some(reason)) => handler.emit(OutputEvent::StepSkipped {
                name: step.name().to_string(),
                reason: reason.to_string(),
                command: matches!(reason, SkipReason::DryRun)
                    .then(|| step.command.clone())
                    .flatten(),
            }),
            (status, _) => handler.emit(OutputEvent::StepComplete {
                name: step.name().to_string(),
                status,
                duration_ms: step.duration().as_millis() as u64,
                exit_code: step.exit_code,
                error: step.error.clone(),
            }),
        }
        if !step.stderr.is_empty() {
            handler.emit(OutputEvent::Debug {
                message: format!("{} stderr:\n{}", step.name(), step.stderr.trim_end()),
            });
        }
    }

    let count = |status| result.steps.iter().filter(|s| s.status == status).count();
    handler.emit(OutputEvent::WorkflowComplete {
        success: result.success,
        cancelled: result.cancelled,
        duration_ms: result.duration.as_millis() as u64,
        succeeded: count(StepStatus::Success),
        failed: count(StepStatus::Failed),
        skipped: count(StepStatus::Skipped),
        report: result.report_path.clone(),
    });
}

/// Parse `KEY=VALUE` pairs given with `--var`
pub fn parse_var_overrides(vars: &[String]) -> Result<BTreeMap<String, String>, String> {
    let mut parsed = BTreeMap::new();

    for var in vars {
        match var.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                parsed.insert(key.trim().to_string(), value.to_string());
            }
            _ => return Err(format!("Invalid variable '{}', expected KEY=VALUE", var)),
        }
    }

    Ok(parsed)
}

/// Validate a workflow without running it
pub fn validate_workflow(
    reference: &str,
    project_dir: Option<&Path>,
    config: &EngineConfig,
    handler: &dyn OutputHandler,
) -> i32 {
    let workflow = match load_workflow(reference, project_dir, config) {
        Ok(wf) => wf,
        Err(e) => {
            handler.emit(OutputEvent::WorkflowError {
                error: format!("Failed to load workflow: {}", e),
            });
            return 1;
        }
    };

    match schedule(&workflow.steps) {
        Ok(levels) => {
            handler.emit(OutputEvent::Info {
                message: format!(
                    "✓ Workflow '{}' is valid ({} steps in {} levels)",
                    workflow.name,
                    workflow.steps.len(),
                    levels.len()
                ),
            });
            for (i, level) in levels.iter().enumerate() {
                let names: Vec<&str> = level
                    .iter()
                    .map(|&idx| workflow.steps[idx].name.as_str())
                    .collect();
                handler.emit(OutputEvent::Info {
                    message: format!("  level {}: {}", i + 1, names.join(", ")),
                });
            }
            0
        }
        Err(e) => {
            handler.emit(OutputEvent::WorkflowError {
                error: format!("✗ Workflow '{}' is invalid: {}", workflow.name, e),
            });
            1
        }
    }
}

/// List discoverable workflows
pub fn list_workflows(
    project_dir: Option<&Path>,
    config: &EngineConfig,
    handler: &dyn OutputHandler,
) -> i32 {
    let workflows = crate::config::list_workflows(project_dir, config);
    handler.emit(OutputEvent::WorkflowList { workflows });
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::output::tests::MockHandler;
    use crate::config::PROJECT_DIR;
    use tempfile::TempDir;

    fn project(workflows: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let wf_dir = dir.path().join(PROJECT_DIR).join("workflows");
        std::fs::create_dir_all(&wf_dir).unwrap();
        for (name, body) in workflows {
            std::fs::write(wf_dir.join(name), body).unwrap();
        }
        dir
    }

    const DEPLOY: &str = r#"
name: deploy
description: Ship it
variables:
  ENV: staging
steps:
  - name: build
    run: echo building ${ENV}
  - name: push
    run: echo pushing
    depends_on: [build]
    condition: "${ENV} == 'production'"
"#;

    #[test]
    fn test_parse_var_overrides() {
        let vars = vec!["ENV=production".to_string(), "URL=http://x?a=b".to_string()];
        let parsed = parse_var_overrides(&vars).unwrap();

        assert_eq!(parsed.get("ENV").map(String::as_str), Some("production"));
        assert_eq!(parsed.get("URL").map(String::as_str), Some("http://x?a=b"));
    }

    #[test]
    fn test_parse_var_overrides_rejects_malformed() {
        assert!(parse_var_overrides(&["novalue".to_string()]).is_err());
        assert!(parse_var_overrides(&["=value".to_string()]).is_err());
        assert_eq!(
            parse_var_overrides(&["EMPTY=".to_string()]).unwrap()["EMPTY"],
            ""
        );
    }

    #[test]
    fn test_validate_reports_levels() {
        let dir = project(&[("deploy.yaml", DEPLOY)]);
        let handler = MockHandler::new();

        let code = validate_workflow("deploy", Some(dir.path()), &EngineConfig::default(), &handler);

        assert_eq!(code, 0);
        let events = handler.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], OutputEvent::Info { message } if message.contains("is valid")));
    }

    #[test]
    fn test_validate_cycle_fails() {
        let dir = project(&[(
            "loop.yaml",
            "name: loop\nsteps:\n  - {name: a, run: x, depends_on: [b]}\n  - {name: b, run: x, depends_on: [a]}\n",
        )]);
        let handler = MockHandler::new();

        let code = validate_workflow("loop", Some(dir.path()), &EngineConfig::default(), &handler);

        assert_eq!(code, 1);
        assert!(matches!(&handler.events()[0], OutputEvent::WorkflowError { .. }));
    }

    #[test]
    fn test_validate_missing_workflow() {
        let dir = project(&[]);
        let handler = MockHandler::new();
        assert_eq!(
            validate_workflow("nope", Some(dir.path()), &EngineConfig::default(), &handler),
            1
        );
    }

    #[tokio::test]
    async fn test_dry_run_emits_plan() {
        let dir = project(&[("deploy.yaml", DEPLOY)]);
        let handler = MockHandler::new();
        let args = RunArgs {
            dry_run: true,
            vars: vec!["ENV=production".into()],
            no_report: true,
            ..Default::default()
        };

        let code = run_workflow(
            "deploy",
            args,
            Some(dir.path()),
            Arc::new(EngineConfig::default()),
            CancellationToken::new(),
            &handler,
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        let events = handler.events();
        assert!(matches!(
            &events[0],
            OutputEvent::WorkflowStart { steps: 2, levels: 2, dry_run: true, .. }
        ));
        assert!(matches!(
            &events[1],
            OutputEvent::StepSkipped { name, command: Some(cmd), .. }
                if name == "build" && cmd == "echo building production"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_writes_report_and_exit_code() {
        let dir = project(&[(
            "fail.yaml",
            "name: fail\nsteps:\n  - {name: ok, run: 'true'}\n  - {name: bad, run: 'exit 3', depends_on: [ok]}\n",
        )]);
        let reports = dir.path().join("reports");
        let handler = MockHandler::new();
        let args = RunArgs {
            report_dir: Some(reports.clone()),
            ..Default::default()
        };

        let code = run_workflow(
            "fail",
            args,
            Some(dir.path()),
            Arc::new(EngineConfig::default()),
            CancellationToken::new(),
            &handler,
        )
        .await
        .unwrap();

        assert_eq!(code, 1);
        assert_eq!(std::fs::read_dir(&reports).unwrap().count(), 1);
        let complete = handler.events().into_iter().last().unwrap();
        assert!(matches!(
            complete,
            OutputEvent::WorkflowComplete { success: false, succeeded: 1, failed: 1, skipped: 0, report: Some(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_run_rejects_bad_var() {
        let handler = MockHandler::new();
        let args = RunArgs {
            vars: vec!["oops".into()],
            ..Default::default()
        };
        let err = run_workflow(
            "anything",
            args,
            None,
            Arc::new(EngineConfig::default()),
            CancellationToken::new(),
            &handler,
        )
        .await
        .unwrap_err();
        assert!(err.contains("KEY=VALUE"));
    }

    #[test]
    fn test_list_workflows_emits_summaries() {
        let dir = project(&[("deploy.yaml", DEPLOY)]);
        let handler = MockHandler::new();

        assert_eq!(list_workflows(Some(dir.path()), &EngineConfig::default(), &handler), 0);

        match &handler.events()[0] {
            OutputEvent::WorkflowList { workflows } => {
                assert!(workflows.iter().any(|w| w.name == "deploy" && w.steps == 2));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

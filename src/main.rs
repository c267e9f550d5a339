use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use wflow::cli::{self, CancellationToken, OutputEvent, OutputMode, RunArgs};
use wflow::config::EngineConfig;
use wflow::logging::{self, LogOptions};

#[derive(Parser)]
#[command(name = "wflow")]
#[command(about = "Run declarative workflows of dependent shell steps")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, value_enum)]
    output: Option<OutputMode>,

    /// Also log to a file (a dated file under the config dir if no path is given)
    #[arg(long, global = true, num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow
    Run {
        /// Workflow name or path
        workflow: String,

        /// Resolve and print steps without running them
        #[arg(long)]
        dry_run: bool,

        /// Override a workflow variable (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Directory for the execution report
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Don't write an execution report
        #[arg(long, conflicts_with = "report_dir")]
        no_report: bool,
    },

    /// Validate a workflow without running
    Validate {
        /// Workflow name or path
        workflow: String,
    },

    /// List available workflows
    Workflows,
}

impl Commands {
    fn label(&self) -> &str {
        match self {
            Commands::Run { workflow, .. } | Commands::Validate { workflow } => workflow
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(workflow),
            Commands::Workflows => "wflow",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mode = cli
        .output
        .unwrap_or(if cli.quiet { OutputMode::Quiet } else { OutputMode::Console });

    let log_file = match cli.log_file {
        Some(Some(path)) => Some(path),
        Some(None) => Some(logging::default_log_path(cli.command.label())?),
        None => None,
    };
    logging::init_logging(LogOptions {
        debug: cli.debug,
        quiet: cli.quiet,
        json: mode == OutputMode::Json,
        log_file,
    })?;

    let handler = cli::create_handler(mode, cli.debug);
    let project_dir = cli.dir.as_deref();
    let config = Arc::new(EngineConfig::load(project_dir)?);

    let exit_code = match cli.command {
        Commands::Run {
            workflow,
            dry_run,
            vars,
            report_dir,
            no_report,
        } => {
            let cancel = CancellationToken::new();
            let signals = cli::install_signal_handlers(cancel.clone());

            let args = RunArgs {
                dry_run,
                vars,
                report_dir,
                no_report,
            };
            let outcome =
                cli::run_workflow(&workflow, args, project_dir, config, cancel, &*handler).await;
            signals.abort();

            match outcome {
                Ok(code) => code,
                Err(error) => {
                    handler.emit(OutputEvent::WorkflowError { error });
                    1
                }
            }
        }

        Commands::Validate { workflow } => {
            cli::validate_workflow(&workflow, project_dir, &config, &*handler)
        }

        Commands::Workflows => cli::list_workflows(project_dir, &config, &*handler),
    };

    std::process::exit(exit_code);
}

use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging switches taken from the command line
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub debug: bool,
    pub quiet: bool,
    /// Emit stderr logs as JSON lines
    pub json: bool,
    pub log_file: Option<PathBuf>,
}

fn filter_directive(options: &LogOptions) -> &'static str {
    if options.debug {
        "wflow=debug"
    } else if options.quiet {
        "wflow=error"
    } else {
        "wflow=info"
    }
}

/// Initialize logging based on output mode and debug flag
pub fn init_logging(options: LogOptions) -> anyhow::Result<()> {
    let env_filter = EnvFilter::new(filter_directive(&options));
    let debug = options.debug;

    let text_layer = (!options.json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(debug)
            .with_file(debug)
            .with_writer(std::io::stderr)
    });
    let json_layer = options
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));

    let file_layer = match options.log_file {
        Some(log_path) => {
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)?;

            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(file)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Get default log file path for a workflow
pub fn default_log_path(workflow_name: &str) -> anyhow::Result<PathBuf> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("wflow")
        .join("logs");

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let filename = format!("{}-{}.log", workflow_name, timestamp);

    Ok(log_dir.join(filename))
}

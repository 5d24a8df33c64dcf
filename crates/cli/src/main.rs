//! delegate CLI - asynchronous task delegation for LLM control loops.

mod demo;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use delegate_execution::ManagerConfig;
use serde_json::json;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,delegate=info";

#[derive(Parser)]
#[command(name = "delegate")]
#[command(about = "Asynchronous task delegation for LLM control loops", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Number of workers
    #[arg(long, env = "DELEGATE_MAX_WORKERS", default_value_t = delegate_execution::DEFAULT_MAX_WORKERS, global = true)]
    max_workers: usize,

    /// Longest allowed sleep, in seconds
    #[arg(long, default_value_t = 60.0, global = true)]
    max_sleep: f64,

    /// Default wait_for_tasks bound, in seconds
    #[arg(long, default_value_t = 30.0, global = true)]
    default_wait: f64,

    /// Log as JSON lines
    #[arg(long, env = "DELEGATE_LOG_JSON", global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the parallel, failure and timeout scenarios
    Demo {
        /// Tasks in the parallel batch
        #[arg(long, default_value = "4")]
        tasks: usize,
        /// Delay of each batch task, in milliseconds
        #[arg(long, default_value = "500")]
        delay_ms: u64,
    },
    /// Print the control tool schemas as JSON
    Tools,
    /// Show version and configuration
    Info,
}

impl Cli {
    fn manager_config(&self) -> Result<ManagerConfig> {
        Ok(ManagerConfig::new()
            .with_max_workers(self.max_workers)
            .with_max_sleep(seconds("--max-sleep", self.max_sleep)?)
            .with_default_wait(seconds("--default-wait", self.default_wait)?))
    }
}

fn seconds(flag: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| anyhow::anyhow!("{} must be a non-negative number of seconds: {}", flag, e))
}

fn init_logging(log_json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);
    let config = cli.manager_config()?;

    match cli.command {
        Commands::Demo { tasks, delay_ms } => {
            demo::run(config, tasks, delay_ms).await?;
        }
        Commands::Tools => {
            let toolkit = demo::toolkit(config);
            let schemas: Vec<_> = toolkit
                .schemas()
                .into_iter()
                .map(|schema| {
                    json!({
                        "name": schema.name,
                        "description": schema.description,
                        "input_schema": schema.input_schema(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&schemas)?);
            toolkit.shutdown().await;
        }
        Commands::Info => {
            println!("delegate {}", env!("CARGO_PKG_VERSION"));
            println!("  Workers: {}", config.worker_count());
            println!("  Max sleep: {:.1}s", config.max_sleep.as_secs_f64());
            println!("  Default wait: {:.1}s", config.default_wait.as_secs_f64());
            println!("  Control tools: {}", delegate_ai::CONTROL_TOOL_NAMES.join(", "));
        }
    }

    Ok(())
}

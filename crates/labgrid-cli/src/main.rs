mod bootstrap;
mod config;
mod export_cmd;
mod list_cmd;
mod result_cmd;
mod run_cmd;
mod sample_experiments;
mod status_cmd;
mod wait_cmd;

use std::io::stdout;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

#[derive(Parser)]
#[command(name = "labgrid", about = "Distributed network-experiment orchestration framework")]
struct Cli {
    /// Path to the servers configuration file (host -> connection info).
    #[arg(long, global = true, default_value = "servers.json")]
    servers: String,

    /// Path to the framework configuration file. Defaults are used when absent.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one experiment and wait for it to finish.
    Run {
        #[arg(long = "type")]
        experiment_type: String,
        #[arg(long)]
        output: String,
        #[arg(long, default_value_t = 0)]
        priority: u32,
        #[arg(long, default_value_t = 0)]
        retries: u32,
        #[arg(long, default_value_t = 3600)]
        timeout: u64,
        /// Repeatable key=value experiment parameter (value parsed as JSON, falling back to a string).
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// Show cluster/queue status, or one task's status.
    Status {
        task_id: Option<String>,
    },
    /// Block until a task reaches a terminal state.
    Wait {
        task_id: String,
        #[arg(long, default_value_t = 3600)]
        timeout: u64,
    },
    /// Print a stored experiment result as JSON.
    Result {
        experiment_id: String,
    },
    /// List registered experiment types.
    List,
    /// Export the result index.
    Export {
        #[arg(long = "out")]
        out_path: String,
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Print a shell completion script to stdout.
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "labgrid", &mut stdout());
            return ExitCode::SUCCESS;
        }
        Commands::Run { experiment_type, output, priority, retries, timeout, params } => {
            run_cmd::run_run(&cli.servers, cli.config.as_deref(), &experiment_type, &output, priority, retries, timeout, &params).await
        }
        Commands::Status { task_id } => status_cmd::run_status(&cli.servers, cli.config.as_deref(), task_id.as_deref()).await,
        Commands::Wait { task_id, timeout } => {
            return match wait_cmd::run_wait(&cli.servers, cli.config.as_deref(), &task_id, timeout).await {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("{e:#}");
                    ExitCode::FAILURE
                }
            };
        }
        Commands::Result { experiment_id } => result_cmd::run_result(&cli.servers, cli.config.as_deref(), &experiment_id).await,
        Commands::List => list_cmd::run_list(&cli.servers, cli.config.as_deref()).await,
        Commands::Export { out_path, format } => export_cmd::run_export(&cli.servers, cli.config.as_deref(), &out_path, &format).await,
    };

    if let Err(e) = result {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

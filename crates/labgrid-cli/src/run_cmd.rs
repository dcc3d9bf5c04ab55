//! `labgrid run` command: submit one experiment and print its task id.

use anyhow::{bail, Result};
use labgrid_types::ExperimentConfig;

use crate::bootstrap::build_framework;

#[allow(clippy::too_many_arguments)]
pub async fn run_run(
    servers_path: &str,
    config_path: Option<&str>,
    experiment_type: &str,
    output_dir: &str,
    priority: u32,
    retries: u32,
    timeout_secs: u64,
    params: &[String],
) -> Result<()> {
    let framework = build_framework(servers_path, config_path)?;

    let mut config = ExperimentConfig::new(experiment_type, output_dir);
    config.priority = priority;
    config.retry_count = retries;
    config.timeout_secs = timeout_secs;
    for entry in params {
        let (key, value) = parse_param(entry)?;
        config.parameters.insert(key, value);
    }

    let task_id = framework.run_experiment(config)?;
    println!("{task_id}");

    // The task queue does not survive process restarts, so a CLI
    // invocation is the only chance this task gets to run: wait for it to
    // reach a terminal state before the process (and its worker pool)
    // disappears.
    let finished = framework.wait_for_experiment(&task_id, std::time::Duration::from_secs(timeout_secs + 5)).await;
    if finished {
        if let Some(status) = framework.get_experiment_status(&task_id) {
            println!("status: {status}");
        }
        if let Some(result) = framework.get_experiment_result(&task_id) {
            // experiment_id is the key `labgrid result` looks results up
            // by; it is assigned by the experiment instance and differs
            // from the task id above (see the data model).
            println!("experiment_id: {}", result.experiment_id);
        }
    } else {
        println!("status: did not reach a terminal state before the CLI timeout");
    }

    framework.stop().await;
    Ok(())
}

/// Parses one `--param key=value` entry. The value is interpreted as JSON
/// when possible (so `--param count=3` yields a number), falling back to a
/// plain string otherwise.
fn parse_param(entry: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, value)) = entry.split_once('=') else {
        bail!("invalid --param '{entry}', expected key=value");
    };
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), parsed))
}

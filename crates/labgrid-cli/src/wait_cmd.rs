//! `labgrid wait` command: block until a task reaches a terminal state.
//!
//! Since the task queue does not survive process restarts, this is only
//! useful when the `run` call that submitted the task is still in flight
//! in another process sharing the same result directory -- in practice,
//! prefer letting `run` wait internally. This command is kept because the
//! engine's public API supports waiting independently of submission.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;

use crate::bootstrap::build_framework;

pub async fn run_wait(servers_path: &str, config_path: Option<&str>, task_id: &str, timeout_secs: u64) -> Result<ExitCode> {
    let framework = build_framework(servers_path, config_path)?;
    let finished = framework.wait_for_experiment(task_id, Duration::from_secs(timeout_secs)).await;
    framework.stop().await;

    if finished {
        println!("{task_id}: terminal");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{task_id}: timed out waiting for a terminal state");
        Ok(ExitCode::FAILURE)
    }
}
